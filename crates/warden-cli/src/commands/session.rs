use anyhow::anyhow;
use tracing::info;

use crate::cli::{GetArgs, OutputFormat};
use crate::client::{AppContext, CliError, CliResult, classify_problem};
use crate::output::{SessionView, render_session};

pub(crate) async fn handle_bootstrap(ctx: &AppContext, format: OutputFormat) -> CliResult<()> {
    let session = ctx.start_session().await?;
    render_session(&SessionView::from_session(&session), format)
}

pub(crate) async fn handle_get(ctx: &AppContext, args: GetArgs) -> CliResult<()> {
    let body = fetch(ctx, &args.path).await?;
    println!("{body}");
    Ok(())
}

/// What the host logout chain did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogoutOutcome {
    /// A hook ended the identity provider session and stopped the chain.
    HandedOff,
    /// Every hook ran without ending an identity provider session.
    Completed {
        /// Number of hooks in the chain.
        hooks: usize,
    },
}

impl LogoutOutcome {
    const fn message(self) -> &'static str {
        match self {
            Self::HandedOff => "identity provider session ended",
            Self::Completed { hooks: 0 } => "no logout hooks registered",
            Self::Completed { .. } => "logout hooks completed; no identity provider session",
        }
    }
}

pub(crate) async fn handle_logout(ctx: &AppContext) -> CliResult<()> {
    println!("{}", logout(ctx).await?.message());
    Ok(())
}

pub(crate) async fn handle_metrics(ctx: &AppContext) -> CliResult<()> {
    let text = metrics_text(ctx).await?;
    print!("{text}");
    Ok(())
}

async fn fetch(ctx: &AppContext, path: &str) -> CliResult<String> {
    let url = ctx
        .settings
        .console_base()
        .join(path.trim_start_matches('/'))
        .map_err(|err| CliError::validation(format!("invalid path '{path}': {err}")))?;

    let session = ctx.start_session().await?;
    let response = session
        .client()
        .send(session.client().get(url.clone()))
        .await
        .map_err(|err| CliError::failure(anyhow::Error::new(err).context(format!("GET {url}"))))?;

    if response.status().is_success() {
        response
            .text()
            .await
            .map_err(|err| CliError::failure(anyhow!("failed to read response body: {err}")))
    } else {
        Err(classify_problem(response).await)
    }
}

async fn logout(ctx: &AppContext) -> CliResult<LogoutOutcome> {
    let session = ctx.start_session().await?;
    let hooks = session.logout_tasks().names().len();
    let completed = session.logout().await;
    info!(completed, hooks, "logout chain finished");
    Ok(if completed {
        LogoutOutcome::Completed { hooks }
    } else {
        LogoutOutcome::HandedOff
    })
}

async fn metrics_text(ctx: &AppContext) -> CliResult<String> {
    ctx.start_session().await?;
    ctx.metrics
        .render()
        .map_err(|err| CliError::failure(anyhow!("failed to render metrics: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use warden_auth::{AuthSettings, InitToken};
    use warden_events::NotificationBus;
    use warden_telemetry::Metrics;
    use warden_test_support::fixtures::ConsoleFixture;

    const ALICE_HEADER: &str = "Basic YWxpY2U6dG9rZW4tMQ==";

    fn context(settings: AuthSettings) -> AppContext {
        AppContext {
            settings,
            subject: "alice".to_string(),
            token_lifetime: None,
            notifications: NotificationBus::new(),
            metrics: Metrics::new().expect("metrics registry"),
        }
    }

    fn sso_console(console: &ConsoleFixture) -> AuthSettings {
        console.mock_enabled("true");
        console.mock_client_config(json!({"url": console.idp_base(), "realm": "console"}));
        console.mock_bundle("keycloak.js", 200);
        console.mock_any_validate();
        console.mock_user("\"alice\"");

        let mut settings = console.settings();
        settings.init_token = Some(InitToken::bare("token-1"));
        settings
    }

    #[tokio::test]
    async fn get_authorizes_with_preset_token() {
        let console = ConsoleFixture::start().await;
        let settings = sso_console(&console);
        let items = console.server().mock(|when, then| {
            when.method(GET)
                .path("/console/api/items")
                .header("authorization", ALICE_HEADER);
            then.status(200).body("[\"broker\"]");
        });

        let ctx = context(settings);
        let body = fetch(&ctx, "/api/items").await.expect("authorized fetch");
        assert_eq!(body, "[\"broker\"]");
        items.assert();
        assert!(ctx.notifications.backlog().is_empty());
    }

    #[tokio::test]
    async fn get_without_init_token_fails_bootstrap() {
        let console = ConsoleFixture::start().await;
        let mut settings = sso_console(&console);
        settings.init_token = None;

        let ctx = context(settings);
        let err = fetch(&ctx, "api/items").await.expect_err("login required");
        assert_eq!(err.exit_code(), 3);
        assert!(err.display_message().contains("authentication failed"));
        let messages: Vec<String> = ctx
            .notifications
            .backlog()
            .into_iter()
            .map(|envelope| envelope.notification.message)
            .collect();
        assert_eq!(messages, vec!["Failed to log in to Keycloak".to_string()]);
    }

    #[tokio::test]
    async fn get_on_disabled_console_sends_no_credentials() {
        let console = ConsoleFixture::start().await;
        console.mock_enabled("false");
        let items = console.server().mock(|when, then| {
            when.method(GET)
                .path("/console/api/items")
                .header_missing("authorization");
            then.status(422).body("unknown broker");
        });

        let ctx = context(console.settings());
        let err = fetch(&ctx, "api/items").await.expect_err("rejected");
        assert_eq!(err.exit_code(), 2);
        assert_eq!(err.display_message(), "unknown broker");
        items.assert();
    }

    #[tokio::test]
    async fn logout_hands_off_to_identity_provider() {
        let console = ConsoleFixture::start().await;
        let ctx = context(sso_console(&console));
        let outcome = logout(&ctx).await.expect("logout runs");
        assert_eq!(outcome, LogoutOutcome::HandedOff);
        assert_eq!(outcome.message(), "identity provider session ended");
    }

    #[tokio::test]
    async fn logout_without_sso_reports_no_hooks() {
        let console = ConsoleFixture::start().await;
        console.mock_enabled("false");
        let ctx = context(console.settings());
        let outcome = logout(&ctx).await.expect("logout runs");
        assert_eq!(outcome, LogoutOutcome::Completed { hooks: 0 });
        assert_eq!(outcome.message(), "no logout hooks registered");
        assert_eq!(
            LogoutOutcome::Completed { hooks: 1 }.message(),
            "logout hooks completed; no identity provider session"
        );
    }

    #[tokio::test]
    async fn unrecognized_user_fails_bootstrap_command() {
        let console = ConsoleFixture::start().await;
        console.mock_enabled("true");
        console.mock_client_config(json!({"url": console.idp_base(), "realm": "console"}));
        console.mock_bundle("keycloak.js", 200);
        console.mock_any_validate();
        console.mock_user("null");
        let mut settings = console.settings();
        settings.init_token = Some(InitToken::bare("token-1"));

        let ctx = context(settings);
        let err = fetch(&ctx, "api/items").await.expect_err("unrecognized user");
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.display_message(), "user not recognized by console directory");
        assert!(
            ctx.notifications
                .backlog()
                .iter()
                .any(|envelope| envelope.notification.action.is_some())
        );
    }

    #[tokio::test]
    async fn metrics_include_bootstrap_outcome() {
        let console = ConsoleFixture::start().await;
        let ctx = context(sso_console(&console));
        let text = metrics_text(&ctx).await.expect("metrics render");
        assert!(text.contains("bootstrap_outcomes_total{outcome=\"authorized\"} 1"));
    }
}
