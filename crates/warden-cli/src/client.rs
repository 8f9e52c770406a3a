//! Shared settings assembly, error types, and session start-up for the CLI.

use std::fmt::{self, Display, Formatter};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use reqwest::StatusCode;
use url::Url;
use warden_auth::{
    AdapterError, AdapterFactory, AuthRuntime, AuthSettings, ClientDescriptor, DirectoryCheck,
    IdentityAdapter, InitToken, PresetTokenAdapter, RuntimeError, Session,
};
use warden_events::NotificationBus;
use warden_telemetry::Metrics;

use crate::cli::Cli;

const DEFAULT_SUBJECT: &str = "console";

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

/// Application context passed to command handlers.
pub(crate) struct AppContext {
    pub(crate) settings: AuthSettings,
    pub(crate) subject: String,
    pub(crate) token_lifetime: Option<Duration>,
    pub(crate) notifications: NotificationBus,
    pub(crate) metrics: Metrics,
}

impl AppContext {
    /// Assemble settings from parsed flags and environment fallbacks.
    pub(crate) fn from_cli(cli: &Cli) -> CliResult<Self> {
        let mut settings = AuthSettings::new(cli.console_url.clone());
        settings.http_timeout_secs = cli.timeout;
        settings.adapter_timeout_secs = cli.adapter_timeout;
        if let Some(script) = &cli.adapter_script {
            settings.adapter_script = parse_script(script)?;
        }
        settings.init_token = parse_init_token(cli.init_token.as_deref())?;
        settings.fallback_descriptor = cli
            .fallback_descriptor
            .as_deref()
            .map(load_descriptor)
            .transpose()?;

        let metrics = Metrics::new()
            .map_err(|err| CliError::failure(anyhow!("failed to build metrics registry: {err}")))?;

        Ok(Self {
            settings,
            subject: cli
                .subject
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            token_lifetime: cli.token_lifetime.map(Duration::from_secs),
            notifications: NotificationBus::new(),
            metrics,
        })
    }

    /// Factory building the preset-token adapter for this invocation.
    pub(crate) fn adapter_factory(&self) -> Arc<dyn AdapterFactory> {
        let subject = self.subject.clone();
        let lifetime = self.token_lifetime;
        Arc::new(
            move |_: &ClientDescriptor| -> Result<Arc<dyn IdentityAdapter>, AdapterError> {
                Ok(Arc::new(PresetTokenAdapter::new(subject.clone(), lifetime)))
            },
        )
    }

    /// Run the gate and bootstrap and return the started session.
    pub(crate) async fn start_session(&self) -> CliResult<Session> {
        AuthRuntime::with_factory(
            self.settings.clone(),
            self.adapter_factory(),
            self.notifications.clone(),
        )
        .map_err(classify_runtime)?
        .with_metrics(self.metrics.clone())
        .start()
        .await
        .map_err(classify_runtime)
    }
}

/// Map a runtime failure onto the CLI error taxonomy.
pub(crate) fn classify_runtime(err: RuntimeError) -> CliError {
    match err {
        RuntimeError::BootstrapFailed { failure } => {
            CliError::failure(anyhow!("authentication failed: {failure}"))
        }
        RuntimeError::Unauthorized { check, .. } => match check {
            DirectoryCheck::Unreachable(reason) => {
                CliError::failure(anyhow!("console directory unreachable: {reason}"))
            }
            DirectoryCheck::Recognized(_) | DirectoryCheck::Unrecognized => {
                CliError::failure(anyhow!("user not recognized by console directory"))
            }
        },
        other => CliError::failure(anyhow::Error::new(other)),
    }
}

/// Parse the console URL provided to the CLI.
pub(crate) fn parse_url(input: &str) -> Result<Url, String> {
    input
        .parse::<Url>()
        .map_err(|err| format!("invalid URL '{input}': {err}"))
}

fn parse_script(input: &str) -> CliResult<String> {
    let trimmed = input.trim().trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(CliError::validation("adapter script name cannot be empty"));
    }
    Ok(trimmed.to_string())
}

/// Parse the out-of-band token: a bare token or the JSON form with refresh and ID tokens.
pub(crate) fn parse_init_token(input: Option<&str>) -> CliResult<Option<InitToken>> {
    let Some(raw) = input else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::validation("init token cannot be empty"));
    }
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map(Some)
            .map_err(|err| CliError::validation(format!("init token JSON is invalid: {err}")));
    }
    Ok(Some(InitToken::bare(trimmed)))
}

/// Load a client descriptor from a JSON file.
pub(crate) fn load_descriptor(path: &Path) -> CliResult<ClientDescriptor> {
    let payload = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))
        .map_err(CliError::failure)?;
    let value: serde_json::Value = serde_json::from_str(&payload).map_err(|err| {
        CliError::validation(format!("{} is not valid JSON: {err}", path.display()))
    })?;
    ClientDescriptor::from_json(&value).ok_or_else(|| {
        CliError::validation(format!("{} must contain a JSON object", path.display()))
    })
}

/// Classify an HTTP response into a CLI error.
pub(crate) async fn classify_problem(response: reqwest::Response) -> CliError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let body = body.trim();

    if matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY
    ) {
        let message = if body.is_empty() {
            format!("request rejected with status {status}")
        } else {
            body.to_string()
        };
        CliError::validation(message)
    } else if body.is_empty() {
        CliError::failure(anyhow!("request failed with status {status}"))
    } else {
        CliError::failure(anyhow!("{body} (status {status})"))
    }
}
