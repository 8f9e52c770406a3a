use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use warden_auth::{
    AdapterError, AdapterFactory, AdapterHandle, AuthBootstrap, AuthContext, AuthRuntime,
    BootstrapFailure, BootstrapOutcome, BootstrapState, ClientDescriptor, ConsoleClient,
    DirectoryCheck, GateError, IdentityAdapter, InitOptions, InitToken, RuntimeError,
};
use warden_events::NotificationBus;
use warden_telemetry::Metrics;
use warden_test_support::fixtures::ConsoleFixture;
use warden_test_support::mocks::{FailingLoader, ScriptedAdapter, StaticLoader};

fn factory_for(adapter: &Arc<ScriptedAdapter>) -> Arc<dyn AdapterFactory> {
    let shared: Arc<dyn IdentityAdapter> = Arc::clone(adapter) as Arc<dyn IdentityAdapter>;
    Arc::new(
        move |_: &ClientDescriptor| -> Result<Arc<dyn IdentityAdapter>, AdapterError> {
            Ok(Arc::clone(&shared))
        },
    )
}

fn enabled_context(adapter: &Arc<ScriptedAdapter>) -> Arc<AuthContext> {
    let handle = AdapterHandle::new(Arc::clone(adapter) as Arc<dyn IdentityAdapter>);
    Arc::new(AuthContext::enabled(
        handle,
        ClientDescriptor::default().with("url", "https://idp.example/auth"),
    ))
}

#[tokio::test]
async fn scenario_a_probe_false_skips_sso_without_further_calls() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    let probe = console.mock_enabled("false");
    let config = console.mock_client_config(json!({"url": console.idp_base()}));
    let validate = console.mock_any_validate();
    let user = console.mock_user("\"alice\"");

    let adapter = Arc::new(ScriptedAdapter::new("alice"));
    let loader = Arc::new(StaticLoader::new(
        Arc::clone(&adapter) as Arc<dyn IdentityAdapter>
    ));
    let session = AuthRuntime::new(console.settings(), loader.clone(), NotificationBus::new())
        .start()
        .await?;

    assert!(!session.context().is_enabled());
    assert!(session.context().adapter().is_none());
    assert_eq!(session.outcome(), &BootstrapOutcome::Skipped);
    assert_eq!(
        session.report().history,
        vec![BootstrapState::Unchecked, BootstrapState::Disabled]
    );
    assert!(session.directory().is_none());
    assert!(session.logout_tasks().names().is_empty());
    assert!(loader.requested().is_empty());
    assert_eq!(adapter.initialize_calls(), 0);

    probe.assert_calls(1);
    config.assert_calls(0);
    validate.assert_calls(0);
    user.assert_calls(0);
    Ok(())
}

#[tokio::test]
async fn non_true_probe_bodies_and_errors_fail_open() -> anyhow::Result<()> {
    for body in ["", "false", "\"false\"", "yes", "{\"enabled\":true}"] {
        let console = ConsoleFixture::start().await;
        console.mock_enabled(body);
        let session = AuthRuntime::new(
            console.settings(),
            Arc::new(FailingLoader),
            NotificationBus::new(),
        )
        .start()
        .await?;
        assert!(!session.context().is_enabled(), "body {body:?} enabled sso");
    }

    let console = ConsoleFixture::start().await;
    console.mock_enabled_status(500);
    let session = AuthRuntime::new(
        console.settings(),
        Arc::new(FailingLoader),
        NotificationBus::new(),
    )
    .start()
    .await?;
    assert_eq!(session.outcome(), &BootstrapOutcome::Skipped);

    let mut settings = console.settings();
    settings.console_url = url::Url::parse("http://127.0.0.1:9/console/")?;
    let session = AuthRuntime::new(settings, Arc::new(FailingLoader), NotificationBus::new())
        .start()
        .await?;
    assert!(!session.context().is_enabled());
    Ok(())
}

#[tokio::test]
async fn scenario_b_string_true_loads_adapter_and_reaches_ready() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    console.mock_enabled("\"true\"");
    console.mock_client_config(json!({"baseUrl": console.idp_base(), "realm": "console"}));
    let bundle = console.mock_bundle("keycloak.js", 200);
    let validate = console.mock_validate("alice", 200);
    let user = console.mock_user("{\"username\":\"alice\"}");

    let adapter = Arc::new(ScriptedAdapter::new("alice"));
    let metrics = Metrics::new()?;
    let session = AuthRuntime::with_factory(
        console.settings(),
        factory_for(&adapter),
        NotificationBus::new(),
    )?
    .with_metrics(metrics.clone())
    .start()
    .await?;

    assert!(session.context().is_enabled());
    assert_eq!(
        session.outcome(),
        &BootstrapOutcome::Authorized {
            subject: "alice".to_string()
        }
    );
    assert_eq!(
        session.report().history,
        vec![
            BootstrapState::Unchecked,
            BootstrapState::CheckingAdapter,
            BootstrapState::Initializing,
            BootstrapState::ValidatingSubject {
                subject: "alice".to_string()
            },
            BootstrapState::Ready {
                subject: "alice".to_string()
            },
        ]
    );
    assert_eq!(adapter.init_options_seen(), vec![InitOptions::LoginRequired]);
    assert!(matches!(
        session.directory(),
        Some(DirectoryCheck::Recognized(_))
    ));
    assert_eq!(session.logout_tasks().names(), vec!["KeycloakLogout"]);

    bundle.assert_calls(1);
    validate.assert_calls(1);
    user.assert_calls(1);
    assert!(
        metrics
            .render()?
            .contains("bootstrap_outcomes_total{outcome=\"authorized\"} 1")
    );
    Ok(())
}

#[tokio::test]
async fn out_of_band_token_replaces_interactive_login() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    console.mock_enabled("true");
    console.mock_client_config(json!({"auth-server-url": console.idp_base()}));
    console.mock_bundle("keycloak.js", 200);
    console.mock_any_validate();
    console.mock_user("\"alice\"");

    let adapter = Arc::new(ScriptedAdapter::new("alice"));
    let mut settings = console.settings();
    settings.init_token = Some(InitToken::bare("handed-over"));
    AuthRuntime::with_factory(settings, factory_for(&adapter), NotificationBus::new())?
        .start()
        .await?;

    assert_eq!(
        adapter.init_options_seen(),
        vec![InitOptions::Token(InitToken::bare("handed-over"))]
    );
    Ok(())
}

#[tokio::test]
async fn validation_failure_still_reaches_ready() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    let validate = console.mock_validate("alice", 500);
    let adapter = Arc::new(ScriptedAdapter::new("alice"));

    let report = AuthBootstrap::new(
        enabled_context(&adapter),
        ConsoleClient::new(&console.settings())?,
        None,
        NotificationBus::new(),
    )
    .run()
    .await;

    validate.assert_calls(1);
    assert_eq!(
        report.state,
        BootstrapState::Ready {
            subject: "alice".to_string()
        }
    );
    assert!(report.outcome.proceeds());
    Ok(())
}

#[tokio::test]
async fn init_failure_blocks_next_task_and_notifies() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    let validate = console.mock_any_validate();
    let adapter = Arc::new(
        ScriptedAdapter::new("alice").failing_init(AdapterError::InitFailed {
            reason: "denied".to_string(),
        }),
    );
    let bus = NotificationBus::new();
    let next_ran = Arc::new(AtomicBool::new(false));

    let flag = Arc::clone(&next_ran);
    let (report, next) = AuthBootstrap::new(
        enabled_context(&adapter),
        ConsoleClient::new(&console.settings())?,
        None,
        bus.clone(),
    )
    .run_with_next(move || async move {
        flag.store(true, Ordering::SeqCst);
    })
    .await;

    assert!(next.is_none());
    assert!(!next_ran.load(Ordering::SeqCst));
    assert!(matches!(
        report.outcome,
        BootstrapOutcome::Failed(BootstrapFailure::LoginFailed { .. })
    ));
    assert!(matches!(report.state, BootstrapState::Failed { .. }));
    validate.assert_calls(0);

    let backlog = bus.backlog();
    assert_eq!(backlog.len(), 1);
    assert_eq!(backlog[0].notification.message, "Failed to log in to Keycloak");
    Ok(())
}

#[tokio::test]
async fn disabled_context_runs_next_task_immediately() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    let (report, next) = AuthBootstrap::new(
        Arc::new(AuthContext::disabled()),
        ConsoleClient::new(&console.settings())?,
        None,
        NotificationBus::new(),
    )
    .run_with_next(|| async { "started" })
    .await;

    assert_eq!(report.outcome, BootstrapOutcome::Skipped);
    assert_eq!(next, Some("started"));
    Ok(())
}

#[tokio::test]
async fn missing_token_uses_dedicated_notification() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    let adapter = Arc::new(ScriptedAdapter::new("alice").without_token());
    let bus = NotificationBus::new();

    let report = AuthBootstrap::new(
        enabled_context(&adapter),
        ConsoleClient::new(&console.settings())?,
        None,
        bus.clone(),
    )
    .run()
    .await;

    assert_eq!(
        report.outcome,
        BootstrapOutcome::Failed(BootstrapFailure::MissingToken)
    );
    assert_eq!(
        bus.backlog()[0].notification.message,
        "Keycloak auth token not found."
    );
    Ok(())
}

#[tokio::test]
async fn unauthenticated_init_fails_bootstrap() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    let adapter = Arc::new(ScriptedAdapter::new("alice").init_unauthenticated());

    let report = AuthBootstrap::new(
        enabled_context(&adapter),
        ConsoleClient::new(&console.settings())?,
        None,
        NotificationBus::new(),
    )
    .run()
    .await;

    assert_eq!(
        report.outcome,
        BootstrapOutcome::Failed(BootstrapFailure::NotAuthenticated)
    );
    Ok(())
}

#[tokio::test]
async fn runtime_surfaces_login_failure() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    console.mock_enabled("true");
    console.mock_client_config(json!({"url": console.idp_base()}));
    let user = console.mock_user("\"alice\"");
    let adapter = Arc::new(
        ScriptedAdapter::new("alice").failing_init(AdapterError::InteractiveLoginUnavailable),
    );
    let loader = Arc::new(StaticLoader::new(
        Arc::clone(&adapter) as Arc<dyn IdentityAdapter>
    ));

    let Err(err) = AuthRuntime::new(console.settings(), loader, NotificationBus::new())
        .start()
        .await
    else {
        panic!("login failure must stop the runtime");
    };
    assert!(matches!(
        err,
        RuntimeError::BootstrapFailed {
            failure: BootstrapFailure::LoginFailed { .. }
        }
    ));
    user.assert_calls(0);
    Ok(())
}

#[tokio::test]
async fn missing_adapter_bundle_is_fatal() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    console.mock_enabled("true");
    console.mock_client_config(json!({"url": console.idp_base()}));
    let bundle = console.mock_bundle("keycloak.js", 404);
    let validate = console.mock_any_validate();
    let adapter = Arc::new(ScriptedAdapter::new("alice"));

    let Err(err) = AuthRuntime::with_factory(
        console.settings(),
        factory_for(&adapter),
        NotificationBus::new(),
    )?
    .start()
    .await
    else {
        panic!("bundle 404 must be fatal");
    };

    assert!(matches!(
        err,
        RuntimeError::Gate {
            source: GateError::AdapterLoad { .. }
        }
    ));
    bundle.assert_calls(1);
    validate.assert_calls(0);
    assert_eq!(adapter.initialize_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn config_failure_uses_fallback_descriptor() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    console.mock_enabled("true");
    console.mock_client_config_status(503);
    console.mock_any_validate();
    console.mock_user("\"alice\"");

    let adapter = Arc::new(ScriptedAdapter::new("alice"));
    let loader = Arc::new(StaticLoader::new(
        Arc::clone(&adapter) as Arc<dyn IdentityAdapter>
    ));
    let mut settings = console.settings();
    settings.fallback_descriptor =
        Some(ClientDescriptor::default().with("url", "https://fallback.example/auth/"));

    let session = AuthRuntime::new(settings, loader.clone(), NotificationBus::new())
        .start()
        .await?;

    assert!(session.context().is_enabled());
    assert_eq!(
        loader
            .requested()
            .iter()
            .map(url::Url::as_str)
            .collect::<Vec<_>>(),
        vec!["https://fallback.example/auth/js/keycloak.js"]
    );
    Ok(())
}

#[tokio::test]
async fn config_failure_without_fallback_fails_open() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    console.mock_enabled("true");
    console.mock_client_config_status(503);

    let loader = Arc::new(StaticLoader::new(Arc::new(ScriptedAdapter::new("alice"))));
    let session = AuthRuntime::new(console.settings(), loader.clone(), NotificationBus::new())
        .start()
        .await?;

    assert!(!session.context().is_enabled());
    assert!(loader.requested().is_empty());
    Ok(())
}

#[tokio::test]
async fn descriptor_without_base_url_is_fatal() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    console.mock_enabled("true");
    console.mock_client_config(json!({"realm": "console", "resource": "console-client"}));

    let loader = Arc::new(StaticLoader::new(Arc::new(ScriptedAdapter::new("alice"))));
    let Err(err) = AuthRuntime::new(console.settings(), loader, NotificationBus::new())
        .start()
        .await
    else {
        panic!("missing base url must be fatal");
    };
    assert!(matches!(
        err,
        RuntimeError::Gate {
            source: GateError::MissingBaseUrl
        }
    ));
    Ok(())
}

#[tokio::test]
async fn empty_directory_answer_blocks_startup() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    console.mock_enabled("true");
    console.mock_client_config(json!({"url": console.idp_base()}));
    console.mock_any_validate();
    let user = console.mock_user("");

    let adapter = Arc::new(ScriptedAdapter::new("alice"));
    let loader = Arc::new(StaticLoader::new(
        Arc::clone(&adapter) as Arc<dyn IdentityAdapter>
    ));
    let bus = NotificationBus::new();
    let Err(err) = AuthRuntime::new(console.settings(), loader, bus.clone())
        .start()
        .await
    else {
        panic!("empty directory answer must not start a session");
    };

    assert!(matches!(
        err,
        RuntimeError::Unauthorized {
            check: DirectoryCheck::Unrecognized,
            ..
        }
    ));
    user.assert_calls(1);
    assert!(
        bus.backlog()
            .iter()
            .any(|envelope| envelope.notification.action.is_some())
    );
    Ok(())
}

#[tokio::test]
async fn unreachable_directory_blocks_startup() -> anyhow::Result<()> {
    let console = ConsoleFixture::start().await;
    console.mock_enabled("true");
    console.mock_client_config(json!({"url": console.idp_base()}));
    console.mock_any_validate();

    let loader = Arc::new(StaticLoader::new(Arc::new(ScriptedAdapter::new("alice"))));
    let bus = NotificationBus::new();
    let Err(err) = AuthRuntime::new(console.settings(), loader, bus.clone())
        .start()
        .await
    else {
        panic!("directory lookup failure must not start a session");
    };

    let RuntimeError::Unauthorized {
        check: DirectoryCheck::Unreachable(reason),
        ..
    } = err
    else {
        panic!("expected unreachable directory");
    };
    assert!(reason.contains("404"));
    assert!(
        bus.backlog()
            .iter()
            .any(|envelope| envelope.notification.message.starts_with("Failed to log in"))
    );
    Ok(())
}
