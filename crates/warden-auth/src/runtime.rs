//! End-to-end orchestration: gate, bootstrap, interceptor and teardown wiring.

use std::sync::Arc;

use tracing::{info, warn};
use warden_events::NotificationBus;
use warden_telemetry::Metrics;

use crate::adapter::{AdapterFactory, AdapterLoader, HttpAdapterLoader};
use crate::bootstrap::{AuthBootstrap, BootstrapOutcome, BootstrapReport};
use crate::config::AuthSettings;
use crate::console::{ConsoleClient, build_http};
use crate::context::AuthContext;
use crate::error::{RuntimeError, RuntimeResult};
use crate::gate::BootstrapGate;
use crate::interceptor::{AuthorizedClient, DirectoryCheck};
use crate::tasks::LogoutTasks;
use crate::teardown::SessionTeardownCoordinator;

/// Brings up an authenticated session for a host application.
pub struct AuthRuntime {
    settings: AuthSettings,
    loader: Arc<dyn AdapterLoader>,
    notifications: NotificationBus,
    metrics: Option<Metrics>,
}

impl AuthRuntime {
    /// Runtime loading the adapter through `loader`.
    #[must_use]
    pub fn new(
        settings: AuthSettings,
        loader: Arc<dyn AdapterLoader>,
        notifications: NotificationBus,
    ) -> Self {
        Self {
            settings,
            loader,
            notifications,
            metrics: None,
        }
    }

    /// Runtime fetching the adapter bundle over HTTP and building it with `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Console`] when the HTTP client cannot be built.
    pub fn with_factory(
        settings: AuthSettings,
        factory: Arc<dyn AdapterFactory>,
        notifications: NotificationBus,
    ) -> RuntimeResult<Self> {
        let http = build_http(settings.http_timeout())
            .map_err(|err| RuntimeError::console("adapter_loader.http", err))?;
        let loader = Arc::new(HttpAdapterLoader::new(http, factory));
        Ok(Self::new(settings, loader, notifications))
    }

    /// Record pipeline counters on `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run the gate and bootstrap, then wire the interceptor and teardown hook.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Gate`] when the adapter cannot be loaded,
    /// [`RuntimeError::BootstrapFailed`] when login fails and
    /// [`RuntimeError::Unauthorized`] when the console directory does not
    /// recognize the logged-in user.
    pub async fn start(self) -> RuntimeResult<Session> {
        let Self {
            settings,
            loader,
            notifications,
            metrics,
        } = self;

        let console = ConsoleClient::new(&settings)
            .map_err(|err| RuntimeError::console("console.new", err))?;
        let gate = BootstrapGate::new(console.clone(), loader, &settings);
        let context = Arc::new(
            gate.check()
                .await
                .map_err(|source| RuntimeError::Gate { source })?,
        );

        let mut bootstrap = AuthBootstrap::new(
            Arc::clone(&context),
            console.clone(),
            settings.init_token.clone(),
            notifications.clone(),
        );
        if let Some(metrics) = &metrics {
            bootstrap = bootstrap.with_metrics(metrics.clone());
        }
        let report = bootstrap.run().await;
        if let BootstrapOutcome::Failed(failure) = &report.outcome {
            return Err(RuntimeError::BootstrapFailed {
                failure: failure.clone(),
            });
        }

        let mut client = AuthorizedClient::new(
            console.http().clone(),
            Arc::clone(&context),
            settings.token_policy(),
            notifications.clone(),
        );
        let mut teardown = SessionTeardownCoordinator::new(Arc::clone(&context));
        if let Some(metrics) = &metrics {
            client = client.with_metrics(metrics.clone());
            teardown = teardown.with_metrics(metrics.clone());
        }
        let logout_tasks = LogoutTasks::new();
        teardown.register(&logout_tasks);

        let directory = if context.is_enabled() {
            let user_url = console
                .user_endpoint()
                .map_err(|err| RuntimeError::console("console.user_endpoint", err))?;
            let check = client.confirm_identity(user_url).await;
            if !matches!(check, DirectoryCheck::Recognized(_)) {
                warn!(check = ?check, "console directory rejected the session");
                return Err(RuntimeError::Unauthorized { check, teardown });
            }
            Some(check)
        } else {
            None
        };

        info!(
            enabled = context.is_enabled(),
            outcome = report.outcome.as_str(),
            "authentication runtime ready"
        );
        Ok(Session {
            context,
            report,
            client,
            logout_tasks,
            teardown,
            directory,
            console,
            notifications,
        })
    }
}

/// A started host session.
pub struct Session {
    context: Arc<AuthContext>,
    report: BootstrapReport,
    client: AuthorizedClient,
    logout_tasks: LogoutTasks,
    teardown: SessionTeardownCoordinator,
    directory: Option<DirectoryCheck>,
    console: ConsoleClient,
    notifications: NotificationBus,
}

impl Session {
    /// Process-wide authentication context.
    #[must_use]
    pub const fn context(&self) -> &Arc<AuthContext> {
        &self.context
    }

    /// Bootstrap outcome.
    #[must_use]
    pub const fn outcome(&self) -> &BootstrapOutcome {
        &self.report.outcome
    }

    /// Full bootstrap report, including the state history.
    #[must_use]
    pub const fn report(&self) -> &BootstrapReport {
        &self.report
    }

    /// Authorizing HTTP client for every later request.
    #[must_use]
    pub const fn client(&self) -> &AuthorizedClient {
        &self.client
    }

    /// Host logout task registry with the teardown hook registered.
    #[must_use]
    pub const fn logout_tasks(&self) -> &LogoutTasks {
        &self.logout_tasks
    }

    /// Teardown coordinator, for external logout watching and notification actions.
    #[must_use]
    pub const fn teardown(&self) -> &SessionTeardownCoordinator {
        &self.teardown
    }

    /// Directory lookup result, always `Recognized`; `None` when SSO is disabled.
    #[must_use]
    pub const fn directory(&self) -> Option<&DirectoryCheck> {
        self.directory.as_ref()
    }

    /// Console backend client.
    #[must_use]
    pub const fn console(&self) -> &ConsoleClient {
        &self.console
    }

    /// Notification bus the pipeline reports to.
    #[must_use]
    pub const fn notifications(&self) -> &NotificationBus {
        &self.notifications
    }

    /// Run the host logout chain; returns `false` when a hook took over teardown.
    pub async fn logout(&self) -> bool {
        self.logout_tasks.execute().await
    }
}
