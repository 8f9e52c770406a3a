//! Single sign-out wiring between the host session and the identity provider.
//!
//! # Design
//! - Host-initiated logout: a `KeycloakLogout` hook in the host's
//!   [`LogoutTasks`] ends the identity provider session and stops the chain.
//! - Provider-initiated logout: a watcher task forwards the adapter's
//!   [`SessionEvent::LoggedOut`] to the host's own logout routine.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warden_events::NotificationAction;
use warden_telemetry::Metrics;

use crate::adapter::{AdapterHandle, SessionEvent};
use crate::context::AuthContext;
use crate::tasks::{LogoutTasks, SessionTask};

/// Name of the logout hook registered in the host's task registry.
pub const TASK_NAME: &str = "KeycloakLogout";

/// The host application's full local logout routine.
#[async_trait]
pub trait LocalSession: Send + Sync {
    /// Clear local session state, mapped identity and storage.
    async fn logout(&self);
}

/// Couples host logout and identity provider logout in both directions.
#[derive(Clone)]
pub struct SessionTeardownCoordinator {
    context: Arc<AuthContext>,
    metrics: Option<Metrics>,
}

impl SessionTeardownCoordinator {
    /// Coordinator for `context`.
    #[must_use]
    pub const fn new(context: Arc<AuthContext>) -> Self {
        Self {
            context,
            metrics: None,
        }
    }

    /// Count forced logouts on `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register the logout hook; returns whether a hook was registered.
    ///
    /// A disabled context registers nothing.
    pub fn register(&self, tasks: &LogoutTasks) -> bool {
        let Some(adapter) = self.context.adapter().cloned() else {
            return false;
        };
        let task: SessionTask = Arc::new(move || {
            let adapter = adapter.clone();
            async move { logout_hook(&adapter).await }.boxed()
        });
        tasks.add_task(TASK_NAME, task);
        debug!(task = TASK_NAME, "logout hook registered");
        true
    }

    /// Forward external logouts to `local` until the adapter's event stream closes.
    ///
    /// Returns `None` when SSO is disabled or the adapter reports no events.
    #[must_use]
    pub fn watch_external_logout(&self, local: Arc<dyn LocalSession>) -> Option<JoinHandle<()>> {
        let mut events = self.context.adapter()?.session_events()?;
        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::LoggedOut) => {
                        info!("identity provider session ended externally; logging out locally");
                        local.logout().await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "session event watcher lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }

    /// Act on a notification action triggered by the operator.
    pub async fn handle_action(&self, action: NotificationAction) {
        match action {
            NotificationAction::Logout => {
                let Some(adapter) = self.context.adapter() else {
                    return;
                };
                if let Some(metrics) = &self.metrics {
                    metrics.inc_forced_logout();
                }
                if let Err(err) = adapter.logout().await {
                    warn!(error = %err, "identity provider logout failed");
                }
            }
        }
    }
}

impl fmt::Debug for SessionTeardownCoordinator {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionTeardownCoordinator")
            .field("enabled", &self.context.is_enabled())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

async fn logout_hook(adapter: &AdapterHandle) -> bool {
    if !adapter.is_authenticated() {
        return true;
    }
    if let Err(err) = adapter.logout().await {
        warn!(error = %err, "identity provider logout failed");
    }
    false
}
