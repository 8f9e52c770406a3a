//! Authentication bootstrap state machine.
//!
//! # Design
//! - States and transitions form a fixed graph; every move is checked against
//!   it and recorded so callers can inspect the path taken.
//! - A login failure blocks the host's next startup task. Subject validation
//!   is advisory and never blocks.
//! - Failures reach the operator through the notification bus, not as errors.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};
use warden_events::{Notification, NotificationBus};
use warden_telemetry::Metrics;

use crate::adapter::{InitOptions, InitToken};
use crate::console::ConsoleClient;
use crate::context::AuthContext;
use crate::error::{AdapterError, BootstrapError};
use crate::notify;

const LOGIN_FAILED_MESSAGE: &str = "Failed to log in to Keycloak";
const TOKEN_MISSING_MESSAGE: &str = "Keycloak auth token not found.";

/// Why the bootstrap ended in [`BootstrapState::Failed`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BootstrapFailure {
    /// The context is enabled but carries no adapter.
    #[error("identity adapter missing from enabled context")]
    MissingAdapter,
    /// The adapter failed to establish a session.
    #[error("identity adapter login failed")]
    LoginFailed {
        /// Source adapter error.
        source: AdapterError,
    },
    /// The adapter finished initialisation without a session.
    #[error("identity adapter reported an unauthenticated session")]
    NotAuthenticated,
    /// The session has no subject identifier.
    #[error("authenticated session has no subject")]
    MissingSubject,
    /// The session has no usable token.
    #[error("authenticated session has no token")]
    MissingToken,
    /// The machine attempted a move outside its state graph.
    #[error("bootstrap state machine error")]
    Internal {
        /// Source guard error.
        source: BootstrapError,
    },
}

impl BootstrapFailure {
    fn notification(&self) -> Notification {
        match self {
            Self::MissingToken => Notification::danger(TOKEN_MISSING_MESSAGE),
            Self::MissingAdapter
            | Self::LoginFailed { .. }
            | Self::NotAuthenticated
            | Self::MissingSubject
            | Self::Internal { .. } => Notification::danger(LOGIN_FAILED_MESSAGE),
        }
    }
}

/// States of the bootstrap machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapState {
    /// Nothing decided yet.
    Unchecked,
    /// SSO is not required; terminal success.
    Disabled,
    /// SSO is required; confirming the adapter is present.
    CheckingAdapter,
    /// Waiting for the adapter to establish a session.
    Initializing,
    /// Cross-checking the subject with the console.
    ValidatingSubject {
        /// Authenticated subject.
        subject: String,
    },
    /// Session established; terminal success.
    Ready {
        /// Authenticated subject.
        subject: String,
    },
    /// Terminal failure.
    Failed {
        /// Why the bootstrap failed.
        reason: BootstrapFailure,
    },
}

impl BootstrapState {
    /// Stable state label for logs and errors.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unchecked => "unchecked",
            Self::Disabled => "disabled",
            Self::CheckingAdapter => "checking_adapter",
            Self::Initializing => "initializing",
            Self::ValidatingSubject { .. } => "validating_subject",
            Self::Ready { .. } => "ready",
            Self::Failed { .. } => "failed",
        }
    }

    /// Whether the machine has stopped.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Disabled | Self::Ready { .. } | Self::Failed { .. })
    }

    /// Whether `next` is reachable in one step from this state.
    #[must_use]
    pub fn can_transition_to(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Unchecked, Self::Disabled | Self::CheckingAdapter)
            | (Self::CheckingAdapter, Self::Initializing | Self::Failed { .. })
            | (Self::Initializing, Self::ValidatingSubject { .. } | Self::Failed { .. }) => true,
            (Self::ValidatingSubject { subject }, Self::Ready { subject: ready }) => {
                subject == ready
            }
            _ => false,
        }
    }
}

/// Result of the bootstrap, deciding whether the host starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// SSO is not required.
    Skipped,
    /// SSO succeeded for `subject`.
    Authorized {
        /// Authenticated subject.
        subject: String,
    },
    /// SSO is required and failed.
    Failed(BootstrapFailure),
}

impl BootstrapOutcome {
    /// Whether the host's next startup task may run.
    #[must_use]
    pub const fn proceeds(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    /// Metrics label for this outcome.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Authorized { .. } => "authorized",
            Self::Failed(_) => "failed",
        }
    }
}

/// Terminal outcome plus the path the machine took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Terminal outcome.
    pub outcome: BootstrapOutcome,
    /// Terminal state.
    pub state: BootstrapState,
    /// Every state visited, starting with [`BootstrapState::Unchecked`].
    pub history: Vec<BootstrapState>,
}

/// Drives the identity adapter from an unchecked context to a terminal state.
pub struct AuthBootstrap {
    context: Arc<AuthContext>,
    console: ConsoleClient,
    init_token: Option<InitToken>,
    notifications: NotificationBus,
    metrics: Option<Metrics>,
    state: BootstrapState,
    history: Vec<BootstrapState>,
}

impl AuthBootstrap {
    /// Machine for `context`; `init_token` replaces interactive login when present.
    #[must_use]
    pub fn new(
        context: Arc<AuthContext>,
        console: ConsoleClient,
        init_token: Option<InitToken>,
        notifications: NotificationBus,
    ) -> Self {
        Self {
            context,
            console,
            init_token,
            notifications,
            metrics: None,
            state: BootstrapState::Unchecked,
            history: vec![BootstrapState::Unchecked],
        }
    }

    /// Record outcomes and notifications on `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &BootstrapState {
        &self.state
    }

    /// Run the machine to a terminal state.
    pub async fn run(mut self) -> BootstrapReport {
        let outcome = match self.drive().await {
            Ok(outcome) => outcome,
            Err(reason) => self.fail(reason),
        };
        if let Some(metrics) = &self.metrics {
            metrics.inc_bootstrap_outcome(outcome.as_str());
        }
        info!(
            outcome = outcome.as_str(),
            state = self.state.name(),
            "authentication bootstrap finished"
        );
        BootstrapReport {
            outcome,
            state: self.state,
            history: self.history,
        }
    }

    /// Run the machine, then await `next` only when the outcome proceeds.
    pub async fn run_with_next<F, Fut, T>(self, next: F) -> (BootstrapReport, Option<T>)
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = T> + Send,
    {
        let report = self.run().await;
        if report.outcome.proceeds() {
            let value = next().await;
            (report, Some(value))
        } else {
            debug!("bootstrap failed; next startup task withheld");
            (report, None)
        }
    }

    async fn drive(&mut self) -> Result<BootstrapOutcome, BootstrapFailure> {
        if !self.context.is_enabled() {
            self.transition(BootstrapState::Disabled)?;
            return Ok(BootstrapOutcome::Skipped);
        }

        self.transition(BootstrapState::CheckingAdapter)?;
        let adapter = self
            .context
            .adapter()
            .cloned()
            .ok_or(BootstrapFailure::MissingAdapter)?;

        self.transition(BootstrapState::Initializing)?;
        let options = self
            .init_token
            .clone()
            .map_or(InitOptions::LoginRequired, InitOptions::Token);
        debug!(
            preset_token = matches!(options, InitOptions::Token(_)),
            "initializing identity adapter"
        );
        let authenticated = adapter
            .initialize(&options)
            .await
            .map_err(|source| BootstrapFailure::LoginFailed { source })?;
        if !authenticated {
            return Err(BootstrapFailure::NotAuthenticated);
        }
        let subject = adapter
            .subject()
            .filter(|subject| !subject.is_empty())
            .ok_or(BootstrapFailure::MissingSubject)?;
        if adapter.token().is_none_or(|token| token.is_empty()) {
            return Err(BootstrapFailure::MissingToken);
        }

        self.transition(BootstrapState::ValidatingSubject {
            subject: subject.clone(),
        })?;
        if let Err(err) = self.console.validate_subject(&subject).await {
            debug!(subject = %subject, error = %err, "subject validation failed; continuing");
        }

        self.transition(BootstrapState::Ready {
            subject: subject.clone(),
        })?;
        Ok(BootstrapOutcome::Authorized { subject })
    }

    fn transition(&mut self, next: BootstrapState) -> Result<(), BootstrapFailure> {
        if !self.state.can_transition_to(&next) {
            return Err(BootstrapFailure::Internal {
                source: BootstrapError::InvalidTransition {
                    from: self.state.name(),
                    to: next.name(),
                },
            });
        }
        debug!(from = self.state.name(), to = next.name(), "bootstrap transition");
        self.history.push(next.clone());
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, reason: BootstrapFailure) -> BootstrapOutcome {
        error!(error = %reason, state = self.state.name(), "authentication bootstrap failed");
        notify::publish(
            &self.notifications,
            self.metrics.as_ref(),
            reason.notification(),
        );
        let failed = BootstrapState::Failed {
            reason: reason.clone(),
        };
        if !self.state.is_terminal() {
            self.history.push(failed.clone());
            self.state = failed;
        }
        BootstrapOutcome::Failed(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_graph_matches_bootstrap_paths() {
        let validating = BootstrapState::ValidatingSubject {
            subject: "alice".to_string(),
        };
        let failed = BootstrapState::Failed {
            reason: BootstrapFailure::NotAuthenticated,
        };

        assert!(BootstrapState::Unchecked.can_transition_to(&BootstrapState::Disabled));
        assert!(BootstrapState::Unchecked.can_transition_to(&BootstrapState::CheckingAdapter));
        assert!(BootstrapState::CheckingAdapter.can_transition_to(&BootstrapState::Initializing));
        assert!(BootstrapState::CheckingAdapter.can_transition_to(&failed));
        assert!(BootstrapState::Initializing.can_transition_to(&validating));
        assert!(validating.can_transition_to(&BootstrapState::Ready {
            subject: "alice".to_string()
        }));

        assert!(!BootstrapState::Unchecked.can_transition_to(&BootstrapState::Initializing));
        assert!(!validating.can_transition_to(&failed));
        assert!(!validating.can_transition_to(&BootstrapState::Ready {
            subject: "bob".to_string()
        }));
        assert!(!BootstrapState::Disabled.can_transition_to(&BootstrapState::CheckingAdapter));
        assert!(!failed.can_transition_to(&BootstrapState::Initializing));
    }

    #[test]
    fn outcome_labels_and_progression() {
        assert!(BootstrapOutcome::Skipped.proceeds());
        assert!(
            BootstrapOutcome::Authorized {
                subject: "alice".to_string()
            }
            .proceeds()
        );
        let failed = BootstrapOutcome::Failed(BootstrapFailure::MissingSubject);
        assert!(!failed.proceeds());
        assert_eq!(failed.as_str(), "failed");
    }

    #[test]
    fn missing_token_uses_dedicated_message() {
        assert_eq!(
            BootstrapFailure::MissingToken.notification().message,
            TOKEN_MISSING_MESSAGE
        );
        assert_eq!(
            BootstrapFailure::LoginFailed {
                source: AdapterError::InteractiveLoginUnavailable
            }
            .notification()
            .message,
            LOGIN_FAILED_MESSAGE
        );
    }
}
