//! Adapter backed by a token handed in out-of-band.
//!
//! It adopts the token given at initialisation and never talks to the
//! identity provider itself, so it cannot log in interactively or renew an
//! expired token, and it never reports external logouts. Headless hosts such
//! as the CLI use it with a token obtained elsewhere.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use super::{IdentityAdapter, InitOptions};
use crate::error::{AdapterError, AdapterResult};

#[derive(Default)]
struct PresetState {
    token: Option<String>,
    expires_at: Option<Instant>,
}

/// Identity adapter that adopts a preset token.
pub struct PresetTokenAdapter {
    subject: String,
    lifetime: Option<Duration>,
    state: RwLock<PresetState>,
}

impl PresetTokenAdapter {
    /// Adapter for `subject`; `lifetime` bounds how long an adopted token stays
    /// valid (`None` means it never expires locally).
    #[must_use]
    pub fn new(subject: impl Into<String>, lifetime: Option<Duration>) -> Self {
        Self {
            subject: subject.into(),
            lifetime,
            state: RwLock::new(PresetState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, PresetState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, PresetState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn remaining(&self) -> Option<Duration> {
        self.read()
            .expires_at
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl IdentityAdapter for PresetTokenAdapter {
    async fn initialize(&self, options: &InitOptions) -> AdapterResult<bool> {
        match options {
            InitOptions::Token(init) => {
                if init.token.trim().is_empty() {
                    return Err(AdapterError::InitFailed {
                        reason: "empty token".to_string(),
                    });
                }
                {
                    let mut state = self.write();
                    state.token = Some(init.token.clone());
                    // A lifetime past the clock's range never expires.
                    state.expires_at = self
                        .lifetime
                        .and_then(|lifetime| Instant::now().checked_add(lifetime));
                }
                debug!(subject = %self.subject, "preset token adopted");
                Ok(true)
            }
            InitOptions::LoginRequired => Err(AdapterError::InteractiveLoginUnavailable),
        }
    }

    async fn refresh(&self, min_validity: Duration) -> AdapterResult<bool> {
        if !self.is_authenticated() {
            return Err(AdapterError::RefreshRejected {
                reason: "no session".to_string(),
            });
        }
        match self.remaining() {
            None => Ok(false),
            Some(remaining) if remaining > min_validity => Ok(false),
            Some(_) => Err(AdapterError::RefreshRejected {
                reason: "preset token cannot be renewed".to_string(),
            }),
        }
    }

    async fn logout(&self) -> AdapterResult<()> {
        *self.write() = PresetState::default();
        info!(subject = %self.subject, "preset session cleared");
        Ok(())
    }

    fn is_token_expired(&self, leeway: Duration) -> bool {
        self.remaining().is_some_and(|remaining| remaining <= leeway)
    }

    fn is_authenticated(&self) -> bool {
        self.read().token.is_some()
    }

    fn subject(&self) -> Option<String> {
        self.is_authenticated().then(|| self.subject.clone())
    }

    fn token(&self) -> Option<String> {
        self.read().token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::InitToken;

    #[tokio::test]
    async fn adopts_token_and_exposes_subject() {
        let adapter = PresetTokenAdapter::new("alice", None);
        assert_eq!(adapter.subject(), None);

        let authenticated = adapter
            .initialize(&InitOptions::Token(InitToken::bare("token-1")))
            .await
            .expect("initialize");
        assert!(authenticated);
        assert_eq!(adapter.subject().as_deref(), Some("alice"));
        assert_eq!(adapter.token().as_deref(), Some("token-1"));
        assert!(!adapter.is_token_expired(Duration::from_secs(10)));
        assert_eq!(adapter.refresh(Duration::from_secs(10)).await, Ok(false));
    }

    #[tokio::test]
    async fn rejects_interactive_login_and_empty_tokens() {
        let adapter = PresetTokenAdapter::new("alice", None);
        assert_eq!(
            adapter.initialize(&InitOptions::LoginRequired).await,
            Err(AdapterError::InteractiveLoginUnavailable)
        );
        assert!(matches!(
            adapter
                .initialize(&InitOptions::Token(InitToken::bare("  ")))
                .await,
            Err(AdapterError::InitFailed { .. })
        ));
        assert!(matches!(
            adapter.refresh(Duration::from_secs(1)).await,
            Err(AdapterError::RefreshRejected { .. })
        ));
    }

    #[tokio::test]
    async fn short_lived_token_expires_and_cannot_be_renewed() {
        let adapter = PresetTokenAdapter::new("alice", Some(Duration::from_secs(5)));
        adapter
            .initialize(&InitOptions::Token(InitToken::bare("token-1")))
            .await
            .expect("initialize");

        assert!(adapter.is_token_expired(Duration::from_secs(10)));
        assert!(matches!(
            adapter.refresh(Duration::from_secs(10)).await,
            Err(AdapterError::RefreshRejected { .. })
        ));
    }

    #[tokio::test]
    async fn unbounded_lifetime_never_expires() {
        let adapter = PresetTokenAdapter::new("alice", Some(Duration::from_secs(u64::MAX)));
        let authenticated = adapter
            .initialize(&InitOptions::Token(InitToken::bare("token-1")))
            .await
            .expect("initialize");

        assert!(authenticated);
        assert!(!adapter.is_token_expired(Duration::from_secs(10)));
        assert_eq!(adapter.refresh(Duration::from_secs(10)).await, Ok(false));
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let adapter = PresetTokenAdapter::new("alice", None);
        assert!(adapter.session_events().is_none());
        adapter
            .initialize(&InitOptions::Token(InitToken::bare("token-1")))
            .await
            .expect("initialize");

        adapter.logout().await.expect("logout");
        assert!(!adapter.is_authenticated());
        assert_eq!(adapter.token(), None);
        assert_eq!(adapter.subject(), None);
    }
}
