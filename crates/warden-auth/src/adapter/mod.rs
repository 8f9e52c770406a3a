//! Identity adapter capability and the serialized handle the pipeline shares.
//!
//! # Design
//! - The adapter is an opaque capability: the pipeline never looks inside the
//!   token, it only asks whether it is expired and forwards it.
//! - [`AdapterHandle`] serializes the mutating calls (`initialize`, `refresh`,
//!   `logout`) behind an async mutex because the process runs on a
//!   multi-threaded runtime; reads go straight to the adapter.
//! - External session loss is reported through a broadcast subscription rather
//!   than a callback slot on the adapter.

mod loader;
mod preset;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};

use crate::error::{AdapterError, AdapterResult};

pub use loader::{AdapterFactory, AdapterLoader, HttpAdapterLoader};
pub use preset::PresetTokenAdapter;

/// Token handed in out-of-band (for example propagated from another console window).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitToken {
    /// Access token.
    pub token: String,
    /// Refresh token, when the issuer provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// ID token, when the issuer provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Clock skew between this process and the issuer, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_skew: Option<i64>,
}

impl InitToken {
    /// Token without refresh or ID token companions.
    #[must_use]
    pub fn bare(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            refresh_token: None,
            id_token: None,
            time_skew: None,
        }
    }
}

impl fmt::Debug for InitToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("InitToken")
            .field("token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("time_skew", &self.time_skew)
            .finish()
    }
}

/// How the adapter should establish the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOptions {
    /// Adopt a token handed in out-of-band.
    Token(InitToken),
    /// Require an interactive login with the identity provider.
    LoginRequired,
}

/// Out-of-band session events raised by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The identity provider session ended outside this process.
    LoggedOut,
}

/// Capability exposed by an identity provider adapter.
#[async_trait]
pub trait IdentityAdapter: Send + Sync {
    /// Establish a session; resolves to whether the adapter is now authenticated.
    async fn initialize(&self, options: &InitOptions) -> AdapterResult<bool>;

    /// Renew the token if it expires within `min_validity`; resolves to whether
    /// a new token was issued.
    async fn refresh(&self, min_validity: Duration) -> AdapterResult<bool>;

    /// End the identity provider session.
    async fn logout(&self) -> AdapterResult<()>;

    /// Whether the token expires within `leeway`.
    fn is_token_expired(&self, leeway: Duration) -> bool;

    /// Whether a session is currently established.
    fn is_authenticated(&self) -> bool;

    /// Authenticated subject identifier.
    fn subject(&self) -> Option<String>;

    /// Current access token.
    fn token(&self) -> Option<String>;

    /// Subscribe to out-of-band session events, if the adapter reports them.
    fn session_events(&self) -> Option<broadcast::Receiver<SessionEvent>> {
        None
    }
}

/// Subject and token pair used to authorize a request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Authenticated subject identifier.
    pub subject: String,
    /// Access token.
    pub token: String,
}

impl Credentials {
    /// `Authorization` header value: basic scheme over `subject:token`.
    #[must_use]
    pub fn header_value(&self) -> String {
        let encoded = general_purpose::STANDARD.encode(format!("{}:{}", self.subject, self.token));
        format!("Basic {encoded}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("subject", &self.subject)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Shared, serialized access to the process's identity adapter.
#[derive(Clone)]
pub struct AdapterHandle {
    adapter: Arc<dyn IdentityAdapter>,
    serial: Arc<Mutex<()>>,
    timeout: Option<Duration>,
}

impl AdapterHandle {
    /// Wrap an adapter without a call bound.
    #[must_use]
    pub fn new(adapter: Arc<dyn IdentityAdapter>) -> Self {
        Self {
            adapter,
            serial: Arc::new(Mutex::new(())),
            timeout: None,
        }
    }

    /// Bound `initialize` and `refresh` calls; `None` waits indefinitely.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Establish the session.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error, or [`AdapterError::TimedOut`] when the bound elapses.
    pub async fn initialize(&self, options: &InitOptions) -> AdapterResult<bool> {
        let _serial = self.serial.lock().await;
        bounded(self.timeout, "initialize", self.adapter.initialize(options)).await
    }

    /// Renew the token.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error, or [`AdapterError::TimedOut`] when the bound elapses.
    pub async fn refresh(&self, min_validity: Duration) -> AdapterResult<bool> {
        let _serial = self.serial.lock().await;
        bounded(self.timeout, "refresh", self.adapter.refresh(min_validity)).await
    }

    /// End the identity provider session.
    ///
    /// # Errors
    ///
    /// Returns the adapter's error.
    pub async fn logout(&self) -> AdapterResult<()> {
        let _serial = self.serial.lock().await;
        self.adapter.logout().await
    }

    /// Whether the token expires within `leeway`.
    #[must_use]
    pub fn is_token_expired(&self, leeway: Duration) -> bool {
        self.adapter.is_token_expired(leeway)
    }

    /// Whether a session is currently established.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.adapter.is_authenticated()
    }

    /// Authenticated subject identifier.
    #[must_use]
    pub fn subject(&self) -> Option<String> {
        self.adapter.subject()
    }

    /// Current access token.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.adapter.token()
    }

    /// Subject and non-empty token, when both are available.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        let subject = self.adapter.subject()?;
        let token = self.adapter.token().filter(|token| !token.is_empty())?;
        Some(Credentials { subject, token })
    }

    /// Subscribe to out-of-band session events.
    #[must_use]
    pub fn session_events(&self) -> Option<broadcast::Receiver<SessionEvent>> {
        self.adapter.session_events()
    }
}

impl fmt::Debug for AdapterHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AdapterHandle")
            .field("authenticated", &self.adapter.is_authenticated())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

async fn bounded<T, F>(
    limit: Option<Duration>,
    operation: &'static str,
    call: F,
) -> AdapterResult<T>
where
    F: Future<Output = AdapterResult<T>>,
{
    match limit {
        Some(after) => tokio::time::timeout(after, call)
            .await
            .unwrap_or(Err(AdapterError::TimedOut { operation, after })),
        None => call.await,
    }
}
