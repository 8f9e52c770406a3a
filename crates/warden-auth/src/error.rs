//! # Design
//!
//! - One error enum per component boundary; network errors never escape raw.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::time::Duration;

use thiserror::Error;

use crate::bootstrap::BootstrapFailure;
use crate::interceptor::DirectoryCheck;
use crate::teardown::SessionTeardownCoordinator;

/// Result alias for identity adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result alias for gate operations.
pub type GateResult<T> = Result<T, GateError>;

/// Result alias for intercepted requests.
pub type InterceptResult<T> = Result<T, InterceptError>;

/// Result alias for runtime orchestration.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Failures reported by an identity adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// The adapter could not establish a session.
    #[error("identity adapter initialisation failed")]
    InitFailed {
        /// Adapter-supplied reason.
        reason: String,
    },
    /// Interactive login was requested but the adapter cannot perform it.
    #[error("interactive login is not available")]
    InteractiveLoginUnavailable,
    /// The identity provider refused to renew the token.
    #[error("token refresh rejected")]
    RefreshRejected {
        /// Adapter-supplied reason.
        reason: String,
    },
    /// Ending the identity provider session failed.
    #[error("identity provider logout failed")]
    LogoutFailed {
        /// Adapter-supplied reason.
        reason: String,
    },
    /// The adapter did not answer within the configured bound.
    #[error("identity adapter call timed out")]
    TimedOut {
        /// Adapter operation that timed out.
        operation: &'static str,
        /// Bound that elapsed.
        after: Duration,
    },
}

/// Failures while loading the identity adapter.
#[derive(Debug, Error)]
pub enum AdapterLoadError {
    /// Fetching the adapter bundle failed at the transport level.
    #[error("adapter bundle fetch failed")]
    Fetch {
        /// Bundle URL.
        url: String,
        /// Source HTTP client error.
        source: reqwest::Error,
    },
    /// The adapter bundle endpoint returned a non-success status.
    #[error("adapter bundle unavailable")]
    Status {
        /// Bundle URL.
        url: String,
        /// HTTP status code returned by the server.
        status: u16,
    },
    /// The adapter could not be constructed from the client descriptor.
    #[error("adapter construction failed")]
    Construct {
        /// Source adapter error.
        source: AdapterError,
    },
}

/// Fatal bootstrap gate failures.
#[derive(Debug, Error)]
pub enum GateError {
    /// The identity adapter could not be loaded.
    #[error("identity adapter load failed")]
    AdapterLoad {
        /// Bundle URL derived from the client descriptor.
        script_url: String,
        /// Source load error.
        source: AdapterLoadError,
    },
    /// The client descriptor did not name an identity provider base URL.
    #[error("client descriptor has no identity provider base url")]
    MissingBaseUrl,
    /// The derived adapter bundle URL was not a valid URL.
    #[error("invalid adapter bundle url")]
    InvalidScriptUrl {
        /// Offending value.
        value: String,
        /// Source parse error.
        source: url::ParseError,
    },
}

/// Failures talking to the console backend.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// The HTTP client could not be constructed.
    #[error("failed to build http client")]
    Client {
        /// Source HTTP client error.
        source: reqwest::Error,
    },
    /// An endpoint path could not be joined onto the console URL.
    #[error("invalid console endpoint")]
    InvalidEndpoint {
        /// Endpoint path relative to the console URL.
        path: &'static str,
        /// Source parse error.
        source: url::ParseError,
    },
    /// The request failed at the transport level.
    #[error("console request failed")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// URL used for the request.
        url: String,
        /// Source HTTP client error.
        source: reqwest::Error,
    },
    /// The console answered with a non-success status.
    #[error("console response status error")]
    Status {
        /// Operation identifier.
        operation: &'static str,
        /// URL used for the request.
        url: String,
        /// HTTP status code returned by the server.
        status: u16,
    },
    /// The response body could not be read or decoded.
    #[error("console response decode failed")]
    Decode {
        /// Operation identifier.
        operation: &'static str,
        /// URL used for the request.
        url: String,
        /// Source HTTP client error.
        source: reqwest::Error,
    },
    /// The response decoded but did not have the expected shape.
    #[error("unexpected console payload")]
    UnexpectedPayload {
        /// Operation identifier.
        operation: &'static str,
        /// URL used for the request.
        url: String,
    },
}

/// Internal state machine guard failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BootstrapError {
    /// A transition outside the bootstrap state graph was attempted.
    #[error("invalid bootstrap transition")]
    InvalidTransition {
        /// State the machine was in.
        from: &'static str,
        /// State that was requested.
        to: &'static str,
    },
}

/// Failures surfaced to callers of [`crate::AuthorizedClient`].
#[derive(Debug, Error)]
pub enum InterceptError {
    /// Token refresh failed; the deferred request was dropped and the session ended.
    #[error("session terminated after failed token refresh")]
    SessionTerminated {
        /// Source adapter error.
        source: AdapterError,
    },
    /// Refresh succeeded but the adapter exposed no usable credentials.
    #[error("credentials unavailable after token refresh")]
    MissingCredentials,
    /// The request could not be assembled.
    #[error("failed to build request")]
    Build {
        /// Source HTTP client error.
        source: reqwest::Error,
    },
    /// The credentials could not be encoded as a header value.
    #[error("invalid authorization header")]
    InvalidHeader {
        /// Source header error.
        source: reqwest::header::InvalidHeaderValue,
    },
    /// The request failed at the transport level.
    #[error("request failed")]
    Transport {
        /// URL used for the request.
        url: String,
        /// Source HTTP client error.
        source: reqwest::Error,
    },
}

/// Failures while bringing up an authenticated session.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Console client construction or endpoint resolution failed.
    #[error("console setup failed")]
    Console {
        /// Operation identifier.
        operation: &'static str,
        /// Source console error.
        source: ConsoleError,
    },
    /// The bootstrap gate failed fatally.
    #[error("bootstrap gate failed")]
    Gate {
        /// Source gate error.
        source: GateError,
    },
    /// The bootstrap state machine ended in a failed state.
    #[error("authentication bootstrap failed")]
    BootstrapFailed {
        /// Terminal failure reason.
        failure: BootstrapFailure,
    },
    /// The console directory did not confirm the authenticated user.
    #[error("console directory did not confirm the authenticated user")]
    Unauthorized {
        /// Directory lookup result.
        check: DirectoryCheck,
        /// Teardown coordinator for acting on the published logout notification.
        teardown: SessionTeardownCoordinator,
    },
}

impl RuntimeError {
    pub(crate) const fn console(operation: &'static str, source: ConsoleError) -> Self {
        Self::Console { operation, source }
    }
}
