//! Request authorization decorator around `reqwest::Client`.
//!
//! # Design
//! - Every request goes through [`AuthorizedClient::execute`]; there is no
//!   global hook, so the authorization contract is visible at the call site.
//! - A request that meets an expiring token is captured as a
//!   [`PendingRequest`], held across the refresh, and replayed at most once.
//! - A refresh failure is session-terminal: the request is dropped and the
//!   adapter is logged out.
//! - Concurrent deferred requests refresh independently; the adapter handle
//!   serializes them, so later callers see a valid token and a no-op refresh.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Client, IntoUrl, Method, Request, RequestBuilder, Response};
use tracing::{debug, warn};
use url::Url;
use warden_events::{Notification, NotificationAction, NotificationBus};
use warden_telemetry::Metrics;

use crate::adapter::{AdapterHandle, Credentials};
use crate::config::TokenPolicy;
use crate::context::AuthContext;
use crate::error::{InterceptError, InterceptResult};
use crate::notify;

const UNRECOGNIZED_MESSAGE: &str = "Unauthorized User. Click here to Logout";
const UNRECOGNIZED_DISPLAY_SECS: u64 = 60;

/// A request held back while the token is renewed.
#[derive(Debug)]
pub struct PendingRequest {
    request: Request,
    captured_at: Instant,
}

impl PendingRequest {
    /// Hold `request` for later replay.
    #[must_use]
    pub fn capture(request: Request) -> Self {
        Self {
            request,
            captured_at: Instant::now(),
        }
    }

    /// The captured request.
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// Time since capture.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    /// Release the request for its single resubmission.
    #[must_use]
    pub fn replay(self) -> Request {
        debug!(
            method = %self.request.method(),
            url = %self.request.url(),
            held = ?self.age(),
            "replaying deferred request"
        );
        self.request
    }

    /// Drop the request without sending it.
    pub fn discard(self, reason: &str) {
        debug!(
            method = %self.request.method(),
            url = %self.request.url(),
            reason,
            "discarding deferred request"
        );
    }
}

/// Result of the post-login directory lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryCheck {
    /// The directory knows the user; carries the lookup body.
    Recognized(String),
    /// The token is valid but the directory returned no user.
    Unrecognized,
    /// The lookup could not be completed.
    Unreachable(String),
}

/// HTTP client that authorizes every request against the process's auth context.
#[derive(Clone)]
pub struct AuthorizedClient {
    http: Client,
    context: Arc<AuthContext>,
    policy: TokenPolicy,
    notifications: NotificationBus,
    metrics: Option<Metrics>,
}

impl AuthorizedClient {
    /// Decorate `http` with the authorization rules of `context`.
    #[must_use]
    pub const fn new(
        http: Client,
        context: Arc<AuthContext>,
        policy: TokenPolicy,
        notifications: NotificationBus,
    ) -> Self {
        Self {
            http,
            context,
            policy,
            notifications,
            metrics: None,
        }
    }

    /// Record refresh and replay counters on `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Start a request; finish it with [`Self::execute`].
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.http.request(method, url)
    }

    /// Start a GET request.
    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.http.get(url)
    }

    /// Build and execute a request assembled with [`Self::request`] or [`Self::get`].
    ///
    /// # Errors
    ///
    /// Returns [`InterceptError::Build`] when the builder is invalid, otherwise
    /// whatever [`Self::execute`] returns.
    pub async fn send(&self, builder: RequestBuilder) -> InterceptResult<Response> {
        let request = builder
            .build()
            .map_err(|source| InterceptError::Build { source })?;
        self.execute(request).await
    }

    /// Authorize and send `request`.
    ///
    /// # Errors
    ///
    /// Returns [`InterceptError::SessionTerminated`] when the token could not be
    /// renewed (the request is never sent), [`InterceptError::MissingCredentials`]
    /// when the renewed session has no credentials, or a transport error.
    pub async fn execute(&self, request: Request) -> InterceptResult<Response> {
        let Some(adapter) = self.context.adapter() else {
            return self.dispatch(request).await;
        };

        if adapter.is_authenticated()
            && !adapter.is_token_expired(self.policy.leeway)
            && let Some(credentials) = adapter.credentials()
        {
            return self.dispatch(authorize(request, &credentials)?).await;
        }

        let pending = PendingRequest::capture(request);
        if let Some(metrics) = &self.metrics {
            metrics.inc_request_deferred();
        }
        debug!(url = %pending.request().url(), "token expiring; deferring request for refresh");

        match adapter.refresh(self.policy.min_validity).await {
            Ok(refreshed) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_token_refresh(true);
                }
                debug!(refreshed, "token refresh succeeded");
                let Some(credentials) = adapter.credentials() else {
                    pending.discard("credentials unavailable after refresh");
                    return Err(InterceptError::MissingCredentials);
                };
                let request = pending.replay();
                if let Some(metrics) = &self.metrics {
                    metrics.inc_request_replay();
                }
                self.dispatch(authorize(request, &credentials)?).await
            }
            Err(source) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_token_refresh(false);
                }
                warn!(error = %source, "token refresh failed; ending session");
                pending.discard("token refresh failed");
                self.force_logout(adapter).await;
                Err(InterceptError::SessionTerminated { source })
            }
        }
    }

    /// Ask the console directory whether it knows the authenticated user.
    ///
    /// Failures are reported through the notification bus; an unknown user
    /// gets a notification carrying the logout action.
    pub async fn confirm_identity(&self, user_url: Url) -> DirectoryCheck {
        let check = match self.send(self.get(user_url.clone())).await {
            Ok(response) if !response.status().is_success() => {
                DirectoryCheck::Unreachable(response.status().to_string())
            }
            Ok(response) => match response.text().await {
                Ok(body) => classify_directory_body(body),
                Err(err) => DirectoryCheck::Unreachable(err.to_string()),
            },
            Err(err) => DirectoryCheck::Unreachable(err.to_string()),
        };

        match &check {
            DirectoryCheck::Recognized(_) => {
                debug!(url = %user_url, "directory recognized authenticated user");
            }
            DirectoryCheck::Unrecognized => {
                warn!(url = %user_url, "directory does not recognize authenticated user");
                notify::publish(
                    &self.notifications,
                    self.metrics.as_ref(),
                    Notification::danger(UNRECOGNIZED_MESSAGE)
                        .with_action(NotificationAction::Logout)
                        .display_for(UNRECOGNIZED_DISPLAY_SECS),
                );
            }
            DirectoryCheck::Unreachable(reason) => {
                warn!(url = %user_url, reason = %reason, "directory lookup failed");
                notify::publish(
                    &self.notifications,
                    self.metrics.as_ref(),
                    Notification::danger(format!("Failed to log in, {reason}")),
                );
            }
        }
        check
    }

    async fn force_logout(&self, adapter: &AdapterHandle) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_forced_logout();
        }
        if let Err(err) = adapter.logout().await {
            warn!(error = %err, "identity provider logout failed");
        }
    }

    async fn dispatch(&self, request: Request) -> InterceptResult<Response> {
        let url = request.url().to_string();
        self.http
            .execute(request)
            .await
            .map_err(|source| InterceptError::Transport { url, source })
    }
}

fn authorize(mut request: Request, credentials: &Credentials) -> InterceptResult<Request> {
    let mut value = HeaderValue::from_str(&credentials.header_value())
        .map_err(|source| InterceptError::InvalidHeader { source })?;
    value.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(request)
}

fn classify_directory_body(body: String) -> DirectoryCheck {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "null" {
        DirectoryCheck::Unrecognized
    } else {
        DirectoryCheck::Recognized(body)
    }
}
