//! Console backend endpoints used during bootstrap.
//!
//! # Design
//! - Endpoints are joined onto the console base URL, which always ends in `/`.
//! - Calls never retry; callers decide whether a failure is fatal.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::{AuthSettings, ClientDescriptor};
use crate::error::ConsoleError;

const ENABLED_PATH: &str = "keycloak/enabled";
const CLIENT_CONFIG_PATH: &str = "keycloak/client-config";
const VALIDATE_SUBJECT_PATH: &str = "keycloak/validate-subject-matches";
const USER_PATH: &str = "user";

/// HTTP client bound to the console backend.
#[derive(Debug, Clone)]
pub struct ConsoleClient {
    http: Client,
    base_url: Url,
}

impl ConsoleClient {
    /// Build a client using the settings' console URL and HTTP timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Client`] when the HTTP client cannot be built.
    pub fn new(settings: &AuthSettings) -> Result<Self, ConsoleError> {
        let http = build_http(settings.http_timeout())?;
        Ok(Self::from_parts(http, settings.console_base()))
    }

    /// Build a client from an existing HTTP client.
    #[must_use]
    pub const fn from_parts(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// Underlying HTTP client, shared with the adapter loader and interceptor.
    #[must_use]
    pub const fn http(&self) -> &Client {
        &self.http
    }

    /// Console base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an endpoint path beneath the console base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::InvalidEndpoint`] when the join fails.
    pub fn endpoint(&self, path: &'static str) -> Result<Url, ConsoleError> {
        self.base_url
            .join(path)
            .map_err(|source| ConsoleError::InvalidEndpoint { path, source })
    }

    /// URL of the directory lookup for the authenticated user.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::InvalidEndpoint`] when the join fails.
    pub fn user_endpoint(&self) -> Result<Url, ConsoleError> {
        self.endpoint(USER_PATH)
    }

    /// Whether the console requires single sign-on.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError`] when the request fails or the status is not 2xx.
    pub async fn keycloak_enabled(&self) -> Result<bool, ConsoleError> {
        const OPERATION: &str = "console.keycloak_enabled";
        let url = self.endpoint(ENABLED_PATH)?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| transport(OPERATION, &url, source))?;
        let response = require_success(OPERATION, &url, response)?;
        let body = response
            .text()
            .await
            .map_err(|source| decode(OPERATION, &url, source))?;
        Ok(parse_enabled(&body))
    }

    /// Fetch the identity provider client descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError`] when the request fails, the status is not 2xx,
    /// or the body is not a JSON object.
    pub async fn client_config(&self) -> Result<ClientDescriptor, ConsoleError> {
        const OPERATION: &str = "console.client_config";
        let url = self.endpoint(CLIENT_CONFIG_PATH)?;
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| transport(OPERATION, &url, source))?;
        let response = require_success(OPERATION, &url, response)?;
        let value: Value = response
            .json()
            .await
            .map_err(|source| decode(OPERATION, &url, source))?;
        ClientDescriptor::from_json(&value).ok_or_else(|| ConsoleError::UnexpectedPayload {
            operation: OPERATION,
            url: url.to_string(),
        })
    }

    /// Ask the console whether `subject` matches its configured principal.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError`] when the request fails or the status is not 2xx.
    pub async fn validate_subject(&self, subject: &str) -> Result<(), ConsoleError> {
        const OPERATION: &str = "console.validate_subject";
        let url = self.endpoint(VALIDATE_SUBJECT_PATH)?;
        let response = self
            .http
            .get(url.clone())
            .query(&[("keycloakUser", subject)])
            .send()
            .await
            .map_err(|source| transport(OPERATION, &url, source))?;
        require_success(OPERATION, &url, response)?;
        debug!(subject, "subject validated by console");
        Ok(())
    }
}

pub(crate) fn build_http(timeout: Duration) -> Result<Client, ConsoleError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|source| ConsoleError::Client { source })
}

/// Interpret the enablement probe body: JSON `true` or the text `true`.
pub(crate) fn parse_enabled(body: &str) -> bool {
    let trimmed = body.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Bool(flag)) => flag,
        Ok(Value::String(text)) => text.trim() == "true",
        Ok(_) => false,
        Err(_) => trimmed == "true",
    }
}

fn require_success(
    operation: &'static str,
    url: &Url,
    response: reqwest::Response,
) -> Result<reqwest::Response, ConsoleError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ConsoleError::Status {
            operation,
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn transport(operation: &'static str, url: &Url, source: reqwest::Error) -> ConsoleError {
    ConsoleError::Transport {
        operation,
        url: url.to_string(),
        source,
    }
}

fn decode(operation: &'static str, url: &Url, source: reqwest::Error) -> ConsoleError {
    ConsoleError::Decode {
        operation,
        url: url.to_string(),
        source,
    }
}
