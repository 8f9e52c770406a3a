//! Settings threaded from the host into the gate, state machine and interceptor.
//!
//! # Design
//! - No ambient globals: the out-of-band init token and the client descriptor
//!   fallback are explicit fields rather than window-scoped state.
//! - Every field except the console URL has a default so partial JSON or CLI
//!   input is enough to run.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::adapter::InitToken;

/// Default adapter bundle name served under `{base-url}/js/`.
pub const DEFAULT_ADAPTER_SCRIPT: &str = "keycloak.js";
/// Default token leeway and minimum validity, in seconds.
pub const DEFAULT_TOKEN_WINDOW_SECS: u64 = 10;
/// Default timeout for console backend calls, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Descriptor keys that may carry the identity provider base URL, in lookup order.
const BASE_URL_KEYS: [&str; 3] = ["auth-server-url", "baseUrl", "url"];

/// Settings for the authentication pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Console backend URL; relative endpoints are resolved beneath it.
    pub console_url: Url,
    /// Adapter bundle file name.
    #[serde(default = "default_adapter_script")]
    pub adapter_script: String,
    /// Remaining lifetime below which a token is treated as expired.
    #[serde(default = "default_token_window")]
    pub leeway_secs: u64,
    /// Minimum validity requested from the adapter on refresh.
    #[serde(default = "default_token_window")]
    pub min_validity_secs: u64,
    /// Timeout applied to every console backend call.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Optional bound on adapter initialisation and refresh.
    #[serde(default)]
    pub adapter_timeout_secs: Option<u64>,
    /// Token handed in out-of-band, used instead of interactive login.
    #[serde(default)]
    pub init_token: Option<InitToken>,
    /// Descriptor used when the console cannot serve its client config.
    #[serde(default)]
    pub fallback_descriptor: Option<ClientDescriptor>,
}

fn default_adapter_script() -> String {
    DEFAULT_ADAPTER_SCRIPT.to_string()
}

const fn default_token_window() -> u64 {
    DEFAULT_TOKEN_WINDOW_SECS
}

const fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl AuthSettings {
    /// Settings with defaults for everything but the console URL.
    #[must_use]
    pub fn new(console_url: Url) -> Self {
        Self {
            console_url: normalize_base_url(console_url),
            adapter_script: default_adapter_script(),
            leeway_secs: DEFAULT_TOKEN_WINDOW_SECS,
            min_validity_secs: DEFAULT_TOKEN_WINDOW_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            adapter_timeout_secs: None,
            init_token: None,
            fallback_descriptor: None,
        }
    }

    /// Console URL with a trailing slash so endpoint joins stay beneath it.
    #[must_use]
    pub fn console_base(&self) -> Url {
        normalize_base_url(self.console_url.clone())
    }

    /// Token windows used by the interceptor.
    #[must_use]
    pub const fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            leeway: Duration::from_secs(self.leeway_secs),
            min_validity: Duration::from_secs(self.min_validity_secs),
        }
    }

    /// Timeout applied to console backend calls.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Optional bound on adapter calls.
    #[must_use]
    pub fn adapter_timeout(&self) -> Option<Duration> {
        self.adapter_timeout_secs.map(Duration::from_secs)
    }
}

/// Token validity windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Remaining lifetime below which the token counts as expired.
    pub leeway: Duration,
    /// Minimum validity requested when refreshing.
    pub min_validity: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            leeway: Duration::from_secs(DEFAULT_TOKEN_WINDOW_SECS),
            min_validity: Duration::from_secs(DEFAULT_TOKEN_WINDOW_SECS),
        }
    }
}

/// Flat identity provider client descriptor (client id, base URL, realm, ...).
///
/// Opaque to the pipeline beyond the base URL; it is handed to the adapter as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientDescriptor(BTreeMap<String, String>);

impl ClientDescriptor {
    /// Build a descriptor from a JSON object.
    ///
    /// Scalars are stringified; nested values are kept as compact JSON text.
    /// Returns `None` when the value is not an object.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let entries = object
            .iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::String(text) => text.clone(),
                    Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
                        value.to_string()
                    }
                };
                Some((key.clone(), text))
            })
            .collect();
        Some(Self(entries))
    }

    /// Insert or replace a descriptor entry.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a descriptor entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Identity provider base URL, if the descriptor names one.
    #[must_use]
    pub fn base_url(&self) -> Option<&str> {
        BASE_URL_KEYS
            .iter()
            .find_map(|key| self.get(key))
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Client identifier, if present.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.get("resource").or_else(|| self.get("clientId"))
    }

    /// Realm identifier, if present.
    #[must_use]
    pub fn realm(&self) -> Option<&str> {
        self.get("realm")
    }

    /// Adapter bundle URL `{base-url}/js/{script}`.
    ///
    /// Returns `None` when no base URL is present.
    #[must_use]
    pub fn script_location(&self, script: &str) -> Option<String> {
        self.base_url().map(|base| {
            format!(
                "{}/js/{}",
                base.trim_end_matches('/'),
                script.trim_start_matches('/')
            )
        })
    }

    /// Iterate over every entry in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

fn normalize_base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
