//! Bootstrap gate: decides whether single sign-on is required and loads the adapter.
//!
//! # Design
//! - The enablement probe and the client-config fetch fail open: any error is
//!   treated as "not required" and only logged at debug level.
//! - Once SSO is required, failing to load the adapter is fatal. Continuing
//!   without it would leave every later request unauthorized.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};
use url::Url;

use crate::adapter::{AdapterHandle, AdapterLoader};
use crate::config::{AuthSettings, ClientDescriptor};
use crate::console::ConsoleClient;
use crate::context::AuthContext;
use crate::error::{GateError, GateResult};

/// Result of the enablement probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRequirement {
    /// The console runs without single sign-on.
    NotRequired,
    /// Single sign-on is required with this client descriptor.
    Required(ClientDescriptor),
}

/// Determines whether SSO is required and, if so, loads the identity adapter.
pub struct BootstrapGate {
    console: ConsoleClient,
    loader: Arc<dyn AdapterLoader>,
    adapter_script: String,
    fallback: Option<ClientDescriptor>,
    adapter_timeout: Option<Duration>,
}

impl BootstrapGate {
    /// Gate over the given console using `loader` to fetch the adapter.
    #[must_use]
    pub fn new(
        console: ConsoleClient,
        loader: Arc<dyn AdapterLoader>,
        settings: &AuthSettings,
    ) -> Self {
        Self {
            console,
            loader,
            adapter_script: settings.adapter_script.clone(),
            fallback: settings.fallback_descriptor.clone(),
            adapter_timeout: settings.adapter_timeout(),
        }
    }

    /// Probe the console for the SSO requirement.
    ///
    /// Never fails: probe or config errors resolve to [`AuthRequirement::NotRequired`]
    /// unless a fallback descriptor is configured for the config fetch.
    pub async fn requirement(&self) -> AuthRequirement {
        match self.console.keycloak_enabled().await {
            Ok(true) => {}
            Ok(false) => {
                debug!("single sign-on not enabled on console");
                return AuthRequirement::NotRequired;
            }
            Err(err) => {
                debug!(error = %err, "enablement probe failed; continuing without single sign-on");
                return AuthRequirement::NotRequired;
            }
        }

        match self.console.client_config().await {
            Ok(descriptor) => AuthRequirement::Required(descriptor),
            Err(err) => match &self.fallback {
                Some(descriptor) => {
                    debug!(error = %err, "client config unavailable; using fallback descriptor");
                    AuthRequirement::Required(descriptor.clone())
                }
                None => {
                    debug!(
                        error = %err,
                        "client config unavailable; continuing without single sign-on"
                    );
                    AuthRequirement::NotRequired
                }
            },
        }
    }

    /// Run the gate and produce the process's authentication context.
    ///
    /// # Errors
    ///
    /// Returns [`GateError`] when SSO is required but the adapter cannot be loaded.
    pub async fn check(&self) -> GateResult<AuthContext> {
        let descriptor = match self.requirement().await {
            AuthRequirement::NotRequired => return Ok(AuthContext::disabled()),
            AuthRequirement::Required(descriptor) => descriptor,
        };

        let script_url = self.script_url(&descriptor)?;
        let adapter = match self.loader.load(&script_url, &descriptor).await {
            Ok(adapter) => adapter,
            Err(source) => {
                error!(url = %script_url, error = %source, "failed to load identity adapter");
                return Err(GateError::AdapterLoad {
                    script_url: script_url.to_string(),
                    source,
                });
            }
        };

        info!(url = %script_url, realm = descriptor.realm(), "identity adapter loaded");
        let handle = AdapterHandle::new(adapter).with_timeout(self.adapter_timeout);
        Ok(AuthContext::enabled(handle, descriptor))
    }

    fn script_url(&self, descriptor: &ClientDescriptor) -> GateResult<Url> {
        let location = descriptor
            .script_location(&self.adapter_script)
            .ok_or(GateError::MissingBaseUrl)?;
        Url::parse(&location).map_err(|source| GateError::InvalidScriptUrl {
            value: location,
            source,
        })
    }
}
