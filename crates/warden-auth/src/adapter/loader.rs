//! Loading the identity adapter from the identity provider.
//!
//! The bundle is fetched from `{base-url}/js/{script}`; a 2xx response proves
//! the identity provider is serving an adapter for this console, after which
//! the factory builds the in-process adapter from the client descriptor.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::IdentityAdapter;
use crate::config::ClientDescriptor;
use crate::error::{AdapterError, AdapterLoadError};

/// Loads an identity adapter for a client descriptor.
#[async_trait]
pub trait AdapterLoader: Send + Sync {
    /// Load the adapter bundle at `script_url` and construct the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterLoadError`] when the bundle cannot be fetched or the
    /// adapter cannot be constructed.
    async fn load(
        &self,
        script_url: &Url,
        descriptor: &ClientDescriptor,
    ) -> Result<Arc<dyn IdentityAdapter>, AdapterLoadError>;
}

/// Builds an adapter from a client descriptor once its bundle is available.
pub trait AdapterFactory: Send + Sync {
    /// Construct the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError`] when the descriptor is unusable for this adapter.
    fn build(&self, descriptor: &ClientDescriptor)
    -> Result<Arc<dyn IdentityAdapter>, AdapterError>;
}

impl<F> AdapterFactory for F
where
    F: Fn(&ClientDescriptor) -> Result<Arc<dyn IdentityAdapter>, AdapterError> + Send + Sync,
{
    fn build(
        &self,
        descriptor: &ClientDescriptor,
    ) -> Result<Arc<dyn IdentityAdapter>, AdapterError> {
        self(descriptor)
    }
}

/// Loader that fetches the adapter bundle over HTTP.
pub struct HttpAdapterLoader {
    http: Client,
    factory: Arc<dyn AdapterFactory>,
}

impl HttpAdapterLoader {
    /// Build a loader on top of an existing HTTP client.
    #[must_use]
    pub fn new(http: Client, factory: Arc<dyn AdapterFactory>) -> Self {
        Self { http, factory }
    }
}

#[async_trait]
impl AdapterLoader for HttpAdapterLoader {
    async fn load(
        &self,
        script_url: &Url,
        descriptor: &ClientDescriptor,
    ) -> Result<Arc<dyn IdentityAdapter>, AdapterLoadError> {
        let response = self
            .http
            .get(script_url.clone())
            .send()
            .await
            .map_err(|source| AdapterLoadError::Fetch {
                url: script_url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterLoadError::Status {
                url: script_url.to_string(),
                status: status.as_u16(),
            });
        }
        debug!(url = %script_url, "adapter bundle available");

        self.factory
            .build(descriptor)
            .map_err(|source| AdapterLoadError::Construct { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::PresetTokenAdapter;
    use httpmock::prelude::*;

    fn preset_factory() -> Arc<dyn AdapterFactory> {
        Arc::new(
            |descriptor: &ClientDescriptor| -> Result<Arc<dyn IdentityAdapter>, AdapterError> {
                let subject = descriptor.client_id().unwrap_or("console").to_string();
                Ok(Arc::new(PresetTokenAdapter::new(subject, None)))
            },
        )
    }

    #[tokio::test]
    async fn load_requires_successful_bundle_fetch() {
        let server = MockServer::start_async().await;
        let bundle = server.mock(|when, then| {
            when.method(GET).path("/auth/js/keycloak.js");
            then.status(200).body("/* adapter */");
        });

        let loader = HttpAdapterLoader::new(Client::new(), preset_factory());
        let url = Url::parse(&server.url("/auth/js/keycloak.js")).expect("bundle url");
        let descriptor = ClientDescriptor::default().with("resource", "console-client");
        let adapter = loader.load(&url, &descriptor).await.expect("adapter loads");

        bundle.assert();
        assert!(!adapter.is_authenticated());
    }

    #[tokio::test]
    async fn missing_bundle_is_reported_with_status() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/auth/js/keycloak.js");
            then.status(404);
        });

        let loader = HttpAdapterLoader::new(Client::new(), preset_factory());
        let url = Url::parse(&server.url("/auth/js/keycloak.js")).expect("bundle url");
        let Err(err) = loader.load(&url, &ClientDescriptor::default()).await else {
            panic!("expected load failure");
        };
        assert!(matches!(err, AdapterLoadError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn factory_errors_surface_as_construct_failures() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/js/keycloak.js");
            then.status(200);
        });

        let factory: Arc<dyn AdapterFactory> = Arc::new(
            |_: &ClientDescriptor| -> Result<Arc<dyn IdentityAdapter>, AdapterError> {
                Err(AdapterError::InitFailed {
                    reason: "no realm".to_string(),
                })
            },
        );
        let loader = HttpAdapterLoader::new(Client::new(), factory);
        let url = Url::parse(&server.url("/js/keycloak.js")).expect("bundle url");
        let Err(err) = loader.load(&url, &ClientDescriptor::default()).await else {
            panic!("expected construct failure");
        };
        assert!(matches!(err, AdapterLoadError::Construct { .. }));
    }
}
