//! httpmock-backed console backend and identity provider.

use httpmock::prelude::*;
use httpmock::Mock;
use serde_json::Value;
use url::Url;
use warden_auth::AuthSettings;

/// Mock console backend; the same server also serves the adapter bundle.
pub struct ConsoleFixture {
    server: MockServer,
}

impl ConsoleFixture {
    /// Start a fresh mock server.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start_async().await,
        }
    }

    /// Underlying mock server, for ad hoc expectations.
    #[must_use]
    pub const fn server(&self) -> &MockServer {
        &self.server
    }

    /// Absolute URL for `path` on the mock server.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        self.server.url(path)
    }

    /// Console base URL (`/console/`).
    ///
    /// # Panics
    ///
    /// Panics if the mock server URL is not a valid URL.
    #[must_use]
    pub fn console_url(&self) -> Url {
        Url::parse(&self.server.url("/console/")).expect("mock console url")
    }

    /// Identity provider base URL (`/auth`) to place in client descriptors.
    #[must_use]
    pub fn idp_base(&self) -> String {
        self.server.url("/auth")
    }

    /// Settings pointing at the mock console with defaults elsewhere.
    #[must_use]
    pub fn settings(&self) -> AuthSettings {
        AuthSettings::new(self.console_url())
    }

    /// `GET keycloak/enabled` answering `body`.
    pub fn mock_enabled(&self, body: &str) -> Mock<'_> {
        self.server.mock(|when, then| {
            when.method(GET).path("/console/keycloak/enabled");
            then.status(200).body(body);
        })
    }

    /// `GET keycloak/enabled` answering `status` with an empty body.
    pub fn mock_enabled_status(&self, status: u16) -> Mock<'_> {
        self.server.mock(|when, then| {
            when.method(GET).path("/console/keycloak/enabled");
            then.status(status);
        })
    }

    /// `GET keycloak/client-config` answering `descriptor`.
    pub fn mock_client_config(&self, descriptor: Value) -> Mock<'_> {
        self.server.mock(|when, then| {
            when.method(GET).path("/console/keycloak/client-config");
            then.status(200).json_body(descriptor);
        })
    }

    /// `GET keycloak/client-config` answering `status`.
    pub fn mock_client_config_status(&self, status: u16) -> Mock<'_> {
        self.server.mock(|when, then| {
            when.method(GET).path("/console/keycloak/client-config");
            then.status(status);
        })
    }

    /// `GET keycloak/validate-subject-matches?keycloakUser={subject}` answering `status`.
    pub fn mock_validate(&self, subject: &str, status: u16) -> Mock<'_> {
        self.server.mock(|when, then| {
            when.method(GET)
                .path("/console/keycloak/validate-subject-matches")
                .query_param("keycloakUser", subject);
            then.status(status).body("true");
        })
    }

    /// Any `GET keycloak/validate-subject-matches` call.
    pub fn mock_any_validate(&self) -> Mock<'_> {
        self.server.mock(|when, then| {
            when.method(GET)
                .path("/console/keycloak/validate-subject-matches");
            then.status(200).body("true");
        })
    }

    /// `GET user` answering `body`.
    pub fn mock_user(&self, body: &str) -> Mock<'_> {
        self.server.mock(|when, then| {
            when.method(GET).path("/console/user");
            then.status(200).body(body);
        })
    }

    /// `GET {idp}/js/{script}` answering `status`.
    pub fn mock_bundle(&self, script: &str, status: u16) -> Mock<'_> {
        let path = format!("/auth/js/{script}");
        self.server.mock(|when, then| {
            when.method(GET).path(path);
            then.status(status).body("/* adapter */");
        })
    }
}
