//! Wiremock-backed token provider.
//!
//! Serves an OIDC discovery document and a JWKS, and can be switched into an
//! outage to exercise the cache's error tolerance.

use crate::crypto_fixtures::{jwks_document, TestSigningKey};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock advertises as `jwks_uri`, relative to the realm.
pub const JWKS_PATH: &str = "protocol/openid-connect/certs";

/// A token provider listening on a random local port.
pub struct MockTokenProvider {
    server: MockServer,
    realm_path: String,
}

impl MockTokenProvider {
    /// Start a provider whose issuer is the server root.
    pub async fn start() -> Self {
        Self::start_with_realm("").await
    }

    /// Start a provider whose issuer lives under `realm_path`,
    /// e.g. `/auth/realms/demo`.
    pub async fn start_with_realm(realm_path: &str) -> Self {
        Self {
            server: MockServer::start().await,
            realm_path: realm_path.trim_end_matches('/').to_string(),
        }
    }

    /// Server root, without the realm path.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Issuer URL (also the configured base URL).
    pub fn issuer(&self) -> String {
        format!("{}{}", self.server.uri(), self.realm_path)
    }

    fn discovery_path(&self) -> String {
        format!("{}/.well-known/openid-configuration", self.realm_path)
    }

    fn jwks_path(&self) -> String {
        format!("{}/{}", self.realm_path, JWKS_PATH)
    }

    /// Serve discovery and a JWKS containing `keys`.
    pub async fn serve_keys(&self, keys: &[&TestSigningKey]) {
        self.serve_jwks(jwks_document(keys)).await;
    }

    /// Serve discovery and an arbitrary JWKS body.
    pub async fn serve_jwks(&self, jwks: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(self.discovery_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": self.issuer(),
                "jwks_uri": format!("{}{}", self.server.uri(), self.jwks_path()),
            })))
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path(self.jwks_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .mount(&self.server)
            .await;
    }

    /// Answer every request with `status` until [`MockTokenProvider::reset`].
    pub async fn fail_with(&self, status: u16) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Drop every mounted response and the request log.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of JWKS downloads seen since start or the last reset.
    pub async fn jwks_request_count(&self) -> usize {
        let jwks_path = self.jwks_path();
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == jwks_path)
            .count()
    }

    /// Number of requests of any kind since start or the last reset.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }
}
