//! Fetching verification material from a token provider.
//!
//! [`KeySetFetcher`] is the seam between the cache and the network. The
//! default [`HttpKeySetFetcher`] performs OIDC discovery against the
//! provider's base URL and then downloads the advertised JWKS.

use crate::errors::ResolverError;
use crate::keys::{JwksDocument, KeySet};
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;
use url::Url;

/// Path of the OIDC discovery document, relative to the issuer base URL.
pub const DISCOVERY_PATH: &str = ".well-known/openid-configuration";

/// Default connection timeout for the HTTP client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Retrieves and parses current verification material for one issuer.
///
/// Implementations report transport problems as `FetchFailed` and unusable
/// payloads as `MalformedMaterial`. Retrying is the cache's concern.
#[async_trait::async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self, base_url: &Url) -> Result<KeySet, ResolverError>;
}

/// Subset of the OIDC discovery document we rely on.
#[derive(Debug, Deserialize)]
struct ProviderMetadata {
    jwks_uri: String,
}

/// Discovery + JWKS fetcher over HTTP.
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    http_client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Create a fetcher whose requests time out after `timeout`.
    ///
    /// Redirects are not followed.
    ///
    /// # Errors
    ///
    /// Returns `ResolverError::FetchFailed` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ResolverError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT.min(timeout))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ResolverError::FetchFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { http_client })
    }

    /// Use an existing client (shares its connection pool and settings).
    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        what: &str,
    ) -> Result<T, ResolverError> {
        let response = self.http_client.get(url).send().await.map_err(|e| {
            tracing::debug!(target: "oidc.fetch", url = %url, error = %e, "Request failed");
            ResolverError::FetchFailed(format!("Failed to fetch {what} from {url}: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(target: "oidc.fetch", url = %url, status = %status, "Endpoint returned error");
            return Err(ResolverError::FetchFailed(format!(
                "{what} endpoint {url} returned {status}"
            )));
        }

        let body = response.bytes().await.map_err(|e| {
            ResolverError::FetchFailed(format!("Failed to read {what} from {url}: {e}"))
        })?;

        serde_json::from_slice(&body).map_err(|e| {
            ResolverError::MalformedMaterial(format!("Failed to parse {what} from {url}: {e}"))
        })
    }
}

/// Discovery document URL for a base URL, tolerating a trailing slash.
pub fn discovery_url(base_url: &Url) -> Result<Url, ResolverError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(DISCOVERY_PATH).map_err(|e| {
        ResolverError::FetchFailed(format!(
            "Cannot build discovery URL from {base_url}: {e}"
        ))
    })
}

#[async_trait::async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    #[instrument(skip(self), fields(base_url = %base_url))]
    async fn fetch(&self, base_url: &Url) -> Result<KeySet, ResolverError> {
        let discovery = discovery_url(base_url)?;
        tracing::debug!(target: "oidc.fetch", url = %discovery, "Fetching discovery document");

        let metadata: ProviderMetadata = self
            .get_json(discovery.as_str(), "discovery document")
            .await?;

        let jwks_url = Url::parse(&metadata.jwks_uri).map_err(|e| {
            ResolverError::MalformedMaterial(format!(
                "Discovery document has invalid jwks_uri '{}': {e}",
                metadata.jwks_uri
            ))
        })?;

        let document: JwksDocument = self.get_json(jwks_url.as_str(), "JWKS").await?;
        let keys = KeySet::from_document(document)?;

        tracing::debug!(target: "oidc.fetch", key_count = keys.len(), "JWKS fetched");
        Ok(keys)
    }
}
