//! Issuer resolution.
//!
//! Maps a token's `iss` claim to the [`VerifierCache`] of the configured token
//! provider with the same scheme and authority. The table is built once at
//! construction and never mutated, so lookups take no lock.

use crate::cache::VerifierCache;
use crate::config::ResolverConfig;
use crate::errors::ResolverError;
use crate::fetcher::{HttpKeySetFetcher, KeySetFetcher};
use crate::observability::metrics;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use url::Url;

/// ASCII word scheme, `://`, then everything up to the next `/`.
const PROTOCOL_AND_DOMAIN_PATTERN: &str = r"^(?-u:\w)+://[^/]+";

fn protocol_and_domain_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(PROTOCOL_AND_DOMAIN_PATTERN).ok())
        .as_ref()
}

/// Lookup key: lower-cased scheme + authority of an issuer URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IssuerKey(String);

impl IssuerKey {
    /// Canonicalize a URL-shaped string.
    ///
    /// Path, query and case differences are discarded. Input that does not
    /// look like `scheme://authority` is used verbatim.
    pub(crate) fn from_issuer(issuer: &str) -> Self {
        match protocol_and_domain_regex().and_then(|re| re.find(issuer)) {
            Some(found) => Self(found.as_str().to_lowercase()),
            None => Self(issuer.to_string()),
        }
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

/// Resolves issuers to their verification material caches.
///
/// Construct once at startup and share by reference (or `Arc`) with every
/// request handler.
pub struct IssuerResolver {
    verifiers: HashMap<IssuerKey, Arc<VerifierCache>>,
}

impl std::fmt::Debug for IssuerResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerResolver")
            .field(
                "issuers",
                &self.verifiers.keys().map(IssuerKey::as_str).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl IssuerResolver {
    /// Build a resolver that fetches material over HTTP.
    ///
    /// # Errors
    ///
    /// - `InvalidProviderUrl` if any configured base URL fails to parse
    /// - `NoTokenProviders` if the configuration lists no URL
    pub fn new(config: &ResolverConfig) -> Result<Self, ResolverError> {
        let fetcher = HttpKeySetFetcher::new(config.http_timeout)?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    /// Build a resolver whose caches use the given fetch collaborator.
    ///
    /// Fails fast: one bad URL aborts construction. When two URLs share a
    /// scheme and authority, the later one replaces the earlier.
    pub fn with_fetcher(
        config: &ResolverConfig,
        fetcher: Arc<dyn KeySetFetcher>,
    ) -> Result<Self, ResolverError> {
        let mut verifiers = HashMap::new();

        for addr in config.provider_addrs() {
            let base_url = Url::parse(addr).map_err(|e| ResolverError::InvalidProviderUrl {
                url: addr.to_string(),
                reason: e.to_string(),
            })?;

            let key = IssuerKey::from_issuer(addr);
            let cache = VerifierCache::new(
                base_url,
                Arc::clone(&fetcher),
                config.cache_ttl,
                config.error_tolerance,
            );

            if let Some(replaced) = verifiers.insert(key.clone(), Arc::new(cache)) {
                tracing::warn!(
                    target: "oidc.resolver",
                    key = %key.as_str(),
                    replaced = %replaced.base_url(),
                    by = %addr,
                    "Token provider URLs share scheme and authority, keeping the last one"
                );
            }
        }

        if verifiers.is_empty() {
            return Err(ResolverError::NoTokenProviders);
        }

        tracing::info!(
            target: "oidc.resolver",
            issuer_count = verifiers.len(),
            cache_ttl_secs = config.cache_ttl.as_secs(),
            error_tolerance_secs = config.error_tolerance.as_secs(),
            "Issuer resolver initialized"
        );

        Ok(Self { verifiers })
    }

    /// Find the cache responsible for an issuer.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIssuer` if no configured provider has the issuer's
    /// scheme and authority.
    pub fn resolve(&self, issuer: &str) -> Result<Arc<VerifierCache>, ResolverError> {
        let key = IssuerKey::from_issuer(issuer);
        match self.verifiers.get(&key) {
            Some(cache) => Ok(Arc::clone(cache)),
            None => {
                tracing::debug!(target: "oidc.resolver", issuer = %issuer, "Unknown issuer");
                metrics::record_unknown_issuer();
                Err(ResolverError::UnknownIssuer(issuer.to_string()))
            }
        }
    }

    /// Number of distinct issuers in the table.
    pub fn issuer_count(&self) -> usize {
        self.verifiers.len()
    }

    /// Fetch material for every issuer concurrently.
    ///
    /// Failures are returned per base URL and do not stop the other fetches.
    /// Without this call, material is fetched on first use.
    pub async fn warm_up(&self) -> Vec<(Url, ResolverError)> {
        let fetches = self.verifiers.values().map(|cache| async move {
            cache
                .current_material()
                .await
                .err()
                .map(|e| (cache.base_url().clone(), e))
        });

        let failures: Vec<(Url, ResolverError)> = futures::future::join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect();

        for (url, error) in &failures {
            tracing::warn!(target: "oidc.resolver", issuer = %url, error = %error, "Warm-up fetch failed");
        }

        failures
    }
}
