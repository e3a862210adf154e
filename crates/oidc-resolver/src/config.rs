//! Resolver configuration.
//!
//! Configuration is loaded from environment variables, or assembled in code
//! with [`ResolverConfig::new`] and the `with_*` setters.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default verification material TTL (15 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Default error tolerance window (1 minute).
pub const DEFAULT_ERROR_TOLERANCE: Duration = Duration::from_secs(60);

/// Default HTTP request timeout for discovery and JWKS fetches.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest accepted TTL, tolerance or timeout (10 years).
pub const MAX_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Whitespace-separated list of token provider base URLs.
pub const ENV_TOKEN_PROVIDER_ADDRS: &str = "OIDC_TOKEN_PROVIDER_ADDRS";

/// Material TTL in seconds.
pub const ENV_CACHE_TTL_SECONDS: &str = "OIDC_CACHE_TTL_SECONDS";

/// Error tolerance window in seconds.
pub const ENV_ERROR_TOLERANCE_SECONDS: &str = "OIDC_ERROR_TOLERANCE_SECONDS";

/// HTTP timeout in seconds.
pub const ENV_HTTP_TIMEOUT_SECONDS: &str = "OIDC_HTTP_TIMEOUT_SECONDS";

/// Issuer resolver configuration.
///
/// A zero duration always means "use the default", whether it comes from the
/// environment or from one of the setters. Durations above [`MAX_DURATION`]
/// are rejected from the environment and clamped by the setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Whitespace-separated token provider base URLs.
    pub token_provider_addrs: String,

    /// How long fetched material is considered fresh.
    pub cache_ttl: Duration,

    /// How long past expiry stale material may still be served while refreshes fail.
    pub error_tolerance: Duration,

    /// Timeout applied to each HTTP request made by the default fetcher.
    pub http_timeout: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),
}

impl ResolverConfig {
    /// Create a configuration with default durations.
    #[must_use]
    pub fn new(token_provider_addrs: impl Into<String>) -> Self {
        Self {
            token_provider_addrs: token_provider_addrs.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            error_tolerance: DEFAULT_ERROR_TOLERANCE,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the material TTL.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = or_default(ttl, DEFAULT_CACHE_TTL);
        self
    }

    /// Set the error tolerance window.
    #[must_use]
    pub fn with_error_tolerance(mut self, tolerance: Duration) -> Self {
        self.error_tolerance = or_default(tolerance, DEFAULT_ERROR_TOLERANCE);
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = or_default(timeout, DEFAULT_HTTP_TIMEOUT);
        self
    }

    /// Iterate over the configured base URLs, in configuration order.
    pub fn provider_addrs(&self) -> impl Iterator<Item = &str> {
        self.token_provider_addrs.split_whitespace()
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let token_provider_addrs = vars
            .get(ENV_TOKEN_PROVIDER_ADDRS)
            .ok_or_else(|| ConfigError::MissingEnvVar(ENV_TOKEN_PROVIDER_ADDRS.to_string()))?
            .clone();

        let cache_ttl = parse_seconds(vars, ENV_CACHE_TTL_SECONDS, DEFAULT_CACHE_TTL)?;
        let error_tolerance =
            parse_seconds(vars, ENV_ERROR_TOLERANCE_SECONDS, DEFAULT_ERROR_TOLERANCE)?;
        let http_timeout = parse_seconds(vars, ENV_HTTP_TIMEOUT_SECONDS, DEFAULT_HTTP_TIMEOUT)?;

        Ok(ResolverConfig {
            token_provider_addrs,
            cache_ttl,
            error_tolerance,
            http_timeout,
        })
    }
}

fn or_default(value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        default
    } else {
        value.min(MAX_DURATION)
    }
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.trim().parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{} must be a non-negative integer number of seconds, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value > MAX_DURATION.as_secs() {
        return Err(ConfigError::InvalidDuration(format!(
            "{} must be at most {} seconds, got {}",
            name,
            MAX_DURATION.as_secs(),
            value
        )));
    }

    Ok(or_default(Duration::from_secs(value), default))
}
