//! Resolver error types.
//!
//! Callers need to tell an unknown issuer apart from unavailable verification
//! material, so each failure cause is its own variant. `status_code` gives the
//! HTTP status an upstream handler should answer with.

use thiserror::Error;

/// Errors produced by issuer resolution, material caching and token verification.
///
/// Maps to HTTP status codes:
/// - InvalidProviderUrl, NoTokenProviders: 500 Internal Server Error
/// - UnknownIssuer, InvalidToken: 401 Unauthorized
/// - FetchFailed, MalformedMaterial, NoMaterialAvailable: 503 Service Unavailable
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolverError {
    /// A configured token provider base URL could not be parsed.
    #[error("Invalid token provider URL '{url}': {reason}")]
    InvalidProviderUrl { url: String, reason: String },

    /// The configuration named no token provider at all.
    #[error("No token provider URL configured")]
    NoTokenProviders,

    /// The issuer does not match any configured token provider.
    #[error("Verification failed: unknown issuer {0}")]
    UnknownIssuer(String),

    /// The issuer could not be reached, or answered with an error status.
    #[error("Failed to fetch verification material: {0}")]
    FetchFailed(String),

    /// The issuer answered, but the payload is not usable verification material.
    #[error("Malformed verification material: {0}")]
    MalformedMaterial(String),

    /// Material has never been fetched and the current fetch failed too.
    #[error("No verification material available: {0}")]
    NoMaterialAvailable(String),

    /// The token failed structural or cryptographic validation.
    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

impl ResolverError {
    /// Returns the HTTP status code an upstream handler should use.
    pub fn status_code(&self) -> u16 {
        match self {
            ResolverError::InvalidProviderUrl { .. } | ResolverError::NoTokenProviders => 500,
            ResolverError::UnknownIssuer(_) | ResolverError::InvalidToken(_) => 401,
            ResolverError::FetchFailed(_)
            | ResolverError::MalformedMaterial(_)
            | ResolverError::NoMaterialAvailable(_) => 503,
        }
    }

    /// True when the issuer is known but its verification material could not be obtained.
    ///
    /// These failures are transient: a later call retries the fetch.
    pub fn is_material_unavailable(&self) -> bool {
        matches!(
            self,
            ResolverError::FetchFailed(_)
                | ResolverError::MalformedMaterial(_)
                | ResolverError::NoMaterialAvailable(_)
        )
    }

    /// Bounded label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            ResolverError::InvalidProviderUrl { .. } => "invalid_provider_url",
            ResolverError::NoTokenProviders => "no_token_providers",
            ResolverError::UnknownIssuer(_) => "unknown_issuer",
            ResolverError::FetchFailed(_) => "fetch_failed",
            ResolverError::MalformedMaterial(_) => "malformed_material",
            ResolverError::NoMaterialAvailable(_) => "no_material",
            ResolverError::InvalidToken(_) => "invalid_token",
        }
    }
}
