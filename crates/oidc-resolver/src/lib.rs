//! OIDC issuer resolution and verification material caching.
//!
//! Resolves the `iss` claim of an incoming token to the token provider that
//! issued it, and caches that provider's signing keys so that verifying a
//! token does not cost a network round-trip.
//!
//! # Components
//!
//! - [`IssuerResolver`] - immutable table from scheme+authority to cache,
//!   built once from configuration
//! - [`VerifierCache`] - per-issuer key set with TTL, coalesced refreshes and
//!   an error tolerance window during provider outages
//! - [`TokenVerifier`] - end-to-end token verification on top of the resolver
//!
//! # Example
//!
//! ```rust,ignore
//! use oidc_resolver::{IssuerResolver, ResolverConfig, TokenVerifier};
//! use std::sync::Arc;
//!
//! let config = ResolverConfig::from_env()?;
//! let resolver = Arc::new(IssuerResolver::new(&config)?);
//!
//! // Keys for the issuer are fetched on first use and cached.
//! let cache = resolver.resolve("https://idp.example.com/auth/realms/demo")?;
//! let keys = cache.current_material().await?;
//!
//! // Or verify a whole token.
//! let verifier = TokenVerifier::new(resolver);
//! let claims = verifier.verify(token).await?;
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod cache;
pub mod config;
pub mod errors;
pub mod fetcher;
pub mod issuer;
pub mod keys;
pub mod observability;
pub mod verifier;

pub use cache::{CacheStatus, VerifierCache};
pub use config::{ConfigError, ResolverConfig};
pub use errors::ResolverError;
pub use fetcher::{HttpKeySetFetcher, KeySetFetcher};
pub use issuer::IssuerResolver;
pub use keys::{Jwk, JwksDocument, KeySet};
pub use verifier::{Claims, TokenVerifier};
