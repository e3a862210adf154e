//! # Resolver Test Utilities
//!
//! Shared test utilities for the `oidc-resolver` crate.
//!
//! This crate provides:
//! - Deterministic Ed25519 signing keys with their public JWK form
//! - A JWT builder that signs claims with those keys
//! - A wiremock-backed token provider serving discovery and JWKS documents
//! - A scripted in-memory `KeySetFetcher` for cache tests without HTTP
//!
//! ## Usage
//!
//! ```rust,ignore
//! use resolver_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = TestSigningKey::from_seed(1, "key-1");
//!     let provider = MockTokenProvider::start().await;
//!     provider.serve_keys(&[&key]).await;
//!
//!     let token = TestTokenBuilder::new(provider.issuer()).sign(&key);
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_provider;
pub mod scripted_fetcher;
pub mod token_builders;

pub use crypto_fixtures::*;
pub use mock_provider::*;
pub use scripted_fetcher::*;
pub use token_builders::*;

/// Install a test-writer tracing subscriber once per test binary.
///
/// Honors `RUST_LOG`; defaults to debug output for the resolver's targets.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("oidc=debug,oidc_resolver=debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
