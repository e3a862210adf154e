//! Builder patterns for test tokens
//!
//! Provides a fluent API for creating signed JWTs from a given issuer.

use crate::crypto_fixtures::TestSigningKey;
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde_json::json;

/// Builder for signed test JWTs
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new("https://idp.example.com/realms/demo")
///     .for_subject("alice")
///     .expires_in(3600)
///     .sign(&key);
/// ```
#[derive(Debug, Clone)]
pub struct TestTokenBuilder {
    iss: String,
    sub: String,
    exp: i64,
    iat: i64,
    kid: Option<String>,
    extra: serde_json::Map<String, serde_json::Value>,
}

impl TestTokenBuilder {
    /// Create a builder for `issuer`, valid for one hour.
    pub fn new(issuer: &str) -> Self {
        let now = Utc::now();
        Self {
            iss: issuer.to_string(),
            sub: "test-subject".to_string(),
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
            kid: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn for_subject(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set expiration in seconds from now (negative for already expired).
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Override the header `kid` (defaults to the signing key's).
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = Some(kid.to_string());
        self
    }

    /// Add an arbitrary claim.
    pub fn with_claim(mut self, name: &str, value: serde_json::Value) -> Self {
        self.extra.insert(name.to_string(), value);
        self
    }

    /// Claims as a JSON value.
    pub fn claims(&self) -> serde_json::Value {
        let mut claims = json!({
            "iss": self.iss,
            "sub": self.sub,
            "exp": self.exp,
            "iat": self.iat,
        });
        if let Some(map) = claims.as_object_mut() {
            map.extend(self.extra.clone());
        }
        claims
    }

    /// Sign with `key` using EdDSA.
    ///
    /// # Panics
    ///
    /// Panics if signing fails.
    pub fn sign(self, key: &TestSigningKey) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.kid.clone().unwrap_or_else(|| key.kid().to_string()));

        encode(&header, &self.claims(), &key.encoding_key()).expect("test token signing failed")
    }
}
