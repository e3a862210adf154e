//! Token verification against resolved issuer material.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - The unverified `iss` claim only selects the issuer; the signature, `exp`
//!   and `iss` are then checked with that issuer's keys
//! - The header `alg` must be one the selected key allows
//! - Generic error messages prevent information leakage; details go to debug logs

use crate::errors::ResolverError;
use crate::issuer::IssuerResolver;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{decode, decode_header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Maximum accepted token size in bytes (8KB).
pub const MAX_TOKEN_SIZE_BYTES: usize = 8192;

const INVALID_TOKEN_MESSAGE: &str = "The access token is invalid or expired";

fn invalid_token() -> ResolverError {
    ResolverError::InvalidToken(INVALID_TOKEN_MESSAGE.to_string())
}

/// Verified token claims.
///
/// The `sub` field is redacted in Debug output.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer the token was verified against.
    pub iss: String,

    /// Subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Expiration timestamp (Unix epoch seconds).
    pub exp: i64,

    /// Issued-at timestamp (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Authorized party (client the token was issued to).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Every other claim, untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claims")
            .field("iss", &self.iss)
            .field("sub", &"[REDACTED]")
            .field("exp", &self.exp)
            .field("iat", &self.iat)
            .field("azp", &self.azp)
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Deserialize)]
struct UnverifiedIssuer {
    iss: String,
}

/// Read the `iss` claim without checking the signature.
///
/// Only used to pick the issuer whose keys will verify the token.
fn extract_unverified_issuer(token: &str) -> Result<String, ResolverError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "oidc.verify", "Token rejected: invalid JWT format");
        return Err(invalid_token());
    };

    let payload_bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|e| {
        tracing::debug!(target: "oidc.verify", error = %e, "Failed to decode JWT payload base64");
        invalid_token()
    })?;

    let claims: UnverifiedIssuer = serde_json::from_slice(&payload_bytes).map_err(|e| {
        tracing::debug!(target: "oidc.verify", error = %e, "JWT payload has no usable iss claim");
        invalid_token()
    })?;

    Ok(claims.iss)
}

/// Verifies tokens from any configured issuer.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    resolver: Arc<IssuerResolver>,
}

impl TokenVerifier {
    pub fn new(resolver: Arc<IssuerResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &IssuerResolver {
        &self.resolver
    }

    /// Verify a token and return its claims.
    ///
    /// # Security Checks
    ///
    /// 1. Size check - reject tokens > 8KB before parsing
    /// 2. Read `kid` from the header and `iss` from the payload
    /// 3. Resolve the issuer and get its current material
    /// 4. Check the header `alg` is allowed for the key with that `kid`
    /// 5. Verify signature, `exp`, and that `iss` is the issuer resolved in step 3
    ///
    /// # Errors
    ///
    /// - `UnknownIssuer` if the issuer is not configured
    /// - `FetchFailed` / `MalformedMaterial` / `NoMaterialAvailable` if the
    ///   issuer's material cannot be obtained
    /// - `InvalidToken` for every other failure, with a generic message
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<Claims, ResolverError> {
        if token.len() > MAX_TOKEN_SIZE_BYTES {
            tracing::debug!(
                target: "oidc.verify",
                token_size = token.len(),
                max_size = MAX_TOKEN_SIZE_BYTES,
                "Token rejected: size exceeds maximum allowed"
            );
            return Err(invalid_token());
        }

        let header = decode_header(token).map_err(|e| {
            tracing::debug!(target: "oidc.verify", error = %e, "Invalid JWT header");
            invalid_token()
        })?;
        let kid = header.kid.filter(|kid| !kid.is_empty()).ok_or_else(|| {
            tracing::debug!(target: "oidc.verify", "Token rejected: missing kid");
            invalid_token()
        })?;

        let issuer = extract_unverified_issuer(token)?;
        let cache = self.resolver.resolve(&issuer)?;
        let keys = cache.current_material().await?;

        let jwk = keys.get(&kid).ok_or_else(|| {
            tracing::debug!(target: "oidc.verify", kid = %kid, issuer = %issuer, "Key not found in issuer material");
            invalid_token()
        })?;

        if !jwk.allowed_algorithms().contains(&header.alg) {
            tracing::warn!(
                target: "oidc.verify",
                kid = %kid,
                alg = ?header.alg,
                kty = %jwk.kty,
                "Token algorithm not allowed for key"
            );
            return Err(invalid_token());
        }

        let decoding_key = jwk.decoding_key().map_err(|e| {
            tracing::warn!(target: "oidc.verify", kid = %kid, error = %e, "Unusable key in issuer material");
            invalid_token()
        })?;

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = true;
        // Audience is the caller's policy, not this layer's.
        validation.validate_aud = false;
        validation.set_issuer(&[issuer.as_str()]);

        let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            tracing::debug!(target: "oidc.verify", error = %e, "Token verification failed");
            invalid_token()
        })?;

        tracing::debug!(target: "oidc.verify", "Token verified successfully");
        Ok(token_data.claims)
    }
}
