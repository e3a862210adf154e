//! Verification material: JSON Web Keys fetched from an issuer.
//!
//! A [`KeySet`] is the unit cached per issuer. It is built once from a JWKS
//! document and never mutated; a refresh replaces the whole set.

use crate::errors::ResolverError;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;

const RSA_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// JSON Web Key from a JWKS endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is meant for, if the issuer states one.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig" for signing keys).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    /// Curve name ("P-256", "P-384", "Ed25519").
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,
}

impl Jwk {
    fn is_supported(&self) -> bool {
        matches!(self.kty.as_str(), "RSA" | "EC" | "OKP")
            && self.key_use.as_deref().map_or(true, |u| u == "sig")
    }

    /// Algorithms a token signed with this key may declare.
    ///
    /// The key family bounds the list; an `alg` on the key narrows it to one.
    pub fn allowed_algorithms(&self) -> Vec<Algorithm> {
        let family: Vec<Algorithm> = match (self.kty.as_str(), self.crv.as_deref()) {
            ("RSA", _) => RSA_ALGORITHMS.to_vec(),
            ("EC", Some("P-256")) => vec![Algorithm::ES256],
            ("EC", Some("P-384")) => vec![Algorithm::ES384],
            ("OKP", Some("Ed25519")) => vec![Algorithm::EdDSA],
            _ => Vec::new(),
        };

        match self.alg.as_deref() {
            None => family,
            Some(alg) => match Algorithm::from_str(alg) {
                Ok(declared) if family.contains(&declared) => vec![declared],
                _ => Vec::new(),
            },
        }
    }

    /// Build the `jsonwebtoken` key used to check signatures.
    pub fn decoding_key(&self) -> Result<DecodingKey, ResolverError> {
        let missing = |field: &str| {
            ResolverError::MalformedMaterial(format!(
                "{} key {} is missing '{}'",
                self.kty,
                self.kid.as_deref().unwrap_or("<no kid>"),
                field
            ))
        };
        let invalid = |e: jsonwebtoken::errors::Error| {
            ResolverError::MalformedMaterial(format!("Invalid {} key: {}", self.kty, e))
        };

        match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or_else(|| missing("n"))?;
                let e = self.e.as_deref().ok_or_else(|| missing("e"))?;
                DecodingKey::from_rsa_components(n, e).map_err(invalid)
            }
            "EC" => {
                let x = self.x.as_deref().ok_or_else(|| missing("x"))?;
                let y = self.y.as_deref().ok_or_else(|| missing("y"))?;
                DecodingKey::from_ec_components(x, y).map_err(invalid)
            }
            "OKP" => {
                let x = self.x.as_deref().ok_or_else(|| missing("x"))?;
                DecodingKey::from_ed_components(x).map_err(invalid)
            }
            other => Err(ResolverError::MalformedMaterial(format!(
                "Unsupported key type {}",
                other
            ))),
        }
    }
}

/// JWKS document as served by an issuer.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Immutable set of signing keys for one issuer, indexed by key ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    keys: HashMap<String, Jwk>,
}

impl KeySet {
    /// Build a key set from a JWKS document.
    ///
    /// Keys without a `kid`, encryption keys and unsupported key types are
    /// skipped. A document with no usable key is malformed material.
    pub fn from_document(document: JwksDocument) -> Result<Self, ResolverError> {
        let total = document.keys.len();
        let keys: HashMap<String, Jwk> = document
            .keys
            .into_iter()
            .filter(Jwk::is_supported)
            .filter_map(|jwk| match jwk.kid.clone() {
                Some(kid) if !kid.is_empty() => Some((kid, jwk)),
                _ => None,
            })
            .collect();

        if keys.len() < total {
            tracing::debug!(
                target: "oidc.keys",
                skipped = total - keys.len(),
                "Skipped unusable keys in JWKS document"
            );
        }

        if keys.is_empty() {
            return Err(ResolverError::MalformedMaterial(
                "JWKS document contains no usable signing key".to_string(),
            ));
        }

        Ok(Self { keys })
    }

    /// Look up a key by ID.
    pub fn get(&self, kid: &str) -> Option<&Jwk> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key IDs in this set, in no particular order.
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // 2048-bit RSA modulus from RFC 7517 appendix A.1.
    const RFC7517_N: &str = "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw";

    #[test]
    fn test_jwk_deserialization_rsa() {
        let json = format!(
            r#"{{"kty": "RSA", "kid": "rsa-1", "alg": "RS256", "use": "sig", "n": "{}", "e": "AQAB"}}"#,
            RFC7517_N
        );

        let jwk: Jwk = serde_json::from_str(&json).unwrap();

        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.kid.as_deref(), Some("rsa-1"));
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
        assert_eq!(jwk.e.as_deref(), Some("AQAB"));
        assert!(jwk.decoding_key().is_ok());
    }

    #[test]
    fn test_jwk_deserialization_minimal() {
        let jwk: Jwk = serde_json::from_str(r#"{"kty": "OKP"}"#).unwrap();

        assert_eq!(jwk.kty, "OKP");
        assert!(jwk.kid.is_none());
        assert!(jwk.x.is_none());
        assert!(jwk.alg.is_none());
    }

    #[test]
    fn test_allowed_algorithms_by_family() {
        let rsa: Jwk = serde_json::from_str(r#"{"kty": "RSA", "kid": "a"}"#).unwrap();
        assert_eq!(rsa.allowed_algorithms().len(), 6);
        assert!(rsa.allowed_algorithms().contains(&Algorithm::RS256));

        let ed: Jwk = serde_json::from_str(r#"{"kty": "OKP", "crv": "Ed25519"}"#).unwrap();
        assert_eq!(ed.allowed_algorithms(), vec![Algorithm::EdDSA]);

        let p256: Jwk = serde_json::from_str(r#"{"kty": "EC", "crv": "P-256"}"#).unwrap();
        assert_eq!(p256.allowed_algorithms(), vec![Algorithm::ES256]);
    }

    #[test]
    fn test_allowed_algorithms_narrowed_by_alg() {
        let jwk: Jwk = serde_json::from_str(r#"{"kty": "RSA", "alg": "PS256"}"#).unwrap();
        assert_eq!(jwk.allowed_algorithms(), vec![Algorithm::PS256]);

        // An alg from another family leaves nothing usable.
        let mismatched: Jwk =
            serde_json::from_str(r#"{"kty": "OKP", "crv": "Ed25519", "alg": "RS256"}"#).unwrap();
        assert!(mismatched.allowed_algorithms().is_empty());
    }

    #[test]
    fn test_decoding_key_missing_component() {
        let jwk: Jwk = serde_json::from_str(r#"{"kty": "RSA", "kid": "no-n", "e": "AQAB"}"#).unwrap();

        let err = jwk.decoding_key().err().expect("missing modulus must be rejected");
        assert!(matches!(err, ResolverError::MalformedMaterial(msg) if msg.contains("'n'")));
    }

    #[test]
    fn test_key_set_from_document() {
        let json = r#"{
            "keys": [
                {"kty": "OKP", "kid": "key-1", "crv": "Ed25519", "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"},
                {"kty": "OKP", "kid": "key-2", "crv": "Ed25519", "x": "11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo"}
            ]
        }"#;
        let document: JwksDocument = serde_json::from_str(json).unwrap();

        let keys = KeySet::from_document(document).unwrap();

        assert_eq!(keys.len(), 2);
        assert!(keys.get("key-1").is_some());
        assert!(keys.get("key-3").is_none());
        let mut kids: Vec<&str> = keys.kids().collect();
        kids.sort_unstable();
        assert_eq!(kids, vec!["key-1", "key-2"]);
    }

    #[test]
    fn test_key_set_skips_unusable_keys() {
        let json = r#"{
            "keys": [
                {"kty": "OKP", "crv": "Ed25519"},
                {"kty": "oct", "kid": "hmac"},
                {"kty": "RSA", "kid": "enc", "use": "enc"},
                {"kty": "RSA", "kid": "sig", "use": "sig"}
            ]
        }"#;
        let document: JwksDocument = serde_json::from_str(json).unwrap();

        let keys = KeySet::from_document(document).unwrap();

        assert_eq!(keys.len(), 1);
        assert!(keys.get("sig").is_some());
    }

    #[test]
    fn test_key_set_empty_is_malformed() {
        let document: JwksDocument = serde_json::from_str(r#"{"keys": []}"#).unwrap();

        let result = KeySet::from_document(document);
        assert!(matches!(result, Err(ResolverError::MalformedMaterial(_))));
    }
}
