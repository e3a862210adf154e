//! In-memory `KeySetFetcher` that replays a script of results.

use crate::crypto_fixtures::{jwks_document, TestSigningKey};
use oidc_resolver::{JwksDocument, KeySet, KeySetFetcher, ResolverError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// Replays scripted fetch results in order; once the script runs out the
/// last result repeats.
///
/// Every call is counted and the requested base URL recorded, so tests can
/// assert on coalescing and on which issuer was asked.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<KeySet, ResolverError>>>,
    last: Mutex<Result<KeySet, ResolverError>>,
    delay: Duration,
    calls: AtomicU32,
    requested: Mutex<Vec<Url>>,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<KeySet, ResolverError>>) -> Arc<Self> {
        Self::with_delay(script, Duration::ZERO)
    }

    /// Each fetch sleeps for `delay` (on the tokio clock) before answering.
    pub fn with_delay(script: Vec<Result<KeySet, ResolverError>>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Err(ResolverError::FetchFailed(
                "script exhausted".to_string(),
            ))),
            delay,
            calls: AtomicU32::new(0),
            requested: Mutex::new(Vec::new()),
        })
    }

    /// Append results to the end of the script.
    pub fn push(&self, result: Result<KeySet, ResolverError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Base URLs passed to `fetch`, in call order.
    pub fn requested(&self) -> Vec<Url> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl KeySetFetcher for ScriptedFetcher {
    async fn fetch(&self, base_url: &Url) -> Result<KeySet, ResolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(base_url.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => {
                *self.last.lock().unwrap() = result.clone();
                result
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

/// Key set holding the public form of `keys`.
///
/// # Panics
///
/// Panics if `keys` is empty.
pub fn key_set(keys: &[&TestSigningKey]) -> KeySet {
    let document: JwksDocument =
        serde_json::from_value(jwks_document(keys)).expect("test JWKS must deserialize");
    KeySet::from_document(document).expect("test JWKS must contain a usable key")
}

/// Transport failure as the HTTP fetcher would report it.
pub fn fetch_failed(reason: &str) -> ResolverError {
    ResolverError::FetchFailed(reason.to_string())
}
