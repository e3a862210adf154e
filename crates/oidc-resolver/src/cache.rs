//! Per-issuer verification material cache.
//!
//! Each configured issuer owns one [`VerifierCache`]. Material is fetched
//! lazily on first use and refreshed once its TTL lapses. When a refresh
//! fails, the previous material keeps being served until the error tolerance
//! window past its expiry is used up.
//!
//! # Concurrency
//!
//! - The freshness check takes the state read lock only.
//! - At most one refresh per issuer is in flight, guarded by `refresh_lock`.
//!   The fetch runs without holding the state lock.
//! - A caller that finds a refresh in flight gets the stale material
//!   immediately when it is still within tolerance, and otherwise waits for
//!   that refresh and reuses its outcome instead of fetching again.

use crate::errors::ResolverError;
use crate::fetcher::KeySetFetcher;
use crate::keys::KeySet;
use crate::observability::metrics::{self, MaterialOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::instrument;
use url::Url;

/// The first failure of a run of consecutive refresh failures, plus the latest error.
#[derive(Debug, Clone)]
struct RefreshFailure {
    error: ResolverError,
    failing_since: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    material: Option<Arc<KeySet>>,
    fetched_at: Option<Instant>,
    last_failure: Option<RefreshFailure>,
    /// Completed refresh attempts, successful or not.
    refresh_count: u64,
}

impl CacheState {
    /// Material still usable `lifetime` after it was fetched.
    ///
    /// A deadline past the clock's range never expires.
    fn usable_for(&self, now: Instant, lifetime: Duration) -> Option<Arc<KeySet>> {
        match (&self.material, self.fetched_at) {
            (Some(keys), Some(fetched_at))
                if fetched_at
                    .checked_add(lifetime)
                    .map_or(true, |deadline| now < deadline) =>
            {
                Some(Arc::clone(keys))
            }
            _ => None,
        }
    }

    fn fresh(&self, now: Instant, ttl: Duration) -> Option<Arc<KeySet>> {
        self.usable_for(now, ttl)
    }

    fn within_tolerance(
        &self,
        now: Instant,
        ttl: Duration,
        tolerance: Duration,
    ) -> Option<Arc<KeySet>> {
        self.usable_for(now, ttl.saturating_add(tolerance))
    }

    /// Answer a caller that found a refresh in flight, if it need not wait.
    ///
    /// The in-flight refresh may already have committed, in which case the
    /// material is fresh again.
    fn serve_during_refresh(
        &self,
        now: Instant,
        ttl: Duration,
        tolerance: Duration,
    ) -> Option<(Arc<KeySet>, MaterialOutcome)> {
        if let Some(keys) = self.fresh(now, ttl) {
            return Some((keys, MaterialOutcome::Refreshed));
        }
        self.within_tolerance(now, ttl, tolerance)
            .map(|keys| (keys, MaterialOutcome::Stale))
    }

    /// Answer a caller from the current state without fetching.
    fn settle(
        &self,
        now: Instant,
        ttl: Duration,
        tolerance: Duration,
    ) -> Result<(Arc<KeySet>, MaterialOutcome), ResolverError> {
        if let Some(keys) = self.fresh(now, ttl) {
            return Ok((keys, MaterialOutcome::Refreshed));
        }
        if let Some(keys) = self.within_tolerance(now, ttl, tolerance) {
            return Ok((keys, MaterialOutcome::Stale));
        }

        match (&self.material, &self.last_failure) {
            (None, Some(failure)) => Err(ResolverError::NoMaterialAvailable(
                failure.error.to_string(),
            )),
            (None, None) => Err(ResolverError::NoMaterialAvailable(
                "verification material has not been fetched".to_string(),
            )),
            (Some(_), Some(failure)) => Err(failure.error.clone()),
            (Some(_), None) => Err(ResolverError::NoMaterialAvailable(
                "verification material expired".to_string(),
            )),
        }
    }
}

/// Point-in-time view of a cache, for diagnostics.
#[derive(Debug, Clone)]
pub struct CacheStatus {
    /// Whether material has ever been fetched successfully.
    pub has_material: bool,
    /// Whether the material is within its TTL.
    pub fresh: bool,
    /// Number of keys in the current material.
    pub key_count: usize,
    /// Start of the current run of refresh failures.
    pub failing_since: Option<Instant>,
    /// Most recent refresh error, cleared by a successful refresh.
    pub last_error: Option<ResolverError>,
}

/// Verification material cache for a single issuer.
pub struct VerifierCache {
    base_url: Url,
    fetcher: Arc<dyn KeySetFetcher>,
    ttl: Duration,
    error_tolerance: Duration,
    state: RwLock<CacheState>,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for VerifierCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierCache")
            .field("base_url", &self.base_url.as_str())
            .field("ttl", &self.ttl)
            .field("error_tolerance", &self.error_tolerance)
            .finish_non_exhaustive()
    }
}

impl VerifierCache {
    /// Create an empty cache. Nothing is fetched until the first request.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Token provider base URL handed to the fetcher
    /// * `fetcher` - Collaborator that retrieves fresh material
    /// * `ttl` - How long fetched material stays fresh
    /// * `error_tolerance` - How long past expiry stale material may be served while refreshes fail
    pub fn new(
        base_url: Url,
        fetcher: Arc<dyn KeySetFetcher>,
        ttl: Duration,
        error_tolerance: Duration,
    ) -> Self {
        Self {
            base_url,
            fetcher,
            ttl,
            error_tolerance,
            state: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn error_tolerance(&self) -> Duration {
        self.error_tolerance
    }

    /// Get currently usable verification material.
    ///
    /// Returns cached material while fresh, refreshes it when stale, and keeps
    /// serving the previous material for up to `error_tolerance` past expiry
    /// while refreshes fail.
    ///
    /// # Errors
    ///
    /// - `NoMaterialAvailable` if no fetch has ever succeeded and this one failed
    /// - `FetchFailed` / `MalformedMaterial` once the tolerance window is exhausted
    #[instrument(skip(self), fields(issuer = %self.base_url))]
    pub async fn current_material(&self) -> Result<Arc<KeySet>, ResolverError> {
        let result = self.lookup().await;

        let outcome = match &result {
            Ok((_, outcome)) => *outcome,
            Err(_) => MaterialOutcome::Error,
        };
        metrics::record_material_request(outcome);

        result.map(|(keys, _)| keys)
    }

    /// Fetch new material now, regardless of freshness.
    ///
    /// Waits for an in-flight refresh to finish first, so it never runs
    /// concurrently with one.
    ///
    /// # Errors
    ///
    /// Returns the fetch error as-is; stale material is not substituted.
    #[instrument(skip(self), fields(issuer = %self.base_url))]
    pub async fn force_refresh(&self) -> Result<Arc<KeySet>, ResolverError> {
        let _refresh_guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Snapshot of the cache state.
    pub async fn status(&self) -> CacheStatus {
        let state = self.state.read().await;
        CacheStatus {
            has_material: state.material.is_some(),
            fresh: state.fresh(Instant::now(), self.ttl).is_some(),
            key_count: state.material.as_ref().map_or(0, |keys| keys.len()),
            failing_since: state.last_failure.as_ref().map(|f| f.failing_since),
            last_error: state.last_failure.as_ref().map(|f| f.error.clone()),
        }
    }

    async fn lookup(&self) -> Result<(Arc<KeySet>, MaterialOutcome), ResolverError> {
        let observed_refreshes = {
            let state = self.state.read().await;
            if let Some(keys) = state.fresh(Instant::now(), self.ttl) {
                tracing::debug!(target: "oidc.cache", "Verification material cache hit");
                return Ok((keys, MaterialOutcome::Fresh));
            }
            state.refresh_count
        };

        let _refresh_guard = match self.refresh_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let served = self.state.read().await.serve_during_refresh(
                    Instant::now(),
                    self.ttl,
                    self.error_tolerance,
                );
                if let Some((keys, outcome)) = served {
                    tracing::debug!(
                        target: "oidc.cache",
                        outcome = outcome.as_str(),
                        "Refresh in flight, not waiting"
                    );
                    return Ok((keys, outcome));
                }
                self.refresh_lock.lock().await
            }
        };

        {
            let state = self.state.read().await;
            if state.refresh_count != observed_refreshes {
                // Another caller finished a refresh while we waited for the lock.
                return state.settle(Instant::now(), self.ttl, self.error_tolerance);
            }
        }

        match self.refresh_locked().await {
            Ok(keys) => Ok((keys, MaterialOutcome::Refreshed)),
            Err(error) => {
                let state = self.state.read().await;
                let settled = state.settle(Instant::now(), self.ttl, self.error_tolerance);
                match &settled {
                    Ok(_) => tracing::warn!(
                        target: "oidc.cache",
                        error = %error,
                        "Refresh failed, serving stale verification material"
                    ),
                    Err(e) => tracing::error!(
                        target: "oidc.cache",
                        error = %e,
                        "Verification material unavailable"
                    ),
                }
                settled
            }
        }
    }

    /// Fetch and commit new material. Caller must hold `refresh_lock`.
    async fn refresh_locked(&self) -> Result<Arc<KeySet>, ResolverError> {
        tracing::debug!(target: "oidc.cache", "Refreshing verification material");

        let started = Instant::now();
        let result = self.fetcher.fetch(&self.base_url).await;
        metrics::record_refresh(
            result.as_ref().err().map(ResolverError::error_type),
            started.elapsed(),
        );

        let now = Instant::now();
        let mut state = self.state.write().await;
        state.refresh_count = state.refresh_count.wrapping_add(1);

        match result {
            Ok(keys) => {
                tracing::info!(
                    target: "oidc.cache",
                    key_count = keys.len(),
                    "Verification material refreshed"
                );
                let keys = Arc::new(keys);
                state.material = Some(Arc::clone(&keys));
                state.fetched_at = Some(now);
                state.last_failure = None;
                Ok(keys)
            }
            Err(error) => {
                let failing_since = state
                    .last_failure
                    .as_ref()
                    .map_or(now, |failure| failure.failing_since);
                state.last_failure = Some(RefreshFailure {
                    error: error.clone(),
                    failing_since,
                });
                Err(error)
            }
        }
    }
}
