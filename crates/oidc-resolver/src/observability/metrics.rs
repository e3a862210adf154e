//! Metrics definitions for issuer resolution and material caching.
//!
//! All metrics follow Prometheus naming conventions:
//! - `oidc_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `outcome`: 4 values (fresh, stale, refreshed, error)
//! - `status`: 2 values (success, error)
//! - `error_type`: bounded by `ResolverError` variants
//!
//! Issuer URLs are never used as labels.

use metrics::{counter, histogram};
use std::time::Duration;

/// How a `current_material` call was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialOutcome {
    /// Cached material within its TTL.
    Fresh,
    /// Expired material served inside the error tolerance window.
    Stale,
    /// Material fetched by this call, or by the refresh it waited on.
    Refreshed,
    /// No usable material.
    Error,
}

impl MaterialOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            MaterialOutcome::Fresh => "fresh",
            MaterialOutcome::Stale => "stale",
            MaterialOutcome::Refreshed => "refreshed",
            MaterialOutcome::Error => "error",
        }
    }
}

/// Record a material lookup.
///
/// Metric: `oidc_material_requests_total`
/// Labels: `outcome`
pub fn record_material_request(outcome: MaterialOutcome) {
    counter!("oidc_material_requests_total", "outcome" => outcome.as_str()).increment(1);
}

/// Record a refresh attempt against an issuer.
///
/// Metric: `oidc_refresh_total`, `oidc_refresh_duration_seconds`
/// Labels: `status`, `error_type`
pub fn record_refresh(error_type: Option<&'static str>, duration: Duration) {
    let status = if error_type.is_some() { "error" } else { "success" };

    histogram!("oidc_refresh_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());

    counter!("oidc_refresh_total",
        "status" => status,
        "error_type" => error_type.unwrap_or("none")
    )
    .increment(1);
}

/// Record a lookup for an issuer that is not configured.
///
/// Metric: `oidc_unknown_issuer_total`
pub fn record_unknown_issuer() {
    counter!("oidc_unknown_issuer_total").increment(1);
}
