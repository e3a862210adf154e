//! Observability for the resolver.
//!
//! Provides metric definitions for material lookups and refreshes.

pub mod metrics;
