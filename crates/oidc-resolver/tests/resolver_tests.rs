//! Issuer resolution integration tests.
//!
//! Exercises the resolver and its caches against wiremock token providers
//! over real HTTP, and against a scripted fetcher on a paused clock for the
//! timing-sensitive outage scenarios.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use anyhow::Result;
use oidc_resolver::{IssuerResolver, ResolverConfig, ResolverError};
use resolver_test_utils::{
    fetch_failed, init_test_tracing, key_set, MockTokenProvider, ScriptedFetcher, TestSigningKey,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn resolver_for(addrs: &[String], ttl: Duration, tolerance: Duration) -> IssuerResolver {
    let config = ResolverConfig::new(addrs.join(" "))
        .with_cache_ttl(ttl)
        .with_error_tolerance(tolerance)
        .with_http_timeout(Duration::from_secs(5));
    IssuerResolver::new(&config).unwrap()
}

#[tokio::test]
async fn test_resolves_each_provider_to_its_own_keys() {
    init_test_tracing();
    let first = MockTokenProvider::start_with_realm("/auth/realms/first").await;
    let second = MockTokenProvider::start().await;
    first.serve_keys(&[&TestSigningKey::from_seed(1, "first-key")]).await;
    second.serve_keys(&[&TestSigningKey::from_seed(2, "second-key")]).await;

    let resolver = resolver_for(
        &[first.issuer(), second.issuer()],
        Duration::from_secs(60),
        Duration::from_secs(60),
    );
    assert_eq!(resolver.issuer_count(), 2);

    let first_keys = resolver
        .resolve(&first.issuer())
        .unwrap()
        .current_material()
        .await
        .unwrap();
    let second_keys = resolver
        .resolve(&second.issuer())
        .unwrap()
        .current_material()
        .await
        .unwrap();

    assert!(first_keys.get("first-key").is_some());
    assert!(first_keys.get("second-key").is_none());
    assert!(second_keys.get("second-key").is_some());
}

#[tokio::test]
async fn test_issuer_with_other_path_resolves_to_same_cache() {
    let provider = MockTokenProvider::start_with_realm("/auth/realms/demo").await;
    provider.serve_keys(&[&TestSigningKey::from_seed(1, "k1")]).await;

    let resolver = resolver_for(
        &[provider.issuer()],
        Duration::from_secs(60),
        Duration::from_secs(60),
    );

    let by_config = resolver.resolve(&provider.issuer()).unwrap();
    let other_realm = format!("{}/auth/realms/other", provider.uri());
    let by_other_path = resolver.resolve(&other_realm).unwrap();
    let upper = provider.issuer().to_uppercase();
    let by_upper_case = resolver.resolve(&upper).unwrap();

    assert!(Arc::ptr_eq(&by_config, &by_other_path));
    assert!(Arc::ptr_eq(&by_config, &by_upper_case));
}

#[tokio::test]
async fn test_unknown_issuer_does_not_touch_network() {
    let provider = MockTokenProvider::start().await;
    provider.serve_keys(&[&TestSigningKey::from_seed(1, "k1")]).await;
    let resolver = resolver_for(
        &[provider.issuer()],
        Duration::from_secs(60),
        Duration::from_secs(60),
    );

    let result = resolver.resolve("https://unknown.example.com/realms/x");

    assert_eq!(
        result.unwrap_err(),
        ResolverError::UnknownIssuer("https://unknown.example.com/realms/x".to_string())
    );
    assert_eq!(provider.request_count().await, 0);
}

#[tokio::test]
async fn test_material_cached_within_ttl() {
    let provider = MockTokenProvider::start().await;
    provider.serve_keys(&[&TestSigningKey::from_seed(1, "k1")]).await;
    let resolver = resolver_for(
        &[provider.issuer()],
        Duration::from_secs(60),
        Duration::from_secs(60),
    );
    let cache = resolver.resolve(&provider.issuer()).unwrap();

    let first = cache.current_material().await.unwrap();
    for _ in 0..5 {
        let again = cache.current_material().await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }

    assert_eq!(provider.jwks_request_count().await, 1);
}

#[tokio::test]
async fn test_concurrent_first_use_fetches_once() {
    let provider = MockTokenProvider::start().await;
    provider.serve_keys(&[&TestSigningKey::from_seed(1, "k1")]).await;
    let resolver = Arc::new(resolver_for(
        &[provider.issuer()],
        Duration::from_secs(60),
        Duration::from_secs(60),
    ));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let resolver = Arc::clone(&resolver);
            let issuer = provider.issuer();
            tokio::spawn(async move { resolver.resolve(&issuer).unwrap().current_material().await })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
    assert_eq!(provider.jwks_request_count().await, 1);
}

#[tokio::test]
async fn test_stale_material_served_during_outage() {
    let provider = MockTokenProvider::start().await;
    provider.serve_keys(&[&TestSigningKey::from_seed(1, "k1")]).await;
    let resolver = resolver_for(
        &[provider.issuer()],
        Duration::from_millis(50),
        Duration::from_secs(30),
    );
    let cache = resolver.resolve(&provider.issuer()).unwrap();
    let before = cache.current_material().await.unwrap();

    provider.fail_with(503).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let during = cache.current_material().await.unwrap();
    assert!(Arc::ptr_eq(&before, &during));
    assert!(provider.request_count().await >= 1, "a refresh must have been attempted");

    let status = cache.status().await;
    assert!(status.has_material);
    assert!(!status.fresh);
    assert!(status.failing_since.is_some());
    assert!(matches!(status.last_error, Some(ResolverError::FetchFailed(_))));
}

#[tokio::test]
async fn test_rotated_keys_picked_up_by_force_refresh() {
    let provider = MockTokenProvider::start().await;
    provider.serve_keys(&[&TestSigningKey::from_seed(1, "old")]).await;
    let resolver = resolver_for(
        &[provider.issuer()],
        Duration::from_secs(60),
        Duration::from_secs(60),
    );
    let cache = resolver.resolve(&provider.issuer()).unwrap();
    assert!(cache.current_material().await.unwrap().get("old").is_some());

    provider.reset().await;
    provider.serve_keys(&[&TestSigningKey::from_seed(2, "new")]).await;

    let refreshed = cache.force_refresh().await.unwrap();
    assert!(refreshed.get("new").is_some());
    assert!(refreshed.get("old").is_none());
    assert!(cache.current_material().await.unwrap().get("new").is_some());
}

#[tokio::test]
async fn test_never_reachable_provider_reports_no_material() {
    let provider = MockTokenProvider::start().await;
    provider.fail_with(500).await;
    let resolver = resolver_for(
        &[provider.issuer()],
        Duration::from_secs(60),
        Duration::from_secs(60),
    );

    let err = resolver
        .resolve(&provider.issuer())
        .unwrap()
        .current_material()
        .await
        .unwrap_err();

    assert!(matches!(err, ResolverError::NoMaterialAvailable(_)));
    assert_eq!(err.status_code(), 503);
}

#[tokio::test]
async fn test_warm_up_reports_failing_providers() {
    let healthy = MockTokenProvider::start().await;
    healthy.serve_keys(&[&TestSigningKey::from_seed(1, "k1")]).await;
    let broken = MockTokenProvider::start().await;
    broken.fail_with(502).await;

    let resolver = resolver_for(
        &[healthy.issuer(), broken.issuer()],
        Duration::from_secs(60),
        Duration::from_secs(60),
    );

    let failures = resolver.warm_up().await;

    assert_eq!(failures.len(), 1);
    assert!(failures
        .iter()
        .all(|(url, _)| url.as_str().starts_with(&broken.issuer())));
    assert!(resolver.resolve(&healthy.issuer()).unwrap().status().await.fresh);
    assert_eq!(healthy.jwks_request_count().await, 1);
}

#[tokio::test]
async fn test_resolver_from_environment_variables() -> Result<()> {
    let provider = MockTokenProvider::start().await;
    provider.serve_keys(&[&TestSigningKey::from_seed(1, "k1")]).await;

    let vars = HashMap::from([
        (
            "OIDC_TOKEN_PROVIDER_ADDRS".to_string(),
            format!("{}  https://second.example.com", provider.issuer()),
        ),
        ("OIDC_CACHE_TTL_SECONDS".to_string(), "120".to_string()),
    ]);
    let config = ResolverConfig::from_vars(&vars)?;
    let resolver = IssuerResolver::new(&config)?;

    assert_eq!(resolver.issuer_count(), 2);
    let cache = resolver.resolve(&provider.issuer())?;
    assert_eq!(cache.ttl(), Duration::from_secs(120));
    cache.current_material().await?;

    Ok(())
}

// Outage timeline on a paused clock: TTL 100ms, tolerance 200ms.

#[tokio::test(start_paused = true)]
async fn test_outage_timeline_with_scripted_provider() {
    let key = TestSigningKey::from_seed(1, "k1");
    let fetcher = ScriptedFetcher::new(vec![Ok(key_set(&[&key])), Err(fetch_failed("down"))]);
    let config = ResolverConfig::new("https://idp.example.com:8443/realms/a")
        .with_cache_ttl(Duration::from_millis(100))
        .with_error_tolerance(Duration::from_millis(200));
    let resolver = IssuerResolver::with_fetcher(&config, fetcher.clone()).unwrap();
    let cache = resolver.resolve("https://IDP.example.com:8443/realms/b").unwrap();

    // t=0: first fetch succeeds.
    let original = cache.current_material().await.unwrap();
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(
        fetcher.requested()[0].as_str(),
        "https://idp.example.com:8443/realms/a"
    );

    // t=150: stale, refresh fails, still within tolerance.
    tokio::time::advance(Duration::from_millis(150)).await;
    let stale = cache.current_material().await.unwrap();
    assert!(Arc::ptr_eq(&original, &stale));
    assert_eq!(fetcher.calls(), 2);

    // t=400: tolerance (expiry at 100 + 200) exhausted.
    tokio::time::advance(Duration::from_millis(250)).await;
    let err = cache.current_material().await.unwrap_err();
    assert_eq!(err, fetch_failed("down"));

    // Provider recovers.
    fetcher.push(Ok(key_set(&[&key])));
    let recovered = cache.current_material().await.unwrap();
    assert!(recovered.get("k1").is_some());
    assert!(cache.status().await.failing_since.is_none());
}
