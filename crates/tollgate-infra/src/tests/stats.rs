use std::time::Duration;

use chrono::{DateTime, Utc};

use tollgate_core::{LimiterConfig, Scope, ScopePolicy, StatsError, StrategyConfig};

use super::support::{config_with, harness};

#[tokio::test]
async fn test_unused_key_reports_zero_consumption() {
    let h = harness(LimiterConfig::default());
    h.clock.set(5_000);

    let stats = h
        .limiter
        .stats_reporter()
        .snapshot_for(&Scope::COMPLIANCE, "nobody", "filings")
        .await
        .unwrap();

    assert_eq!(stats.consumption, 0.0);
    assert_eq!(stats.request_count, 0);
    assert_eq!(stats.capacity, 10);
    assert_eq!(stats.last_request_at, None);
    assert_eq!(stats.utilization(), 0.0);
    // snapshots never create state
    assert!(h.store.is_empty().await);
}

#[tokio::test]
async fn test_sliding_window_stats_count_calls_in_window() {
    let h = harness(LimiterConfig::default());

    h.admit_at(&Scope::CORPORATE, "acme", "orders", 1_000).await;
    h.admit_at(&Scope::CORPORATE, "acme", "orders", 2_500).await;
    h.clock.set(3_000);

    let stats = h
        .limiter
        .stats_reporter()
        .snapshot_for(&Scope::CORPORATE, "acme", "orders")
        .await
        .unwrap();

    assert_eq!(stats.consumption, 2.0);
    assert_eq!(stats.capacity, 100);
    assert_eq!(stats.last_request_at, DateTime::<Utc>::from_timestamp_millis(2_500));
    assert!((stats.allowed_rate_per_sec - 100.0 / 60.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_token_bucket_stats_report_spent_tokens_after_refill() {
    let h = harness(LimiterConfig::default());

    // capacity 1000, one token per 10ms
    for _ in 0..50 {
        h.admit_at(&Scope::HIGH_FREQUENCY, "svc", "quotes", 0).await;
    }
    h.clock.set(200);

    let stats = h
        .limiter
        .stats_reporter()
        .snapshot_for(&Scope::HIGH_FREQUENCY, "svc", "quotes")
        .await
        .unwrap();

    assert_eq!(stats.consumption, 30.0);
}

#[tokio::test]
async fn test_token_bucket_stats_report_last_admission_between_refills() {
    let h = harness(config_with(
        Scope::HIGH_FREQUENCY,
        ScopePolicy::new(StrategyConfig::token_bucket(10, Duration::from_millis(1000))),
    ));

    for t in [0, 500, 900] {
        assert!(h.admit_at(&Scope::HIGH_FREQUENCY, "svc", "quotes", t).await);
    }
    h.clock.set(950);

    let stats = h
        .limiter
        .stats_reporter()
        .snapshot_for(&Scope::HIGH_FREQUENCY, "svc", "quotes")
        .await
        .unwrap();

    assert_eq!(stats.consumption, 3.0);
    assert_eq!(stats.request_count, 3);
    assert_eq!(stats.last_request_at, DateTime::<Utc>::from_timestamp_millis(900));
}

#[tokio::test]
async fn test_token_bucket_without_tracking_has_no_last_request_time() {
    let mut config = LimiterConfig::default();
    config.track_request_counts = false;
    let h = harness(config);

    assert!(h.admit_at(&Scope::HIGH_FREQUENCY, "svc", "quotes", 40).await);

    let stats = h
        .limiter
        .stats_reporter()
        .snapshot_for(&Scope::HIGH_FREQUENCY, "svc", "quotes")
        .await
        .unwrap();

    assert_eq!(stats.consumption, 1.0);
    assert_eq!(stats.last_request_at, None);
}

#[tokio::test]
async fn test_leaky_bucket_stats_report_drained_level() {
    let h = harness(LimiterConfig::default());

    // capacity 10, one droplet per second
    for _ in 0..4 {
        h.admit_at(&Scope::COMPLIANCE, "acme", "filings", 0).await;
    }
    h.clock.set(1_500);

    let reporter = h.limiter.stats_reporter();
    let stats = reporter
        .snapshot_for(&Scope::COMPLIANCE, "acme", "filings")
        .await
        .unwrap();

    assert!((stats.consumption - 2.5).abs() < 1e-9);
    assert!((stats.utilization() - 0.25).abs() < 1e-9);
    assert_eq!(h.telemetry.consumption(&stats.key.to_string()), Some(stats.consumption));
}

#[tokio::test]
async fn test_unknown_scope_is_reported() {
    let h = harness(LimiterConfig::default());

    let err = h
        .limiter
        .stats_reporter()
        .snapshot_for(&Scope::new("partner"), "acme", "orders")
        .await
        .unwrap_err();

    assert!(matches!(err, StatsError::UnknownScope(_)));
}

#[tokio::test]
async fn test_snapshot_rejects_key_of_another_strategy() {
    let h = harness(LimiterConfig::default());
    let mut key = h
        .limiter
        .config()
        .key_for(&Scope::CORPORATE, "acme", "orders")
        .unwrap();
    key.strategy = tollgate_core::StrategyKind::LeakyBucket;

    let result = h.limiter.stats_reporter().snapshot(&key).await;
    assert!(matches!(result, Err(StatsError::UnknownScope(_))));
}
