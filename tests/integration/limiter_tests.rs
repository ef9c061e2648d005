//! Limiter behaviour on the real clock

use rate_dispatch::core::events::ChannelEventSink;
use rate_dispatch::{
    DispatchEvent, ErrorKind, LimiterConfig, LocalTokenBackend, RateLimitConfig,
    RateLimitRegistry, TokenBucketLimiter,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn limiter(rate: f64, burst: u32) -> TokenBucketLimiter {
    let registry = RateLimitRegistry::empty()
        .with_default("default", RateLimitConfig::new(rate, burst).unwrap());
    let settings = LimiterConfig {
        queue_timeout_secs: 1,
        drain_interval_ms: 20,
        ..LimiterConfig::default()
    };
    TokenBucketLimiter::new(registry, settings).unwrap()
}

#[tokio::test]
async fn test_queued_caller_is_admitted_after_refill() {
    let limiter = limiter(10.0, 1);
    limiter.acquire("reports").await.unwrap();

    let started = Instant::now();
    limiter.acquire("reports").await.unwrap();
    let waited = started.elapsed();

    assert!(waited >= Duration::from_millis(50), "waited {:?}", waited);
    assert!(waited < Duration::from_millis(900), "waited {:?}", waited);
    limiter.shutdown().await;
}

#[tokio::test]
async fn test_queue_timeout() {
    let limiter = limiter(0.01, 1);
    limiter.acquire("feeds").await.unwrap();

    let error = limiter.acquire("feeds").await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Timeout);
    assert!(error.is_retryable());
    assert_eq!(error.retry_after(), Some(Duration::from_secs(100)));
    limiter.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_rejects_waiting_callers() {
    let limiter = limiter(0.01, 1);
    limiter.acquire("feeds").await.unwrap();

    let waiting = tokio::spawn({
        let limiter = limiter.clone();
        async move { limiter.acquire("feeds").await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    limiter.shutdown().await;

    let error = waiting.await.unwrap().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::LimiterShutdown);
}

#[tokio::test]
async fn test_admissions_are_reported() {
    let (sink, mut events) = ChannelEventSink::new();
    let registry = RateLimitRegistry::empty()
        .with_default("default", RateLimitConfig::new(20.0, 1).unwrap());
    let limiter = TokenBucketLimiter::with_parts(
        registry,
        LimiterConfig {
            drain_interval_ms: 20,
            ..LimiterConfig::default()
        },
        Arc::new(LocalTokenBackend::new()),
        Arc::new(sink),
    )
    .unwrap();

    limiter.acquire("listings").await.unwrap();
    limiter.acquire("listings").await.unwrap();

    let mut admitted = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, DispatchEvent::Admitted { .. }) {
            admitted += 1;
        }
    }
    assert!(admitted >= 1);
    limiter.shutdown().await;
}
