//! Gateway behavior under provider failures and admission control, driven
//! by scripted clients against the in-memory audit sink. Paused tokio time
//! lets the backoff and quota waits run instantly.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use opsledger_api::models::{OracleCallCategory, OracleCallOutcome};
use opsledger_api::oracle::{OracleApiError, OracleClient, OracleGateway, OracleGatewayConfig};
use opsledger_api::store::InMemoryStore;

/// Always rate limited, with a fixed retry-after hint.
struct AlwaysRateLimited {
    retry_after: Duration,
    calls: AtomicU32,
}

#[async_trait]
impl OracleClient for AlwaysRateLimited {
    async fn generate(&self, _prompt: &str, _model: &str) -> Result<String, OracleApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OracleApiError::RateLimited {
            retry_after: Some(self.retry_after),
        })
    }
}

/// Fails with a transport error for the first `failures` calls, then
/// succeeds.
struct FlakyClient {
    failures: u32,
    calls: AtomicU32,
}

#[async_trait]
impl OracleClient for FlakyClient {
    async fn generate(&self, _prompt: &str, _model: &str) -> Result<String, OracleApiError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(OracleApiError::Transport("connection reset".to_string()))
        } else {
            Ok("on the third try".to_string())
        }
    }
}

/// Tracks how many calls are in flight at once.
struct SlowClient {
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

#[async_trait]
impl OracleClient for SlowClient {
    async fn generate(&self, _prompt: &str, _model: &str) -> Result<String, OracleApiError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok("done".to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn persistent_rate_limiting_ends_in_a_fallback_with_full_audit_trail() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(AlwaysRateLimited {
        retry_after: Duration::from_secs(5),
        calls: AtomicU32::new(0),
    });
    let gateway = OracleGateway::new(
        client.clone(),
        store.clone(),
        OracleGatewayConfig {
            max_attempts: 3,
            ..Default::default()
        },
    );

    let started = Instant::now();
    let text = gateway
        .ask("forecast", "test-model", OracleCallCategory::StockPrediction, None)
        .await;

    assert_eq!(text, "prediction unavailable: retry budget exhausted");
    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    // Two waits of the provider's 5s hint between the three attempts.
    assert!(started.elapsed() >= Duration::from_secs(10));

    let records = store.oracle_records().await;
    assert_eq!(records.len(), 4);
    let rate_limited = records
        .iter()
        .filter(|r| r.outcome == OracleCallOutcome::RateLimited)
        .count();
    assert_eq!(rate_limited, 3);
    assert_eq!(records[3].outcome, OracleCallOutcome::Fallback);
}

#[tokio::test(start_paused = true)]
async fn missing_retry_after_hint_falls_back_to_the_configured_delay() {
    struct NoHint;

    #[async_trait]
    impl OracleClient for NoHint {
        async fn generate(&self, _p: &str, _m: &str) -> Result<String, OracleApiError> {
            Err(OracleApiError::RateLimited { retry_after: None })
        }
    }

    let store = Arc::new(InMemoryStore::new());
    let gateway = OracleGateway::new(
        Arc::new(NoHint),
        store,
        OracleGatewayConfig {
            max_attempts: 2,
            rate_limit_fallback: Duration::from_secs(30),
            ..Default::default()
        },
    );

    let started = Instant::now();
    gateway
        .ask("p", "m", OracleCallCategory::General, None)
        .await;
    assert!(started.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn transient_errors_back_off_exponentially_then_succeed() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(FlakyClient {
        failures: 2,
        calls: AtomicU32::new(0),
    });
    let gateway = OracleGateway::new(client, store.clone(), OracleGatewayConfig::default());

    let started = Instant::now();
    let text = gateway
        .ask("p", "m", OracleCallCategory::General, None)
        .await;

    assert_eq!(text, "on the third try");
    // 2s after the first failure, 4s after the second.
    assert!(started.elapsed() >= Duration::from_secs(6));

    let records = store.oracle_records().await;
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].outcome, OracleCallOutcome::TransientError);
    assert_eq!(records[1].outcome, OracleCallOutcome::TransientError);
    assert_eq!(records[2].outcome, OracleCallOutcome::Success);
}

#[tokio::test(start_paused = true)]
async fn concurrency_never_exceeds_the_permit_count() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(SlowClient {
        in_flight: AtomicU32::new(0),
        max_in_flight: AtomicU32::new(0),
    });
    let gateway = Arc::new(OracleGateway::new(
        client.clone(),
        store,
        OracleGatewayConfig {
            max_concurrent: 2,
            min_spacing: Duration::ZERO,
            ..Default::default()
        },
    ));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let gateway = gateway.clone();
        handles.push(tokio::spawn(async move {
            gateway
                .ask("p", "m", OracleCallCategory::General, None)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(client.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test(start_paused = true)]
async fn minute_quota_stalls_the_call_past_the_window() {
    let store = Arc::new(InMemoryStore::new());
    let client = Arc::new(FlakyClient {
        failures: 0,
        calls: AtomicU32::new(0),
    });
    let gateway = OracleGateway::new(
        client,
        store,
        OracleGatewayConfig {
            calls_per_minute: 2,
            min_spacing: Duration::ZERO,
            ..Default::default()
        },
    );

    let started = Instant::now();
    for _ in 0..2 {
        gateway
            .ask("p", "m", OracleCallCategory::General, None)
            .await;
    }
    assert!(started.elapsed() < Duration::from_secs(60));

    gateway
        .ask("p", "m", OracleCallCategory::General, None)
        .await;
    assert!(started.elapsed() >= Duration::from_secs(60));
}
