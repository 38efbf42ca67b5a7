use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{OracleApiError, OracleClient};
use crate::config::OracleConfig;
use crate::models::{OracleCallCategory, OracleCallOutcome, OracleCallRecord};
use crate::store::OracleAuditSink;

const QUOTA_WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct OracleGatewayConfig {
    pub max_concurrent: usize,
    pub min_spacing: Duration,
    pub calls_per_minute: u32,
    pub max_attempts: u32,
    pub rate_limit_fallback: Duration,
}

impl Default for OracleGatewayConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            min_spacing: Duration::from_millis(60),
            calls_per_minute: 900,
            max_attempts: 3,
            rate_limit_fallback: Duration::from_secs(30),
        }
    }
}

impl From<&OracleConfig> for OracleGatewayConfig {
    fn from(config: &OracleConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            min_spacing: Duration::from_millis(config.min_spacing_ms),
            calls_per_minute: config.calls_per_minute,
            max_attempts: config.max_attempts,
            rate_limit_fallback: Duration::from_secs(config.rate_limit_fallback_secs),
        }
    }
}

#[derive(Default)]
struct ThrottleWindow {
    last_start: Option<Instant>,
    starts: VecDeque<Instant>,
}

/// Sole path to the external prediction service.
///
/// Admission control (semaphore), call spacing and the sliding one-minute
/// quota are in-process state on this instance: safe within one process,
/// not across replicas. A multi-instance deployment needs a shared counter
/// in an external store; that redesign is out of scope here.
///
/// `ask` never errors on retry exhaustion; it returns a best-effort string
/// and leaves heuristics to the caller. Every attempt, including the final
/// fallback, lands in the audit sink.
pub struct OracleGateway {
    client: Arc<dyn OracleClient>,
    audit: Arc<dyn OracleAuditSink>,
    config: OracleGatewayConfig,
    permits: Semaphore,
    window: Mutex<ThrottleWindow>,
}

impl OracleGateway {
    pub fn new(
        client: Arc<dyn OracleClient>,
        audit: Arc<dyn OracleAuditSink>,
        config: OracleGatewayConfig,
    ) -> Self {
        let permits = Semaphore::new(config.max_concurrent.max(1));
        Self {
            client,
            audit,
            config,
            permits,
            window: Mutex::new(ThrottleWindow::default()),
        }
    }

    /// Ask the oracle for a completion. Retries rate limits using the
    /// provider's retry-after hint (bounded) and transient errors with
    /// exponential backoff; after exhaustion, returns a fallback string
    /// describing the failure.
    #[instrument(skip(self, prompt), fields(model = %model, category = %category))]
    pub async fn ask(
        &self,
        prompt: &str,
        model: &str,
        category: OracleCallCategory,
        related_id: Option<Uuid>,
    ) -> String {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!("oracle gateway semaphore closed");
                return self.fallback_text();
            }
        };

        let mut last_error = String::new();
        for attempt in 1..=self.config.max_attempts {
            self.throttle().await;

            match self.client.generate(prompt, model).await {
                Ok(text) => {
                    self.record(model, category, related_id, prompt, &text, OracleCallOutcome::Success)
                        .await;
                    return text;
                }
                Err(OracleApiError::RateLimited { retry_after }) => {
                    let delay = retry_after.unwrap_or(self.config.rate_limit_fallback);
                    last_error = format!("rate limited, retry after {:?}", delay);
                    self.record(
                        model,
                        category,
                        related_id,
                        prompt,
                        &last_error,
                        OracleCallOutcome::RateLimited,
                    )
                    .await;
                    if attempt < self.config.max_attempts {
                        debug!(attempt, ?delay, "oracle rate limited, backing off");
                        sleep(delay).await;
                    }
                }
                Err(OracleApiError::MissingCredentials) => {
                    last_error = OracleApiError::MissingCredentials.to_string();
                    self.record(
                        model,
                        category,
                        related_id,
                        prompt,
                        &last_error,
                        OracleCallOutcome::TransientError,
                    )
                    .await;
                    break;
                }
                Err(err) => {
                    last_error = err.to_string();
                    self.record(
                        model,
                        category,
                        related_id,
                        prompt,
                        &last_error,
                        OracleCallOutcome::TransientError,
                    )
                    .await;
                    if attempt < self.config.max_attempts {
                        let backoff = Duration::from_secs(1u64 << attempt.min(6));
                        debug!(attempt, ?backoff, "oracle transient error, backing off");
                        sleep(backoff).await;
                    }
                }
            }
        }

        let fallback = self.fallback_text();
        let detail = format!("{} (last error: {})", fallback, last_error);
        self.record(model, category, related_id, prompt, &detail, OracleCallOutcome::Fallback)
            .await;
        fallback
    }

    // Deliberately digit-free so callers that scrape a number out of the
    // reply cannot mistake this text for an estimate.
    fn fallback_text(&self) -> String {
        "prediction unavailable: retry budget exhausted".to_string()
    }

    /// Blocks until both the minimum inter-call spacing and the sliding
    /// one-minute quota admit another call start.
    async fn throttle(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();

                while let Some(&front) = window.starts.front() {
                    if now.duration_since(front) >= QUOTA_WINDOW {
                        window.starts.pop_front();
                    } else {
                        break;
                    }
                }

                let spacing_wait = window.last_start.and_then(|last| {
                    let since = now.duration_since(last);
                    (since < self.config.min_spacing).then(|| self.config.min_spacing - since)
                });

                let quota_wait = if window.starts.len() >= self.config.calls_per_minute as usize {
                    window
                        .starts
                        .front()
                        .map(|&front| QUOTA_WINDOW - now.duration_since(front))
                } else {
                    None
                };

                match (spacing_wait, quota_wait) {
                    (None, None) => {
                        window.last_start = Some(now);
                        window.starts.push_back(now);
                        None
                    }
                    (a, b) => Some(a.unwrap_or(Duration::ZERO).max(b.unwrap_or(Duration::ZERO))),
                }
            };

            match wait {
                None => return,
                Some(delay) => sleep(delay).await,
            }
        }
    }

    async fn record(
        &self,
        model: &str,
        category: OracleCallCategory,
        related_id: Option<Uuid>,
        request: &str,
        response: &str,
        outcome: OracleCallOutcome,
    ) {
        let record = OracleCallRecord::new(model, category, related_id, request, response, outcome);
        if let Err(err) = self.audit.append_oracle_record(record).await {
            warn!(error = %err, "failed to append oracle audit record");
        }
    }
}
