//! Bounded retry with exponential backoff around a single remote call.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{HarvestError, Result};
use crate::registry::ApiRequest;
use crate::transport::{CallError, Transport};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each later attempt.
    pub base_delay: Duration,
    /// Upper bound on each individual attempt.
    pub attempt_timeout: Duration,
    /// Treat HTTP 429 as transient.
    pub retry_rate_limited: bool,
    /// Cap applied to a server-supplied `Retry-After`.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(30),
            retry_rate_limited: true,
            max_retry_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            attempt_timeout,
            retry_rate_limited: config.retry_rate_limited,
            max_retry_after: Duration::from_secs(config.max_retry_after_secs),
        }
    }

    /// Delay before attempt `n` (1-based). Zero for the first attempt,
    /// `base * 2^(n-2)` afterwards.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = (attempt - 2).min(16);
        self.base_delay.saturating_mul(1u32 << exp)
    }

    fn delay_after(&self, failure: &CallError, next_attempt: u32) -> Duration {
        match failure.retry_after() {
            Some(server) if failure.is_rate_limited() => server.min(self.max_retry_after),
            _ => self.delay_before(next_attempt),
        }
    }
}

/// Successful call plus how much it cost.
#[derive(Debug, Clone)]
pub struct Response {
    pub body: serde_json::Value,
    pub attempts: u32,
    pub waited: Duration,
}

#[derive(Clone)]
pub struct RetryExecutor {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run an idempotent read, retrying transient failures.
    pub async fn execute(&self, request: &ApiRequest) -> Result<Response> {
        let mut waited = Duration::ZERO;
        let mut attempt = 1u32;

        loop {
            let outcome = match timeout(self.policy.attempt_timeout, self.transport.send(request)).await {
                Ok(result) => result,
                Err(_) => Err(CallError::Timeout),
            };

            let failure = match outcome {
                Ok(body) => {
                    return Ok(Response {
                        body,
                        attempts: attempt,
                        waited,
                    })
                }
                Err(failure) => failure,
            };

            if !failure.is_transient(self.policy.retry_rate_limited) {
                debug!(endpoint = %request.endpoint, attempt, error = %failure, "non-transient failure");
                return Err(permanent_error(&request.endpoint, failure));
            }

            if attempt >= self.policy.max_attempts {
                warn!(endpoint = %request.endpoint, attempts = attempt, error = %failure, "retries exhausted");
                return Err(HarvestError::Transient {
                    endpoint: request.endpoint.clone(),
                    attempts: attempt,
                    cause: failure,
                });
            }

            let delay = self.policy.delay_after(&failure, attempt + 1);
            warn!(
                endpoint = %request.endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "transient failure, retrying"
            );
            sleep(delay).await;
            waited += delay;
            attempt += 1;
        }
    }
}

fn permanent_error(endpoint: &str, failure: CallError) -> HarvestError {
    let endpoint = endpoint.to_string();
    match failure {
        CallError::Status { status, body, .. } if status == 401 || status == 403 => {
            HarvestError::PermissionDenied {
                endpoint,
                status,
                body,
            }
        }
        CallError::Status { status, body, .. } => HarvestError::Rejected {
            endpoint,
            status,
            body,
        },
        CallError::Decode(reason) => HarvestError::Decode { endpoint, reason },
        other => HarvestError::Rejected {
            endpoint,
            status: 0,
            body: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{params, EndpointRegistry, CHATS_TEAMS, USER_CHANNELS};
    use crate::testing::ScriptedTransport;
    use serde_json::json;
    use tokio::time::Instant;

    fn request() -> ApiRequest {
        EndpointRegistry::builtin()
            .get(CHATS_TEAMS)
            .unwrap()
            .render(&Default::default())
            .unwrap()
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..=5).map(|n| policy.delay_before(n).as_secs()).collect();
        assert_eq!(delays, vec![0, 1, 2, 4, 8]);
        assert_eq!(policy.delay_before(6).as_secs(), 16);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_then_success() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_err(CallError::Timeout);
        transport.push_err(CallError::Connect("reset by peer".into()));
        transport.push_err(CallError::status(502));
        transport.push_ok(json!([]));

        let executor = RetryExecutor::new(transport.clone(), RetryPolicy::default());
        let started = Instant::now();
        let response = executor.execute(&request()).await.unwrap();

        assert_eq!(response.attempts, 4);
        assert_eq!(transport.calls(), 4);
        assert_eq!(response.waited, Duration::from_secs(1 + 2 + 4));
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempts_and_cause() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..5 {
            transport.push_err(CallError::status(503));
        }
        transport.push_ok(json!([]));

        let executor = RetryExecutor::new(transport.clone(), RetryPolicy::default());
        let started = Instant::now();
        let err = executor.execute(&request()).await.unwrap_err();

        match err {
            HarvestError::Transient { attempts, cause, .. } => {
                assert_eq!(attempts, 5);
                assert_eq!(cause, CallError::status(503));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.calls(), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(1 + 2 + 4 + 8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_errors_fail_immediately() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_err(CallError::status(403));

        let executor = RetryExecutor::new(transport.clone(), RetryPolicy::default());
        let req = EndpointRegistry::builtin()
            .get(USER_CHANNELS)
            .unwrap()
            .render(&params([("userId", "u1")]))
            .unwrap();
        let err = executor.execute(&req).await.unwrap_err();

        assert!(matches!(err, HarvestError::PermissionDenied { status: 403, .. }));
        assert_eq!(transport.calls(), 1);

        transport.push_err(CallError::status(404));
        let err = executor.execute(&req).await.unwrap_err();
        assert!(matches!(err, HarvestError::Rejected { status: 404, .. }));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_honours_retry_after() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_err(CallError::Status {
            status: 429,
            retry_after: Some(10),
            body: String::new(),
        });
        transport.push_ok(json!({"ok": true}));

        let executor = RetryExecutor::new(transport.clone(), RetryPolicy::default());
        let started = Instant::now();
        let response = executor.execute(&request()).await.unwrap();

        assert_eq!(response.attempts, 2);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_without_header_uses_backoff_and_budget() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..5 {
            transport.push_err(CallError::status(429));
        }

        let executor = RetryExecutor::new(transport.clone(), RetryPolicy::default());
        let err = executor.execute(&request()).await.unwrap_err();

        assert!(matches!(err, HarvestError::Transient { attempts: 5, .. }));
        assert_eq!(transport.calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_not_retried_when_disabled() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_err(CallError::status(429));

        let policy = RetryPolicy {
            retry_rate_limited: false,
            ..RetryPolicy::default()
        };
        let executor = RetryExecutor::new(transport.clone(), policy);
        let err = executor.execute(&request()).await.unwrap_err();

        assert!(matches!(err, HarvestError::Rejected { status: 429, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_delayed(Duration::from_secs(45), Ok(json!([])));
        transport.push_ok(json!([1]));

        let executor = RetryExecutor::new(transport.clone(), RetryPolicy::default());
        let response = executor.execute(&request()).await.unwrap();

        assert_eq!(response.attempts, 2);
        assert_eq!(response.body, json!([1]));
    }
}
