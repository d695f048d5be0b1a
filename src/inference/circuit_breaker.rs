use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::InferenceConfig;
use crate::errors::{PromptsmithError, PromptsmithResult};

use super::{InferenceClient, InferenceResult, is_transient};

/// Circuit breaker states, grounded on `providers/circuit_breaker.rs`'s
/// `CircuitState` enum. `Open` carries the instant it opened so elapsed
/// time, not a stored deadline, decides the lazy transition to `HalfOpen`.
#[derive(Debug, Clone, Copy)]
enum CircuitState {
    Closed,
    Open { since: Instant },
    HalfOpen,
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
}

/// Wraps an `InferenceClient` with the `Closed`/`Open`/`HalfOpen` state
/// machine from spec §4.1, directly grounded on
/// `providers/circuit_breaker.rs::CircuitBreakerProvider`.
pub struct CircuitBreakerClient<C> {
    inner: C,
    failure_threshold: u32,
    recovery_timeout: Duration,
    state: Mutex<BreakerState>,
}

impl<C: InferenceClient> CircuitBreakerClient<C> {
    pub fn new(inner: C, config: &InferenceConfig) -> Self {
        CircuitBreakerClient {
            inner,
            failure_threshold: config.circuit_failure_threshold,
            recovery_timeout: config.recovery_timeout(),
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
            }),
        }
    }

    /// Returns `Ok(())` if the call may proceed, transitioning `Open` ->
    /// `HalfOpen` lazily if the recovery timeout has elapsed.
    async fn admit(&self) -> PromptsmithResult<()> {
        let mut guard = self.state.lock().await;
        match guard.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open { since } => {
                if since.elapsed() >= self.recovery_timeout {
                    guard.state = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(PromptsmithError::CircuitOpen)
                }
            }
        }
    }

    async fn record_success(&self) {
        let mut guard = self.state.lock().await;
        guard.state = CircuitState::Closed;
        guard.consecutive_failures = 0;
    }

    async fn record_failure(&self, transient: bool) {
        if !transient {
            // Non-transient failures (validation, malformed response) are
            // the caller's or the server's contract problem, not evidence of
            // outage — they must not trip the breaker.
            return;
        }
        let mut guard = self.state.lock().await;
        match guard.state {
            CircuitState::HalfOpen => {
                guard.state = CircuitState::Open { since: Instant::now() };
                guard.consecutive_failures = self.failure_threshold;
            }
            _ => {
                guard.consecutive_failures += 1;
                if guard.consecutive_failures >= self.failure_threshold {
                    guard.state = CircuitState::Open { since: Instant::now() };
                    warn!("inference circuit breaker opened after {} consecutive failures", guard.consecutive_failures);
                }
            }
        }
    }

    async fn guarded<F, Fut, T>(&self, op: F) -> PromptsmithResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = PromptsmithResult<T>>,
    {
        self.admit().await?;
        match op().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(err) => {
                self.record_failure(is_transient(&err)).await;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl<C: InferenceClient> InferenceClient for CircuitBreakerClient<C> {
    async fn classify(&self, text: &str) -> PromptsmithResult<InferenceResult> {
        self.guarded(|| self.inner.classify(text)).await
    }

    async fn batch_classify(&self, texts: &[String]) -> PromptsmithResult<Vec<InferenceResult>> {
        self.guarded(|| self.inner.batch_classify(texts)).await
    }

    async fn health(&self) -> PromptsmithResult<()> {
        self.inner.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct AlwaysFails {
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl InferenceClient for AlwaysFails {
        async fn classify(&self, _text: &str) -> PromptsmithResult<InferenceResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PromptsmithError::Connect("down".into()))
        }
        async fn batch_classify(&self, _texts: &[String]) -> PromptsmithResult<Vec<InferenceResult>> {
            unimplemented!()
        }
        async fn health(&self) -> PromptsmithResult<()> {
            Ok(())
        }
    }

    fn config(threshold: u32, recovery_secs: u64) -> InferenceConfig {
        let mut c = InferenceConfig::default();
        c.circuit_failure_threshold = threshold;
        c.circuit_recovery_timeout_secs = recovery_secs;
        c
    }

    #[tokio::test]
    async fn opens_after_threshold_and_fails_fast_without_calling_transport() {
        let calls = Arc::new(AtomicU32::new(0));
        let breaker = CircuitBreakerClient::new(AlwaysFails { calls: calls.clone() }, &config(3, 30));

        for _ in 0..3 {
            assert!(breaker.classify("x").await.is_err());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let fourth = breaker.classify("x").await.unwrap_err();
        assert_eq!(fourth.kind(), "CircuitOpen");
        assert_eq!(calls.load(Ordering::SeqCst), 3, "fourth call must not reach transport");
    }

    #[tokio::test]
    async fn half_open_after_recovery_timeout_permits_one_trial() {
        let calls = Arc::new(AtomicU32::new(0));
        let breaker = CircuitBreakerClient::new(AlwaysFails { calls: calls.clone() }, &config(1, 0));

        assert!(breaker.classify("x").await.is_err()); // opens immediately (threshold=1)
        // recovery_timeout=0 => next call is admitted as the half-open trial
        assert!(breaker.classify("x").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn success_resets_failure_counter() {
        struct SometimesFails {
            fail_next: std::sync::atomic::AtomicBool,
        }
        #[async_trait]
        impl InferenceClient for SometimesFails {
            async fn classify(&self, _text: &str) -> PromptsmithResult<InferenceResult> {
                if self.fail_next.swap(false, Ordering::SeqCst) {
                    Err(PromptsmithError::Connect("down".into()))
                } else {
                    Ok(InferenceResult {
                        intent: "conversation".into(),
                        confidence: 0.5,
                        complexity_level: super::super::ComplexityLevel::Simple,
                        complexity_score: 0.1,
                        techniques: vec![],
                        all_intents: None,
                        model_version: "t".into(),
                        inference_time_ms: 1,
                        retry_attempts: 0,
                    })
                }
            }
            async fn batch_classify(&self, _texts: &[String]) -> PromptsmithResult<Vec<InferenceResult>> {
                unimplemented!()
            }
            async fn health(&self) -> PromptsmithResult<()> {
                Ok(())
            }
        }

        let breaker = CircuitBreakerClient::new(
            SometimesFails { fail_next: std::sync::atomic::AtomicBool::new(true) },
            &config(2, 30),
        );
        assert!(breaker.classify("x").await.is_err());
        assert!(breaker.classify("x").await.is_ok());
        // failures should have reset; two more successes won't open the breaker
        assert!(breaker.classify("x").await.is_ok());
        assert!(breaker.classify("x").await.is_ok());
    }
}
