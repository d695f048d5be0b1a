use async_trait::async_trait;
use tracing::warn;

use crate::config::InferenceConfig;
use crate::errors::PromptsmithResult;

use super::{InferenceClient, InferenceResult, capped_backoff, is_transient};

/// Wraps an `InferenceClient` with bounded exponential-backoff retry.
/// Grounded on `providers/base.rs::chat_with_retry`: only transient
/// (transport/timeout) failures are retried; the last error is surfaced
/// verbatim once attempts are exhausted.
pub struct RetryingClient<C> {
    inner: C,
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
}

impl<C: InferenceClient> RetryingClient<C> {
    pub fn new(inner: C, config: &InferenceConfig) -> Self {
        RetryingClient {
            inner,
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    async fn run_with_retry<F, Fut, T>(&self, mut op: F) -> PromptsmithResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = PromptsmithResult<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt < self.max_retries => {
                    let delay = capped_backoff(
                        attempt,
                        self.initial_backoff_ms,
                        self.backoff_multiplier,
                        self.max_backoff_ms,
                    );
                    warn!(attempt, ?delay, "inference call failed transiently, retrying: {err}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<C: InferenceClient> InferenceClient for RetryingClient<C> {
    async fn classify(&self, text: &str) -> PromptsmithResult<InferenceResult> {
        self.run_with_retry(|| self.inner.classify(text)).await
    }

    async fn batch_classify(&self, texts: &[String]) -> PromptsmithResult<Vec<InferenceResult>> {
        self.run_with_retry(|| self.inner.batch_classify(texts)).await
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

    struct FlakyClient {
        calls: Arc<AtomicU32>,
        fail_times: u32,
    }

    #[async_trait]
    impl InferenceClient for FlakyClient {
        async fn classify(&self, _text: &str) -> PromptsmithResult<InferenceResult> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(crate::errors::PromptsmithError::Connect("refused".into()))
            } else {
                Ok(InferenceResult {
                    intent: "question_answering".into(),
                    confidence: 0.9,
                    complexity_level: super::super::ComplexityLevel::Simple,
                    complexity_score: 0.1,
                    techniques: vec![],
                    all_intents: None,
                    model_version: "test".into(),
                    inference_time_ms: 1,
                    retry_attempts: n,
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

    fn fast_config() -> InferenceConfig {
        let mut c = InferenceConfig::default();
        c.initial_backoff_ms = 1;
        c.max_backoff_ms = 2;
        c
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            FlakyClient { calls: calls.clone(), fail_times: 2 },
            &fast_config(),
        );
        let result = client.classify("hi").await.unwrap();
        assert_eq!(result.intent, "question_answering");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let client = RetryingClient::new(
            FlakyClient { calls: calls.clone(), fail_times: 100 },
            &fast_config(),
        );
        let err = client.classify("hi").await.unwrap_err();
        assert_eq!(err.kind(), "ConnectError");
        assert_eq!(calls.load(Ordering::SeqCst), fast_config().max_retries + 1);
    }
}
