//! Remote ML model call with timeout, bounded retry, and circuit breaking.
//!
//! Layered as `Circuit(Retry(Http))`: the circuit breaker's single
//! `HalfOpen` trial call still goes through the retry policy, grounded on
//! `providers/fallback.rs`'s layered-provider composition.

mod circuit_breaker;
mod http_client;
mod retry;

pub use circuit_breaker::CircuitBreakerClient;
pub use http_client::HttpInferenceClient;
pub use retry::RetryingClient;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::PromptsmithResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Simple,
    Moderate,
    Complex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechniqueSuggestion {
    pub name: String,
    pub score: Option<f64>,
}

/// Decoded response from the ML service for a single text, enriched with
/// client-observed timing/retry counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResult {
    pub intent: String,
    pub confidence: f64,
    pub complexity_level: ComplexityLevel,
    pub complexity_score: f64,
    pub techniques: Vec<TechniqueSuggestion>,
    pub all_intents: Option<Vec<(String, f64)>>,
    pub model_version: String,
    pub inference_time_ms: u64,
    pub retry_attempts: u32,
}

/// Contract consumed by the intent classifier (C3) for its ML tier.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn classify(&self, text: &str) -> PromptsmithResult<InferenceResult>;
    async fn batch_classify(&self, texts: &[String]) -> PromptsmithResult<Vec<InferenceResult>>;
    async fn health(&self) -> PromptsmithResult<()>;
}

/// Classifies a raw error into the transport/timeout class that the retry
/// policy and circuit breaker both act on, versus the non-transient class
/// (server rejection, validation) that must fail fast.
pub(crate) fn is_transient(err: &crate::errors::PromptsmithError) -> bool {
    use crate::errors::PromptsmithError::*;
    matches!(err, Connect(_) | Timeout)
}

pub(crate) fn capped_backoff(attempt: u32, initial_ms: u64, multiplier: f64, cap_ms: u64) -> Duration {
    let delay = (initial_ms as f64 * multiplier.powi(attempt as i32)).min(cap_ms as f64);
    Duration::from_millis(delay as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_then_caps() {
        assert_eq!(capped_backoff(0, 1000, 2.0, 10_000), Duration::from_millis(1000));
        assert_eq!(capped_backoff(1, 1000, 2.0, 10_000), Duration::from_millis(2000));
        assert_eq!(capped_backoff(2, 1000, 2.0, 10_000), Duration::from_millis(4000));
        assert_eq!(capped_backoff(10, 1000, 2.0, 10_000), Duration::from_millis(10_000));
    }

    #[test]
    fn transient_classification() {
        use crate::errors::PromptsmithError;
        assert!(is_transient(&PromptsmithError::Connect("refused".into())));
        assert!(is_transient(&PromptsmithError::Timeout));
        assert!(!is_transient(&PromptsmithError::Inference("bad body".into())));
        assert!(!is_transient(&PromptsmithError::Validation("empty".into())));
    }
}
