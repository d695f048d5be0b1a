#![allow(dead_code)]

use thiserror::Error;

/// Typed error hierarchy for the enhancement core.
///
/// Use at module boundaries (inference calls, cache ops, orchestrator steps).
/// Internal/leaf functions can continue using `anyhow::Result` — the `Internal`
/// variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum PromptsmithError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Transport error: {0}")]
    Connect(String),

    #[error("Request deadline exceeded")]
    Timeout,

    #[error("Pool exhausted")]
    PoolExhausted,

    #[error("Circuit breaker open")]
    CircuitOpen,

    #[error("Operation canceled")]
    Canceled,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `PromptsmithError`.
pub type PromptsmithResult<T> = std::result::Result<T, PromptsmithError>;

impl PromptsmithError {
    /// Short machine-readable kind, surfaced on the wire as `EnhanceError.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            PromptsmithError::Validation(_) => "ValidationError",
            PromptsmithError::ServiceUnavailable(_) => "ServiceUnavailable",
            PromptsmithError::Inference(_) => "InferenceError",
            PromptsmithError::Connect(_) => "ConnectError",
            PromptsmithError::Timeout => "TimeoutError",
            PromptsmithError::PoolExhausted => "PoolExhausted",
            PromptsmithError::CircuitOpen => "CircuitOpen",
            PromptsmithError::Canceled => "Canceled",
            PromptsmithError::Internal(_) => "Internal",
        }
    }

    /// Whether a caller may retry this failure (transport/timeout class only).
    pub fn retryable(&self) -> bool {
        matches!(self, PromptsmithError::Connect(_) | PromptsmithError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = PromptsmithError::Validation("empty text".into());
        assert_eq!(err.to_string(), "Validation error: empty text");
        assert_eq!(err.kind(), "ValidationError");
        assert!(!err.retryable());
    }

    #[test]
    fn connect_error_retryable() {
        let err = PromptsmithError::Connect("refused".into());
        assert!(err.retryable());
        assert_eq!(err.kind(), "ConnectError");
    }

    #[test]
    fn timeout_retryable() {
        assert!(PromptsmithError::Timeout.retryable());
    }

    #[test]
    fn circuit_open_not_retryable() {
        assert!(!PromptsmithError::CircuitOpen.retryable());
        assert_eq!(PromptsmithError::CircuitOpen.kind(), "CircuitOpen");
    }

    #[test]
    fn internal_from_anyhow() {
        let anyhow_err = anyhow::anyhow!("something broke");
        let err: PromptsmithError = anyhow_err.into();
        assert!(matches!(err, PromptsmithError::Internal(_)));
        assert!(!err.retryable());
    }
}
