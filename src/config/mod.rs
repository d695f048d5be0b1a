//! Process configuration: typed sections loaded from TOML, each with its own
//! validation. Grounded on the teacher's `config/schema/mod.rs` per-section
//! `validate_*` style — explicit range checks with descriptive messages,
//! `warn!()` for soft/advisory issues.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::PromptsmithError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub inference: InferenceConfig,
    pub cache: CacheConfig,
    pub classifier: ClassifierConfig,
    pub engine: EngineConfig,
    pub orchestrator: OrchestratorConfig,
    pub persistence: PersistenceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            inference: InferenceConfig::default(),
            cache: CacheConfig::default(),
            classifier: ClassifierConfig::default(),
            engine: EngineConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file, falling back to
    /// defaults for any field the file omits.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PromptsmithError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PromptsmithError::Validation(format!("cannot read config: {e}")))?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| PromptsmithError::Validation(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PromptsmithError> {
        self.inference.validate()?;
        self.cache.validate()?;
        self.classifier.validate()?;
        self.engine.validate()?;
        self.orchestrator.validate()?;
        self.persistence.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub circuit_failure_threshold: u32,
    pub circuit_recovery_timeout_secs: u64,
    pub circuit_half_open_trials: u32,
    pub health_cache_ttl_secs: u64,
    pub max_batch_size: usize,
    pub max_text_len: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        InferenceConfig {
            base_url: "http://localhost:8080".into(),
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
            circuit_failure_threshold: 3,
            circuit_recovery_timeout_secs: 30,
            circuit_half_open_trials: 1,
            health_cache_ttl_secs: 30,
            max_batch_size: 32,
            max_text_len: 5000,
        }
    }
}

impl InferenceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_recovery_timeout_secs)
    }

    fn validate(&self) -> Result<(), PromptsmithError> {
        if self.max_retries == 0 {
            warn!("inference.max_retries is 0; calls will not be retried");
        }
        if self.backoff_multiplier < 1.0 {
            return Err(PromptsmithError::Validation(
                "inference.backoff_multiplier must be >= 1.0".into(),
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(PromptsmithError::Validation(
                "inference.initial_backoff_ms must be <= max_backoff_ms".into(),
            ));
        }
        if self.circuit_failure_threshold == 0 {
            return Err(PromptsmithError::Validation(
                "inference.circuit_failure_threshold must be >= 1".into(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(PromptsmithError::Validation(
                "inference.max_batch_size must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub key_prefix: String,
    pub max_entries: u64,
    pub default_ttl_secs: u64,
    pub scan_batch_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            key_prefix: "promptsmith".into(),
            max_entries: 100_000,
            default_ttl_secs: 300,
            scan_batch_size: 100,
        }
    }
}

impl CacheConfig {
    fn validate(&self) -> Result<(), PromptsmithError> {
        if self.key_prefix.trim().is_empty() {
            return Err(PromptsmithError::Validation(
                "cache.key_prefix must not be empty".into(),
            ));
        }
        if self.scan_batch_size == 0 {
            return Err(PromptsmithError::Validation(
                "cache.scan_batch_size must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    PerformanceMode,
    QualityMode,
    Adaptive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub mode: RoutingMode,
    pub low_confidence_threshold: f64,
    pub high_confidence_threshold: f64,
    pub min_confidence: f64,
    pub cache_ttl_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            mode: RoutingMode::Adaptive,
            low_confidence_threshold: 0.4,
            high_confidence_threshold: 0.8,
            min_confidence: 0.3,
            cache_ttl_secs: 600,
        }
    }
}

impl ClassifierConfig {
    fn validate(&self) -> Result<(), PromptsmithError> {
        for (name, v) in [
            ("low_confidence_threshold", self.low_confidence_threshold),
            ("high_confidence_threshold", self.high_confidence_threshold),
            ("min_confidence", self.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(PromptsmithError::Validation(format!(
                    "classifier.{name} must be within [0, 1]"
                )));
            }
        }
        if self.low_confidence_threshold > self.high_confidence_threshold {
            return Err(PromptsmithError::Validation(
                "classifier.low_confidence_threshold must be <= high_confidence_threshold".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub default_max_tokens: usize,
    pub max_tokens_ceiling: usize,
    pub clarity_weight: f64,
    pub specificity_weight: f64,
    pub coherence_weight: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            default_max_tokens: 2048,
            max_tokens_ceiling: 8192,
            clarity_weight: 1.0,
            specificity_weight: 1.0,
            coherence_weight: 1.0,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), PromptsmithError> {
        if self.default_max_tokens == 0 || self.default_max_tokens > self.max_tokens_ceiling {
            return Err(PromptsmithError::Validation(
                "engine.default_max_tokens must be >0 and <= max_tokens_ceiling".into(),
            ));
        }
        if self.max_tokens_ceiling > 8192 {
            warn!("engine.max_tokens_ceiling exceeds the documented 8192 ceiling");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub enhancement_cache_ttl_secs: u64,
    pub max_batch_size: usize,
    pub history_queue_capacity: usize,
    pub request_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            enhancement_cache_ttl_secs: 3600,
            max_batch_size: 100,
            history_queue_capacity: 1024,
            request_timeout_secs: 30,
        }
    }
}

impl OrchestratorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<(), PromptsmithError> {
        if self.max_batch_size == 0 || self.max_batch_size > 100 {
            return Err(PromptsmithError::Validation(
                "orchestrator.max_batch_size must be within 1..=100".into(),
            ));
        }
        if self.history_queue_capacity == 0 {
            return Err(PromptsmithError::Validation(
                "orchestrator.history_queue_capacity must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub database_path: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub max_inactive_secs: u64,
    pub acquire_timeout_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig {
            database_path: "promptsmith.db".into(),
            min_connections: 1,
            max_connections: 8,
            max_inactive_secs: 300,
            acquire_timeout_secs: 5,
        }
    }
}

impl PersistenceConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    fn validate(&self) -> Result<(), PromptsmithError> {
        if self.min_connections == 0 {
            return Err(PromptsmithError::Validation(
                "persistence.min_connections must be >= 1".into(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(PromptsmithError::Validation(
                "persistence.min_connections must be <= max_connections".into(),
            ));
        }
        Ok(())
    }
}
