//! Enhancement orchestrator (C5): wires the classifier, technique engine,
//! cache, and history store into the single `enhance`/`enhance_batch`
//! contract from spec §4.5.
//!
//! Async history enqueue + background drain task grounded on
//! `src/agent/tools/registry.rs::execute_with_guards`'s task-spawn/JoinHandle
//! idiom; cooperative cancellation threaded via `tokio_util::sync::
//! CancellationToken` at each suspension point (cache op, inference call,
//! DB op, history enqueue) per spec §5.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::cache::{CacheClient, CacheFacade};
use crate::classifier::IntentClassifier;
use crate::config::OrchestratorConfig;
use crate::errors::{PromptsmithError, PromptsmithResult};
use crate::persistence::{HistoryRecord, HistoryStore};
use crate::techniques::{QualityMetrics, TechniqueEngine, TechniqueRegistry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhanceRequest {
    pub text: String,
    pub intent: Option<String>,
    pub complexity: Option<String>,
    #[serde(default)]
    pub techniques: Vec<String>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    pub target_model: Option<String>,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResponseMetadata {
    pub intent: Option<String>,
    pub complexity: Option<String>,
    pub cached: bool,
    pub model_version: Option<String>,
    pub metrics: Option<QualityMetrics>,
    pub context: Option<HashMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhanceResponse {
    pub enhanced_text: String,
    pub techniques_applied: Vec<String>,
    pub generation_time_ms: u64,
    pub token_estimate: usize,
    pub confidence: f64,
    pub warnings: Vec<String>,
    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub prompts: Vec<EnhanceRequest>,
    pub batch_id: Option<String>,
    pub priority: Option<i32>,
}

pub struct Orchestrator {
    cache: Arc<dyn CacheClient>,
    classifier: Arc<IntentClassifier>,
    registry: Arc<TechniqueRegistry>,
    history: Arc<dyn HistoryStore>,
    config: OrchestratorConfig,
    default_max_tokens: usize,
    max_tokens_ceiling: usize,
    history_tx: Mutex<Option<mpsc::Sender<HistoryRecord>>>,
    drain_task: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<dyn CacheClient>,
        classifier: Arc<IntentClassifier>,
        registry: Arc<TechniqueRegistry>,
        history: Arc<dyn HistoryStore>,
        config: OrchestratorConfig,
        default_max_tokens: usize,
        max_tokens_ceiling: usize,
    ) -> Self {
        Orchestrator {
            cache,
            classifier,
            registry,
            history,
            config,
            default_max_tokens,
            max_tokens_ceiling,
            history_tx: Mutex::new(None),
            drain_task: Mutex::new(None),
        }
    }

    /// Spawns the background history-drain task. Idempotent: calling twice
    /// is a no-op once the channel is already installed.
    pub fn init(self: &Arc<Self>) {
        if self.history_tx.lock().is_some() {
            return;
        }
        let (tx, mut rx) = mpsc::channel::<HistoryRecord>(self.config.history_queue_capacity);
        let history = self.history.clone();
        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                if let Err(e) = history.save_history(record).await {
                    warn!("history enqueue write failed, dropping record: {e}");
                }
            }
        });
        *self.history_tx.lock() = Some(tx);
        *self.drain_task.lock() = Some(handle);
    }

    /// Closes the history sender and awaits the drain task. Idempotent.
    pub async fn shutdown(&self) {
        let tx = self.history_tx.lock().take();
        drop(tx);
        let handle = self.drain_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("history drain task failed to join cleanly: {e}");
            }
        }
    }

    fn fingerprint(text: &str, techniques: &[String], target_model: Option<&str>) -> String {
        let normalized = text.trim().to_lowercase();
        let mut sorted = techniques.to_vec();
        sorted.sort();
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update(sorted.join(",").as_bytes());
        hasher.update(target_model.unwrap_or("").as_bytes());
        hex::encode(hasher.finalize())
    }

    fn validate(&self, request: &EnhanceRequest) -> PromptsmithResult<usize> {
        if request.text.trim().is_empty() || request.text.chars().count() > 5000 {
            return Err(PromptsmithError::Validation(
                "text must be 1..5000 characters".into(),
            ));
        }
        if let Some(temp) = request.temperature {
            if !(0.0..=2.0).contains(&temp) {
                return Err(PromptsmithError::Validation(
                    "temperature must be within 0.0..=2.0".into(),
                ));
            }
        }
        let max_tokens = request.max_tokens.unwrap_or(self.default_max_tokens);
        if max_tokens == 0 || max_tokens > self.max_tokens_ceiling {
            return Err(PromptsmithError::Validation(format!(
                "max_tokens must be within 1..={}",
                self.max_tokens_ceiling
            )));
        }
        Ok(max_tokens)
    }

    /// Runs the 7-step contract from spec §4.5.
    pub async fn enhance(
        &self,
        request: EnhanceRequest,
        cancel: &CancellationToken,
    ) -> PromptsmithResult<EnhanceResponse> {
        let started = Instant::now();
        let max_tokens = self.validate(&request)?;

        let fingerprint = Self::fingerprint(&request.text, &request.techniques, request.target_model.as_deref());
        let facade = CacheFacade::new(self.cache.as_ref());
        if let Some(mut cached) = facade.get_json::<EnhanceResponse>("enhancement", &fingerprint).await? {
            cached.metadata.cached = true;
            return Ok(cached);
        }

        if cancel.is_cancelled() {
            return Err(PromptsmithError::Canceled);
        }

        let intent_result = match self.classifier.classify(&request.text).await {
            Ok(r) => Some(r),
            Err(e) if request.techniques.is_empty() => {
                return Err(PromptsmithError::ServiceUnavailable(format!(
                    "classifier unavailable and no techniques supplied: {e}"
                )));
            }
            Err(e) => {
                warn!("classifier failed but caller supplied explicit techniques, continuing: {e}");
                None
            }
        };

        if cancel.is_cancelled() {
            return Err(PromptsmithError::Canceled);
        }

        let mut final_techniques = request.techniques.clone();
        if let Some(ref intent) = intent_result {
            for suggested in &intent.suggested_techniques {
                if !final_techniques.contains(suggested) {
                    final_techniques.push(suggested.clone());
                }
            }
        }

        let engine = TechniqueEngine::new(&self.registry);
        let outcome = engine.apply_techniques(&request.text, &final_techniques, &request.context, max_tokens)?;

        if cancel.is_cancelled() {
            return Err(PromptsmithError::Canceled);
        }

        let generation_time_ms = started.elapsed().as_millis() as u64;
        let confidence = intent_result.as_ref().map(|i| i.confidence).unwrap_or(1.0);

        let response = EnhanceResponse {
            enhanced_text: outcome.enhanced_text,
            techniques_applied: outcome.techniques_applied,
            generation_time_ms,
            token_estimate: outcome.token_estimate,
            confidence,
            warnings: outcome.warnings,
            metadata: ResponseMetadata {
                intent: intent_result.as_ref().map(|i| i.intent.clone()),
                complexity: intent_result.as_ref().map(|i| format!("{:?}", i.complexity).to_lowercase()),
                cached: false,
                model_version: intent_result.as_ref().and_then(|i| i.model_version.clone()),
                metrics: Some(outcome.metrics),
                context: if request.context.is_empty() { None } else { Some(request.context.clone()) },
            },
        };

        self.enqueue_history(&request, &response, intent_result.as_ref().map(|i| i.intent.clone()));

        facade
            .set_json(
                "enhancement",
                &fingerprint,
                &response,
                Duration::from_secs(self.config.enhancement_cache_ttl_secs),
            )
            .await;

        Ok(response)
    }

    fn enqueue_history(&self, request: &EnhanceRequest, response: &EnhanceResponse, intent: Option<String>) {
        let Some(tx) = self.history_tx.lock().clone() else {
            return;
        };
        let record = HistoryRecord {
            request_id: uuid::Uuid::new_v4().to_string(),
            original_text: request.text.clone(),
            enhanced_text: response.enhanced_text.clone(),
            intent,
            techniques_applied: response.techniques_applied.clone(),
            generation_time_ms: response.generation_time_ms,
            confidence: response.confidence,
            cached: false,
        };
        if let Err(e) = tx.try_send(record) {
            warn!("history queue full or closed, dropping record: {e}");
        }
    }

    /// Each request is processed independently; failures do not abort
    /// peers. Batch size is bounded, refusing excess items before dispatch.
    pub async fn enhance_batch(
        &self,
        batch: BatchRequest,
        cancel: &CancellationToken,
    ) -> PromptsmithResult<Vec<PromptsmithResult<EnhanceResponse>>> {
        if batch.prompts.is_empty() || batch.prompts.len() > self.config.max_batch_size {
            return Err(PromptsmithError::Validation(format!(
                "batch size must be within 1..={}",
                self.config.max_batch_size
            )));
        }

        let mut results = Vec::with_capacity(batch.prompts.len());
        for request in batch.prompts {
            if cancel.is_cancelled() {
                results.push(Err(PromptsmithError::Canceled));
                continue;
            }
            results.push(self.enhance(request, cancel).await);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InProcessCacheClient;
    use crate::config::{CacheConfig, ClassifierConfig};
    use crate::persistence::{FeedbackUpdate, IntentPattern, UserActivity};
    use crate::techniques::all_techniques;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullHistoryStore {
        saved: AtomicUsize,
    }

    #[async_trait]
    impl HistoryStore for NullHistoryStore {
        async fn save_history(&self, _record: HistoryRecord) -> PromptsmithResult<()> {
            self.saved.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn update_feedback(&self, _update: FeedbackUpdate) -> PromptsmithResult<()> {
            Ok(())
        }
        async fn save_intent_pattern(&self, _pattern: IntentPattern) -> PromptsmithResult<()> {
            Ok(())
        }
        async fn record_user_activity(&self, _activity: UserActivity) -> PromptsmithResult<()> {
            Ok(())
        }
    }

    fn orchestrator() -> Arc<Orchestrator> {
        let cache: Arc<dyn CacheClient> = Arc::new(InProcessCacheClient::new(&CacheConfig::default()));
        let classifier = Arc::new(IntentClassifier::new(ClassifierConfig::default(), cache.clone(), None));
        let registry = Arc::new(TechniqueRegistry::new());
        for t in all_techniques() {
            registry.register(t).unwrap();
        }
        let history: Arc<dyn HistoryStore> = Arc::new(NullHistoryStore { saved: AtomicUsize::new(0) });
        Arc::new(Orchestrator::new(
            cache,
            classifier,
            registry,
            history,
            OrchestratorConfig::default(),
            2048,
            8192,
        ))
    }

    fn request(text: &str) -> EnhanceRequest {
        EnhanceRequest {
            text: text.to_string(),
            intent: None,
            complexity: None,
            techniques: Vec::new(),
            context: HashMap::new(),
            parameters: HashMap::new(),
            target_model: None,
            max_tokens: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn enhance_rejects_empty_text() {
        let orchestrator = orchestrator();
        let cancel = CancellationToken::new();
        let err = orchestrator.enhance(request(""), &cancel).await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[tokio::test]
    async fn repeat_enhance_hits_cache_on_second_call() {
        let orchestrator = orchestrator();
        orchestrator.init();
        let cancel = CancellationToken::new();
        let first = orchestrator.enhance(request("Write a Python function to sort a list"), &cancel).await.unwrap();
        let second = orchestrator.enhance(request("Write a Python function to sort a list"), &cancel).await.unwrap();
        assert_eq!(first.enhanced_text, second.enhanced_text);
        assert!(second.metadata.cached);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn batch_over_cap_is_rejected_before_dispatch() {
        let orchestrator = orchestrator();
        let cancel = CancellationToken::new();
        let prompts = (0..101).map(|i| request(&format!("prompt {i}"))).collect();
        let err = orchestrator
            .enhance_batch(BatchRequest { prompts, batch_id: None, priority: None }, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[tokio::test]
    async fn batch_failures_do_not_abort_peers() {
        let orchestrator = orchestrator();
        let cancel = CancellationToken::new();
        let prompts = vec![request(""), request("a valid request about writing code")];
        let results = orchestrator
            .enhance_batch(BatchRequest { prompts, batch_id: None, priority: None }, &cancel)
            .await
            .unwrap();
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }
}
