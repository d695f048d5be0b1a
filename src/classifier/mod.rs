//! Hybrid rule-engine + ML intent classifier with adaptive routing.
//!
//! Rule-matching style grounded on `agent/loop/intent.rs`'s
//! `LazyLock<Regex>` per-category pattern statics; routing-fallback shape
//! grounded on `providers/fallback.rs`'s try-primary-then-fallback pattern,
//! generalized here from provider fallback to rules/ML routing.

mod rules;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::cache::{CacheClient, CacheFacade};
use crate::config::{ClassifierConfig, RoutingMode};
use crate::errors::PromptsmithResult;
use crate::inference::InferenceClient;

pub use rules::{Audience, Complexity, RuleMatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Rules,
    Ml,
    Cache,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f64,
    pub complexity: Complexity,
    pub complexity_score: Option<f64>,
    pub audience: Audience,
    pub suggested_techniques: Vec<String>,
    pub source: IntentSource,
    pub model_version: Option<String>,
    pub matched_patterns: Vec<String>,
    pub warnings: Vec<String>,
}

pub struct IntentClassifier {
    config: ClassifierConfig,
    cache: Arc<dyn CacheClient>,
    inference: Option<Arc<dyn InferenceClient>>,
}

impl IntentClassifier {
    pub fn new(
        config: ClassifierConfig,
        cache: Arc<dyn CacheClient>,
        inference: Option<Arc<dyn InferenceClient>>,
    ) -> Self {
        IntentClassifier { config, cache, inference }
    }

    fn fingerprint(text: &str, mode: RoutingMode) -> String {
        let normalized = text.trim().to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hasher.update(format!("{mode:?}").as_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn classify(&self, text: &str) -> PromptsmithResult<IntentResult> {
        let key = Self::fingerprint(text, self.config.mode);
        let facade = CacheFacade::new(self.cache.as_ref());
        if let Some(mut cached) = facade.get_json::<IntentResult>("intent", &key).await? {
            cached.source = IntentSource::Cache;
            return Ok(cached);
        }

        let mut result = self.classify_uncached(text).await?;
        if result.confidence < self.config.min_confidence {
            result.warnings.push("low_confidence".into());
        }
        facade
            .set_json(
                "intent",
                &key,
                &result,
                Duration::from_secs(self.config.cache_ttl_secs),
            )
            .await;
        Ok(result)
    }

    async fn classify_uncached(&self, text: &str) -> PromptsmithResult<IntentResult> {
        let rule_match = rules::classify(text);
        let rules_result = self.rule_match_to_result(&rule_match);

        match self.config.mode {
            RoutingMode::PerformanceMode => {
                if rule_match.score < self.config.low_confidence_threshold {
                    if let Some(ml) = self.try_ml(text).await {
                        return Ok(ml);
                    }
                }
                Ok(rules_result)
            }
            RoutingMode::QualityMode => {
                if let Some(ml) = self.try_ml(text).await {
                    Ok(ml)
                } else {
                    let mut r = rules_result;
                    r.warnings.push("ml_fallback".into());
                    Ok(r)
                }
            }
            RoutingMode::Adaptive => {
                if rule_match.score >= self.config.high_confidence_threshold {
                    return Ok(rules_result);
                }
                if let Some(ml) = self.try_ml(text).await {
                    Ok(ml)
                } else {
                    let mut r = rules_result;
                    r.warnings.push("ml_fallback".into());
                    Ok(r)
                }
            }
        }
    }

    async fn try_ml(&self, text: &str) -> Option<IntentResult> {
        let client = self.inference.as_ref()?;
        match client.classify(text).await {
            Ok(inference) => Some(self.inference_to_result(inference)),
            Err(e) => {
                warn!("ML classification failed, falling back to rules: {e}");
                None
            }
        }
    }

    fn rule_match_to_result(&self, m: &RuleMatch) -> IntentResult {
        let suggested_techniques = default_techniques_for(&m.intent);
        IntentResult {
            intent: m.intent.clone(),
            confidence: m.score,
            complexity: m.complexity,
            complexity_score: None,
            audience: m.audience,
            suggested_techniques,
            source: IntentSource::Rules,
            model_version: None,
            matched_patterns: m.matched_patterns.clone(),
            warnings: Vec::new(),
        }
    }

    fn inference_to_result(&self, r: crate::inference::InferenceResult) -> IntentResult {
        use crate::inference::ComplexityLevel;
        let complexity = match r.complexity_level {
            ComplexityLevel::Simple => Complexity::Simple,
            ComplexityLevel::Moderate => Complexity::Moderate,
            ComplexityLevel::Complex => Complexity::Complex,
        };
        let mut suggested: Vec<String> = r.techniques.iter().map(|t| t.name.clone()).collect();
        if suggested.is_empty() {
            suggested = default_techniques_for(&r.intent);
        }
        IntentResult {
            intent: r.intent,
            confidence: r.confidence,
            complexity,
            complexity_score: Some(r.complexity_score),
            audience: Audience::General,
            suggested_techniques: suggested,
            source: IntentSource::Ml,
            model_version: Some(r.model_version),
            matched_patterns: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Intent -> technique default map from the glossary, ranked by the
/// registry's declared priority at selection time (the orchestrator does
/// the final priority/intent-weight ranking; this only supplies the set).
pub fn default_techniques_for(intent: &str) -> Vec<String> {
    let ids: &[&str] = match intent {
        "question_answering" => &["chain_of_thought", "few_shot"],
        "creative_writing" => &["few_shot", "role_play"],
        "code_generation" => &["structured_output", "step_by_step", "few_shot"],
        "data_analysis" => &["chain_of_thought", "structured_output"],
        "reasoning" => &["chain_of_thought", "tree_of_thoughts", "self_consistency"],
        "summarization" => &["structured_output"],
        "translation" => &["few_shot"],
        "conversation" => &["role_play"],
        "task_planning" => &["step_by_step", "structured_output"],
        "problem_solving" => &["chain_of_thought", "react", "self_consistency"],
        _ => &[],
    };
    ids.iter().map(|s| s.to_string()).collect()
}
