use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::registry::TechniqueRegistry;

/// Closed-form quality metrics computed over the original/enhanced text and
/// the applied-id list, per spec §4.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub clarity: f64,
    pub specificity: f64,
    pub coherence: f64,
    pub per_technique: HashMap<String, f64>,
    pub overall_quality: f64,
    pub improvement_pct: f64,
}

const CLARITY_MARKERS: &[&str] = &["step", "1.", "2.", "3.", "-", "•"];
const SPECIFICITY_MARKERS: &[&str] = &["must", "should", "specifically", "exactly", "required"];
const COHERENCE_MARKERS: &[&str] = &["first", "then", "finally", "next", "consequently"];
const DEFAULT_TECHNIQUE_SCORE: f64 = 0.75;

impl QualityMetrics {
    pub fn compute(
        original: &str,
        enhanced: &str,
        applied: &[String],
        registry: &TechniqueRegistry,
    ) -> Self {
        let lower = enhanced.to_lowercase();
        let clarity = marker_score(&lower, CLARITY_MARKERS);
        let specificity = marker_score(&lower, SPECIFICITY_MARKERS);
        let coherence = marker_score(&lower, COHERENCE_MARKERS);

        let mut per_technique = HashMap::new();
        for id in applied {
            let score = registry
                .get(id)
                .map(|t| {
                    let m = t.metrics(enhanced);
                    m.get("characteristic_score").copied().unwrap_or(DEFAULT_TECHNIQUE_SCORE)
                })
                .unwrap_or(DEFAULT_TECHNIQUE_SCORE);
            per_technique.insert(id.clone(), score);
        }

        let overall_quality = (clarity + specificity + coherence) / 3.0;

        let original_len = original.chars().count().max(1) as f64;
        let enhanced_len = enhanced.chars().count() as f64;
        let improvement_pct = ((enhanced_len / original_len) - 1.0) * 100.0;
        let improvement_pct = improvement_pct.max(0.0);

        QualityMetrics {
            clarity,
            specificity,
            coherence,
            per_technique,
            overall_quality,
            improvement_pct,
        }
    }
}

fn marker_score(lower_text: &str, markers: &[&str]) -> f64 {
    let hits = markers.iter().filter(|m| lower_text.contains(**m)).count();
    (hits as f64 / markers.len() as f64).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::techniques::implementations::all_techniques;

    fn registry() -> TechniqueRegistry {
        let registry = TechniqueRegistry::new();
        for t in all_techniques() {
            registry.register(t).unwrap();
        }
        registry
    }

    #[test]
    fn unknown_technique_defaults_to_baseline_score() {
        let registry = registry();
        let metrics = QualityMetrics::compute("hi", "hi there", &["unregistered_id".to_string()], &registry);
        assert_eq!(metrics.per_technique["unregistered_id"], DEFAULT_TECHNIQUE_SCORE);
    }

    #[test]
    fn improvement_pct_nonnegative_for_shorter_output() {
        let registry = registry();
        let metrics = QualityMetrics::compute("a long original prompt here", "short", &[], &registry);
        assert!(metrics.improvement_pct >= 0.0);
    }

    #[test]
    fn coherence_rewards_transition_words() {
        let registry = registry();
        let metrics = QualityMetrics::compute("x", "First, do this. Then do that. Finally, review.", &[], &registry);
        assert!(metrics.coherence > 0.0);
    }
}
