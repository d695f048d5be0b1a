use std::sync::Arc;

use promptsmith::cache::{CacheClient, InProcessCacheClient};
use promptsmith::classifier::IntentClassifier;
use promptsmith::config::{CacheConfig, ClassifierConfig, InferenceConfig, RoutingMode};
use promptsmith::inference::{HttpInferenceClient, InferenceClient};
use promptsmith::techniques::validate_structured_output;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Spec §8 scenario 5: adaptive routing skips ML on a high-confidence rule
/// match, calls ML on a low-confidence one, and degrades to a low-confidence
/// warning when ML is unreachable.
#[tokio::test]
async fn adaptive_routing_skips_ml_on_high_confidence_and_falls_back_on_ml_down() {
    let cache: Arc<dyn CacheClient> = Arc::new(InProcessCacheClient::new(&CacheConfig::default()));

    let mut classifier_config = ClassifierConfig::default();
    classifier_config.mode = RoutingMode::Adaptive;
    classifier_config.high_confidence_threshold = 0.8;

    // Inference client pointed at an address nothing listens on, standing in
    // for "ML is down".
    let inference_config = InferenceConfig {
        base_url: "http://127.0.0.1:1".into(),
        connect_timeout_secs: 1,
        request_timeout_secs: 1,
        ..InferenceConfig::default()
    };
    let inference: Arc<dyn InferenceClient> = Arc::new(HttpInferenceClient::new(&inference_config).unwrap());

    let classifier = IntentClassifier::new(classifier_config, cache, Some(inference));

    let high_confidence = classifier
        .classify("Write a Python function to sort a list")
        .await
        .unwrap();
    assert!(high_confidence.confidence >= 0.8);

    let low_confidence = classifier.classify("Help me with this").await.unwrap();
    assert!(!low_confidence.intent.is_empty());
    assert!(low_confidence.warnings.contains(&"ml_fallback".to_string()));
}

#[tokio::test]
async fn adaptive_routing_calls_ml_when_rules_are_unsure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/classify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "intent": "problem_solving",
            "confidence": 0.77,
            "complexity": {"level": "moderate", "score": 0.5},
            "techniques": [{"name": "chain_of_thought", "score": 0.7}],
            "metadata": {"model_version": "v2", "inference_time_ms": 8}
        })))
        .mount(&server)
        .await;

    let cache: Arc<dyn CacheClient> = Arc::new(InProcessCacheClient::new(&CacheConfig::default()));
    let mut classifier_config = ClassifierConfig::default();
    classifier_config.mode = RoutingMode::Adaptive;
    classifier_config.high_confidence_threshold = 0.8;

    let inference_config = InferenceConfig { base_url: server.uri(), ..InferenceConfig::default() };
    let inference: Arc<dyn InferenceClient> = Arc::new(HttpInferenceClient::new(&inference_config).unwrap());
    let classifier = IntentClassifier::new(classifier_config, cache, Some(inference));

    let result = classifier.classify("Help me with this").await.unwrap();
    assert_eq!(result.intent, "problem_solving");
    assert_eq!(result.model_version.as_deref(), Some("v2"));
}

/// Spec §8 scenario 6: structured_output validation reports the missing
/// required field by name.
#[test]
fn structured_output_validation_reports_missing_required_field() {
    let schema = serde_json::json!({"required": ["name"]});

    let valid = validate_structured_output(r#"{"name":"x"}"#, "json", Some(&schema));
    assert!(valid.valid);

    let invalid = validate_structured_output(r#"{"age":30}"#, "json", Some(&schema));
    assert!(!invalid.valid);
    assert!(invalid.errors.iter().any(|e| e.contains("name")));
}
