use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use crate::config::InferenceConfig;
use crate::errors::{PromptsmithError, PromptsmithResult};

use super::{ComplexityLevel, InferenceClient, InferenceResult, TechniqueSuggestion};

/// `reqwest`-backed ML service client, grounded on `providers/openai.rs`'s
/// client-builder/constant pattern.
pub struct HttpInferenceClient {
    client: Client,
    base_url: String,
    max_len: usize,
    max_batch_size: usize,
}

impl HttpInferenceClient {
    pub fn new(config: &InferenceConfig) -> PromptsmithResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PromptsmithError::Internal(anyhow::anyhow!(e)))?;
        Ok(HttpInferenceClient {
            client,
            base_url: config.base_url.clone(),
            max_len: config.max_text_len,
            max_batch_size: config.max_batch_size,
        })
    }

    #[cfg(test)]
    pub fn with_base_url(base_url: impl Into<String>, config: &InferenceConfig) -> PromptsmithResult<Self> {
        let mut client = Self::new(config)?;
        client.base_url = base_url.into();
        Ok(client)
    }

    fn truncate(&self, text: &str) -> String {
        if text.chars().count() <= self.max_len {
            text.to_string()
        } else {
            text.chars().take(self.max_len).collect()
        }
    }

    async fn post(&self, body: Value) -> PromptsmithResult<Value> {
        let started = std::time::Instant::now();
        let resp = self
            .client
            .post(format!("{}/classify", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PromptsmithError::Timeout
                } else {
                    PromptsmithError::Connect(e.to_string())
                }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| PromptsmithError::Connect(e.to_string()))?;

        if !status.is_success() {
            return Err(PromptsmithError::Inference(format!(
                "ML service returned {status}: {text}"
            )));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| PromptsmithError::Inference(format!("malformed response body: {e}")))?;
        let _elapsed = started.elapsed();
        Ok(parsed)
    }

    fn parse_item(item: &Value, inference_time_ms: u64, retry_attempts: u32) -> PromptsmithResult<InferenceResult> {
        let intent = item
            .get("intent")
            .and_then(Value::as_str)
            .ok_or_else(|| PromptsmithError::Inference("response missing `intent`".into()))?
            .to_string();
        let confidence = item
            .get("confidence")
            .and_then(Value::as_f64)
            .ok_or_else(|| PromptsmithError::Inference("response missing `confidence`".into()))?;
        let complexity = item.get("complexity");
        let level_str = complexity
            .and_then(|c| c.get("level"))
            .and_then(Value::as_str)
            .unwrap_or("moderate");
        let complexity_level = match level_str {
            "simple" => ComplexityLevel::Simple,
            "complex" => ComplexityLevel::Complex,
            _ => ComplexityLevel::Moderate,
        };
        let complexity_score = complexity
            .and_then(|c| c.get("score"))
            .and_then(Value::as_f64)
            .unwrap_or(0.5);
        let techniques = item
            .get("techniques")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| {
                        let name = t.get("name").and_then(Value::as_str)?.to_string();
                        let score = t.get("score").and_then(Value::as_f64);
                        Some(TechniqueSuggestion { name, score })
                    })
                    .collect()
            })
            .unwrap_or_default();
        let all_intents = item.get("all_intents").and_then(Value::as_array).map(|arr| {
            arr.iter()
                .filter_map(|p| {
                    let name = p.get(0)?.as_str()?.to_string();
                    let score = p.get(1)?.as_f64()?;
                    Some((name, score))
                })
                .collect()
        });
        let model_version = item
            .get("metadata")
            .and_then(|m| m.get("model_version"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        Ok(InferenceResult {
            intent,
            confidence,
            complexity_level,
            complexity_score,
            techniques,
            all_intents,
            model_version,
            inference_time_ms,
            retry_attempts,
        })
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn classify(&self, text: &str) -> PromptsmithResult<InferenceResult> {
        if text.trim().is_empty() {
            return Err(PromptsmithError::Validation("empty text".into()));
        }
        let truncated = self.truncate(text);
        let started = std::time::Instant::now();
        let body = self.post(json!({ "text": truncated })).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        Self::parse_item(&body, elapsed_ms, 0)
    }

    async fn batch_classify(&self, texts: &[String]) -> PromptsmithResult<Vec<InferenceResult>> {
        if texts.is_empty() {
            return Err(PromptsmithError::Validation("empty batch".into()));
        }
        let capped: Vec<String> = texts
            .iter()
            .take(self.max_batch_size)
            .map(|t| self.truncate(t))
            .collect();
        let started = std::time::Instant::now();
        let body = self.post(json!({ "text": capped })).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let items = body
            .as_array()
            .ok_or_else(|| PromptsmithError::Inference("expected an array response for batch".into()))?;
        items
            .iter()
            .map(|item| Self::parse_item(item, elapsed_ms, 0))
            .collect()
    }

    async fn health(&self) -> PromptsmithResult<()> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| PromptsmithError::Connect(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(PromptsmithError::ServiceUnavailable(format!(
                "health check returned {}",
                resp.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> InferenceConfig {
        InferenceConfig::default()
    }

    #[tokio::test]
    async fn classify_parses_success_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "intent": "code_generation",
                "confidence": 0.92,
                "complexity": {"level": "moderate", "score": 0.5},
                "techniques": [{"name": "few_shot", "score": 0.8}],
                "metadata": {"model_version": "v1", "inference_time_ms": 12}
            })))
            .mount(&server)
            .await;

        let client = HttpInferenceClient::with_base_url(server.uri(), &config()).unwrap();
        let result = client.classify("write a function").await.unwrap();
        assert_eq!(result.intent, "code_generation");
        assert!((result.confidence - 0.92).abs() < 1e-9);
        assert_eq!(result.model_version, "v1");
    }

    #[tokio::test]
    async fn classify_maps_non_2xx_to_inference_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/classify"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpInferenceClient::with_base_url(server.uri(), &config()).unwrap();
        let err = client.classify("hello").await.unwrap_err();
        assert_eq!(err.kind(), "InferenceError");
    }

    #[tokio::test]
    async fn classify_rejects_empty_text() {
        let client = HttpInferenceClient::with_base_url("http://example.invalid", &config()).unwrap();
        let err = client.classify("   ").await.unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
    }

    #[tokio::test]
    async fn health_ok_on_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let client = HttpInferenceClient::with_base_url(server.uri(), &config()).unwrap();
        client.health().await.unwrap();
    }
}
