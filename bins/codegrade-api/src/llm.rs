// Text-generation collaborator: prompt in, free-form text out

use async_trait::async_trait;
use codegrade_common::Config;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::GenerationError;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Generation is slower than status queries; allow several HTTP timeouts
fn generation_timeout(http_timeout: Duration) -> Duration {
    http_timeout.saturating_mul(6)
}

/// Read the generated text out of an Ollama `/api/generate` reply
pub fn response_text(reply: Value) -> Result<String, GenerationError> {
    reply
        .get("response")
        .and_then(|v| v.as_str())
        .map(|text| text.trim().to_string())
        .ok_or(GenerationError::MissingResponse)
}

/// Sends prompts to an Ollama server
pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(generation_timeout(config.http_timeout()))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}/api/generate", config.llm_url.trim_end_matches('/')),
            model: config.llm_model.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false
        });

        let response = self.client.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response_text(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text() {
        let reply = json!({
            "model": "llama3",
            "response": "  {\"score\": 80}\n",
            "done": true
        });

        assert_eq!(response_text(reply).unwrap(), "{\"score\": 80}");
    }

    #[test]
    fn test_missing_response_field() {
        let err = response_text(json!({"error": "model not found"})).unwrap_err();
        assert!(matches!(err, GenerationError::MissingResponse));

        let err = response_text(json!({"response": null})).unwrap_err();
        assert!(matches!(err, GenerationError::MissingResponse));
    }

    #[test]
    fn test_generation_timeout_saturates() {
        assert_eq!(generation_timeout(Duration::from_secs(10)), Duration::from_secs(60));
        assert_eq!(generation_timeout(Duration::MAX), Duration::MAX);
    }
}
