use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::provider::LlmProvider;
use super::types::CompletionRequest;
use crate::core::errors::{CoreError, Result};

/// Local inference via an Ollama server (`/api/generate`).
#[derive(Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(base_url: String, model: String, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout,
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        // One deadline over send and body read; headers arriving on
        // time is not completion.
        let exchange = async {
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(CoreError::internal)?;

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(CoreError::Internal(format!(
                    "ollama completion failed ({}): {}",
                    status, text
                )));
            }

            let payload: GenerateResponse = response.json().await.map_err(CoreError::internal)?;
            Ok(payload.response)
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| CoreError::ProviderTimeout {
                provider: "ollama".to_string(),
                seconds: self.timeout.as_secs(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn complete_returns_generated_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .json_body_includes(r#"{"stream": false}"#);
                then.status(200)
                    .json_body(serde_json::json!({ "response": "Fifteen days per year." }));
            })
            .await;

        let provider = OllamaProvider::new(
            server.base_url(),
            "llama3.2:3b".to_string(),
            Duration::from_secs(5),
        );
        let answer = provider
            .complete(
                CompletionRequest::new("How many vacation days?")
                    .with_system("Answer only from context.")
                    .with_max_tokens(256),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(answer, "Fifteen days per year.");
    }

    #[tokio::test]
    async fn slow_backend_fails_with_provider_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .delay(Duration::from_millis(300))
                    .json_body(serde_json::json!({ "response": "late" }));
            })
            .await;

        let provider = OllamaProvider::new(
            server.base_url(),
            "llama3.2:3b".to_string(),
            Duration::from_millis(50),
        );
        let err = provider
            .complete(CompletionRequest::new("anything"))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::ProviderTimeout { .. }));
    }
}
