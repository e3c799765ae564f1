//! Ollama (local LLM) provider.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use eduplanner_core::traits::{GenerateRequest, GenerateResponse, LlmProvider, TokenUsage};

use crate::chat::{self, ChatMessage};
use crate::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "deepseek-r1:latest";
const DEFAULT_TIMEOUT_SECS: u64 = 300; // reasoning models think for a while

/// Talks to a local `ollama serve` over its chat API.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl OllamaProvider {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(base_url: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let base_url = match base_url.trim_end_matches('/') {
            "" => DEFAULT_BASE_URL.to_string(),
            url => url.to_string(),
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url,
            client,
            timeout_secs,
        })
    }

    fn not_running(&self) -> String {
        format!(
            "Ollama not reachable at {}. Is it running? Start with: ollama serve",
            self.base_url
        )
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Serialize)]
struct SamplingOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Deserialize)]
struct ChatReply {
    message: ReplyMessage,
    model: String,
    /// Prompt tokens.
    #[serde(default)]
    prompt_eval_count: u32,
    /// Completion tokens.
    #[serde(default)]
    eval_count: u32,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();
        let body = ChatRequest {
            model: &request.model,
            messages: chat::messages(request),
            stream: false,
            options: SamplingOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| chat::send_error(e, self.timeout_secs, || self.not_running()))?;

        match response.status().as_u16() {
            404 => {
                return Err(ProviderError::ModelNotFound(format!(
                    "'{0}' is not installed locally. Pull it with: ollama pull {0}",
                    request.model
                ))
                .into())
            }
            status if status >= 400 => return Err(chat::status_error(response).await.into()),
            _ => {}
        }

        let reply: ChatReply = response.json().await.map_err(chat::decode_error)?;
        let latency_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(latency_ms, completion_tokens = reply.eval_count, "ollama reply");

        Ok(GenerateResponse {
            content: reply.message.content,
            model: reply.model,
            token_usage: TokenUsage {
                prompt_tokens: reply.prompt_eval_count,
                completion_tokens: reply.eval_count,
                total_tokens: reply.prompt_eval_count + reply.eval_count,
            },
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eduplanner_core::error::is_connectivity_error;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(model: &str) -> GenerateRequest {
        GenerateRequest {
            model: model.into(),
            prompt: "Evaluate this plan".into(),
            system_prompt: Some("You are an OS instructor.".into()),
            max_tokens: 1024,
            temperature: 0.0,
        }
    }

    #[tokio::test]
    async fn successful_generation() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "message": {"role": "assistant", "content": "[C]:4; clear"},
            "model": "deepseek-r1:latest",
            "prompt_eval_count": 30,
            "eval_count": 15
        });

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "stream": false,
                "options": {"temperature": 0.0, "num_predict": 1024},
                "messages": [
                    {"role": "system", "content": "You are an OS instructor."},
                    {"role": "user", "content": "Evaluate this plan"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(&format!("{}/", server.uri())).unwrap();
        let response = provider.generate(&request(DEFAULT_MODEL)).await.unwrap();
        assert_eq!(response.content, "[C]:4; clear");
        assert_eq!(response.token_usage.prompt_tokens, 30);
        assert_eq!(response.token_usage.total_tokens, 45);
    }

    #[tokio::test]
    async fn missing_token_counts_default_to_zero() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "ok"},
                "model": "llama3.1:8b"
            })))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(&server.uri()).unwrap();
        let response = provider.generate(&request("llama3.1:8b")).await.unwrap();
        assert_eq!(response.token_usage.total_tokens, 0);
    }

    #[tokio::test]
    async fn model_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(&server.uri()).unwrap();
        let err = provider.generate(&request("nonexistent")).await.unwrap_err();
        assert!(err.to_string().contains("ollama pull nonexistent"));
        assert!(!is_connectivity_error(&err));
    }

    #[tokio::test]
    async fn server_error_keeps_body() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("out of memory"))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new(&server.uri()).unwrap();
        let err = provider.generate(&request(DEFAULT_MODEL)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::ApiError { status: 500, message }) if message == "out of memory"
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_connectivity_error() {
        // Nothing listens on port 9 (discard) in the test environment.
        let provider = OllamaProvider::with_timeout("http://127.0.0.1:9", 5).unwrap();
        let err = provider.generate(&request(DEFAULT_MODEL)).await.unwrap_err();
        assert!(is_connectivity_error(&err));
    }
}
