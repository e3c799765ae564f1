//! OpenAI-compatible chat completions provider.
//!
//! Works against api.openai.com and any compatible endpoint, e.g.
//! OpenRouter with `base_url = "https://openrouter.ai/api"`.

use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use eduplanner_core::traits::{GenerateRequest, GenerateResponse, LlmProvider, TokenUsage};

use crate::chat::{self, ChatMessage};
use crate::error::ProviderError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TIMEOUT_SECS: u64 = 120;
/// Used when a 429 carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    org_id: Option<String>,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
        org_id: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;

        let base_url = base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .to_string();

        Ok(Self {
            api_key: api_key.to_string(),
            base_url,
            org_id: org_id.filter(|o| !o.is_empty()),
            client,
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
    #[serde(default)]
    model: String,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    /// Null for refusals and tool calls.
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

fn retry_after_ms(response: &reqwest::Response) -> u64 {
    let secs = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    secs * 1000
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        let start = Instant::now();
        let body = CompletionRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            messages: chat::messages(request),
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key);
        if let Some(org) = &self.org_id {
            builder = builder.header("OpenAI-Organization", org);
        }

        let response = builder.json(&body).send().await.map_err(|e| {
            chat::send_error(e, DEFAULT_TIMEOUT_SECS, || {
                format!("cannot connect to {}", self.base_url)
            })
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            let error = match status {
                429 => ProviderError::RateLimited {
                    retry_after_ms: retry_after_ms(&response),
                },
                401 => ProviderError::AuthenticationFailed(
                    response.text().await.unwrap_or_default(),
                ),
                404 => ProviderError::ModelNotFound(request.model.clone()),
                _ => chat::status_error(response).await,
            };
            return Err(error.into());
        }

        let completion: Completion = response.json().await.map_err(chat::decode_error)?;
        let latency_ms = start.elapsed().as_millis() as u64;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let model = if completion.model.is_empty() {
            request.model.clone()
        } else {
            completion.model
        };

        Ok(GenerateResponse {
            content,
            model,
            token_usage: TokenUsage {
                prompt_tokens: completion.usage.prompt_tokens,
                completion_tokens: completion.usage.completion_tokens,
                total_tokens: completion.usage.total_tokens,
            },
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eduplanner_core::error::is_connectivity_error;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(model: &str) -> GenerateRequest {
        GenerateRequest {
            model: model.into(),
            prompt: "Optimize this plan".into(),
            system_prompt: Some("You are an OS instructor.".into()),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn successful_generation() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "choices": [{"message": {"content": "{\"plan\": \"new\"}", "role": "assistant"}, "index": 0}],
            "model": "gpt-4.1",
            "usage": {"prompt_tokens": 40, "completion_tokens": 15, "total_tokens": 55}
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(header("OpenAI-Organization", "org-1"))
            .and(body_partial_json(serde_json::json!({
                "max_tokens": 1024,
                "messages": [
                    {"role": "system", "content": "You are an OS instructor."},
                    {"role": "user", "content": "Optimize this plan"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let provider =
            OpenAiProvider::new("test-key", Some(server.uri()), Some("org-1".into())).unwrap();
        let response = provider.generate(&request("gpt-4.1")).await.unwrap();
        assert_eq!(response.content, "{\"plan\": \"new\"}");
        assert_eq!(response.token_usage.total_tokens, 55);
    }

    #[tokio::test]
    async fn custom_base_url() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok", "role": "assistant"}, "index": 0}]
            })))
            .mount(&server)
            .await;

        let base = format!("{}/api/", server.uri());
        let provider = OpenAiProvider::new("key", Some(base), None).unwrap();
        let response = provider.generate(&request("deepseek/deepseek-r1")).await.unwrap();
        assert_eq!(response.content, "ok");
        // No model or usage in the reply: fall back to the requested model.
        assert_eq!(response.model, "deepseek/deepseek-r1");
        assert_eq!(response.token_usage.total_tokens, 0);
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("key", Some(server.uri()), None).unwrap();
        let err = provider.generate(&request("gpt-4.1")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::RateLimited { retry_after_ms: 3000 })
        ));
        assert!(!is_connectivity_error(&err));
    }

    #[tokio::test]
    async fn bad_key_is_auth_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("wrong", Some(server.uri()), None).unwrap();
        let err = provider.generate(&request("gpt-4.1")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProviderError>(),
            Some(ProviderError::AuthenticationFailed(_))
        ));
        assert!(err.to_string().contains("invalid api key"));
        assert!(!is_connectivity_error(&err));
    }

    #[tokio::test]
    async fn error_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let provider = OpenAiProvider::new("key", Some(server.uri()), None).unwrap();
        let err = provider.generate(&request("gpt-4.1")).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
