//! Request pieces shared by the chat-style HTTP providers.

use serde::Serialize;

use eduplanner_core::traits::GenerateRequest;

use crate::error::ProviderError;

#[derive(Debug, Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// The optional system message followed by the user prompt.
pub(crate) fn messages(request: &GenerateRequest) -> Vec<ChatMessage<'_>> {
    let system = request
        .system_prompt
        .as_deref()
        .map(|content| ChatMessage {
            role: "system",
            content,
        });
    let user = ChatMessage {
        role: "user",
        content: &request.prompt,
    };
    system.into_iter().chain(std::iter::once(user)).collect()
}

/// Classify a request that never produced a response.
pub(crate) fn send_error(
    err: reqwest::Error,
    timeout_secs: u64,
    refused: impl FnOnce() -> String,
) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else if err.is_connect() {
        ProviderError::NetworkError(refused())
    } else {
        ProviderError::NetworkError(err.to_string())
    }
}

/// Generic error for a non-success status, carrying the response body.
pub(crate) async fn status_error(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    ProviderError::ApiError { status, message }
}

pub(crate) fn decode_error(err: reqwest::Error) -> ProviderError {
    ProviderError::ApiError {
        status: 0,
        message: format!("failed to parse response: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(system: Option<&str>) -> GenerateRequest {
        GenerateRequest {
            model: "m".into(),
            prompt: "Evaluate".into(),
            system_prompt: system.map(str::to_string),
            max_tokens: 10,
            temperature: 0.0,
        }
    }

    #[test]
    fn system_message_comes_first() {
        let req = request(Some("You are an OS instructor."));
        let msgs = messages(&req);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, "system");
        assert_eq!(msgs[1].content, "Evaluate");
    }

    #[test]
    fn no_system_message() {
        let req = request(None);
        let json = serde_json::to_value(messages(&req)).unwrap();
        assert_eq!(json, serde_json::json!([{"role": "user", "content": "Evaluate"}]));
    }
}
