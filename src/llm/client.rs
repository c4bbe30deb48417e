use anyhow::{Context, Result};
use async_openai::{Client, config::OpenAIConfig};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::prompt::Prompt;
use super::provider::{MAX_OUTPUT_TOKENS, Provider};
use crate::error::GenerationError;
use crate::utils::preview;

const ERROR_BODY_PREVIEW_CHARS: usize = 300;

/// Something that turns a prompt into raw reply text.
#[allow(async_fn_in_trait)]
pub trait Completion {
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}

/// Single-attempt client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatClient {
    http: reqwest::Client,
    provider: Provider,
    api_key: String,
    json_mode: bool,
}

impl ChatClient {
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider,
            api_key: api_key.into(),
            json_mode: provider.supports_json_mode(),
        }
    }

    /// Ask for plain text even when the backend offers a JSON mode.
    pub fn without_json_mode(mut self) -> Self {
        self.json_mode = false;
        self
    }

    fn request_body<'a>(&self, prompt: &'a Prompt) -> ChatRequest<'a> {
        ChatRequest {
            model: self.provider.model(),
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: MAX_OUTPUT_TOKENS,
            response_format: self.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

impl Completion for ChatClient {
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let endpoint = self.provider.chat_completions_url();
        let body = self.request_body(prompt);
        debug!(
            model = body.model,
            json_mode = self.json_mode,
            system_len = prompt.system.len(),
            user_len = prompt.user.len(),
            "prepared chat completion request"
        );
        info!(%endpoint, "sending completion request");

        let transport = |source| GenerationError::Transport {
            endpoint: endpoint.clone(),
            source,
        };
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let text = response.text().await.map_err(transport)?;
        debug!(%status, body_len = text.len(), "received completion response");

        parse_completion(status, &text)
    }
}

/// Maps an HTTP status and body from `/chat/completions` to reply text.
fn parse_completion(status: StatusCode, body: &str) -> Result<String, GenerationError> {
    if !status.is_success() {
        let message = api_error_message(body);
        return Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::Unauthorized {
                status: status.as_u16(),
                message,
            },
            StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited { message },
            _ => GenerationError::Api {
                status: status.as_u16(),
                message,
            },
        });
    }

    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|source| GenerationError::MalformedEnvelope { source })?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(GenerationError::EmptyReply)?;

    if choice.finish_reason.as_deref() == Some("length") {
        return Err(GenerationError::Truncated {
            max_tokens: MAX_OUTPUT_TOKENS,
        });
    }

    choice
        .message
        .content
        .filter(|content| !content.trim().is_empty())
        .ok_or(GenerationError::EmptyReply)
}

fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => match envelope.error.kind {
            Some(kind) => format!("{} ({kind})", envelope.error.message),
            None => envelope.error.message,
        },
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => preview(body.trim(), ERROR_BODY_PREVIEW_CHARS),
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Confirms that `api_key` is accepted by listing the provider's models.
pub async fn healthcheck(provider: Provider, api_key: &str) -> Result<()> {
    let config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(provider.base_url());
    let client = Client::with_config(config);

    client
        .models()
        .list()
        .await
        .with_context(|| format!("Failed to validate API key with {provider}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn prompt() -> Prompt {
        Prompt {
            system: "be a linguist".into(),
            user: "make 3 cards".into(),
        }
    }

    #[test]
    fn request_body_carries_model_messages_and_json_mode() {
        let client = ChatClient::new(Provider::Deepseek, "key");
        let prompt = prompt();
        let body: Value = serde_json::to_value(client.request_body(&prompt)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "deepseek-chat",
                "messages": [
                    {"role": "system", "content": "be a linguist"},
                    {"role": "user", "content": "make 3 cards"}
                ],
                "max_tokens": 4000,
                "response_format": {"type": "json_object"}
            })
        );
    }

    #[test]
    fn json_mode_can_be_disabled() {
        let client = ChatClient::new(Provider::Openai, "key").without_json_mode();
        let prompt = prompt();
        let body: Value = serde_json::to_value(client.request_body(&prompt)).unwrap();
        assert!(body.get("response_format").is_none());
        assert_eq!(body["model"], "gpt-4o-mini");
    }

    #[test]
    fn successful_reply_returns_content() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"[{\"expression\":\"salut\"}]"},"finish_reason":"stop"}]}"#;
        let text = parse_completion(StatusCode::OK, body).unwrap();
        assert_eq!(text, r#"[{"expression":"salut"}]"#);
    }

    #[test]
    fn truncated_reply_is_an_error() {
        let body = r#"{"choices":[{"message":{"content":"{\"cards\": [{\"expr"},"finish_reason":"length"}]}"#;
        let err = parse_completion(StatusCode::OK, body).unwrap_err();
        assert!(matches!(err, GenerationError::Truncated { max_tokens: 4000 }));
    }

    #[test]
    fn missing_or_blank_content_is_empty_reply() {
        let no_choices = r#"{"choices":[]}"#;
        assert!(matches!(
            parse_completion(StatusCode::OK, no_choices).unwrap_err(),
            GenerationError::EmptyReply
        ));
        let blank = r#"{"choices":[{"message":{"content":"  "},"finish_reason":"stop"}]}"#;
        assert!(matches!(
            parse_completion(StatusCode::OK, blank).unwrap_err(),
            GenerationError::EmptyReply
        ));
    }

    #[test]
    fn auth_failures_keep_provider_message() {
        let body = r#"{"error":{"message":"Authentication Fails","type":"authentication_error"}}"#;
        let err = parse_completion(StatusCode::UNAUTHORIZED, body).unwrap_err();
        match err {
            GenerationError::Unauthorized { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Authentication Fails (authentication_error)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rate_limit_is_reported() {
        let body = r#"{"error":{"message":"Rate limit reached"}}"#;
        let err = parse_completion(StatusCode::TOO_MANY_REQUESTS, body).unwrap_err();
        assert_eq!(err.to_string(), "rate limited (HTTP 429): Rate limit reached");
    }

    #[test]
    fn non_json_error_body_is_previewed() {
        let err =
            parse_completion(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.to_string(), "HTTP 502: <html>bad gateway</html>");
    }

    #[test]
    fn undecodable_success_body_is_malformed() {
        let err = parse_completion(StatusCode::OK, "not json").unwrap_err();
        assert!(matches!(err, GenerationError::MalformedEnvelope { .. }));
    }
}
