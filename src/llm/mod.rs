use std::{env, fmt};

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

/// Defines the shape of a chat-style interaction with the completion service.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_schema: Option<ResponseSchema>,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            response_schema: None,
        }
    }

    /// Force the provider to return JSON conforming to the given schema
    /// instead of free text.
    pub fn with_response_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// Strict structured-output contract passed as `response_format` to the
/// provider. `schema` must be a valid JSON Schema object.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Individual chat message, compatible with OpenAI compliant providers.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub text: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Supported chat roles passed to the provider.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Captures basic token usage metrics associated with a call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub response_tokens: usize,
    pub total_tokens: usize,
}

/// Full response surface returned to callers.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub token_usage: TokenUsage,
    pub model: String,
    pub raw: serde_json::Value,
}

/// Failure taxonomy for a single completion call. The matching pipeline
/// branches on these kinds, so they are typed rather than folded into a
/// generic error.
#[derive(Debug)]
pub enum LlmError {
    /// HTTP 429: transient, the caller may continue with other work.
    RateLimited { body: String },
    /// HTTP 402: provider credits exhausted, no further calls will succeed.
    QuotaExhausted { body: String },
    /// Any other non-success HTTP status.
    Api { status: StatusCode, body: String },
    /// Transport-level failure (connect, timeout from the client).
    Transport(reqwest::Error),
    /// Response body that could not be interpreted as a completion payload.
    Payload(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::RateLimited { body } => write!(f, "provider rate limited: {body}"),
            LlmError::QuotaExhausted { body } => write!(f, "provider quota exhausted: {body}"),
            LlmError::Api { status, body } => {
                write!(f, "provider call failed with status {status}: {body}")
            }
            LlmError::Transport(err) => write!(f, "transport error: {err}"),
            LlmError::Payload(detail) => write!(f, "unexpected provider payload: {detail}"),
        }
    }
}

impl std::error::Error for LlmError {}

/// Main entry point for invoking the completion provider.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

#[derive(Clone, Default)]
struct LlmConfig {
    api_key: String,
    referer: Option<String>,
    title: Option<String>,
}

impl LlmClient {
    /// Build a client using environment variables.
    pub fn from_env() -> Result<Self> {
        let api_key =
            env::var("OPENROUTER_API_KEY").context("OPENROUTER_API_KEY env var is missing")?;
        let referer = env::var("OPENROUTER_HTTP_REFERER").ok();
        let title = env::var("OPENROUTER_X_TITLE").ok();

        Ok(Self {
            http: Client::new(),
            config: LlmConfig {
                api_key,
                referer,
                title,
            },
        })
    }

    /// Execute a single blocking completion round-trip.
    pub async fn execute(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|msg| {
                serde_json::json!({
                    "role": msg.role.as_str(),
                    "content": msg.text,
                })
            })
            .collect();

        let prompt_tokens = approximate_token_count(
            &request
                .messages
                .iter()
                .map(|m| m.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        );

        let mut payload = serde_json::json!({
            "model": request.model,
            "messages": messages,
        });

        if let Some(schema) = &request.response_schema {
            payload["response_format"] = serde_json::json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "strict": true,
                    "schema": schema.schema,
                },
            });
        }

        let mut req_builder = self
            .http
            .post("https://openrouter.ai/api/v1/chat/completions")
            .bearer_auth(&self.config.api_key)
            .json(&payload);

        if let Some(referer) = &self.config.referer {
            req_builder = req_builder.header("HTTP-Referer", referer);
        }

        if let Some(title) = &self.config.title {
            req_builder = req_builder.header("X-Title", title);
        }

        let response = req_builder.send().await.map_err(LlmError::Transport)?;
        let status = response.status();
        let response_text = response.text().await.map_err(LlmError::Transport)?;

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(LlmError::RateLimited {
                    body: truncate_body(&response_text),
                });
            }
            StatusCode::PAYMENT_REQUIRED => {
                return Err(LlmError::QuotaExhausted {
                    body: truncate_body(&response_text),
                });
            }
            status if !status.is_success() => {
                return Err(LlmError::Api {
                    status,
                    body: truncate_body(&response_text),
                });
            }
            _ => {}
        }

        let body: serde_json::Value = serde_json::from_str(&response_text).map_err(|err| {
            LlmError::Payload(format!(
                "response is not JSON ({err}): {}",
                truncate_body(&response_text)
            ))
        })?;

        let (text, usage) = extract_text_and_usage(&body)
            .ok_or_else(|| LlmError::Payload(truncate_body(&response_text)))?;

        let mut token_usage = usage.unwrap_or_else(|| TokenUsage {
            prompt_tokens,
            response_tokens: approximate_token_count(&text),
            total_tokens: 0,
        });
        if token_usage.prompt_tokens == 0 {
            token_usage.prompt_tokens = prompt_tokens;
        }
        if token_usage.response_tokens == 0 {
            token_usage.response_tokens = approximate_token_count(&text);
        }
        token_usage.total_tokens = token_usage.prompt_tokens + token_usage.response_tokens;

        Ok(LlmResponse {
            text,
            token_usage,
            model: request.model,
            raw: body,
        })
    }
}

const MAX_BODY_PREVIEW_BYTES: usize = 500;

/// Shorten an error body for logging. Cuts on a char boundary so multi-byte
/// UTF-8 in provider error messages cannot panic the error path.
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_BODY_PREVIEW_BYTES {
        return body.to_string();
    }
    let mut cut = MAX_BODY_PREVIEW_BYTES;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &body[..cut])
}

/// Extract assistant text and optional usage metrics from either Responses or
/// Chat Completions payloads.
fn extract_text_and_usage(value: &serde_json::Value) -> Option<(String, Option<TokenUsage>)> {
    if let Ok(resp) = serde_json::from_value::<ResponsesPayload>(value.clone()) {
        if !resp.output.is_empty() {
            let text = resp
                .output
                .into_iter()
                .filter(|item| item.item_type == "message")
                .flat_map(|item| item.content)
                .find_map(|content| match content.content_type.as_str() {
                    "output_text" | "text" => Some(content.text.unwrap_or_default()),
                    _ => None,
                })
                .unwrap_or_default();

            let usage = resp.usage.map(|usage| TokenUsage {
                prompt_tokens: usage.prompt_tokens.unwrap_or_default(),
                response_tokens: usage.completion_tokens.unwrap_or_default(),
                total_tokens: usage.total_tokens.unwrap_or_default(),
            });

            return Some((text, usage));
        }
    }

    if let Ok(chat) = serde_json::from_value::<ChatCompletionPayload>(value.clone()) {
        if !chat.choices.is_empty() {
            let text = chat
                .choices
                .into_iter()
                .find_map(|choice| choice.message.content)
                .unwrap_or_default();

            let usage = chat.usage.map(|usage| TokenUsage {
                prompt_tokens: usage.prompt_tokens.unwrap_or_default(),
                response_tokens: usage.completion_tokens.unwrap_or_default(),
                total_tokens: usage.total_tokens.unwrap_or_default(),
            });

            return Some((text, usage));
        }
    }

    None
}

fn approximate_token_count(input: &str) -> usize {
    if input.trim().is_empty() {
        return 0;
    }
    input
        .split_whitespace()
        .filter(|segment| !segment.is_empty())
        .count()
}

#[derive(Debug, Deserialize)]
struct ResponsesPayload {
    #[serde(default)]
    output: Vec<ResponsesOutputItem>,
    #[serde(default)]
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    content: Vec<ResponsesOutputContent>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionPayload {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<UsagePayload>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsagePayload {
    #[serde(default)]
    prompt_tokens: Option<usize>,
    #[serde(default)]
    completion_tokens: Option<usize>,
    #[serde(default)]
    total_tokens: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_chat_completion_text_and_usage() {
        let body = serde_json::json!({
            "choices": [{ "message": { "content": "{\"match_score\": 80}" } }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 30, "total_tokens": 150 },
        });

        let (text, usage) = extract_text_and_usage(&body).expect("payload should parse");
        assert_eq!(text, "{\"match_score\": 80}");
        let usage = usage.expect("usage present");
        assert_eq!(usage.prompt_tokens, 120);
        assert_eq!(usage.response_tokens, 30);
    }

    #[test]
    fn extracts_responses_payload_text() {
        let body = serde_json::json!({
            "output": [{
                "type": "message",
                "content": [{ "type": "output_text", "text": "hello" }],
            }],
        });

        let (text, usage) = extract_text_and_usage(&body).expect("payload should parse");
        assert_eq!(text, "hello");
        assert!(usage.is_none());
    }

    #[test]
    fn rejects_unrecognized_payload() {
        let body = serde_json::json!({ "error": { "message": "bad request" } });
        assert!(extract_text_and_usage(&body).is_none());
    }

    #[test]
    fn truncate_body_leaves_short_bodies_untouched() {
        assert_eq!(truncate_body("rate limited"), "rate limited");
        let exactly_max = "a".repeat(MAX_BODY_PREVIEW_BYTES);
        assert_eq!(truncate_body(&exactly_max), exactly_max);
    }

    #[test]
    fn truncate_body_shortens_long_ascii_bodies() {
        let body = "x".repeat(1200);
        let preview = truncate_body(&body);
        assert_eq!(preview.len(), MAX_BODY_PREVIEW_BYTES + 3);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn truncate_body_respects_char_boundaries_in_multibyte_bodies() {
        // 200 three-byte chars: 600 bytes, with a char straddling byte 500.
        let body = "€".repeat(200);
        let preview = truncate_body(&body);
        assert!(preview.ends_with("..."));
        assert!(preview.len() <= MAX_BODY_PREVIEW_BYTES + 3);
        assert!(preview.trim_end_matches("...").chars().all(|c| c == '€'));

        let mixed = format!("{}{}", "a".repeat(499), "é".repeat(50));
        assert!(truncate_body(&mixed).ends_with("..."));
    }

    #[test]
    fn approximate_token_count_splits_on_whitespace() {
        assert_eq!(approximate_token_count(""), 0);
        assert_eq!(approximate_token_count("   "), 0);
        assert_eq!(approximate_token_count("one two  three"), 3);
    }
}
