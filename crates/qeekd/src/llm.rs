//! Completion-service client.
//!
//! One operation: send a system prompt plus chat history, get text back.
//! Errors are classified into the network/timeout/unknown taxonomy the
//! gateways map onto fallback sentences. The request timeout is applied
//! here, on every call — conversation start and follow-up turns alike.

use async_trait::async_trait;
use qeek_common::{ChatMessage, ChatRole, GatewayErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

const OPENAI_API: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("completion service unreachable: {0}")]
    Network(String),

    #[error("completion request timed out: {0}")]
    Timeout(String),

    #[error("completion failed: {0}")]
    Unknown(String),
}

impl CompletionError {
    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            CompletionError::Network(_) => GatewayErrorKind::Network,
            CompletionError::Timeout(_) => GatewayErrorKind::Timeout,
            CompletionError::Unknown(_) => GatewayErrorKind::Unknown,
        }
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CompletionError::Timeout(e.to_string())
        } else if e.is_connect() {
            CompletionError::Network(e.to_string())
        } else {
            CompletionError::Unknown(e.to_string())
        }
    }
}

/// Per-call sampling settings. Each gateway fixes its own values.
#[derive(Debug, Clone, Copy)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Demand a single JSON object instead of prose.
    pub json_object: bool,
}

/// The external completion service, abstracted so tests can script it.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<String, CompletionError>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

/// OpenAI chat-completions client with a fixed model and request timeout.
pub struct OpenAiClient {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: Option<String>, timeout: Duration) -> Self {
        OpenAiClient {
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: OPENAI_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[ChatMessage],
        params: CompletionParams,
    ) -> Result<String, CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage {
            role: ChatRole::System,
            content: system_prompt.to_string(),
        });
        messages.extend_from_slice(history);

        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            response_format: params.json_object.then_some(ResponseFormat { kind: "json_object" }),
        };

        let start = std::time::Instant::now();
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Unknown(format!(
                "completion service returned {}: {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Unknown(format!("malformed completion body: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        info!("[<]  completion in {}ms ({} chars)", start.elapsed().as_millis(), content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_puts_system_prompt_first() {
        let request = ChatCompletionRequest {
            model: "gpt-4o",
            messages: vec![
                ChatMessage { role: ChatRole::System, content: "persona".into() },
                ChatMessage::user("question"),
            ],
            temperature: 0.7,
            max_tokens: Some(500),
            response_format: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["max_tokens"], 500);
        assert!(value.get("response_format").is_none());
    }

    #[test]
    fn test_json_object_format_serializes() {
        let request = ChatCompletionRequest {
            model: "gpt-4o",
            messages: vec![],
            temperature: 0.5,
            max_tokens: None,
            response_format: Some(ResponseFormat { kind: "json_object" }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert!(value.get("max_tokens").is_none());
    }

    #[test]
    fn test_response_with_null_content_parses() {
        let raw = r#"{"choices":[{"message":{"content":null}}]}"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }

    #[test]
    fn test_default_model() {
        let client = OpenAiClient::new("sk-test".into(), None, Duration::from_secs(15));
        assert_eq!(client.model(), DEFAULT_MODEL);
    }
}
