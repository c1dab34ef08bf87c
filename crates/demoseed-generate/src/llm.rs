//! Completion clients.
//!
//! [`CompletionClient`] is the seam between the generator and a model
//! provider. The HTTP clients map provider status codes onto [`LlmError`] so
//! the retry wrapper can tell transient failures from fatal ones.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::errors::LlmError;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_URL: &str = "https://api.openai.com/v1";

/// One structured-generation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// Model answer text plus usage figures.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Completion {
    pub text: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// The answer was cut off by the token limit.
    pub truncated: bool,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError>;

    fn provider(&self) -> &str;

    fn model(&self) -> &str;
}

fn build_http_client() -> Result<Client, LlmError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(180))
        .build()
        .map_err(|err| LlmError::Setup(err.to_string()))
}

fn map_transport_error(err: reqwest::Error) -> LlmError {
    if err.is_builder() {
        LlmError::InvalidRequest(err.to_string())
    } else {
        LlmError::Transient(err.to_string())
    }
}

/// Classify a non-success HTTP status.
pub fn map_status(status: StatusCode, body: &str) -> LlmError {
    let detail = format!("{status}: {}", body.trim());
    match status.as_u16() {
        401 | 403 => LlmError::Auth(detail),
        429 | 529 => LlmError::RateLimited(detail),
        408 | 500..=599 => LlmError::Transient(detail),
        _ => LlmError::InvalidRequest(detail),
    }
}

async fn error_for(response: reqwest::Response) -> LlmError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unknown error".to_string());
    map_status(status, &body)
}

/// Anthropic Messages API client.
pub struct AnthropicClient {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_http_client()?,
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| ANTHROPIC_URL.to_string()),
        })
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicContent>,
    model: String,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl CompletionClient for AnthropicClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "system": request.system,
            "messages": [{ "role": "user", "content": request.prompt }],
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        let response = self
            .client
            .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        let text = parsed
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|usage| (usage.input_tokens, usage.output_tokens))
            .unwrap_or((0, 0));

        Ok(Completion {
            text,
            model: parsed.model,
            input_tokens,
            output_tokens,
            truncated: parsed.stop_reason.as_deref() == Some("max_tokens"),
        })
    }

    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// OpenAI-compatible chat completions client.
pub struct OpenAiClient {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Result<Self, LlmError> {
        Ok(Self {
            client: build_http_client()?,
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| OPENAI_URL.to_string()),
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !response.status().is_success() {
            return Err(error_for(response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;
        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|usage| (usage.prompt_tokens, usage.completion_tokens))
            .unwrap_or((0, 0));

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            model: parsed.model,
            input_tokens,
            output_tokens,
            truncated: choice.finish_reason.as_deref() == Some("length"),
        })
    }

    fn provider(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Client replaying queued answers, for tests and offline runs.
#[derive(Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.lock_responses().push_back(Ok(text.into()));
        self
    }

    pub fn push_error(&self, err: LlmError) -> &Self {
        self.lock_responses().push_back(Err(err));
        self
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, LlmError>>> {
        self.responses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        match self.lock_responses().pop_front() {
            Some(Ok(text)) => Ok(Completion {
                text,
                model: "scripted".to_string(),
                ..Completion::default()
            }),
            Some(Err(err)) => Err(err),
            None => {
                warn!("scripted client has no response left");
                Err(LlmError::InvalidResponse(
                    "no scripted response left".to_string(),
                ))
            }
        }
    }

    fn provider(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}
