use crate::error::PipelineError;
use crate::traits::ChatModel;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub chat_model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("chat_model", &self.chat_model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Reads `OPENAI_API_KEY` and, if set, `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self, PipelineError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                PipelineError::InvalidArgument("OPENAI_API_KEY is not set".to_string())
            })?;

        let mut config = Self::new(api_key);
        if let Some(base_url) = std::env::var("OPENAI_BASE_URL")
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            config.base_url = base_url.trim().to_string();
        }
        Ok(config)
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// Joins `path` onto `base`, treating `base` as a directory.
pub(crate) fn endpoint_url(base: &str, path: &str) -> Result<Url, PipelineError> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(Url::parse(&base)?.join(path.trim_start_matches('/'))?)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_choice(body: &str) -> Result<String, PipelineError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|error| PipelineError::synthesis("openai", format!("malformed response: {error}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| PipelineError::synthesis("openai", "response contained no answer"))
}

pub struct OpenAiChatModel {
    client: Client,
    config: OpenAiConfig,
}

impl std::fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("config", &self.config)
            .finish()
    }
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiConfig) -> Result<Self, PipelineError> {
        if config.api_key.trim().is_empty() {
            return Err(PipelineError::synthesis("openai", "API key must not be empty"));
        }

        Ok(Self {
            client: http_client(config.timeout)
                .map_err(|error| PipelineError::synthesis("openai", error.to_string()))?,
            config,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn model_id(&self) -> String {
        format!("openai/{}", self.config.chat_model)
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, PipelineError> {
        debug!(
            provider = "openai",
            model = %self.config.chat_model,
            message_count = messages.len(),
            "chat completion"
        );

        let response = self
            .client
            .post(endpoint_url(&self.config.base_url, "chat/completions")?)
            .bearer_auth(&self.config.api_key)
            .json(&ChatRequest {
                model: &self.config.chat_model,
                messages,
                temperature: self.config.temperature,
            })
            .send()
            .await
            .map_err(|error| {
                error!(provider = "openai", %error, timed_out = error.is_timeout(), "chat request failed");
                PipelineError::synthesis("openai", format!("request failed: {error}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| PipelineError::synthesis("openai", error.to_string()))?;

        if !status.is_success() {
            error!(provider = "openai", %status, "chat API error");
            return Err(PipelineError::synthesis(
                "openai",
                format!("API returned {status}: {body}"),
            ));
        }

        first_choice(&body)
    }
}
