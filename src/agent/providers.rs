use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CompletionConfig;
use crate::error::{ConfigError, ProviderError};

/// Everything a completion backend needs for one reply.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
}

/// Trait for LLM completion backends.
///
/// Implementations do not retry; a failure ends the request.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for OpenAI-compatible `/chat/completions` endpoints (Groq, OpenAI).
pub struct ChatCompletionsClient {
    client: Client,
    provider: &'static str,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "no_stops")]
    stop: &'a [String],
}

fn no_stops(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(
        provider: &'static str,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ProviderError::Client { provider, source })?;
        Ok(Self {
            client,
            provider,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl CompletionClient for ChatCompletionsClient {
    fn name(&self) -> &str {
        self.provider
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let provider = self.provider;
        let body = ChatBody {
            model: &self.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: &request.system,
                },
                WireMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stop: &request.stop,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(provider, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider,
                status,
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(provider, e))?;
        let reply = parse_reply(provider, &text)?;
        debug!(provider, model = %self.model, chars = reply.len(), "completion received");
        Ok(reply)
    }
}

/// Extract the first choice's text from a chat-completions body.
pub fn parse_reply(provider: &'static str, body: &str) -> Result<String, ProviderError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| ProviderError::Decode {
        provider,
        reason: e.to_string(),
    })?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|content| content.trim().to_string())
        .ok_or(ProviderError::Empty { provider })
}

/// Create a completion client from config.
pub fn from_config(config: &CompletionConfig) -> Result<Arc<dyn CompletionClient>, ConfigError> {
    let api_key = config.require_api_key()?;

    let (provider, default_base): (&'static str, &str) = match config.provider.as_str() {
        "groq" => ("groq", GROQ_BASE_URL),
        "openai" => ("openai", OPENAI_BASE_URL),
        other => {
            return Err(ConfigError::Invalid(format!(
                "unknown completion provider: {other}"
            )));
        }
    };

    Ok(Arc::new(ChatCompletionsClient::new(
        provider,
        config.base_url.as_deref().unwrap_or(default_base),
        api_key,
        config.model.clone(),
        Duration::from_secs(config.timeout_secs),
    )?))
}
