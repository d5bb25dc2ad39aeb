//! OpenRouter chat-completions client.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

use super::{ChatMessage, GenerationBackend};
use crate::config::BackendConfig;
use crate::error::{RelayError, Result};

/// Client for an OpenAI-compatible chat-completions endpoint, by default
/// OpenRouter.
pub struct OpenRouterBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    referer: String,
    title: String,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenRouterBackend {
    /// Create a backend from configuration.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| RelayError::Config("backend API key is not set".to_string()))?;

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            referer: config.referer.clone(),
            title: config.title.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl GenerationBackend for OpenRouterBackend {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let start = Instant::now();
        let request = CompletionRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Backend returned an error");
            return Err(RelayError::Backend {
                status: Some(status.as_u16()),
                message: error_text,
            });
        }

        let body: CompletionResponse = response.json().await.map_err(|e| RelayError::Backend {
            status: Some(status.as_u16()),
            message: format!("Failed to parse response: {}", e),
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RelayError::Backend {
                status: Some(status.as_u16()),
                message: "response contained no message content".to_string(),
            })?;

        debug!(
            model = %self.model,
            messages = messages.len(),
            reply_chars = content.chars().count(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Generation completed"
        );

        Ok(content)
    }
}
