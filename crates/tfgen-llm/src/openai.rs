//! OpenAI-compatible chat-completion client.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::{ChatClient, ChatTurn, LlmError};

/// Connection settings, normally loaded from the environment.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
            timeout: Duration::from_secs(60),
        }
    }
}

impl OpenAiConfig {
    /// Read `OPENAI_API_BASE`, `OPENAI_API_KEY`, `OPENAI_MODEL_NAME`,
    /// `OPENAI_TIMEOUT_SECS` with the usual defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base) = std::env::var("OPENAI_API_BASE") {
            config.base_url = base;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.api_key = key;
        }
        if let Ok(model) = std::env::var("OPENAI_MODEL_NAME") {
            config.model = model;
        }
        if let Ok(secs) = std::env::var("OPENAI_TIMEOUT_SECS") {
            if let Ok(secs) = secs.parse::<u64>() {
                config.timeout = Duration::from_secs(secs);
            }
        }
        config
    }
}

/// Client for any endpoint speaking the `/chat/completions` dialect.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("reqwest client");
        Self { config, client }
    }

    pub fn from_env() -> Self {
        Self::new(OpenAiConfig::from_env())
    }
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn chat(&self, messages: &[ChatTurn]) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "model": self.config.model,
                "messages": messages,
                "temperature": self.config.temperature,
                "max_tokens": self.config.max_tokens,
            }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Http(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Http(format!("{status}: {body}")));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::Empty)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OpenAiConfig::default();
        assert_eq!(config.model, "gpt-4");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_model_name() {
        let client = OpenAiClient::new(OpenAiConfig {
            model: "gpt-4o-mini".into(),
            ..OpenAiConfig::default()
        });
        assert_eq!(client.model_name(), "gpt-4o-mini");
    }
}
