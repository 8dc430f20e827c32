//! HTTP chat providers for the analyzer.
//!
//! - [`OpenAIChat`]: `POST {url}/chat/completions` with
//!   `response_format = {"type": "json_object"}`.
//! - [`OllamaChat`]: `POST {url}/api/chat` with `format = "json"` and
//!   streaming off.
//! - [`DisabledChat`]: always errors, so every sub-report carries an
//!   `error` key.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::json;

use neurashield_core::analysis::ChatModel;
use neurashield_core::prompts::RenderedPrompt;

use crate::config::LlmConfig;
use crate::embedding::{api_key_from_env, http_client, post_json_with_retry};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn complete(&self, _prompt: &RenderedPrompt) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}

pub struct OpenAIChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &LlmConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base_url(config, OPENAI_BASE_URL),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "temperature": self.temperature,
            "response_format": {"type": "json_object"},
        });
        let reply = post_json_with_retry("OpenAI chat", 0, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        reply
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
    }
}

pub struct OllamaChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            base_url: base_url(config, OLLAMA_BASE_URL),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &RenderedPrompt) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "format": "json",
            "stream": false,
            "options": {"temperature": self.temperature},
        });
        let reply = post_json_with_retry("Ollama chat", 0, || self.client.post(&url).json(&body)).await?;

        reply
            .pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
    }
}

fn base_url(config: &LlmConfig, default: &str) -> String {
    config
        .url
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// Create the chat model named by `llm.provider`. Fails fast when the
/// OpenAI credential is missing.
pub fn create_chat(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledChat)),
        "openai" => Ok(Box::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        other => bail!("Unknown LLM provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_chat_errors() {
        let prompt = RenderedPrompt {
            system: "s".into(),
            user: "u".into(),
        };
        assert!(DisabledChat.complete(&prompt).await.is_err());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = LlmConfig {
            provider: "mystery".into(),
            ..LlmConfig::default()
        };
        assert!(create_chat(&config).is_err());
    }

    #[test]
    fn base_url_trims_trailing_slash() {
        let config = LlmConfig {
            url: Some("http://127.0.0.1:9999/v1/".into()),
            ..LlmConfig::default()
        };
        assert_eq!(base_url(&config, OPENAI_BASE_URL), "http://127.0.0.1:9999/v1");
    }
}
