//! LLM transport. The model is used strictly as a constrained classifier;
//! prompt construction and label validation live in `classifier`, this
//! module only moves text to a provider and back.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use embudo_core::config::{LlmConfig, LlmProvider};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One classification call. `system` pins the closed answer set, `user`
/// carries the text under classification.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Client that reports the model as unavailable. Keeps the funnel running
/// on local matching plus fail-closed defaults when no provider is set up.
#[derive(Default)]
pub struct NoopLlmClient;

#[async_trait]
impl LlmClient for NoopLlmClient {
    async fn complete(&self, _request: &CompletionRequest) -> Result<String> {
        Err(anyhow!("no llm provider configured"))
    }
}

pub struct HttpLlmClient {
    http: reqwest::Client,
    provider: LlmProvider,
    model: String,
    api_key: Option<SecretString>,
    base_url: String,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building llm http client")?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(HttpLlmClient {
            http,
            provider: config.provider,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
        })
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<String> {
        match self.provider {
            LlmProvider::Anthropic => self.complete_anthropic(request).await,
            // Ollama speaks the same chat-completions dialect.
            LlmProvider::OpenAi | LlmProvider::Ollama => self.complete_chat(request).await,
        }
    }

    async fn complete_anthropic(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self.require_key()?;
        let body = AnthropicRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: &request.system,
            messages: vec![ChatMessage { role: "user", content: &request.user }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .context("anthropic request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("anthropic returned {status}: {body}"));
        }

        let parsed: AnthropicResponse =
            response.json().await.context("decoding anthropic response")?;
        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow!("anthropic response had no text content"))
    }

    async fn complete_chat(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.user },
            ],
        };

        let mut builder = self.http.post(format!("{}/v1/chat/completions", self.base_url));
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder.json(&body).send().await.context("chat completion failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("chat endpoint returned {status}: {body}"));
        }

        let parsed: ChatCompletionResponse =
            response.json().await.context("decoding chat completion")?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| anyhow!("chat completion had no content"))
    }

    fn require_key(&self) -> Result<&SecretString> {
        self.api_key.as_ref().ok_or_else(|| anyhow!("llm api key is not configured"))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.complete_once(request).await {
                Ok(text) => return Ok(text),
                Err(error) => {
                    debug!(attempt, %error, "llm completion attempt failed");
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("llm completion failed")))
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::OpenAi => "https://api.openai.com",
        LlmProvider::Ollama => "http://127.0.0.1:11434",
    }
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use embudo_core::config::{LlmConfig, LlmProvider};

    use super::HttpLlmClient;

    fn config(provider: LlmProvider) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: Some("test-key".to_string().into()),
            base_url: None,
            model: "claude-3-5-haiku-20241022".to_string(),
            timeout_secs: 5,
            max_retries: 1,
        }
    }

    #[test]
    fn base_url_defaults_per_provider() {
        let client = HttpLlmClient::from_config(&config(LlmProvider::Anthropic)).unwrap();
        assert_eq!(client.base_url, "https://api.anthropic.com");

        let client = HttpLlmClient::from_config(&config(LlmProvider::OpenAi)).unwrap();
        assert_eq!(client.base_url, "https://api.openai.com");
    }

    #[test]
    fn configured_base_url_is_trimmed() {
        let mut cfg = config(LlmProvider::Ollama);
        cfg.base_url = Some("http://localhost:11434/".to_string());
        let client = HttpLlmClient::from_config(&cfg).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn missing_key_is_reported() {
        let mut cfg = config(LlmProvider::Anthropic);
        cfg.api_key = None;
        let client = HttpLlmClient::from_config(&cfg).unwrap();
        assert!(client.require_key().is_err());
    }
}
