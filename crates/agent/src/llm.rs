use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use innkeep_core::config::{LlmConfig, LlmProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation request failed: {0}")]
    Request(String),
    #[error("generation returned no text")]
    EmptyResponse,
    #[error("text generation is disabled")]
    Disabled,
}

/// Text generation capability. Only ever used for free-form answers; prices, dates and
/// booking state never come from here.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Runs `generate` under a deadline so a slow provider only costs the current turn its
/// generated text.
pub async fn generate_with_timeout(
    client: &dyn LlmClient,
    prompt: &str,
    timeout: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(timeout, client.generate(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(timeout)),
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledLlm;

#[async_trait]
impl LlmClient for DisabledLlm {
    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Disabled)
    }
}

/// Chat-completions client for OpenAI and for Ollama's OpenAI-compatible endpoint.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
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
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
        max_retries: u32,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            max_retries,
        }
    }

    async fn send_once(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: 0.2,
        };

        let mut builder =
            self.http.post(format!("{}/chat/completions", self.base_url)).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response =
            builder.send().await.map_err(|error| LlmError::Request(error.to_string()))?;
        if !response.status().is_success() {
            return Err(LlmError::Request(format!(
                "completion endpoint returned {}",
                response.status()
            )));
        }

        let body: ChatResponse = response.json().await.map_err(|error| {
            LlmError::Request(format!("failed to decode completion response: {error}"))
        })?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.send_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(LlmError::Request(message)) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::debug!(
                        event_name = "llm.request.retry",
                        attempt,
                        error = %message,
                        "retrying completion request"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }
}

pub fn client_from_config(config: &LlmConfig) -> Arc<dyn LlmClient> {
    match config.provider {
        LlmProvider::Disabled => Arc::new(DisabledLlm),
        LlmProvider::OpenAi => Arc::new(OpenAiCompatibleClient::new(
            config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            config.model.clone(),
            config.api_key.clone(),
            config.max_retries,
        )),
        LlmProvider::Ollama => {
            let base_url = config.base_url.clone().unwrap_or_default();
            Arc::new(OpenAiCompatibleClient::new(
                format!("{}/v1", base_url.trim_end_matches('/')),
                config.model.clone(),
                None,
                config.max_retries,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{generate_with_timeout, DisabledLlm, LlmClient, LlmError};

    struct SlowLlm;

    #[async_trait]
    impl LlmClient for SlowLlm {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test]
    async fn slow_generation_times_out() {
        let result = generate_with_timeout(&SlowLlm, "hello", Duration::from_millis(20)).await;
        assert!(matches!(result, Err(LlmError::Timeout(_))));
    }

    #[tokio::test]
    async fn disabled_client_never_generates() {
        let result = generate_with_timeout(&DisabledLlm, "hello", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(LlmError::Disabled)));
    }
}
