pub mod openai;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, LlmConfig};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Sampling knobs sent with every completion. `max_tokens` is never set, so
/// the server decides when to stop.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repetition_penalty: f32,
    pub stop: Vec<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.6,
            top_k: 70,
            repetition_penalty: 1.2,
            stop: vec!["<|eot_id|>".into(), "<|eom_id|>".into()],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub sampling: SamplingParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub delta: String,
    pub done: bool,
}

/// Anything that can turn a chat request into a complete reply.
///
/// The caller always waits for the whole reply, even when the transport
/// streams it.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// Hosted backends. All of them speak the OpenAI-compatible wire format.
#[derive(Debug, Clone)]
pub enum Provider {
    Together(openai::OpenAiConfig),
    OpenAi(openai::OpenAiConfig),
    Ollama(openai::OpenAiConfig),
}

impl Provider {
    pub fn together(api_key: String) -> Self {
        Provider::Together(openai::OpenAiConfig {
            api_key,
            base_url: "https://api.together.xyz/v1".to_string(),
        })
    }

    pub fn openai(api_key: String) -> Self {
        Provider::OpenAi(openai::OpenAiConfig {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
        })
    }

    pub fn ollama(host: String) -> Self {
        Provider::Ollama(openai::OpenAiConfig {
            api_key: String::new(),
            base_url: format!("{}/v1", host.trim_end_matches('/')),
        })
    }

    /// Pick the backend named in `[llm]`, resolving its key from the file or
    /// the provider's environment variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self, ConfigError> {
        let mut provider = match config.provider.as_str() {
            "together" => Provider::together(config.resolve_api_key()?),
            "openai" => Provider::openai(config.resolve_api_key()?),
            "ollama" => Provider::ollama(
                config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string()),
            ),
            other => return Err(ConfigError::UnknownProvider(other.to_string())),
        };
        if let (Some(base_url), Provider::Together(c) | Provider::OpenAi(c)) =
            (&config.base_url, &mut provider)
        {
            c.base_url = base_url.trim_end_matches('/').to_string();
        }
        Ok(provider)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Together(_) => "together",
            Provider::OpenAi(_) => "openai",
            Provider::Ollama(_) => "ollama",
        }
    }

    pub fn config(&self) -> &openai::OpenAiConfig {
        match self {
            Provider::Together(c) | Provider::OpenAi(c) | Provider::Ollama(c) => c,
        }
    }

    pub async fn chat_stream(
        &self,
        request: &ChatRequest,
        on_chunk: impl Fn(StreamChunk) + Send,
    ) -> Result<String, LlmError> {
        openai::chat_stream(self.config(), request, on_chunk).await
    }
}

#[async_trait]
impl ChatModel for Provider {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        tracing::debug!(
            provider = self.name(),
            model = %request.model,
            messages = request.messages.len(),
            "Opening completion stream"
        );
        let output = self
            .chat_stream(request, |chunk: StreamChunk| {
                if !chunk.done {
                    tracing::trace!(delta = %chunk.delta, "Stream delta");
                }
            })
            .await?;
        tracing::debug!(chars = output.len(), "Completion stream finished");
        Ok(output)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    /// The server reported an error inside an already-open stream.
    #[error("Stream error: {0}")]
    Stream(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sampling_matches_hosted_settings() {
        let p = SamplingParams::default();
        assert_eq!(p.top_k, 70);
        assert_eq!(p.stop, vec!["<|eot_id|>", "<|eom_id|>"]);
    }

    #[test]
    fn test_ollama_base_url() {
        let p = Provider::ollama("http://localhost:11434/".into());
        assert_eq!(p.config().base_url, "http://localhost:11434/v1");
        assert!(p.config().api_key.is_empty());
    }

    #[test]
    fn test_from_config_overrides_base_url() {
        let config = LlmConfig {
            provider: "openai".into(),
            api_key: Some("sk-test".into()),
            base_url: Some("http://proxy.local/v1/".into()),
            ..LlmConfig::default()
        };
        let p = Provider::from_config(&config).unwrap();
        assert_eq!(p.name(), "openai");
        assert_eq!(p.config().base_url, "http://proxy.local/v1");
        assert_eq!(p.config().api_key, "sk-test");
    }

    #[test]
    fn test_from_config_unknown_provider() {
        let config = LlmConfig {
            provider: "carrier-pigeon".into(),
            ..LlmConfig::default()
        };
        assert!(matches!(
            Provider::from_config(&config),
            Err(ConfigError::UnknownProvider(p)) if p == "carrier-pigeon"
        ));
    }
}
