use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::context::{DEFAULT_MAX_CHARS, DEFAULT_MAX_TURNS};
use crate::llm::SamplingParams;
use crate::router::DEFAULT_REQUIRED_COLUMN;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{provider} API key not configured (set llm.api_key or {env})")]
    MissingApiKey { provider: String, env: String },
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

/// Application settings, loaded from `~/.config/docchat/config.toml` by
/// default. Every section falls back to its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub plot: PlotConfig,
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("docchat").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Missing file means defaults. A broken file also means defaults, and
    /// the error comes back alongside them so it can be reported once logging
    /// is up.
    pub fn load_or_default(path: &Path) -> (Self, Option<ConfigError>) {
        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// trace, debug, info, warn or error. `RUST_LOG` wins when set.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// together, openai or ollama.
    pub provider: String,
    pub model: String,
    /// Overrides the provider's endpoint. For ollama this is the host.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repetition_penalty: f32,
    pub stop: Vec<String>,
    /// Ask the model for a description when an image is opened.
    pub describe_images: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let sampling = SamplingParams::default();
        Self {
            provider: "together".to_string(),
            model: "meta-llama/Llama-3.2-11B-Vision-Instruct-Turbo".to_string(),
            base_url: None,
            api_key: None,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            top_k: sampling.top_k,
            repetition_penalty: sampling.repetition_penalty,
            stop: sampling.stop,
            describe_images: true,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_deref().map(mask_key))
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("top_k", &self.top_k)
            .field("repetition_penalty", &self.repetition_penalty)
            .field("stop", &self.stop)
            .field("describe_images", &self.describe_images)
            .finish()
    }
}

impl LlmConfig {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repetition_penalty: self.repetition_penalty,
            stop: self.stop.clone(),
        }
    }

    /// Environment variable consulted when no key is in the file.
    pub fn api_key_env(&self) -> String {
        format!("{}_API_KEY", self.provider.to_uppercase())
    }

    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Ok(key.clone());
        }
        let env = self.api_key_env();
        std::env::var(&env)
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey {
                provider: self.provider.clone(),
                env,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Exchanges carried into each text prompt.
    pub max_history_turns: usize,
    /// Trailing characters of document text carried into each text prompt.
    pub max_context_chars: usize,
    pub max_upload_bytes: u64,
    pub preview_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history_turns: DEFAULT_MAX_TURNS,
            max_context_chars: DEFAULT_MAX_CHARS,
            max_upload_bytes: 50 * 1024 * 1024,
            preview_chars: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    /// Column a table must have before any plot request is sent.
    pub required_column: String,
    pub interpreter: String,
    pub timeout_secs: u64,
    pub memory_limit_mb: u64,
    pub output_dir: PathBuf,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            required_column: DEFAULT_REQUIRED_COLUMN.to_string(),
            interpreter: "python3".to_string(),
            timeout_secs: 30,
            memory_limit_mb: 2048,
            output_dir: PathBuf::from("charts"),
        }
    }
}

/// `sk-a...wxyz` style masking for logs and debug output.
pub fn mask_key(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        "****".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, "together");
        assert_eq!(config.session.max_history_turns, 5);
        assert_eq!(config.session.max_context_chars, 1000);
        assert_eq!(config.plot.required_column, "engagement_rate");
        assert_eq!(config.plot.memory_limit_mb, 2048);
        assert_eq!(config.plot.timeout_secs, 30);
        assert_eq!(config.llm.sampling(), SamplingParams::default());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [llm]
            provider = "ollama"
            model = "llama3"

            [plot]
            required_column = "revenue"
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.top_k, 70);
        assert_eq!(config.plot.required_column, "revenue");
        assert_eq!(config.plot.timeout_secs, 30);
        assert_eq!(config.session.preview_chars, 500);
    }

    #[test]
    fn test_load_or_default_reports_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[llm\nprovider =").unwrap();

        let (config, err) = AppConfig::load_or_default(&path);
        assert_eq!(config.llm.provider, "together");
        assert!(matches!(err, Some(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_or_default_missing_and_valid_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let (config, err) = AppConfig::load_or_default(&path);
        assert!(err.is_none());
        assert_eq!(config.llm.provider, "together");

        std::fs::write(&path, "[llm]\nprovider = \"openai\"\n").unwrap();
        let (config, err) = AppConfig::load_or_default(&path);
        assert!(err.is_none());
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn test_api_key_from_file_wins() {
        let config = LlmConfig {
            api_key: Some("from-file".into()),
            ..LlmConfig::default()
        };
        assert_eq!(config.resolve_api_key().unwrap(), "from-file");
    }

    #[test]
    fn test_missing_api_key_names_env_var() {
        let config = LlmConfig {
            provider: "nonexistent-provider-xyz".into(),
            ..LlmConfig::default()
        };
        let err = config.resolve_api_key().unwrap_err();
        assert!(err
            .to_string()
            .contains("NONEXISTENT-PROVIDER-XYZ_API_KEY"));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-1234567890abcd"), "sk-1...abcd");
        assert_eq!(mask_key("short"), "****");
        assert_eq!(mask_key(""), "");
        let debug = format!(
            "{:?}",
            LlmConfig {
                api_key: Some("sk-1234567890abcd".into()),
                ..LlmConfig::default()
            }
        );
        assert!(!debug.contains("1234567890"));
    }
}
