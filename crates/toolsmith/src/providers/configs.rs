use serde::{Deserialize, Serialize};

pub const OPENAI_DEFAULT_HOST: &str = "https://api.openai.com";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";
pub const ANTHROPIC_DEFAULT_HOST: &str = "https://api.anthropic.com";
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const ANTHROPIC_DEFAULT_MAX_TOKENS: u32 = 4096;

// Unified enum to wrap different provider configurations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    Anthropic(AnthropicProviderConfig),
}

impl ProviderConfig {
    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAi(config) => &config.model,
            ProviderConfig::Anthropic(config) => &config.model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl OpenAiProviderConfig {
    pub fn new<K: Into<String>>(api_key: K) -> Self {
        Self {
            host: OPENAI_DEFAULT_HOST.to_string(),
            api_key: api_key.into(),
            model: OPENAI_DEFAULT_MODEL.to_string(),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnthropicProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    /// Anthropic requires an explicit limit on every request
    pub max_tokens: u32,
}

impl AnthropicProviderConfig {
    pub fn new<K: Into<String>>(api_key: K) -> Self {
        Self {
            host: ANTHROPIC_DEFAULT_HOST.to_string(),
            api_key: api_key.into(),
            model: ANTHROPIC_DEFAULT_MODEL.to_string(),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: ANTHROPIC_DEFAULT_MAX_TOKENS,
        }
    }
}
