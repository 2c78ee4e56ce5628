use std::fmt;
use std::str::FromStr;

use super::{
    anthropic::AnthropicProvider, base::Provider, configs::ProviderConfig,
    openai::OpenAiProvider,
};
use anyhow::{anyhow, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    OpenAi,
    Anthropic,
}

impl ProviderType {
    pub const ALL: [ProviderType; 2] = [ProviderType::OpenAi, ProviderType::Anthropic];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAi => "openai",
            ProviderType::Anthropic => "anthropic",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAi),
            "anthropic" => Ok(ProviderType::Anthropic),
            other => Err(anyhow!(
                "Unknown provider '{}', expected one of: openai, anthropic",
                other
            )),
        }
    }
}

impl From<&ProviderConfig> for ProviderType {
    fn from(config: &ProviderConfig) -> Self {
        match config {
            ProviderConfig::OpenAi(_) => ProviderType::OpenAi,
            ProviderConfig::Anthropic(_) => ProviderType::Anthropic,
        }
    }
}

pub fn get_provider(config: ProviderConfig) -> Result<Box<dyn Provider>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Box::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Anthropic(anthropic_config) => {
            Ok(Box::new(AnthropicProvider::new(anthropic_config)?))
        }
    }
}
