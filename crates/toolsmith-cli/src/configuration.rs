use crate::error::{to_env_var, ConfigError, ENV_PREFIX};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use toolsmith::agent::{AgentConfig, DEFAULT_MAX_STEPS};
use toolsmith::providers::configs::{
    AnthropicProviderConfig, OpenAiProviderConfig, ProviderConfig, ANTHROPIC_DEFAULT_HOST,
    ANTHROPIC_DEFAULT_MAX_TOKENS, ANTHROPIC_DEFAULT_MODEL, OPENAI_DEFAULT_HOST,
    OPENAI_DEFAULT_MODEL,
};
use toolsmith::providers::factory::ProviderType;
use toolsmith::providers::retry::{RetryConfig, DEFAULT_MAX_RETRIES};
use toolsmith::synthesizer::SandboxPolicy;

/// Settings file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_NAME: &str = "toolsmith";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<u32>,
    },
    Anthropic {
        #[serde(default = "default_anthropic_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default = "default_anthropic_max_tokens")]
        max_tokens: u32,
    },
}

impl ProviderSettings {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderSettings::OpenAi { .. } => ProviderType::OpenAi,
            ProviderSettings::Anthropic { .. } => ProviderType::Anthropic,
        }
    }

    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
            ProviderSettings::Anthropic {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::Anthropic(AnthropicProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Upper bound for one tool invocation, in seconds
    #[serde(default)]
    pub tool_timeout_secs: Option<u64>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            system_prompt: None,
            tool_timeout_secs: None,
        }
    }
}

impl AgentSettings {
    pub fn to_config(&self, sandbox: SandboxPolicy) -> AgentConfig {
        let mut config = AgentConfig {
            max_steps: self.max_steps,
            tool_timeout: self.tool_timeout_secs.map(Duration::from_secs),
            sandbox,
            ..AgentConfig::default()
        };
        if let Some(prompt) = &self.system_prompt {
            config.system_prompt = prompt.clone();
        }
        config
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

impl RetrySettings {
    pub fn to_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_retries,
            Duration::from_millis(self.initial_backoff_ms),
        )
    }
}

/// Command line values that take precedence over files and the environment
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub provider: Option<ProviderType>,
    pub model: Option<String>,
    pub max_steps: Option<usize>,
    pub allow_network: bool,
    pub allow_fs: Option<PathBuf>,
}

impl Overrides {
    fn apply(
        &self,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
        let mut builder = builder;
        if let Some(provider) = self.provider {
            builder = builder.set_override("provider.type", provider.as_str())?;
        }
        if let Some(model) = &self.model {
            builder = builder.set_override("provider.model", model.as_str())?;
        }
        if let Some(max_steps) = self.max_steps {
            builder = builder.set_override("agent.max_steps", max_steps as i64)?;
        }
        if self.allow_network {
            builder = builder.set_override("sandbox.allow_network", true)?;
        }
        if let Some(root) = &self.allow_fs {
            builder = builder
                .set_override("sandbox.allow_fs_read", true)?
                .set_override("sandbox.allow_fs_write", true)?
                .set_override("sandbox.fs_root", root.to_string_lossy().to_string())?;
        }
        Ok(builder)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub sandbox: SandboxPolicy,
}

impl Settings {
    /// Defaults, then the settings file, then `TOOLSMITH_*` variables, then
    /// command line overrides
    pub fn load(overrides: &Overrides) -> Result<Self, ConfigError> {
        let file = match &overrides.config_file {
            Some(path) => File::from(path.as_path()).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let builder = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        let config = overrides.apply(builder)?.build()?;

        match config.try_deserialize::<Self>() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let message = err.to_string();
                if let Some(field) = missing_field(&message) {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }

    pub fn provider_config(&self) -> ProviderConfig {
        self.provider.clone().into_config()
    }
}

/// Field name out of serde's "missing field `name`" message
fn missing_field(message: &str) -> Option<&str> {
    let rest = message.split("missing field `").nth(1)?;
    rest.split('`').next()
}

fn default_openai_host() -> String {
    OPENAI_DEFAULT_HOST.to_string()
}

fn default_openai_model() -> String {
    OPENAI_DEFAULT_MODEL.to_string()
}

fn default_anthropic_host() -> String {
    ANTHROPIC_DEFAULT_HOST.to_string()
}

fn default_anthropic_model() -> String {
    ANTHROPIC_DEFAULT_MODEL.to_string()
}

fn default_anthropic_max_tokens() -> u32 {
    ANTHROPIC_DEFAULT_MAX_TOKENS
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff_ms() -> u64 {
    1000
}
