use thiserror::Error;

pub const ENV_PREFIX: &str = "TOOLSMITH";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting, set it with the environment variable {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a settings field.
///
/// Bare field names come from the provider section, the only one with
/// required fields.
pub fn to_env_var(field: &str) -> String {
    let path = match field {
        "provider" => "provider.type".to_string(),
        field if field.contains('.') => field.to_string(),
        field => format!("provider.{}", field),
    };
    format!("{}_{}", ENV_PREFIX, path.replace('.', "__").to_uppercase())
}
