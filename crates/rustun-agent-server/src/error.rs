use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },
    #[error("Invalid value for {env_var}: {message}")]
    InvalidValue { env_var: String, message: String },
    #[error("Invalid server address {addr}: {message}")]
    InvalidAddress { addr: String, message: String },
    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Maps a dotted settings key to the environment variable that sets it
pub fn to_env_var(field_path: &str) -> String {
    // bare field names come from the provider section
    let normalized_path = if field_path == "type" {
        "provider.type".to_string()
    } else if field_path.starts_with("provider.") {
        field_path.to_string()
    } else {
        format!("provider.{}", field_path)
    };

    format!(
        "RUSTUN_AGENT_{}",
        normalized_path.replace('.', "__").to_uppercase()
    )
}
