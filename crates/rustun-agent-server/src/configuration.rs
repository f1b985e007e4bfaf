use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment, File, FileFormat};
use rustun_agent::agent::MAX_ITERATIONS;
use rustun_agent::providers::configs::{
    OpenAiProviderConfig, ProviderConfig, DEEPSEEK_HOST, DEEPSEEK_MODEL, DEFAULT_TEMPERATURE,
    OPENAI_HOST, OPENAI_MODEL,
};
use rustun_agent::resources::NetworkConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Names the optional TOML settings file
pub const CONFIG_FILE_ENV: &str = "RUSTUN_AGENT_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "rustun-agent.toml";

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|e: std::net::AddrParseError| ConfigError::InvalidAddress {
            message: e.to_string(),
            addr,
        })
    }
}

#[derive(Debug, Deserialize)]
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
        max_tokens: Option<i32>,
    },
    DeepSeek {
        #[serde(default = "default_deepseek_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_deepseek_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
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
                temperature: temperature.or(Some(DEFAULT_TEMPERATURE)),
                max_tokens,
            }),
            ProviderSettings::DeepSeek {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::DeepSeek(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature: temperature.or(Some(DEFAULT_TEMPERATURE)),
                max_tokens,
            }),
        }
    }
}

/// Where client records live
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum StorageSettings {
    Memory,
    File {
        #[serde(default = "default_routes_file")]
        path: PathBuf,
    },
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings::File {
            path: default_routes_file(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Replaces the bundled knowledge base
    #[serde(default)]
    pub knowledge_path: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            knowledge_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub agent: AgentSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                env_var: "RUSTUN_AGENT_AGENT__MAX_ITERATIONS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(self)
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config_file = std::env::var(CONFIG_FILE_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Optional settings file
            .add_source(File::new(&config_file, FileFormat::Toml).required(false))
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("RUSTUN_AGENT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        match config.try_deserialize::<Self>() {
            Ok(settings) => settings.validate(),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                // Handle both NotFound and missing field message variants
                let error_str = err.to_string();
                if let Some(field) = missing_field(&error_str) {
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
}

/// Field name from a message like "missing field `type`"
fn missing_field(message: &str) -> Option<&str> {
    let (_, rest) = message.split_once("missing field `")?;
    rest.split('`').next()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_openai_model() -> String {
    OPENAI_MODEL.to_string()
}

fn default_deepseek_host() -> String {
    DEEPSEEK_HOST.to_string()
}

fn default_deepseek_model() -> String {
    DEEPSEEK_MODEL.to_string()
}

fn default_routes_file() -> PathBuf {
    PathBuf::from("routes.json")
}

fn default_max_iterations() -> usize {
    MAX_ITERATIONS
}
