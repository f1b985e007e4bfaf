use serde::{Deserialize, Serialize};

pub const OPENAI_HOST: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEEPSEEK_HOST: &str = "https://api.deepseek.com/v1";
pub const DEEPSEEK_MODEL: &str = "deepseek-chat";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// Unified enum to wrap different provider configurations
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    DeepSeek(OpenAiProviderConfig),
}

/// Settings for an OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    /// Base URL including the API version, e.g. `https://api.openai.com/v1`
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl OpenAiProviderConfig {
    pub fn openai<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: OPENAI_HOST.to_string(),
            api_key: api_key.into(),
            model: OPENAI_MODEL.to_string(),
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: None,
        }
    }

    pub fn deepseek<S: Into<String>>(api_key: S) -> Self {
        Self {
            host: DEEPSEEK_HOST.to_string(),
            model: DEEPSEEK_MODEL.to_string(),
            ..Self::openai(api_key)
        }
    }

    pub fn with_host<S: Into<String>>(mut self, host: S) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.host.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_defaults() {
        let openai = OpenAiProviderConfig::openai("key");
        assert_eq!(openai.endpoint(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(openai.model, "gpt-4o-mini");
        assert_eq!(openai.temperature, Some(0.7));

        let deepseek = OpenAiProviderConfig::deepseek("key");
        assert_eq!(deepseek.endpoint(), "https://api.deepseek.com/v1/chat/completions");
        assert_eq!(deepseek.model, "deepseek-chat");
        assert_eq!(deepseek.api_key, "key");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = OpenAiProviderConfig::openai("key").with_host("http://localhost:9000/v1/");
        assert_eq!(config.endpoint(), "http://localhost:9000/v1/chat/completions");
    }
}
