use super::{base::Provider, configs::ProviderConfig, openai::OpenAiProvider};
use crate::errors::ProviderError;
use std::sync::Arc;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(EnumIter, EnumString, Display, Debug, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum ProviderType {
    OpenAi,
    DeepSeek,
}

impl ProviderConfig {
    pub fn provider_type(&self) -> ProviderType {
        match self {
            ProviderConfig::OpenAi(_) => ProviderType::OpenAi,
            ProviderConfig::DeepSeek(_) => ProviderType::DeepSeek,
        }
    }
}

pub fn get_provider(config: ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    match config {
        // DeepSeek speaks the same chat-completions protocol
        ProviderConfig::OpenAi(config) | ProviderConfig::DeepSeek(config) => {
            Ok(Arc::new(OpenAiProvider::new(config)?))
        }
    }
}
