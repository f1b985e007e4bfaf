use anyhow::Context;
use rustun_agent::agent::Agent;
use rustun_agent::prompt_template::{load_knowledge, system_prompt};
use rustun_agent::providers::factory::get_provider;
use rustun_agent::registry::ToolRegistry;
use rustun_agent::resources::{JsonFileStore, MemoryStore, RouteManager, RouteStore};
use std::sync::Arc;
use tracing::info;

use crate::configuration::{Settings, StorageSettings};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: Agent,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        Self { agent }
    }

    /// Wires the provider, storage and tools described by `settings` into one agent
    pub async fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let store: Arc<dyn RouteStore> = match &settings.storage {
            StorageSettings::Memory => Arc::new(MemoryStore::new()),
            StorageSettings::File { path } => {
                info!(path = %path.display(), "using routes file");
                Arc::new(JsonFileStore::new(path))
            }
        };
        let manager = RouteManager::load(store, settings.network.clone())
            .await
            .context("failed to load client records")?;
        let registry = Arc::new(ToolRegistry::new(Arc::new(manager)));

        let knowledge = load_knowledge(settings.agent.knowledge_path.as_deref())
            .context("failed to read knowledge base")?;
        let prompt = system_prompt(registry.list(), &settings.network, &knowledge)
            .context("failed to render system prompt")?;

        let provider_config = settings.provider.into_config();
        info!(provider = %provider_config.provider_type(), "configured provider");
        let provider = get_provider(provider_config)?;

        let agent = Agent::new(provider, registry, prompt)
            .with_max_iterations(settings.agent.max_iterations);
        Ok(Self::new(agent))
    }
}
