use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ipam::{IpAllocator, NetworkConfig};
use super::store::RouteStore;
use crate::errors::ResourceResult;
use crate::models::client::{Client, ClientPatch, Cluster, NewClient};

/// The management operations the agent's tools act on.
///
/// Implementations are shared by concurrent tool dispatches and must be internally safe.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    async fn list_clusters(&self) -> ResourceResult<Vec<Cluster>>;

    /// All clients, or only those in `cluster` when given
    async fn list_clients(&self, cluster: Option<&str>) -> ResourceResult<Vec<Client>>;

    async fn get_client(&self, cluster: &str, identity: &str) -> ResourceResult<Client>;

    async fn create_client(&self, request: NewClient) -> ResourceResult<Client>;

    async fn update_client(
        &self,
        cluster: &str,
        identity: &str,
        patch: ClientPatch,
    ) -> ResourceResult<Client>;

    async fn delete_client(&self, cluster: &str, identity: &str) -> ResourceResult<()>;
}

/// Client management over a [`RouteStore`] with addresses from an [`IpAllocator`].
pub struct RouteManager {
    store: Arc<dyn RouteStore>,
    allocator: IpAllocator,
}

impl RouteManager {
    pub fn new(store: Arc<dyn RouteStore>, allocator: IpAllocator) -> Self {
        Self { store, allocator }
    }

    /// Builds a manager whose allocator already knows every stored address
    pub async fn load(store: Arc<dyn RouteStore>, network: NetworkConfig) -> ResourceResult<Self> {
        let allocator = IpAllocator::new(network)?;
        let existing = store.all().await?;
        allocator.seed(&existing);
        info!(clients = existing.len(), "loaded existing clients");
        Ok(Self::new(store, allocator))
    }

    pub fn allocator(&self) -> &IpAllocator {
        &self.allocator
    }
}

/// An allocated address that goes back to the pool on drop unless kept.
///
/// A create that fails or is dropped before its client is stored leaves no address behind.
struct Reservation<'a> {
    allocator: &'a IpAllocator,
    cluster: String,
    ip: String,
    kept: bool,
}

impl<'a> Reservation<'a> {
    fn new(allocator: &'a IpAllocator, cluster: &str, ip: String) -> Self {
        Self {
            allocator,
            cluster: cluster.to_string(),
            ip,
            kept: false,
        }
    }

    fn keep(mut self) {
        self.kept = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.kept {
            debug!(cluster = %self.cluster, ip = %self.ip, "releasing unused address");
            self.allocator.release(&self.cluster, &self.ip);
        }
    }
}

#[async_trait]
impl ResourceManager for RouteManager {
    async fn list_clusters(&self) -> ResourceResult<Vec<Cluster>> {
        self.store.clusters().await
    }

    async fn list_clients(&self, cluster: Option<&str>) -> ResourceResult<Vec<Client>> {
        match cluster {
            Some(cluster) => self.store.by_cluster(cluster).await,
            None => self.store.all().await,
        }
    }

    async fn get_client(&self, cluster: &str, identity: &str) -> ResourceResult<Client> {
        self.store.get(cluster, identity).await
    }

    async fn create_client(&self, request: NewClient) -> ResourceResult<Client> {
        let allocation = self.allocator.allocate(&request.cluster)?;
        let reservation =
            Reservation::new(&self.allocator, &request.cluster, allocation.ip.to_string());
        let client = Client {
            identity: Uuid::new_v4().to_string(),
            name: request.name.unwrap_or_default(),
            private_ip: allocation.ip.to_string(),
            mask: allocation.mask,
            gateway: allocation.gateway,
            routes: request.routes.unwrap_or_default(),
            cluster: request.cluster,
        };

        if let Err(err) = self.store.create(client.clone()).await {
            warn!(cluster = %client.cluster, error = %err, "store rejected client, releasing address");
            return Err(err);
        }
        reservation.keep();

        info!(cluster = %client.cluster, identity = %client.identity, ip = %client.private_ip, "created client");
        Ok(client)
    }

    async fn update_client(
        &self,
        cluster: &str,
        identity: &str,
        patch: ClientPatch,
    ) -> ResourceResult<Client> {
        let mut client = self.store.get(cluster, identity).await?;
        patch.apply(&mut client);
        self.store.update(cluster, identity, client.clone()).await?;
        Ok(client)
    }

    async fn delete_client(&self, cluster: &str, identity: &str) -> ResourceResult<()> {
        let client = self.store.get(cluster, identity).await?;
        self.store.delete(cluster, identity).await?;
        self.allocator.release(cluster, &client.private_ip);
        info!(cluster, identity, ip = %client.private_ip, "deleted client");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ResourceError;
    use crate::resources::store::tests::client;
    use crate::resources::store::MemoryStore;

    struct FailingStore;

    #[async_trait]
    impl RouteStore for FailingStore {
        async fn all(&self) -> ResourceResult<Vec<Client>> {
            Ok(vec![])
        }

        async fn create(&self, _client: Client) -> ResourceResult<()> {
            Err(ResourceError::Storage("disk full".to_string()))
        }

        async fn update(&self, _: &str, _: &str, _: Client) -> ResourceResult<()> {
            Ok(())
        }

        async fn delete(&self, _: &str, _: &str) -> ResourceResult<()> {
            Ok(())
        }
    }

    /// Store whose writes never complete
    struct StalledStore;

    #[async_trait]
    impl RouteStore for StalledStore {
        async fn all(&self) -> ResourceResult<Vec<Client>> {
            Ok(vec![])
        }

        async fn create(&self, _client: Client) -> ResourceResult<()> {
            futures::future::pending().await
        }

        async fn update(&self, _: &str, _: &str, _: Client) -> ResourceResult<()> {
            Ok(())
        }

        async fn delete(&self, _: &str, _: &str) -> ResourceResult<()> {
            Ok(())
        }
    }

    async fn manager() -> RouteManager {
        let store = Arc::new(MemoryStore::with_clients(vec![client(
            "office",
            "existing",
            "10.12.0.10",
        )]));
        RouteManager::load(store, NetworkConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_derives_identity_and_address() -> anyhow::Result<()> {
        let manager = manager().await;
        let created = manager
            .create_client(NewClient {
                cluster: "office".to_string(),
                name: Some("NAS".to_string()),
                routes: Some(vec!["192.168.1.0/24".to_string()]),
            })
            .await?;

        assert!(Uuid::parse_str(&created.identity).is_ok());
        // .10 is taken by the seeded client
        assert_eq!(created.private_ip, "10.12.0.11");
        assert_eq!(created.gateway, "10.12.0.1");
        assert_eq!(created.mask, "255.255.0.0");
        assert_eq!(manager.get_client("office", &created.identity).await?, created);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_releases_address_when_store_fails() -> anyhow::Result<()> {
        let manager = RouteManager::load(Arc::new(FailingStore), NetworkConfig::default()).await?;
        let err = manager
            .create_client(NewClient {
                cluster: "office".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, ResourceError::Storage("disk full".to_string()));
        assert!(!manager.allocator().is_allocated("office", "10.12.0.10"));
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_create_releases_address() -> anyhow::Result<()> {
        let manager = RouteManager::load(Arc::new(StalledStore), NetworkConfig::default()).await?;
        let create = manager.create_client(NewClient {
            cluster: "office".to_string(),
            ..Default::default()
        });
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(50), create).await;
        assert!(timed_out.is_err());
        assert!(!manager.allocator().is_allocated("office", "10.12.0.10"));

        // the next create gets the same first address
        assert_eq!(manager.allocator().allocate("office")?.ip.to_string(), "10.12.0.10");
        Ok(())
    }

    #[tokio::test]
    async fn test_update_only_touches_name_and_routes() -> anyhow::Result<()> {
        let manager = manager().await;
        let updated = manager
            .update_client(
                "office",
                "existing",
                ClientPatch {
                    name: Some("Branch".to_string()),
                    routes: None,
                },
            )
            .await?;
        assert_eq!(updated.name, "Branch");
        assert_eq!(updated.private_ip, "10.12.0.10");
        assert_eq!(updated.routes, Vec::<String>::new());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_releases_address() -> anyhow::Result<()> {
        let manager = manager().await;
        manager.delete_client("office", "existing").await?;
        assert!(!manager.allocator().is_allocated("office", "10.12.0.10"));
        assert!(manager.list_clients(Some("office")).await?.is_empty());

        let err = manager.delete_client("office", "existing").await.unwrap_err();
        assert!(matches!(err, ResourceError::NotFound { .. }));
        Ok(())
    }
}
