use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};

use crate::errors::{ResourceError, ResourceResult};
use crate::models::client::{Client, Cluster};

/// Persistence for client records.
#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn all(&self) -> ResourceResult<Vec<Client>>;

    /// Fails with `Conflict` when the identity already exists in the cluster
    async fn create(&self, client: Client) -> ResourceResult<()>;

    /// Replaces the stored record; cluster and identity of the stored record are kept
    async fn update(&self, cluster: &str, identity: &str, client: Client) -> ResourceResult<()>;

    async fn delete(&self, cluster: &str, identity: &str) -> ResourceResult<()>;

    async fn by_cluster(&self, cluster: &str) -> ResourceResult<Vec<Client>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|client| client.cluster == cluster)
            .collect())
    }

    async fn get(&self, cluster: &str, identity: &str) -> ResourceResult<Client> {
        self.all()
            .await?
            .into_iter()
            .find(|client| client.cluster == cluster && client.identity == identity)
            .ok_or_else(|| not_found(cluster, identity))
    }

    /// Client counts per cluster, sorted by cluster name
    async fn clusters(&self) -> ResourceResult<Vec<Cluster>> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for client in self.all().await? {
            *counts.entry(client.cluster).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(name, client_count)| Cluster { name, client_count })
            .collect())
    }
}

fn not_found(cluster: &str, identity: &str) -> ResourceError {
    ResourceError::NotFound {
        cluster: cluster.to_string(),
        identity: identity.to_string(),
    }
}

fn position(clients: &[Client], cluster: &str, identity: &str) -> Option<usize> {
    clients
        .iter()
        .position(|client| client.cluster == cluster && client.identity == identity)
}

fn insert_client(clients: &mut Vec<Client>, client: Client) -> ResourceResult<()> {
    if position(clients, &client.cluster, &client.identity).is_some() {
        return Err(ResourceError::Conflict {
            cluster: client.cluster,
            identity: client.identity,
        });
    }
    clients.push(client);
    Ok(())
}

fn replace_client(
    clients: &mut [Client],
    cluster: &str,
    identity: &str,
    mut client: Client,
) -> ResourceResult<()> {
    let index = position(clients, cluster, identity).ok_or_else(|| not_found(cluster, identity))?;
    client.cluster = cluster.to_string();
    client.identity = identity.to_string();
    clients[index] = client;
    Ok(())
}

fn remove_client(clients: &mut Vec<Client>, cluster: &str, identity: &str) -> ResourceResult<()> {
    let index = position(clients, cluster, identity).ok_or_else(|| not_found(cluster, identity))?;
    clients.remove(index);
    Ok(())
}

/// Keeps clients in memory; contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    clients: RwLock<Vec<Client>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clients(clients: Vec<Client>) -> Self {
        Self {
            clients: RwLock::new(clients),
        }
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn all(&self) -> ResourceResult<Vec<Client>> {
        Ok(self.clients.read().await.clone())
    }

    async fn create(&self, client: Client) -> ResourceResult<()> {
        insert_client(&mut *self.clients.write().await, client)
    }

    async fn update(&self, cluster: &str, identity: &str, client: Client) -> ResourceResult<()> {
        replace_client(&mut self.clients.write().await, cluster, identity, client)
    }

    async fn delete(&self, cluster: &str, identity: &str) -> ResourceResult<()> {
        remove_client(&mut *self.clients.write().await, cluster, identity)
    }
}

/// Stores clients in a `routes.json` file.
///
/// Every operation holds the lock for its whole read-modify-write cycle. A missing file
/// reads as an empty list and is created on the first write.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> ResourceResult<Vec<Client>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ResourceError::Storage(format!("failed to parse {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ResourceError::Storage(format!(
                "failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, clients: &[Client]) -> ResourceResult<()> {
        let data = serde_json::to_vec_pretty(clients)
            .map_err(|e| ResourceError::Storage(format!("failed to encode clients: {e}")))?;
        tokio::fs::write(&self.path, data).await.map_err(|e| {
            ResourceError::Storage(format!("failed to write {}: {e}", self.path.display()))
        })
    }

    async fn modify<F>(&self, change: F) -> ResourceResult<()>
    where
        F: FnOnce(&mut Vec<Client>) -> ResourceResult<()> + Send,
    {
        let _guard = self.lock.lock().await;
        let mut clients = self.load().await?;
        change(&mut clients)?;
        self.save(&clients).await
    }
}

#[async_trait]
impl RouteStore for JsonFileStore {
    async fn all(&self) -> ResourceResult<Vec<Client>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    async fn create(&self, client: Client) -> ResourceResult<()> {
        self.modify(|clients| insert_client(clients, client)).await
    }

    async fn update(&self, cluster: &str, identity: &str, client: Client) -> ResourceResult<()> {
        self.modify(|clients| replace_client(clients, cluster, identity, client))
            .await
    }

    async fn delete(&self, cluster: &str, identity: &str) -> ResourceResult<()> {
        self.modify(|clients| remove_client(clients, cluster, identity))
            .await
    }
}
