use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::{debug, warn};

use crate::errors::{ToolError, ToolResult};
use crate::models::client::{ClientPatch, NewClient};
use crate::models::tool::Tool;
use crate::resources::ResourceManager;

/// The closed set of management operations exposed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumString, IntoStaticStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    ListClusters,
    ListClients,
    GetClient,
    CreateClient,
    UpdateClient,
    DeleteClient,
}

impl Operation {
    pub fn name(self) -> &'static str {
        self.into()
    }

    fn description(self) -> &'static str {
        match self {
            Operation::ListClusters => "Get all clusters with their names and client counts",
            Operation::ListClients => {
                "Get client list, optionally filtered by cluster. Returns detailed client \
                 information including identity, name, IP address, etc."
            }
            Operation::GetClient => {
                "Get detailed information of a single client by cluster name and client identity"
            }
            Operation::CreateClient => {
                "Create a new VPN client. System will automatically generate client identity \
                 (UUID) and IP address configuration. If specified cluster doesn't exist, it \
                 will be created automatically"
            }
            Operation::UpdateClient => {
                "Update existing client information. Can modify name and CIDR routes, but \
                 cannot modify cluster, identity and IP configuration"
            }
            Operation::DeleteClient => {
                "Delete specified client. After deletion, the IP address occupied by the \
                 client will be released"
            }
        }
    }

    fn parameters(self) -> Value {
        let cluster = json!({
            "type": "string",
            "description": "Cluster name where the client belongs"
        });
        let identity = json!({
            "type": "string",
            "description": "Unique client identifier (UUID)"
        });

        match self {
            Operation::ListClusters => json!({
                "type": "object",
                "properties": {}
            }),
            Operation::ListClients => json!({
                "type": "object",
                "properties": {
                    "cluster": {
                        "type": "string",
                        "description": "Cluster name to filter clients. If not provided, returns all clients"
                    }
                }
            }),
            Operation::GetClient | Operation::DeleteClient => json!({
                "type": "object",
                "properties": {
                    "cluster": cluster,
                    "identity": identity
                },
                "required": ["cluster", "identity"]
            }),
            Operation::CreateClient => json!({
                "type": "object",
                "properties": {
                    "cluster": cluster,
                    "name": {
                        "type": "string",
                        "description": "Friendly name for the client, e.g.: Headquarters, Branch, NAS, Laptop, Phone"
                    },
                    "ciders": {
                        "type": "array",
                        "description": "CIDR route list for the client, e.g. [\"192.168.1.0/24\"]",
                        "items": {"type": "string"}
                    }
                },
                "required": ["cluster"]
            }),
            Operation::UpdateClient => json!({
                "type": "object",
                "properties": {
                    "cluster": cluster,
                    "identity": identity,
                    "name": {
                        "type": "string",
                        "description": "New friendly name for the client"
                    },
                    "ciders": {
                        "type": "array",
                        "description": "New CIDR route list",
                        "items": {"type": "string"}
                    }
                },
                "required": ["cluster", "identity"]
            }),
        }
    }

    pub fn definition(self) -> Tool {
        Tool::new(self.name(), self.description(), self.parameters())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListClientsArgs {
    #[serde(default)]
    cluster: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientKeyArgs {
    cluster: String,
    identity: String,
}

#[derive(Debug, Deserialize)]
struct CreateClientArgs {
    cluster: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "routes")]
    ciders: Option<Vec<String>>,
}

// Unknown fields such as private_ip or a new cluster are ignored.
#[derive(Debug, Deserialize)]
struct UpdateClientArgs {
    cluster: String,
    identity: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "routes")]
    ciders: Option<Vec<String>>,
}

fn parse_arguments<T: DeserializeOwned>(operation: Operation, raw: &str) -> ToolResult<T> {
    let raw = if raw.trim().is_empty() { "{}" } else { raw };
    serde_json::from_str(raw).map_err(|e| ToolError::ArgumentError {
        tool: operation.name().to_string(),
        message: e.to_string(),
    })
}

fn require_non_empty(operation: Operation, field: &str, value: &str) -> ToolResult<()> {
    if value.trim().is_empty() {
        return Err(ToolError::ArgumentError {
            tool: operation.name().to_string(),
            message: format!("{field} must not be empty"),
        });
    }
    Ok(())
}

fn encode<T: Serialize>(value: &T) -> ToolResult<String> {
    serde_json::to_string(value).map_err(|e| ToolError::Encode(e.to_string()))
}

/// Enumerates the management tools and dispatches calls to a [`ResourceManager`].
pub struct ToolRegistry {
    tools: Vec<Tool>,
    manager: Arc<dyn ResourceManager>,
}

impl ToolRegistry {
    pub fn new(manager: Arc<dyn ResourceManager>) -> Self {
        Self {
            tools: Operation::iter().map(Operation::definition).collect(),
            manager,
        }
    }

    pub fn list(&self) -> &[Tool] {
        &self.tools
    }

    /// Runs the named tool, returning its JSON result
    pub async fn call(&self, name: &str, arguments: &str) -> ToolResult<String> {
        let operation =
            Operation::from_str(name).map_err(|_| ToolError::UnknownTool(name.to_string()))?;
        debug!(tool = %operation, arguments, "dispatching tool");

        match operation {
            Operation::ListClusters => encode(&self.manager.list_clusters().await?),
            Operation::ListClients => {
                let args: ListClientsArgs = parse_arguments(operation, arguments)?;
                let cluster = args.cluster.as_deref().filter(|c| !c.is_empty());
                encode(&self.manager.list_clients(cluster).await?)
            }
            Operation::GetClient => {
                let args: ClientKeyArgs = parse_arguments(operation, arguments)?;
                encode(&self.manager.get_client(&args.cluster, &args.identity).await?)
            }
            Operation::CreateClient => {
                let args: CreateClientArgs = parse_arguments(operation, arguments)?;
                require_non_empty(operation, "cluster", &args.cluster)?;
                let request = NewClient {
                    cluster: args.cluster,
                    name: args.name,
                    routes: args.ciders,
                };
                encode(&self.manager.create_client(request).await?)
            }
            Operation::UpdateClient => {
                let args: UpdateClientArgs = parse_arguments(operation, arguments)?;
                let patch = ClientPatch {
                    name: args.name,
                    routes: args.ciders,
                };
                encode(
                    &self
                        .manager
                        .update_client(&args.cluster, &args.identity, patch)
                        .await?,
                )
            }
            Operation::DeleteClient => {
                let args: ClientKeyArgs = parse_arguments(operation, arguments)?;
                self.manager
                    .delete_client(&args.cluster, &args.identity)
                    .await?;
                Ok(json!({"success": true, "message": "Client deleted successfully"}).to_string())
            }
        }
    }

    /// Like [`call`](Self::call), but failures become an `{"error": ...}` payload
    pub async fn invoke(&self, name: &str, arguments: &str) -> String {
        match self.call(name, arguments).await {
            Ok(result) => result,
            Err(err) => {
                warn!(tool = name, error = %err, "tool call failed");
                json!({"error": err.to_string()}).to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::store::tests::client;
    use crate::resources::{MemoryStore, NetworkConfig, RouteManager};
    use serde_json::Value;

    async fn registry() -> ToolRegistry {
        let store = Arc::new(MemoryStore::with_clients(vec![
            client("office", "a", "10.12.0.10"),
            client("office", "b", "10.12.0.11"),
            client("home", "c", "10.12.0.10"),
        ]));
        let manager = RouteManager::load(store, NetworkConfig::default())
            .await
            .unwrap();
        ToolRegistry::new(Arc::new(manager))
    }

    fn parse(payload: &str) -> Value {
        serde_json::from_str(payload).unwrap()
    }

    #[tokio::test]
    async fn test_list_is_fixed_and_unique() {
        let registry = registry().await;
        let names: Vec<&str> = registry.list().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "list_clusters",
                "list_clients",
                "get_client",
                "create_client",
                "update_client",
                "delete_client"
            ]
        );
        let create = &registry.list()[3];
        assert_eq!(create.parameters["required"], json!(["cluster"]));
    }

    #[tokio::test]
    async fn test_list_clusters_and_clients() -> anyhow::Result<()> {
        let registry = registry().await;
        let clusters = parse(&registry.call("list_clusters", "").await?);
        assert_eq!(
            clusters,
            json!([
                {"name": "home", "client_count": 1},
                {"name": "office", "client_count": 2}
            ])
        );

        let office = parse(&registry.call("list_clients", r#"{"cluster":"office"}"#).await?);
        assert_eq!(office.as_array().map(Vec::len), Some(2));

        // an empty filter means every cluster
        let all = parse(&registry.call("list_clients", r#"{"cluster":""}"#).await?);
        assert_eq!(all.as_array().map(Vec::len), Some(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_then_update_ignores_immutable_fields() -> anyhow::Result<()> {
        let registry = registry().await;
        let created = parse(
            &registry
                .call(
                    "create_client",
                    r#"{"cluster":"office","name":"NAS","ciders":["192.168.1.0/24"]}"#,
                )
                .await?,
        );
        assert_eq!(created["private_ip"], "10.12.0.12");
        let identity = created["identity"].as_str().unwrap_or_default().to_string();

        let arguments = json!({
            "cluster": "office",
            "identity": identity,
            "name": "Storage",
            "private_ip": "10.12.9.9"
        })
        .to_string();
        let updated = parse(&registry.call("update_client", &arguments).await?);
        assert_eq!(updated["name"], "Storage");
        assert_eq!(updated["private_ip"], "10.12.0.12");
        assert_eq!(updated["ciders"], json!(["192.168.1.0/24"]));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_reports_success() -> anyhow::Result<()> {
        let registry = registry().await;
        let result = parse(
            &registry
                .call("delete_client", r#"{"cluster":"home","identity":"c"}"#)
                .await?,
        );
        assert_eq!(result["success"], true);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_taxonomy() {
        let registry = registry().await;

        assert_eq!(
            registry.call("reboot_server", "{}").await,
            Err(ToolError::UnknownTool("reboot_server".to_string()))
        );
        assert!(matches!(
            registry.call("get_client", r#"{"cluster":"office"}"#).await,
            Err(ToolError::ArgumentError { .. })
        ));
        assert!(matches!(
            registry.call("get_client", "{not json").await,
            Err(ToolError::ArgumentError { .. })
        ));
        assert!(matches!(
            registry.call("create_client", r#"{"cluster":""}"#).await,
            Err(ToolError::ArgumentError { .. })
        ));
        assert!(matches!(
            registry
                .call("get_client", r#"{"cluster":"office","identity":"zzz"}"#)
                .await,
            Err(ToolError::UpstreamError(_))
        ));
    }

    #[tokio::test]
    async fn test_invoke_always_yields_payload() {
        let registry = registry().await;
        let payload = parse(
            &registry
                .invoke("delete_client", r#"{"cluster":"office","identity":"missing"}"#)
                .await,
        );
        assert_eq!(
            payload["error"],
            "client missing not found in cluster office"
        );

        let payload = parse(&registry.invoke("nope", "").await);
        assert_eq!(payload["error"], "unknown tool: nope");
    }
}
