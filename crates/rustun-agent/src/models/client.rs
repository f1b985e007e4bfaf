use serde::{Deserialize, Serialize};

/// A VPN client as stored in `routes.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub cluster: String,
    pub identity: String,
    #[serde(default)]
    pub name: String,
    pub private_ip: String,
    pub mask: String,
    pub gateway: String,
    /// CIDR routes reachable through this client
    #[serde(rename = "ciders", default)]
    pub routes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub client_count: usize,
}

/// Fields a caller supplies when creating a client; identity and address are derived.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewClient {
    pub cluster: String,
    pub name: Option<String>,
    pub routes: Option<Vec<String>>,
}

/// Changes to a client's mutable fields. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientPatch {
    pub name: Option<String>,
    pub routes: Option<Vec<String>>,
}

impl ClientPatch {
    pub fn apply(self, client: &mut Client) {
        if let Some(name) = self.name {
            client.name = name;
        }
        if let Some(routes) = self.routes {
            client.routes = routes;
        }
    }
}
