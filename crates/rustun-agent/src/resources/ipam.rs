use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Mutex;
use tracing::debug;

use crate::errors::{ResourceError, ResourceResult};
use crate::models::client::Client;

/// Address plan shared by every cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// CIDR of the overlay network, e.g. `10.12.0.0/16`
    pub network: String,
    pub gateway: String,
    /// First address handed out to clients
    pub start_ip: String,
    pub mask: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network: "10.12.0.0/16".to_string(),
            gateway: "10.12.0.1".to_string(),
            start_ip: "10.12.0.10".to_string(),
            mask: "255.255.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub ip: Ipv4Addr,
    pub gateway: String,
    pub mask: String,
}

#[derive(Debug, Clone, Copy)]
struct AddressRange {
    gateway: u32,
    start: u32,
    /// Last assignable address; the broadcast address is never handed out
    last: u32,
}

impl AddressRange {
    fn parse(config: &NetworkConfig) -> ResourceResult<Self> {
        let invalid = |msg: String| ResourceError::InvalidNetwork(msg);

        let (base, prefix) = config
            .network
            .split_once('/')
            .ok_or_else(|| invalid(format!("{} is not in CIDR notation", config.network)))?;
        let base: Ipv4Addr = base
            .parse()
            .map_err(|_| invalid(format!("bad network address {base}")))?;
        let prefix: u32 = prefix
            .parse()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| invalid(format!("bad prefix length {prefix}")))?;

        let netmask = if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        };
        let network = u32::from(base) & netmask;
        let broadcast = network | !netmask;
        let contains = |addr: u32| addr & netmask == network;

        let gateway: Ipv4Addr = config
            .gateway
            .parse()
            .map_err(|_| invalid(format!("bad gateway {}", config.gateway)))?;
        let start: Ipv4Addr = config
            .start_ip
            .parse()
            .map_err(|_| invalid(format!("bad start ip {}", config.start_ip)))?;
        if !contains(u32::from(start)) {
            return Err(invalid(format!(
                "start ip {start} is outside {}",
                config.network
            )));
        }

        Ok(Self {
            gateway: u32::from(gateway),
            start: u32::from(start),
            last: broadcast.saturating_sub(1).max(network),
        })
    }
}

/// Hands out client addresses, tracking allocations per cluster.
///
/// Every cluster draws from the same range independently, so two clusters may reuse an
/// address. Safe to share between tasks.
#[derive(Debug)]
pub struct IpAllocator {
    config: NetworkConfig,
    range: AddressRange,
    pools: Mutex<HashMap<String, HashSet<u32>>>,
}

impl IpAllocator {
    pub fn new(config: NetworkConfig) -> ResourceResult<Self> {
        let range = AddressRange::parse(&config)?;
        Ok(Self {
            config,
            range,
            pools: Mutex::new(HashMap::new()),
        })
    }

    fn pools(&self) -> std::sync::MutexGuard<'_, HashMap<String, HashSet<u32>>> {
        self.pools.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks the addresses of existing clients as taken
    pub fn seed<'a>(&self, clients: impl IntoIterator<Item = &'a Client>) {
        let mut pools = self.pools();
        for client in clients {
            match client.private_ip.parse::<Ipv4Addr>() {
                Ok(ip) => {
                    pools
                        .entry(client.cluster.clone())
                        .or_default()
                        .insert(u32::from(ip));
                }
                Err(_) => debug!(
                    cluster = %client.cluster,
                    identity = %client.identity,
                    ip = %client.private_ip,
                    "skipping client with unparseable address"
                ),
            }
        }
    }

    /// First free address at or after the start address, skipping the gateway
    pub fn allocate(&self, cluster: &str) -> ResourceResult<Allocation> {
        let mut pools = self.pools();
        let pool = pools.entry(cluster.to_string()).or_default();

        let candidate = (self.range.start..=self.range.last)
            .find(|addr| *addr != self.range.gateway && !pool.contains(addr))
            .ok_or_else(|| ResourceError::AddressExhausted(cluster.to_string()))?;
        pool.insert(candidate);

        Ok(Allocation {
            ip: Ipv4Addr::from(candidate),
            gateway: self.config.gateway.clone(),
            mask: self.config.mask.clone(),
        })
    }

    /// Returns an address to its cluster's pool; unknown addresses are ignored
    pub fn release(&self, cluster: &str, ip: &str) {
        let Ok(ip) = ip.parse::<Ipv4Addr>() else {
            return;
        };
        if let Some(pool) = self.pools().get_mut(cluster) {
            pool.remove(&u32::from(ip));
        }
    }

    pub fn is_allocated(&self, cluster: &str, ip: &str) -> bool {
        ip.parse::<Ipv4Addr>()
            .map(|ip| {
                self.pools()
                    .get(cluster)
                    .is_some_and(|pool| pool.contains(&u32::from(ip)))
            })
            .unwrap_or(false)
    }
}
