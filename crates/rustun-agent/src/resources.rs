//! Cluster and client management backing the agent's tools.
pub mod ipam;
pub mod manager;
pub mod store;

pub use ipam::{Allocation, IpAllocator, NetworkConfig};
pub use manager::{ResourceManager, RouteManager};
pub use store::{JsonFileStore, MemoryStore, RouteStore};
