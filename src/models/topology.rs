use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Router definition stored inside a saved topology
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyRouter {
    pub name: String,
    #[serde(default)]
    pub ip: String,
    pub router_type: String,
    #[serde(default = "default_ram_gb")]
    pub ram_gb: u32,
    #[serde(default = "default_vcpus")]
    pub vcpus: u32,
}

fn default_ram_gb() -> u32 {
    4
}

fn default_vcpus() -> u32 {
    2
}

/// Topology is a saved, named set of router definitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub name: String,
    pub description: String,
    pub routers: Vec<TopologyRouter>,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SaveTopologyRequest creates or replaces a topology by name
#[derive(Debug, Clone, Deserialize)]
pub struct SaveTopologyRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub routers: Vec<TopologyRouter>,
}

/// Topology summary for list views
#[derive(Debug, Clone, Serialize)]
pub struct TopologyInfo {
    pub name: String,
    pub description: String,
    pub router_count: usize,
    pub created_at: DateTime<Utc>,
}
