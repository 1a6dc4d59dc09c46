use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Device, Link};

/// Lab is a named grouping of devices that share the "<lab>-" name prefix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lab {
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// CreateLabRequest for creating new labs
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLabRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Lab with member counts computed from the live device directory
#[derive(Debug, Clone, Serialize)]
pub struct LabInfo {
    pub name: String,
    pub description: String,
    pub router_count: usize,
    pub running_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Lab record together with its member devices and links
#[derive(Debug, Clone, Serialize)]
pub struct LabDetail {
    #[serde(flatten)]
    pub lab: Lab,
    pub routers: Vec<Device>,
    pub links: Vec<Link>,
}
