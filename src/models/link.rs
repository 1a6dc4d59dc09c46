use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DeviceState;

/// Link status derived from the state of both endpoint devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Up,
    Down,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s == "up" {
            Self::Up
        } else {
            Self::Down
        }
    }

    /// A link is up only while both endpoint devices are running
    pub fn from_endpoints(a: DeviceState, b: DeviceState) -> Self {
        if a == DeviceState::Running && b == DeviceState::Running {
            Self::Up
        } else {
            Self::Down
        }
    }
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Link is an undirected cable between two device interfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: String,
    pub source_router: String,
    pub source_interface: String,
    pub target_router: String,
    pub target_interface: String,
    pub status: LinkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Link {
    /// The endpoint device on the other side of `device`
    pub fn peer_of(&self, device: &str) -> &str {
        if self.source_router == device {
            &self.target_router
        } else {
            &self.source_router
        }
    }

    /// Whether `req` describes this link's cable, from either side
    pub fn same_cable(&self, req: &CreateLinkRequest) -> bool {
        let ends = |dev: &str, port: &str| (dev.to_string(), normalize_interface(port));
        let mut ours = [
            ends(&self.source_router, &self.source_interface),
            ends(&self.target_router, &self.target_interface),
        ];
        let mut theirs = [
            ends(&req.source_router, &req.source_interface),
            ends(&req.target_router, &req.target_interface),
        ];
        ours.sort();
        theirs.sort();
        ours == theirs
    }
}

/// CreateLinkRequest for cabling two device interfaces
#[derive(Debug, Clone, Deserialize)]
pub struct CreateLinkRequest {
    pub source_router: String,
    pub source_interface: String,
    pub target_router: String,
    pub target_interface: String,
    #[serde(default)]
    pub lab: Option<String>,
}

impl CreateLinkRequest {
    pub fn link_id(&self) -> String {
        link_id(
            &self.source_router,
            &self.source_interface,
            &self.target_router,
            &self.target_interface,
        )
    }
}

/// Query parameters for listing links
#[derive(Debug, Default, Deserialize)]
pub struct LinkQuery {
    #[serde(default)]
    pub lab: Option<String>,
}

/// Strip the separators that commonly appear in interface names ("ge-0/0/1" -> "ge001")
pub fn normalize_interface(name: &str) -> String {
    name.chars().filter(|c| !matches!(c, '/' | ':' | '-')).collect()
}

/// Deterministic link id. Endpoints are ordered by (device, interface) first, so
/// the same cable described from either side gets the same id.
pub fn link_id(source: &str, source_if: &str, target: &str, target_if: &str) -> String {
    let a = (source, normalize_interface(source_if));
    let b = (target, normalize_interface(target_if));
    let (first, second) = if (a.0, a.1.as_str()) <= (b.0, b.1.as_str()) {
        (a, b)
    } else {
        (b, a)
    };
    format!("{}-{}-{}-{}", first.0, first.1, second.0, second.1)
}
