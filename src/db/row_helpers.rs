use sqlx::{Row, sqlite::SqliteRow};

use crate::models::*;

/// Filter empty strings to None; the DB stores "" instead of NULL
pub fn none_if_empty(opt: Option<String>) -> Option<String> {
    opt.filter(|s| !s.is_empty())
}

/// Map a SQLite row to a Link struct
pub fn map_link_row(row: &SqliteRow) -> Link {
    Link {
        id: row.get("id"),
        source_router: row.get("source_router"),
        source_interface: row.get("source_interface"),
        target_router: row.get("target_router"),
        target_interface: row.get("target_interface"),
        status: LinkStatus::parse(row.get::<&str, _>("status")),
        lab: none_if_empty(row.get("lab")),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a Lab struct
pub fn map_lab_row(row: &SqliteRow) -> Lab {
    Lab {
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Map a SQLite row to a Topology struct; the router list is stored as JSON
pub fn map_topology_row(row: &SqliteRow) -> Topology {
    let routers_json: String = row.get("routers");
    let routers: Vec<TopologyRouter> = serde_json::from_str(&routers_json).unwrap_or_default();
    Topology {
        name: row.get("name"),
        description: row.get("description"),
        routers,
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
