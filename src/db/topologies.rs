use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;
use super::row_helpers::map_topology_row;

const TOPOLOGY_VERSION: &str = "1.0";

/// Topology database operations
pub struct TopologyRepo;

impl TopologyRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Topology>> {
        let rows = sqlx::query("SELECT * FROM topologies ORDER BY name")
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_topology_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, name: &str) -> Result<Option<Topology>> {
        let row = sqlx::query("SELECT * FROM topologies WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_topology_row))
    }

    /// Save a topology, replacing any earlier one with the same name
    pub async fn save(pool: &Pool<Sqlite>, req: &SaveTopologyRequest) -> Result<Topology> {
        let now = Utc::now();
        let routers = serde_json::to_string(&req.routers)?;
        sqlx::query(
            r#"
            INSERT INTO topologies (name, description, routers, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                description = excluded.description,
                routers = excluded.routers,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&req.name)
        .bind(req.description.as_deref().unwrap_or(""))
        .bind(&routers)
        .bind(TOPOLOGY_VERSION)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, &req.name)
            .await?
            .context("Topology not found after save")
    }

    pub async fn delete(pool: &Pool<Sqlite>, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM topologies WHERE name = ?")
            .bind(name)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Topology", name).into());
        }
        Ok(())
    }
}
