use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;
use super::row_helpers::map_link_row;

const SELECT_LINK: &str = r#"
    SELECT id, source_router, source_interface, target_router, target_interface,
           status, lab, created_at, updated_at
    FROM links
"#;

/// Link database operations
pub struct LinkRepo;

impl LinkRepo {
    pub async fn list(pool: &Pool<Sqlite>, lab: Option<&str>) -> Result<Vec<Link>> {
        let rows = match lab {
            Some(lab) => {
                sqlx::query(&format!("{} WHERE lab = ? ORDER BY id", SELECT_LINK))
                    .bind(lab)
                    .fetch_all(pool)
                    .await?
            }
            None => {
                sqlx::query(&format!("{} ORDER BY id", SELECT_LINK))
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(rows.iter().map(map_link_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Link>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_LINK))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_link_row))
    }

    /// Every link where `device` is the source or the target
    pub async fn list_by_device(pool: &Pool<Sqlite>, device: &str) -> Result<Vec<Link>> {
        let rows = sqlx::query(&format!(
            "{} WHERE source_router = ? OR target_router = ? ORDER BY id",
            SELECT_LINK
        ))
        .bind(device)
        .bind(device)
        .fetch_all(pool)
        .await?;
        Ok(rows.iter().map(map_link_row).collect())
    }

    pub async fn create(
        pool: &Pool<Sqlite>,
        id: &str,
        req: &CreateLinkRequest,
        status: LinkStatus,
    ) -> Result<Link> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO links (id, source_router, source_interface, target_router, target_interface,
                               status, lab, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&req.source_router)
        .bind(&req.source_interface)
        .bind(&req.target_router)
        .bind(&req.target_interface)
        .bind(status.as_str())
        .bind(req.lab.as_deref().unwrap_or(""))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Self::get(pool, id)
            .await?
            .context("Link not found after creation")
    }

    /// Update a link's status. Returns false when the link no longer exists, so a
    /// late status write can never bring back a deleted link.
    pub async fn set_status(pool: &Pool<Sqlite>, id: &str, status: LinkStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE links SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &Pool<Sqlite>, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM links WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Link", id).into());
        }
        Ok(())
    }

    pub async fn delete_by_device(pool: &Pool<Sqlite>, device: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM links WHERE source_router = ? OR target_router = ?")
            .bind(device)
            .bind(device)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
