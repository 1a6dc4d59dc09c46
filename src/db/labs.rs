use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use crate::models::*;
use super::row_helpers::map_lab_row;

/// Lab database operations
pub struct LabRepo;

impl LabRepo {
    pub async fn list(pool: &Pool<Sqlite>) -> Result<Vec<Lab>> {
        let rows = sqlx::query("SELECT * FROM labs ORDER BY name")
            .fetch_all(pool)
            .await?;
        Ok(rows.iter().map(map_lab_row).collect())
    }

    pub async fn get(pool: &Pool<Sqlite>, name: &str) -> Result<Option<Lab>> {
        let row = sqlx::query("SELECT * FROM labs WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(row.as_ref().map(map_lab_row))
    }

    pub async fn create(pool: &Pool<Sqlite>, req: &CreateLabRequest) -> Result<Lab> {
        if Self::get(pool, &req.name).await?.is_some() {
            return Err(super::ConflictError::new(format!("Lab '{}' already exists", req.name)).into());
        }

        let now = Utc::now();
        sqlx::query("INSERT INTO labs (name, description, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(&req.name)
            .bind(req.description.as_deref().unwrap_or(""))
            .bind(now)
            .bind(now)
            .execute(pool)
            .await?;

        Self::get(pool, &req.name)
            .await?
            .context("Lab not found after creation")
    }

    /// Delete the lab record. Member devices are left untouched.
    pub async fn delete(pool: &Pool<Sqlite>, name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM labs WHERE name = ?")
            .bind(name)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(super::NotFoundError::new("Lab", name).into());
        }
        Ok(())
    }
}
