mod labs;
mod links;
pub(crate) mod row_helpers;
mod topologies;

use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::*;

use labs::LabRepo;
use links::LinkRepo;
use topologies::TopologyRepo;

/// Typed error for "resource not found", downcast by the API error handler
/// instead of matching on message text.
#[derive(Debug)]
pub struct NotFoundError {
    pub resource: String,
    pub id: String,
}

impl NotFoundError {
    pub fn new(resource: &str, id: &str) -> Self {
        Self {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} not found: {}", self.resource, self.id)
    }
}

impl std::error::Error for NotFoundError {}

/// Typed error for a create that collides with an existing record. Creates are
/// refused rather than turned into overwrites.
#[derive(Debug)]
pub struct ConflictError {
    pub message: String,
}

impl ConflictError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConflictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConflictError {}

/// Store handles all database operations, delegating to per-entity repo modules.
#[derive(Clone)]
pub struct Store {
    pool: Pool<Sqlite>,
    /// Serializes every link mutation (create, status update, delete)
    link_writes: Arc<Mutex<()>>,
}

impl Store {
    /// Create a new database store with a specific pool size
    pub async fn with_pool_size(db_path: &str, max_connections: u32) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(&db_url)
            .await
            .context("Failed to connect to database")?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database; a single connection so every query sees the same data
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        let store = Self {
            pool,
            link_writes: Arc::new(Mutex::new(())),
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Cheap liveness check for the health endpoint
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // ========== Link Operations ==========

    pub async fn list_links(&self, lab: Option<&str>) -> Result<Vec<Link>> {
        LinkRepo::list(&self.pool, lab).await
    }

    pub async fn get_link(&self, id: &str) -> Result<Option<Link>> {
        LinkRepo::get(&self.pool, id).await
    }

    pub async fn list_links_by_device(&self, device: &str) -> Result<Vec<Link>> {
        LinkRepo::list_by_device(&self.pool, device).await
    }

    /// Create a link under its deterministic id. An existing id is rejected with
    /// a `ConflictError`, never overwritten. Ids join names with '-', so two
    /// different cables between hyphenated device names can map to one id.
    pub async fn create_link(&self, req: &CreateLinkRequest, status: LinkStatus) -> Result<Link> {
        let id = req.link_id();
        let _guard = self.link_writes.lock().await;
        if let Some(existing) = LinkRepo::get(&self.pool, &id).await? {
            if existing.same_cable(req) {
                return Err(ConflictError::new(format!("Link already exists: {}", id)).into());
            }
            return Err(ConflictError::new(format!(
                "Link id {} is already used by {}:{} <-> {}:{}",
                id,
                existing.source_router,
                existing.source_interface,
                existing.target_router,
                existing.target_interface
            ))
            .into());
        }
        LinkRepo::create(&self.pool, &id, req, status).await
    }

    /// Returns false when the link no longer exists
    pub async fn set_link_status(&self, id: &str, status: LinkStatus) -> Result<bool> {
        let _guard = self.link_writes.lock().await;
        LinkRepo::set_status(&self.pool, id, status).await
    }

    pub async fn delete_link(&self, id: &str) -> Result<()> {
        let _guard = self.link_writes.lock().await;
        LinkRepo::delete(&self.pool, id).await
    }

    /// Remove every link touching `device`, returning how many were removed
    pub async fn delete_links_by_device(&self, device: &str) -> Result<u64> {
        let _guard = self.link_writes.lock().await;
        LinkRepo::delete_by_device(&self.pool, device).await
    }

    // ========== Lab Operations ==========

    pub async fn list_labs(&self) -> Result<Vec<Lab>> {
        LabRepo::list(&self.pool).await
    }

    pub async fn get_lab(&self, name: &str) -> Result<Option<Lab>> {
        LabRepo::get(&self.pool, name).await
    }

    pub async fn create_lab(&self, req: &CreateLabRequest) -> Result<Lab> {
        LabRepo::create(&self.pool, req).await
    }

    pub async fn delete_lab(&self, name: &str) -> Result<()> {
        LabRepo::delete(&self.pool, name).await
    }

    // ========== Topology Operations ==========

    pub async fn list_topologies(&self) -> Result<Vec<Topology>> {
        TopologyRepo::list(&self.pool).await
    }

    pub async fn get_topology(&self, name: &str) -> Result<Option<Topology>> {
        TopologyRepo::get(&self.pool, name).await
    }

    pub async fn save_topology(&self, req: &SaveTopologyRequest) -> Result<Topology> {
        TopologyRepo::save(&self.pool, req).await
    }

    pub async fn delete_topology(&self, name: &str) -> Result<()> {
        TopologyRepo::delete(&self.pool, name).await
    }
}
