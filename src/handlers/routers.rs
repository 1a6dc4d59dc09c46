use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::models::*;
use crate::ws::EventType;
use crate::AppState;

use super::{action, ActionResult, ApiError, BulkResult};

#[derive(Serialize)]
pub struct RouterList {
    pub routers: Vec<Device>,
    pub count: usize,
}

/// List all routers and switches
pub async fn list_routers(State(state): State<Arc<AppState>>) -> Result<Json<RouterList>, ApiError> {
    let routers = state.directory.list().await?;
    Ok(Json(RouterList {
        count: routers.len(),
        routers,
    }))
}

/// Get a single router by name
pub async fn get_router(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Device>, ApiError> {
    Ok(Json(state.directory.get(&name).await?))
}

/// Provision a new router or switch
pub async fn create_router(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRouterRequest>,
) -> (StatusCode, Json<ActionResult>) {
    let result = state.lifecycle.create(&req).await;
    if result.is_ok() {
        let name = req.name.trim();
        let current = state.directory.state_of(name).await;
        state.ws_hub.broadcast_device_state(EventType::DeviceCreated, name, current).await;
    }
    action(result, StatusCode::CREATED)
}

/// Delete a router together with its links
pub async fn delete_router(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> (StatusCode, Json<ActionResult>) {
    let result = state.lifecycle.delete(&name).await;
    if result.is_ok() {
        state
            .ws_hub
            .broadcast_device_state(EventType::DeviceDeleted, &name, DeviceState::NotCreated)
            .await;
    }
    action(result, StatusCode::OK)
}

pub async fn start_router(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> (StatusCode, Json<ActionResult>) {
    action(state.bulk.start(&name).await, StatusCode::OK)
}

pub async fn stop_router(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<StopQuery>,
) -> (StatusCode, Json<ActionResult>) {
    action(state.bulk.stop(&name, query.force).await, StatusCode::OK)
}

pub async fn restart_router(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> (StatusCode, Json<ActionResult>) {
    action(state.lifecycle.restart(&name).await, StatusCode::OK)
}

/// Links touching a router
pub async fn router_links(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Link>>, ApiError> {
    Ok(Json(state.store.list_links_by_device(&name).await?))
}

pub async fn start_all(State(state): State<Arc<AppState>>) -> Result<Json<BulkResult>, ApiError> {
    let report = state.bulk.start_all().await?;
    Ok(BulkResult::new("Started", report))
}

pub async fn stop_all(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StopQuery>,
) -> Result<Json<BulkResult>, ApiError> {
    let report = state.bulk.stop_all(query.force).await?;
    Ok(BulkResult::new("Stopped", report))
}
