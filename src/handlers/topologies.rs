use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::utils::is_valid_name;
use crate::AppState;

use super::{created, ApiError};

pub async fn list_topologies(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TopologyInfo>>, ApiError> {
    let topologies = state.store.list_topologies().await?;
    Ok(Json(
        topologies
            .into_iter()
            .map(|t| TopologyInfo {
                router_count: t.routers.len(),
                name: t.name,
                description: t.description,
                created_at: t.created_at,
            })
            .collect(),
    ))
}

pub async fn get_topology(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Topology>, ApiError> {
    let topology = state
        .store
        .get_topology(&name)
        .await?
        .ok_or_else(|| ApiError::not_found("topology"))?;
    Ok(Json(topology))
}

/// Save a topology, replacing an earlier one with the same name
pub async fn save_topology(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveTopologyRequest>,
) -> Result<(StatusCode, Json<Topology>), ApiError> {
    if !is_valid_name(&req.name) {
        return Err(ApiError::bad_request("invalid topology name"));
    }
    for router in &req.routers {
        if !is_valid_name(&router.name) {
            return Err(ApiError::bad_request(format!("invalid router name: {:?}", router.name)));
        }
        if DeviceType::parse(&router.router_type).is_none() {
            return Err(ApiError::bad_request(format!(
                "unsupported router type for {}: {}",
                router.name, router.router_type
            )));
        }
    }

    let topology = state.store.save_topology(&req).await?;
    Ok(created(topology))
}

pub async fn delete_topology(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_topology(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
