use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::utils::{in_lab, is_valid_name};
use crate::AppState;

use super::{created, ApiError, BulkResult};

/// List labs with member counts from the live device directory
pub async fn list_labs(State(state): State<Arc<AppState>>) -> Result<Json<Vec<LabInfo>>, ApiError> {
    let labs = state.store.list_labs().await?;
    let devices = state.directory.list().await?;

    let infos = labs
        .into_iter()
        .map(|lab| {
            let members: Vec<&Device> = devices.iter().filter(|d| in_lab(&d.name, &lab.name)).collect();
            LabInfo {
                router_count: members.len(),
                running_count: members.iter().filter(|d| d.state == DeviceState::Running).count(),
                name: lab.name,
                description: lab.description,
                created_at: lab.created_at,
            }
        })
        .collect();
    Ok(Json(infos))
}

pub async fn create_lab(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLabRequest>,
) -> Result<(StatusCode, Json<Lab>), ApiError> {
    if !is_valid_name(&req.name) || req.name.contains('-') {
        return Err(ApiError::bad_request(
            "lab name must be alphanumeric (dots and underscores allowed, no hyphens)",
        ));
    }
    let lab = state.store.create_lab(&req).await?;
    Ok(created(lab))
}

/// Lab record with its member routers and links
pub async fn get_lab(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<LabDetail>, ApiError> {
    let lab = state
        .store
        .get_lab(&name)
        .await?
        .ok_or_else(|| ApiError::not_found("lab"))?;
    let routers = state.directory.list_lab(&name).await?;
    let links = state.store.list_links(Some(&name)).await?;
    Ok(Json(LabDetail { lab, routers, links }))
}

/// Delete the lab record; member routers are left alone
pub async fn delete_lab(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_lab(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn lab_routers(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Device>>, ApiError> {
    Ok(Json(state.directory.list_lab(&name).await?))
}

pub async fn start_lab(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<BulkResult>, ApiError> {
    let report = state.bulk.start_lab(&name).await?;
    Ok(BulkResult::new("Started", report))
}

pub async fn stop_lab(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<StopQuery>,
) -> Result<Json<BulkResult>, ApiError> {
    let report = state.bulk.stop_lab(&name, query.force).await?;
    Ok(BulkResult::new("Stopped", report))
}
