use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::models::*;
use crate::AppState;

use super::{created, ApiError};

/// List links, optionally filtered by lab tag
pub async fn list_links(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LinkQuery>,
) -> Result<Json<Vec<Link>>, ApiError> {
    let links = state.store.list_links(query.lab.as_deref()).await?;
    Ok(Json(links))
}

pub async fn get_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Link>, ApiError> {
    let link = state
        .store
        .get_link(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("link"))?;
    Ok(Json(link))
}

/// Create a link. Its initial status comes from the live state of both endpoints.
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateLinkRequest>,
) -> Result<(StatusCode, Json<Link>), ApiError> {
    if [&req.source_router, &req.source_interface, &req.target_router, &req.target_interface]
        .iter()
        .any(|f| f.trim().is_empty())
    {
        return Err(ApiError::bad_request(
            "source_router, source_interface, target_router and target_interface are required",
        ));
    }
    if req.source_router == req.target_router
        && normalize_interface(&req.source_interface) == normalize_interface(&req.target_interface)
    {
        return Err(ApiError::bad_request("a link cannot connect an interface to itself"));
    }

    let source = state.directory.state_of(&req.source_router).await;
    let target = state.directory.state_of(&req.target_router).await;
    let link = state
        .store
        .create_link(&req, LinkStatus::from_endpoints(source, target))
        .await?;

    tracing::info!("Created link {} ({})", link.id, link.status);
    Ok(created(link))
}

pub async fn delete_link(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_link(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
