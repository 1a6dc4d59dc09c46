use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::models::{RouterStats, SystemStats};
use crate::AppState;

use super::ApiError;

pub async fn system_stats(State(state): State<Arc<AppState>>) -> Result<Json<SystemStats>, ApiError> {
    Ok(Json(state.stats.system().await?))
}

pub async fn router_stats(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RouterStats>, ApiError> {
    Ok(Json(state.stats.router(&name).await?))
}
