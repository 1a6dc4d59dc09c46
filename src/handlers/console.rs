use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::console::ConsoleSession;
use crate::models::Backing;
use crate::ws::EventType;
use crate::AppState;

use super::{created, ApiError};

#[derive(Serialize)]
pub struct ConsoleInfo {
    pub name: String,
    pub ssh_command: String,
    pub virsh_command: String,
    pub note: String,
}

/// Static hints for reaching a router's console from the host
pub async fn console_info(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<ConsoleInfo> {
    Json(ConsoleInfo {
        ssh_command: format!("ssh root@{}", name),
        virsh_command: format!("virsh -c {} console {}", state.config.libvirt_uri, name),
        note: "Use virsh console from the host system".to_string(),
        name,
    })
}

/// Open a web console session. Composite devices attach to their control unit.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<ConsoleSession>), ApiError> {
    let device = state.directory.get(&name).await?;
    let vm = match &device.backing {
        Backing::Simple { unit } => Some(unit),
        Backing::Composite { control, .. } => control.as_ref(),
    }
    .filter(|unit| unit.active)
    .map(|unit| unit.id.clone())
    .ok_or_else(|| ApiError::bad_request(format!("Device {} is not running", name)))?;

    let session = state.consoles.create(&vm).await?;
    state
        .ws_hub
        .broadcast_console(EventType::ConsoleOpened, &vm, session.port)
        .await;
    Ok(created(session))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<ConsoleSession>, ApiError> {
    let session = state
        .consoles
        .get(&token)
        .await
        .ok_or_else(|| ApiError::not_found("console session"))?;
    Ok(Json(session))
}

pub async fn close_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<StatusCode, ApiError> {
    let session = state.consoles.get(&token).await;
    if !state.consoles.close(&token).await {
        return Err(ApiError::not_found("console session"));
    }
    if let Some(session) = session {
        state
            .ws_hub
            .broadcast_console(EventType::ConsoleClosed, &session.router_name, session.port)
            .await;
    }
    Ok(StatusCode::NO_CONTENT)
}
