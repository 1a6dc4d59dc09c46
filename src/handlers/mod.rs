pub mod console;
pub mod labs;
pub mod links;
pub mod routers;
pub mod stats;
pub mod topologies;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::engine::{LifecycleError, LifecycleResult};
use crate::models::{ActionReport, BulkReport};
use crate::AppState;

/// Error response body: {"error": "message"}
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// API error type
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{} not found", resource),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        // Typed store errors first (no fragile string matching)
        if let Some(nf) = err.downcast_ref::<crate::db::NotFoundError>() {
            return Self::not_found(&nf.to_string());
        }
        if let Some(conflict) = err.downcast_ref::<crate::db::ConflictError>() {
            return Self::conflict(conflict.to_string());
        }
        Self::internal(format!("{:#}", err))
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        Self {
            status: lifecycle_status(&err),
            message: err.to_string(),
        }
    }
}

/// HTTP status for each lifecycle outcome
pub fn lifecycle_status(err: &LifecycleError) -> StatusCode {
    match err {
        LifecycleError::NotFound { .. } => StatusCode::NOT_FOUND,
        LifecycleError::AlreadyInState { .. }
        | LifecycleError::AlreadyExists { .. }
        | LifecycleError::MissingConstituent { .. } => StatusCode::CONFLICT,
        LifecycleError::ConstituentAddressed { .. }
        | LifecycleError::NotRunning { .. }
        | LifecycleError::UnsupportedType { .. }
        | LifecycleError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        LifecycleError::BackendFailure { .. } | LifecycleError::Gateway { .. } => StatusCode::BAD_GATEWAY,
        LifecycleError::BackendTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        LifecycleError::Fault(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Body of every lifecycle endpoint: {success, message, ...}
#[derive(Debug, Serialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(flatten)]
    pub report: ActionReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

/// Turn a lifecycle outcome into a structured response; expected failures are
/// bodies with `success: false`, never bare transport errors.
pub fn action(result: LifecycleResult<ActionReport>, ok_status: StatusCode) -> (StatusCode, Json<ActionResult>) {
    match result {
        Ok(report) => (
            ok_status,
            Json(ActionResult {
                success: true,
                report,
                error_kind: None,
            }),
        ),
        Err(err) => {
            if matches!(err, LifecycleError::Fault(_)) {
                tracing::error!("Lifecycle fault: {:#}", err);
            }
            (
                lifecycle_status(&err),
                Json(ActionResult {
                    success: false,
                    error_kind: Some(err.kind()),
                    report: ActionReport::new(err.to_string()),
                }),
            )
        }
    }
}

/// Body of bulk start/stop endpoints
#[derive(Debug, Serialize)]
pub struct BulkResult {
    pub success: bool,
    pub message: String,
    pub count: usize,
    #[serde(flatten)]
    pub report: BulkReport,
}

impl BulkResult {
    pub fn new(verb: &str, report: BulkReport) -> Json<Self> {
        let message = if report.failed.is_empty() {
            format!("{} {} devices", verb, report.count())
        } else {
            format!("{} {} devices, {} failed", verb, report.count(), report.failed.len())
        };
        Json(Self {
            success: report.failed.is_empty(),
            message,
            count: report.count(),
            report,
        })
    }
}

/// Response helper: return 201 Created with JSON body
pub fn created<T: Serialize>(item: T) -> (StatusCode, Json<T>) {
    (StatusCode::CREATED, Json(item))
}

/// Service banner
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "VRHost Lab API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// Healthcheck endpoint: reports hypervisor and database reachability
pub async fn healthcheck(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let database = state.store.ping().await.is_ok();
    match state.directory.hypervisor().list_domains().await {
        Ok(domains) if database => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "libvirt_connected": true,
                "database": true,
                "total_vms": domains.len(),
                "ws_clients": state.ws_hub.client_count().await,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })),
        ),
        Ok(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unhealthy",
                "libvirt_connected": true,
                "database": false,
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unhealthy",
                "libvirt_connected": false,
                "database": database,
                "error": format!("{:#}", e),
            })),
        ),
    }
}
