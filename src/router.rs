use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>, frontend_dir: &str) -> Router {
    Router::new()
        .route("/api/health", get(handlers::healthcheck))
        // Router routes
        .route("/api/routers", get(handlers::routers::list_routers).post(handlers::routers::create_router))
        .route("/api/routers/start-all", post(handlers::routers::start_all))
        .route("/api/routers/stop-all", post(handlers::routers::stop_all))
        .route(
            "/api/routers/:name",
            get(handlers::routers::get_router).delete(handlers::routers::delete_router),
        )
        .route("/api/routers/:name/start", post(handlers::routers::start_router))
        .route("/api/routers/:name/stop", post(handlers::routers::stop_router))
        .route("/api/routers/:name/restart", post(handlers::routers::restart_router))
        .route("/api/routers/:name/links", get(handlers::routers::router_links))
        // Console routes
        .route("/api/routers/:name/console", get(handlers::console::console_info))
        .route("/api/routers/:name/console/session", post(handlers::console::create_session))
        .route(
            "/api/console/:token",
            get(handlers::console::get_session).delete(handlers::console::close_session),
        )
        // Link routes
        .route("/api/links", get(handlers::links::list_links).post(handlers::links::create_link))
        .route("/api/links/:id", get(handlers::links::get_link).delete(handlers::links::delete_link))
        // Lab routes
        .route("/api/labs", get(handlers::labs::list_labs).post(handlers::labs::create_lab))
        .route("/api/labs/:name", get(handlers::labs::get_lab).delete(handlers::labs::delete_lab))
        .route("/api/labs/:name/routers", get(handlers::labs::lab_routers))
        .route("/api/labs/:name/start", post(handlers::labs::start_lab))
        .route("/api/labs/:name/stop", post(handlers::labs::stop_lab))
        // Topology routes
        .route(
            "/api/topologies",
            get(handlers::topologies::list_topologies).post(handlers::topologies::save_topology),
        )
        .route(
            "/api/topologies/:name",
            get(handlers::topologies::get_topology).delete(handlers::topologies::delete_topology),
        )
        // Stats routes
        .route("/api/stats/system", get(handlers::stats::system_stats))
        .route("/api/stats/routers/:name", get(handlers::stats::router_stats))
        // WebSocket route
        .route("/api/ws", get(ws_upgrade_handler))
        .route("/", get(handlers::root))
        // Static files (frontend)
        .fallback_service(ServeDir::new(frontend_dir).fallback(ServeFile::new(format!("{}/index.html", frontend_dir))))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn ws_upgrade_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    crate::ws::ws_handler(ws, State(state.ws_hub.clone())).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::Store;
    use crate::hypervisor::mock::MockHypervisor;
    use crate::provision::mock::MockProvisioner;

    async fn app(hv: MockHypervisor) -> (Arc<MockHypervisor>, Arc<MockProvisioner>, Router) {
        let hv = Arc::new(hv);
        let prov = Arc::new(MockProvisioner::succeeding());
        let config = Config {
            db_path: ":memory:".to_string(),
            db_max_connections: 1,
            listen_addr: "127.0.0.1:0".to_string(),
            frontend_dir: "/nonexistent-frontend".to_string(),
            libvirt_uri: "test:///default".to_string(),
            virsh_bin: "virsh".to_string(),
            images_dir: std::env::temp_dir().join("vrhost-lab-router-test").display().to_string(),
            provision_timeout_secs: 5,
            composite_settle_secs: 0,
            console_program: "true".to_string(),
            console_host: "127.0.0.1".to_string(),
            console_base_port: 27681,
            console_session_ttl_secs: 60,
            link_reconcile_secs: 0,
        };

        let store = Store::in_memory().await.unwrap();
        let state = Arc::new(AppState::new(config, store, hv.clone(), prov.clone()));
        (hv, prov, build(state, "/nonexistent-frontend"))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(v) => Body::from(v.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (_hv, _prov, app) = app(MockHypervisor::new().with_domain("r1", false)).await;
        let (status, body) = send(&app, "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["total_vms"], 1);
    }

    #[tokio::test]
    async fn test_router_lifecycle_over_http() {
        let (hv, _prov, app) = app(
            MockHypervisor::new()
                .with_domain("A", false)
                .with_domain("B", false),
        )
        .await;

        let (status, link) = send(
            &app,
            "POST",
            "/api/links",
            Some(json!({"source_router": "A", "source_interface": "ge0", "target_router": "B", "target_interface": "ge0"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(link["id"], "A-ge0-B-ge0");
        assert_eq!(link["status"], "down");

        let (status, body) = send(&app, "POST", "/api/routers/A/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, body) = send(&app, "POST", "/api/routers/B/start", None).await;
        assert_eq!(body["links_updated"], 1);
        let (_, link) = send(&app, "GET", "/api/links/A-ge0-B-ge0", None).await;
        assert_eq!(link["status"], "up");

        let (status, body) = send(&app, "POST", "/api/routers/A/start", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "already_in_state");

        send(&app, "POST", "/api/routers/A/stop?force=true", None).await;
        let (_, link) = send(&app, "GET", "/api/links/A-ge0-B-ge0", None).await;
        assert_eq!(link["status"], "down");
        assert!(hv.calls().contains(&"destroy:A".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_link_from_other_side_conflicts() {
        let (_hv, _prov, app) = app(MockHypervisor::new()).await;
        let body = json!({"source_router": "A", "source_interface": "ge-0/0/0", "target_router": "B", "target_interface": "ge-0/0/1"});
        assert_eq!(send(&app, "POST", "/api/links", Some(body)).await.0, StatusCode::CREATED);

        let reversed = json!({"source_router": "B", "source_interface": "ge-0/0/1", "target_router": "A", "target_interface": "ge-0/0/0"});
        let (status, body) = send(&app, "POST", "/api/links", Some(reversed)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn test_list_routers_and_unknown_router() {
        let (_hv, _prov, app) = app(
            MockHypervisor::new()
                .with_domain("sw1-re", true)
                .with_domain("sw1-pfe", true)
                .with_domain("r1", false),
        )
        .await;
        let (status, body) = send(&app, "GET", "/api/routers", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);

        let (_, sw1) = send(&app, "GET", "/api/routers/sw1", None).await;
        assert_eq!(sw1["kind"], "composite");
        assert_eq!(sw1["state"], "running");

        let (status, body) = send(&app, "GET", "/api/routers/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_create_router_statuses() {
        let (_hv, prov, app) = app(MockHypervisor::new()).await;
        let (status, body) = send(
            &app,
            "POST",
            "/api/routers",
            Some(json!({"name": "lab1-r1", "router_type": "csr1000v"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["router_type"], "cisco");
        assert_eq!(prov.calls()[0].command_line(), "mkcsr1000v lab1-r1");

        let (status, body) = send(&app, "POST", "/api/routers", Some(json!({"name": "r2", "router_type": "arista"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_kind"], "unsupported_type");
    }

    #[tokio::test]
    async fn test_delete_missing_router_succeeds() {
        let (_hv, _prov, app) = app(MockHypervisor::new()).await;
        let (status, body) = send(&app, "DELETE", "/api/routers/ghost", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_labs_and_bulk() {
        let (_hv, _prov, app) = app(
            MockHypervisor::new()
                .with_domain("lab1-r1", false)
                .with_domain("lab1-r2", true)
                .with_domain("lab2-r1", false),
        )
        .await;
        let (status, _) = send(&app, "POST", "/api/labs", Some(json!({"name": "lab1", "description": "BGP"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&app, "POST", "/api/labs", Some(json!({"name": "lab1"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, labs) = send(&app, "GET", "/api/labs", None).await;
        assert_eq!(labs[0]["router_count"], 2);
        assert_eq!(labs[0]["running_count"], 1);

        let (status, report) = send(&app, "POST", "/api/labs/lab1/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["succeeded"], json!(["lab1-r1"]));
        assert_eq!(report["skipped"], json!(["lab1-r2"]));
        assert_eq!(report["count"], 1);

        let (_, detail) = send(&app, "GET", "/api/labs/lab1", None).await;
        assert_eq!(detail["routers"].as_array().unwrap().len(), 2);

        assert_eq!(send(&app, "DELETE", "/api/labs/lab1", None).await.0, StatusCode::NO_CONTENT);
        assert_eq!(send(&app, "GET", "/api/labs/lab1", None).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_topologies() {
        let (_hv, _prov, app) = app(MockHypervisor::new()).await;
        let body = json!({"name": "core", "routers": [{"name": "core-r1", "router_type": "vsrx"}]});
        let (status, saved) = send(&app, "POST", "/api/topologies", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(saved["routers"][0]["ram_gb"], 4);

        let (_, list) = send(&app, "GET", "/api/topologies", None).await;
        assert_eq!(list[0]["router_count"], 1);

        let bad = json!({"name": "bad", "routers": [{"name": "x", "router_type": "arista"}]});
        assert_eq!(send(&app, "POST", "/api/topologies", Some(bad)).await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stats_and_console() {
        let (_hv, _prov, app) = app(
            MockHypervisor::new()
                .with_domain("r1", true)
                .with_domain("r2", false),
        )
        .await;
        let (status, stats) = send(&app, "GET", "/api/stats/system", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["vms"]["running"], 1);

        let (status, _) = send(&app, "GET", "/api/stats/routers/r2", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, session) = send(&app, "POST", "/api/routers/r1/console/session", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let token = session["token"].as_str().unwrap().to_string();
        assert_eq!(session["port"], 27681);

        let uri = format!("/api/console/{}", token);
        assert_eq!(send(&app, "GET", &uri, None).await.0, StatusCode::OK);
        assert_eq!(send(&app, "DELETE", &uri, None).await.0, StatusCode::NO_CONTENT);
        assert_eq!(send(&app, "GET", &uri, None).await.0, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "POST", "/api/routers/r2/console/session", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
