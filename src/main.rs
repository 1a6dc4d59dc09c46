mod config;
mod console;
mod db;
mod engine;
mod handlers;
mod hypervisor;
mod models;
mod provision;
mod router;
mod stats;
mod status;
mod utils;
mod ws;

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use console::{ConsoleRegistry, ConsoleSettings};
use db::Store;
use engine::{BulkOrchestrator, DeviceDirectory, LifecycleController, LinkPropagator};
use hypervisor::{Hypervisor, VirshHypervisor};
use provision::{CommandProvisioner, Provisioner};
use stats::StatsService;
use status::LinkReconciler;
use ws::Hub;

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub config: Config,
    pub directory: Arc<DeviceDirectory>,
    pub lifecycle: Arc<LifecycleController>,
    pub propagator: Arc<LinkPropagator>,
    pub bulk: Arc<BulkOrchestrator>,
    pub stats: StatsService,
    pub consoles: Arc<ConsoleRegistry>,
    pub ws_hub: Arc<Hub>,
}

impl AppState {
    /// Wire the engine together around the given collaborators
    pub fn new(
        config: Config,
        store: Store,
        hypervisor: Arc<dyn Hypervisor>,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        let ws_hub = Arc::new(Hub::new());
        let directory = Arc::new(DeviceDirectory::new(hypervisor.clone()));
        let lifecycle = Arc::new(
            LifecycleController::new(directory.clone(), provisioner, store.clone())
                .with_settle(Duration::from_secs(config.composite_settle_secs))
                .with_images_dir(&config.images_dir),
        );
        let propagator = Arc::new(LinkPropagator::new(store.clone(), directory.clone()).with_hub(ws_hub.clone()));
        let bulk = Arc::new(BulkOrchestrator::new(lifecycle.clone(), propagator.clone()).with_hub(ws_hub.clone()));
        let consoles = Arc::new(ConsoleRegistry::new(ConsoleSettings {
            program: config.console_program.clone(),
            host: config.console_host.clone(),
            base_port: config.console_base_port,
            ttl: Duration::from_secs(config.console_session_ttl_secs),
            virsh_bin: config.virsh_bin.clone(),
            libvirt_uri: config.libvirt_uri.clone(),
        }));

        Self {
            stats: StatsService::new(hypervisor, &config.images_dir),
            store,
            config,
            directory,
            lifecycle,
            propagator,
            bulk,
            consoles,
            ws_hub,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vrhost_lab=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Config::load();
    tracing::info!("Starting VRHost Lab server");
    tracing::info!("Database: {}", cfg.db_path);
    tracing::info!("Libvirt: {} via {}", cfg.libvirt_uri, cfg.virsh_bin);
    tracing::info!("Listen: {}", cfg.listen_addr);

    let store = Store::with_pool_size(&cfg.db_path, cfg.db_max_connections).await?;
    tracing::info!("Database initialized (pool_size={})", cfg.db_max_connections);

    let hypervisor: Arc<dyn Hypervisor> = Arc::new(VirshHypervisor::new(&cfg.virsh_bin, &cfg.libvirt_uri));
    match hypervisor.list_domains().await {
        Ok(domains) => tracing::info!("Connected to libvirt ({} domains)", domains.len()),
        Err(e) => tracing::warn!("Libvirt not reachable at startup: {:#}", e),
    }

    let provisioner: Arc<dyn Provisioner> =
        Arc::new(CommandProvisioner::new(Duration::from_secs(cfg.provision_timeout_secs)));

    let state = Arc::new(AppState::new(cfg.clone(), store, hypervisor, provisioner));

    let mut reconciler = LinkReconciler::new(state.propagator.clone(), cfg.link_reconcile_secs);
    if cfg.link_reconcile_secs > 0 {
        reconciler.start();
    }

    let reaper = state.consoles.spawn_reaper(Duration::from_secs(60));

    let app = router::build(state.clone(), &cfg.frontend_dir);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!("VRHost Lab listening on {}", cfg.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("VRHost Lab shutting down");
    reconciler.stop();
    reaper.abort();
    state.consoles.drain().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
