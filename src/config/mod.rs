use std::env;
use std::str::FromStr;

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    pub listen_addr: String,
    pub frontend_dir: String,
    pub libvirt_uri: String,
    pub virsh_bin: String,
    pub images_dir: String,
    pub provision_timeout_secs: u64,
    pub composite_settle_secs: u64,
    pub console_program: String,
    pub console_host: String,
    pub console_base_port: u16,
    pub console_session_ttl_secs: u64,
    /// Zero disables background link reconciliation
    pub link_reconcile_secs: u64,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        Self {
            db_path: get_env("DB_PATH", "/data/vrhost-lab.db"),
            db_max_connections: get_parsed("DB_MAX_CONNECTIONS", 5),
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:8000"),
            frontend_dir: get_env("FRONTEND_DIR", "/app/frontend"),
            libvirt_uri: get_env("LIBVIRT_URI", "qemu:///system"),
            virsh_bin: get_env("VIRSH_BIN", "virsh"),
            images_dir: get_env("IMAGES_DIR", "/var/lib/libvirt/images"),
            provision_timeout_secs: get_parsed("PROVISION_TIMEOUT_SECS", 120),
            composite_settle_secs: get_parsed("COMPOSITE_SETTLE_SECS", 5),
            console_program: get_env("CONSOLE_PROGRAM", "ttyd"),
            console_host: get_env("CONSOLE_HOST", "0.0.0.0"),
            console_base_port: get_parsed("CONSOLE_BASE_PORT", 7681),
            console_session_ttl_secs: get_parsed("CONSOLE_SESSION_TTL_SECS", 3600),
            link_reconcile_secs: get_parsed("LINK_RECONCILE_SECS", 30),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Numeric setting; unparseable values fall back to the default
fn get_parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
