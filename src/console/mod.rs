//! Web console sessions. Each session is a terminal-forwarding process
//! (ttyd by default) attached to one router's serial console.

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// How long a terminated console process gets before it is killed
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ConsoleSettings {
    pub program: String,
    pub host: String,
    pub base_port: u16,
    pub ttl: Duration,
    pub virsh_bin: String,
    pub libvirt_uri: String,
}

/// Public view of a live session
#[derive(Debug, Clone, Serialize)]
pub struct ConsoleSession {
    pub token: String,
    pub router_name: String,
    pub port: u16,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

struct Session {
    info: ConsoleSession,
    child: Child,
    started: Instant,
}

struct Inner {
    sessions: HashMap<String, Session>,
    next_port: u16,
}

/// Process-scoped registry of console sessions. Created at startup and
/// drained at shutdown so no console process outlives the service.
pub struct ConsoleRegistry {
    settings: ConsoleSettings,
    inner: Mutex<Inner>,
}

impl ConsoleRegistry {
    pub fn new(settings: ConsoleSettings) -> Self {
        let next_port = settings.base_port;
        Self {
            settings,
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                next_port,
            }),
        }
    }

    /// Spawn a console process for `router` and register it under a fresh token
    pub async fn create(&self, router: &str) -> Result<ConsoleSession> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let mut inner = self.inner.lock().await;

        let port = self.allocate_port(&mut inner)?;
        let child = Command::new(&self.settings.program)
            .args(self.command_args(port, router))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.settings.program))?;

        let created_at = Utc::now();
        let expires_at = created_at
            + chrono::Duration::from_std(self.settings.ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        let info = ConsoleSession {
            token: token.clone(),
            router_name: router.to_string(),
            port,
            created_at,
            expires_at,
        };

        inner.sessions.insert(
            token,
            Session {
                info: info.clone(),
                child,
                started: Instant::now(),
            },
        );
        tracing::info!("Console session for {} on port {}", router, port);
        Ok(info)
    }

    /// Look up a session; an expired one is closed and reported as absent
    pub async fn get(&self, token: &str) -> Option<ConsoleSession> {
        let expired = {
            let mut inner = self.inner.lock().await;
            let session = inner.sessions.get(token)?;
            if session.started.elapsed() <= self.settings.ttl {
                return Some(session.info.clone());
            }
            inner.sessions.remove(token)
        };
        if let Some(session) = expired {
            tracing::info!("Console session for {} expired", session.info.router_name);
            terminate(session.child).await;
        }
        None
    }

    pub async fn list(&self) -> Vec<ConsoleSession> {
        let inner = self.inner.lock().await;
        let mut sessions: Vec<ConsoleSession> = inner.sessions.values().map(|s| s.info.clone()).collect();
        sessions.sort_by_key(|s| s.port);
        sessions
    }

    /// Close a session. Returns false if the token is unknown.
    pub async fn close(&self, token: &str) -> bool {
        let removed = self.inner.lock().await.sessions.remove(token);
        match removed {
            Some(session) => {
                tracing::info!("Closing console session for {}", session.info.router_name);
                terminate(session.child).await;
                true
            }
            None => false,
        }
    }

    /// Close every session older than the TTL
    pub async fn reap_expired(&self) -> usize {
        let expired: Vec<Session> = {
            let mut inner = self.inner.lock().await;
            let tokens: Vec<String> = inner
                .sessions
                .iter()
                .filter(|(_, s)| s.started.elapsed() > self.settings.ttl)
                .map(|(t, _)| t.clone())
                .collect();
            tokens
                .iter()
                .filter_map(|t| inner.sessions.remove(t))
                .collect()
        };

        let count = expired.len();
        for session in expired {
            terminate(session.child).await;
        }
        if count > 0 {
            tracing::info!("Reaped {} expired console sessions", count);
        }
        count
    }

    /// Close every session
    pub async fn drain(&self) {
        let sessions: Vec<Session> = self.inner.lock().await.sessions.drain().map(|(_, s)| s).collect();
        if !sessions.is_empty() {
            tracing::info!("Closing {} console sessions", sessions.len());
        }
        futures_util::future::join_all(sessions.into_iter().map(|s| terminate(s.child))).await;
    }

    /// Background task that reaps expired sessions every `every`
    pub fn spawn_reaper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                registry.reap_expired().await;
            }
        })
    }

    fn command_args(&self, port: u16, router: &str) -> Vec<String> {
        vec![
            "-p".to_string(),
            port.to_string(),
            "-i".to_string(),
            self.settings.host.clone(),
            "-t".to_string(),
            "fontSize=14".to_string(),
            "-t".to_string(),
            "fontFamily=\"Courier New, monospace\"".to_string(),
            self.settings.virsh_bin.clone(),
            "-c".to_string(),
            self.settings.libvirt_uri.clone(),
            "console".to_string(),
            router.to_string(),
        ]
    }

    /// Next port at or after the cursor that no live session holds
    fn allocate_port(&self, inner: &mut Inner) -> Result<u16> {
        let used: HashSet<u16> = inner.sessions.values().map(|s| s.info.port).collect();
        let base = self.settings.base_port;
        let span = u32::from(u16::MAX - base) + 1;

        let mut port = inner.next_port.max(base);
        for _ in 0..span {
            let candidate = port;
            port = if port == u16::MAX { base } else { port + 1 };
            if !used.contains(&candidate) {
                inner.next_port = port;
                return Ok(candidate);
            }
        }
        anyhow::bail!("No free console port at or above {}", base)
    }
}

/// SIGTERM, then kill if the process is still alive after the grace period
async fn terminate(mut child: Child) {
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!("SIGTERM to console process {} failed: {}", pid, e);
        }
    }

    match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => tracing::warn!("Waiting for console process failed: {}", e),
        Err(_) => {
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill console process: {}", e);
            }
        }
    }
}
