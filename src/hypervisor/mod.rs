//! Hypervisor gateway.
//!
//! The lifecycle engine only talks to VMs through the [`Hypervisor`] trait. The
//! production implementation drives `virsh`; tests use an in-memory mock that
//! records the order of calls.

mod virsh;

#[cfg(test)]
pub mod mock;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::{HostInfo, VmState};

pub use virsh::VirshHypervisor;

/// Static and runtime information about one domain
#[derive(Debug, Clone, Serialize)]
pub struct DomainInfo {
    pub name: String,
    pub state: VmState,
    pub max_memory_kib: u64,
    pub memory_kib: u64,
    pub vcpus: u32,
    pub cpu_time_ns: u64,
    pub domain_id: Option<u32>,
    pub uuid: Option<String>,
    pub autostart: bool,
}

impl DomainInfo {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn max_memory_mb(&self) -> u64 {
        self.max_memory_kib / 1024
    }

    pub fn memory_mb(&self) -> u64 {
        self.memory_kib / 1024
    }
}

/// Operations the engine needs from the hypervisor. Every call is a fresh read
/// or a direct action; implementations must not cache domain state.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Names of every defined domain, active or not
    async fn list_domains(&self) -> Result<Vec<String>>;

    /// Look up a domain by name; `Ok(None)` when it is not defined
    async fn lookup(&self, name: &str) -> Result<Option<DomainInfo>>;

    async fn start(&self, name: &str) -> Result<()>;

    /// Graceful (ACPI) shutdown request
    async fn shutdown(&self, name: &str) -> Result<()>;

    /// Immediate power-off
    async fn force_stop(&self, name: &str) -> Result<()>;

    /// Reboot signal; does not wait for the guest to come back
    async fn reboot(&self, name: &str) -> Result<()>;

    /// Remove the domain definition
    async fn undefine(&self, name: &str) -> Result<()>;

    /// Domain XML, used for device type classification
    async fn definition(&self, name: &str) -> Result<String>;

    async fn host_info(&self) -> Result<HostInfo>;
}
