use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{DomainInfo, Hypervisor};
use crate::models::{HostInfo, VmState};

#[derive(Debug, Clone)]
struct MockDomain {
    active: bool,
    memory_mb: u64,
    vcpus: u32,
    xml: String,
}

#[derive(Default)]
struct MockState {
    domains: BTreeMap<String, MockDomain>,
    calls: Vec<String>,
    failing: HashSet<(String, String)>,
}

/// In-memory hypervisor that records every mutating call as "op:name"
#[derive(Default)]
pub struct MockHypervisor {
    state: Mutex<MockState>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(self, name: &str, active: bool) -> Self {
        self.add_domain(name, active);
        self
    }

    pub fn add_domain(&self, name: &str, active: bool) {
        self.add_domain_with(name, active, 2048, 2, "<domain type='kvm'/>");
    }

    pub fn add_domain_with(&self, name: &str, active: bool, memory_mb: u64, vcpus: u32, xml: &str) {
        self.state.lock().unwrap().domains.insert(
            name.to_string(),
            MockDomain {
                active,
                memory_mb,
                vcpus,
                xml: xml.to_string(),
            },
        );
    }

    pub fn set_active(&self, name: &str, active: bool) {
        if let Some(d) = self.state.lock().unwrap().domains.get_mut(name) {
            d.active = active;
        }
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.state.lock().unwrap().domains.contains_key(name)
    }

    pub fn active(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .domains
            .get(name)
            .map(|d| d.active)
            .unwrap_or(false)
    }

    /// Make the next and every later `op` on `name` fail
    pub fn fail_on(&self, op: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert((op.to_string(), name.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn act(&self, op: &str, name: &str, f: impl FnOnce(&mut BTreeMap<String, MockDomain>) -> Result<()>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{}:{}", op, name));
        if state.failing.contains(&(op.to_string(), name.to_string())) {
            bail!("injected {} failure for {}", op, name);
        }
        if !state.domains.contains_key(name) {
            bail!("Domain not found: no domain with matching name '{}'", name);
        }
        f(&mut state.domains)
    }
}

#[async_trait]
impl Hypervisor for MockHypervisor {
    async fn list_domains(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().unwrap().domains.keys().cloned().collect())
    }

    async fn lookup(&self, name: &str) -> Result<Option<DomainInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state.domains.get(name).map(|d| DomainInfo {
            name: name.to_string(),
            state: if d.active { VmState::Running } else { VmState::Shutoff },
            max_memory_kib: d.memory_mb * 1024,
            memory_kib: d.memory_mb * 1024,
            vcpus: d.vcpus,
            cpu_time_ns: if d.active { 5_000_000_000 } else { 0 },
            domain_id: if d.active { Some(1) } else { None },
            uuid: None,
            autostart: false,
        }))
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.act("start", name, |domains| {
            let d = domains.get_mut(name).expect("checked");
            if d.active {
                bail!("Requested operation is not valid: domain is already running");
            }
            d.active = true;
            Ok(())
        })
    }

    async fn shutdown(&self, name: &str) -> Result<()> {
        self.act("shutdown", name, |domains| {
            domains.get_mut(name).expect("checked").active = false;
            Ok(())
        })
    }

    async fn force_stop(&self, name: &str) -> Result<()> {
        self.act("destroy", name, |domains| {
            domains.get_mut(name).expect("checked").active = false;
            Ok(())
        })
    }

    async fn reboot(&self, name: &str) -> Result<()> {
        self.act("reboot", name, |_| Ok(()))
    }

    async fn undefine(&self, name: &str) -> Result<()> {
        self.act("undefine", name, |domains| {
            domains.remove(name);
            Ok(())
        })
    }

    async fn definition(&self, name: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        state
            .domains
            .get(name)
            .map(|d| d.xml.clone())
            .ok_or_else(|| anyhow!("Domain not found: {}", name))
    }

    async fn host_info(&self) -> Result<HostInfo> {
        Ok(HostInfo {
            model: "x86_64".to_string(),
            total_memory_mb: 65536,
            total_cpus: 16,
            cpu_mhz: 2400,
            numa_nodes: 1,
        })
    }
}
