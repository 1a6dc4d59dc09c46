use serde::{Deserialize, Serialize};

/// Suffix of the control unit (routing engine) of a composite device
pub const CONTROL_SUFFIX: &str = "-re";
/// Suffix of the forwarding unit (packet forwarding engine) of a composite device
pub const FORWARDING_SUFFIX: &str = "-pfe";

/// Hypervisor domain state, as libvirt's virDomainState
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    NoState,
    Running,
    Blocked,
    Paused,
    Shutdown,
    Shutoff,
    Crashed,
    Suspended,
    Unknown,
}

impl VmState {
    /// Parse the state string printed by `virsh dominfo` / `virsh domstate`
    pub fn from_virsh(s: &str) -> Self {
        match s.trim() {
            "no state" => Self::NoState,
            "running" => Self::Running,
            "idle" | "blocked" => Self::Blocked,
            "paused" => Self::Paused,
            "in shutdown" => Self::Shutdown,
            "shut off" => Self::Shutoff,
            "crashed" => Self::Crashed,
            "pmsuspended" => Self::Suspended,
            _ => Self::Unknown,
        }
    }

    /// A domain counts as active while it has a live process (libvirt isActive)
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Blocked | Self::Paused | Self::Shutdown)
    }
}

/// Logical device state as presented to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceState {
    Unknown,
    NotCreated,
    Stopped,
    Running,
    Partial,
}

impl DeviceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::NotCreated => "not-created",
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Partial => "partial",
        }
    }

    /// State of a single-VM device
    pub fn from_active(active: bool) -> Self {
        if active {
            Self::Running
        } else {
            Self::Stopped
        }
    }

    /// Combined state of a composite device. `None` means the unit does not exist.
    pub fn composite(control: Option<bool>, forwarding: Option<bool>) -> Self {
        match (control, forwarding) {
            (Some(true), Some(true)) => Self::Running,
            (Some(false), Some(false)) => Self::Stopped,
            (None, None) => Self::NotCreated,
            _ => Self::Partial,
        }
    }
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vendor/role of a device. Selects the provisioning command and whether the
/// device is backed by one VM or a control/forwarding pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceType {
    Juniper,
    Cisco,
    CiscoSwitch,
    JuniperSwitch,
}

impl DeviceType {
    /// Parse a requested type, accepting the platform aliases operators use
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "juniper" | "vsrx" => Some(Self::Juniper),
            "cisco" | "csr1000v" | "csr" => Some(Self::Cisco),
            "cisco-switch" | "iosvl2" | "viosl2" => Some(Self::CiscoSwitch),
            "juniper-switch" | "vqfx" => Some(Self::JuniperSwitch),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Juniper => "juniper",
            Self::Cisco => "cisco",
            Self::CiscoSwitch => "cisco-switch",
            Self::JuniperSwitch => "juniper-switch",
        }
    }

    /// Provisioning script that builds the VM definition(s) and disk images
    pub fn create_command(self) -> &'static str {
        match self {
            Self::Juniper => "mkjuniper",
            Self::Cisco => "mkcsr1000v",
            Self::CiscoSwitch => "mkviosl2",
            Self::JuniperSwitch => "mkvqfx",
        }
    }

    /// Provisioning script that tears down every VM of a composite device at once
    pub fn teardown_command(self) -> Option<&'static str> {
        match self {
            Self::JuniperSwitch => Some("rmvqfx"),
            _ => None,
        }
    }

    /// Best-effort classification of an existing single VM from its name and
    /// domain XML. Unknown platforms default to juniper.
    pub fn classify(name: &str, xml: &str) -> Self {
        let xml = xml.to_lowercase();
        let lower_name = name.to_lowercase();

        if xml.contains("viosl2") || name.starts_with("sw") || lower_name.contains("iosvl2") {
            return Self::CiscoSwitch;
        }
        if xml.contains("vjunos-switch") || xml.contains("vqfx") {
            return Self::JuniperSwitch;
        }
        if xml.contains("csr1000v") {
            return Self::Cisco;
        }
        if xml.contains("vsrx") {
            return Self::Juniper;
        }
        if name.starts_with("csr-") || lower_name.contains("cisco") {
            return Self::Cisco;
        }
        Self::Juniper
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live view of one underlying VM
#[derive(Debug, Clone, Serialize)]
pub struct UnitRef {
    pub id: String,
    pub active: bool,
    pub vm_state: VmState,
    pub memory_mb: u64,
    pub vcpus: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_id: Option<u32>,
}

/// How a device is backed by hypervisor VMs. A missing composite unit is `None`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backing {
    Simple {
        unit: UnitRef,
    },
    Composite {
        control: Option<UnitRef>,
        forwarding: Option<UnitRef>,
    },
}

impl Backing {
    pub fn is_composite(&self) -> bool {
        matches!(self, Backing::Composite { .. })
    }

    /// Derived device state, computed from the unit snapshot
    pub fn state(&self) -> DeviceState {
        match self {
            Backing::Simple { unit } => DeviceState::from_active(unit.active),
            Backing::Composite { control, forwarding } => DeviceState::composite(
                control.as_ref().map(|u| u.active),
                forwarding.as_ref().map(|u| u.active),
            ),
        }
    }

    /// Summed resources across every existing unit
    pub fn resources(&self) -> (u64, u32) {
        match self {
            Backing::Simple { unit } => (unit.memory_mb, unit.vcpus),
            Backing::Composite { control, forwarding } => [control, forwarding]
                .into_iter()
                .flatten()
                .fold((0, 0), |(mem, cpu), u| (mem + u.memory_mb, cpu + u.vcpus)),
        }
    }
}

/// Device is one logical router or switch
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    pub name: String,
    #[serde(flatten)]
    pub backing: Backing,
    pub router_type: DeviceType,
    pub state: DeviceState,
    pub memory_mb: u64,
    pub vcpus: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab: Option<String>,
}

impl Device {
    pub fn new(name: impl Into<String>, backing: Backing, router_type: DeviceType) -> Self {
        let name = name.into();
        let (memory_mb, vcpus) = backing.resources();
        Self {
            lab: crate::utils::lab_of(&name),
            state: backing.state(),
            name,
            backing,
            router_type,
            memory_mb,
            vcpus,
        }
    }

    pub fn is_composite(&self) -> bool {
        self.backing.is_composite()
    }
}

/// CreateRouterRequest for provisioning a new device
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRouterRequest {
    pub name: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default = "default_router_type")]
    pub router_type: String,
    #[serde(default = "default_ram_gb")]
    pub ram_gb: u32,
    #[serde(default = "default_vcpus")]
    pub vcpus: u32,
}

fn default_router_type() -> String {
    "vsrx".to_string()
}

fn default_ram_gb() -> u32 {
    4
}

fn default_vcpus() -> u32 {
    2
}

/// Query parameters for stop operations
#[derive(Debug, Default, Deserialize)]
pub struct StopQuery {
    #[serde(default)]
    pub force: bool,
}

/// Outcome of a successful lifecycle operation
#[derive(Debug, Clone, Serialize)]
pub struct ActionReport {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub router_type: Option<DeviceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links_removed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links_updated: Option<usize>,
}

impl ActionReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            router_type: None,
            output: None,
            links_removed: None,
            links_updated: None,
        }
    }
}

/// Per-device failure inside a bulk operation
#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub name: String,
    pub error: String,
}

/// Aggregated outcome of a bulk start/stop
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<BulkFailure>,
    pub skipped: Vec<String>,
    pub links_updated: usize,
}

impl BulkReport {
    pub fn count(&self) -> usize {
        self.succeeded.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: &str, active: bool, mem: u64, cpus: u32) -> UnitRef {
        UnitRef {
            id: id.to_string(),
            active,
            vm_state: if active { VmState::Running } else { VmState::Shutoff },
            memory_mb: mem,
            vcpus: cpus,
            domain_id: None,
        }
    }

    #[test]
    fn test_composite_state_derivation() {
        assert_eq!(DeviceState::composite(Some(true), Some(true)), DeviceState::Running);
        assert_eq!(DeviceState::composite(Some(false), Some(false)), DeviceState::Stopped);
        assert_eq!(DeviceState::composite(Some(true), Some(false)), DeviceState::Partial);
        assert_eq!(DeviceState::composite(Some(false), Some(true)), DeviceState::Partial);
        assert_eq!(DeviceState::composite(None, Some(false)), DeviceState::Partial);
        assert_eq!(DeviceState::composite(Some(true), None), DeviceState::Partial);
        assert_eq!(DeviceState::composite(None, None), DeviceState::NotCreated);
    }

    #[test]
    fn test_composite_resources_are_summed() {
        let backing = Backing::Composite {
            control: Some(unit("sw1-re", true, 1024, 1)),
            forwarding: Some(unit("sw1-pfe", true, 2048, 2)),
        };
        let device = Device::new("sw1", backing, DeviceType::JuniperSwitch);
        assert_eq!(device.memory_mb, 3072);
        assert_eq!(device.vcpus, 3);
        assert_eq!(device.state, DeviceState::Running);
    }

    #[test]
    fn test_device_type_aliases() {
        assert_eq!(DeviceType::parse("vsrx"), Some(DeviceType::Juniper));
        assert_eq!(DeviceType::parse("CSR"), Some(DeviceType::Cisco));
        assert_eq!(DeviceType::parse("viosl2"), Some(DeviceType::CiscoSwitch));
        assert_eq!(DeviceType::parse("vqfx"), Some(DeviceType::JuniperSwitch));
        assert_eq!(DeviceType::parse("arista"), None);
        assert_eq!(DeviceType::JuniperSwitch.teardown_command(), Some("rmvqfx"));
        assert_eq!(DeviceType::Cisco.teardown_command(), None);
    }

    #[test]
    fn test_classify() {
        assert_eq!(DeviceType::classify("sw1", ""), DeviceType::CiscoSwitch);
        assert_eq!(DeviceType::classify("r1", "<disk file='vqfx.qcow2'/>"), DeviceType::JuniperSwitch);
        assert_eq!(DeviceType::classify("r1", "<disk file='CSR1000V.qcow2'/>"), DeviceType::Cisco);
        assert_eq!(DeviceType::classify("csr-1", ""), DeviceType::Cisco);
        assert_eq!(DeviceType::classify("r1", "<domain/>"), DeviceType::Juniper);
    }

    #[test]
    fn test_vm_states() {
        assert_eq!(VmState::from_virsh("running"), VmState::Running);
        assert_eq!(VmState::from_virsh("idle"), VmState::Blocked);
        assert_eq!(VmState::from_virsh("something else"), VmState::Unknown);
        assert_eq!(VmState::from_virsh("shut off"), VmState::Shutoff);
        assert!(VmState::Paused.is_active());
        assert!(!VmState::Shutoff.is_active());
    }

    #[test]
    fn test_state_serializes_kebab_case() {
        let json = serde_json::to_string(&DeviceState::NotCreated).unwrap();
        assert_eq!(json, "\"not-created\"");
    }
}
