use crate::models::DeviceState;
use crate::provision::ProvisionError;

/// Outcome taxonomy of lifecycle operations.
///
/// Every variant except `Fault` is an expected, reportable result. `Fault` wraps
/// infrastructure failures (e.g. the record store is unreachable) that the HTTP
/// layer turns into a 500.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Device {name} is already {state}")]
    AlreadyInState { name: String, state: DeviceState },

    #[error("Device {name} not found")]
    NotFound { name: String },

    #[error("{name} is a unit of composite device {base}; address {base} instead")]
    ConstituentAddressed { name: String, base: String },

    #[error("Device {name} is not running ({detail})")]
    NotRunning { name: String, detail: String },

    #[error("Device {name} already exists")]
    AlreadyExists { name: String },

    #[error("Composite device {name} is missing its {unit} unit")]
    MissingConstituent { name: String, unit: &'static str },

    #[error("Unsupported router type: {router_type}. Use 'juniper', 'cisco', 'cisco-switch', or 'juniper-switch'")]
    UnsupportedType { router_type: String },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Provisioning timed out after {secs} seconds")]
    BackendTimeout { secs: u64 },

    #[error("Provisioning failed: {message}")]
    BackendFailure { message: String },

    #[error("Hypervisor error on {name}: {message}")]
    Gateway { name: String, message: String },

    #[error(transparent)]
    Fault(#[from] anyhow::Error),
}

impl LifecycleError {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyInState { .. } => "already_in_state",
            Self::NotFound { .. } => "not_found",
            Self::ConstituentAddressed { .. } => "constituent_addressed",
            Self::NotRunning { .. } => "not_running",
            Self::AlreadyExists { .. } => "already_exists",
            Self::MissingConstituent { .. } => "missing_constituent",
            Self::UnsupportedType { .. } => "unsupported_type",
            Self::InvalidRequest(_) => "invalid_request",
            Self::BackendTimeout { .. } => "backend_timeout",
            Self::BackendFailure { .. } => "backend_failure",
            Self::Gateway { .. } => "gateway",
            Self::Fault(_) => "fault",
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self::NotFound {
            name: name.to_string(),
        }
    }

    /// Wrap a failed hypervisor call on one VM
    pub fn gateway(name: &str, err: anyhow::Error) -> Self {
        Self::Gateway {
            name: name.to_string(),
            message: format!("{:#}", err),
        }
    }

    pub fn from_provision(err: ProvisionError) -> Self {
        match err {
            ProvisionError::Timeout(after) => Self::BackendTimeout { secs: after.as_secs() },
            ProvisionError::NonZeroExit { stderr, stdout, .. } => Self::BackendFailure {
                message: if stderr.trim().is_empty() {
                    stdout.trim().to_string()
                } else {
                    stderr.trim().to_string()
                },
            },
            other => Self::BackendFailure {
                message: other.to_string(),
            },
        }
    }
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_provision_errors_map_to_distinct_kinds() {
        let timeout = LifecycleError::from_provision(ProvisionError::Timeout(Duration::from_secs(120)));
        assert_eq!(timeout.kind(), "backend_timeout");
        assert_eq!(timeout.to_string(), "Provisioning timed out after 120 seconds");

        let failed = LifecycleError::from_provision(ProvisionError::NonZeroExit {
            code: Some(1),
            stdout: String::new(),
            stderr: "disk image missing\n".to_string(),
        });
        assert_eq!(failed.kind(), "backend_failure");
        assert_eq!(failed.to_string(), "Provisioning failed: disk image missing");
    }

    #[test]
    fn test_already_in_state_message() {
        let err = LifecycleError::AlreadyInState {
            name: "r1".to_string(),
            state: DeviceState::Running,
        };
        assert_eq!(err.to_string(), "Device r1 is already running");
    }
}
