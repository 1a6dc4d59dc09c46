//! Device lifecycle and link consistency engine.
//!
//! [`DeviceDirectory`] reads devices from the hypervisor, [`LifecycleController`]
//! changes their state, [`LinkPropagator`] keeps link status in line with the
//! endpoints and [`BulkOrchestrator`] ties the last two together for single and
//! batch start/stop.

mod bulk;
mod directory;
mod error;
mod lifecycle;
mod locks;
mod propagator;

pub use bulk::BulkOrchestrator;
pub use directory::DeviceDirectory;
pub use error::{LifecycleError, LifecycleResult};
pub use lifecycle::LifecycleController;
pub use propagator::LinkPropagator;
