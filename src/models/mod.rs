mod device;
mod lab;
mod link;
mod stats;
mod topology;

pub use device::*;
pub use lab::*;
pub use link::*;
pub use stats::*;
pub use topology::*;
