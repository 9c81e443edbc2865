//! Target supervision: registry, per-target state machine, and the monitor
//! that drives launch, the wait loop, and teardown.

pub mod monitor;
pub mod registry;
pub mod state_machine;

pub use monitor::Monitor;
pub use registry::TargetRegistry;
pub use state_machine::{apply_event, Disposition};
