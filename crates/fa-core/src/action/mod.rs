//! Process control: traced launch, attach, signals, and child-state polling.

pub mod control;
pub mod launcher;

pub use control::{
    classify_status, signal_name, ChildEvent, PollResult, ProcessControl, PtraceControl,
};
pub use launcher::{LaunchPolicy, ProcessController};
