//! Fuzzing agent common types, IDs, and errors.
//!
//! This crate provides foundational types shared across fa-core modules:
//! - Process identity types
//! - The supervised target model and its state machine states
//! - Error taxonomy for registration, discovery, launch, attach, and protocol

pub mod error;
pub mod id;
pub mod target;

pub use error::{
    AttachError, DiscoveryError, Error, ErrorCategory, LaunchError, ProtocolError, RegistryError,
    Result,
};
pub use id::{ProcessId, TargetId};
pub use target::{Target, TargetKind, TargetState, TargetView, ARG_SEPARATOR};
