//! Error types for the fuzzing agent.
//!
//! Each supervision component reports its own error enum so callers can match
//! on the precise failure. [`Error`] unifies them for the orchestration layer
//! and carries stable codes and categories for logs.
//!
//! Propagation rules:
//! - Registry and discovery errors go back to the registering caller and end
//!   up as a protocol-level `"failed"` response.
//! - Launch errors are retried locally before they are escalated.
//! - Protocol errors never produce a response.

use crate::id::ProcessId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Target registry errors (capacity, duplicates).
    Registry,
    /// Process filesystem lookups.
    Discovery,
    /// Spawning traced commands.
    Launch,
    /// Tracing pre-existing processes.
    Attach,
    /// Command protocol decoding.
    Protocol,
    /// Supervisor lifecycle misuse.
    Lifecycle,
    /// File and socket I/O.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Registry => write!(f, "registry"),
            ErrorCategory::Discovery => write!(f, "discovery"),
            ErrorCategory::Launch => write!(f, "launch"),
            ErrorCategory::Attach => write!(f, "attach"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Lifecycle => write!(f, "lifecycle"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Target registry rejections. The registry is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("target registry is full ({capacity} targets)")]
    CapacityExceeded { capacity: usize },

    #[error("target already registered: {command_line}")]
    Duplicate { command_line: String },
}

/// Failures launching a traced command.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("command line is empty")]
    EmptyCommandLine,

    #[error("executable not found: {path}")]
    ExecNotFound { path: String },

    #[error("failed to spawn {path} after {attempts} attempt(s): {source}")]
    SpawnFailed {
        path: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("process {pid} died before the liveness probe")]
    DiedBeforeLiveness { pid: ProcessId },
}

/// Failures attaching to an existing process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error("permission denied attaching to process {pid}")]
    PermissionDenied { pid: ProcessId },

    #[error("process {pid} does not exist")]
    NoSuchProcess { pid: ProcessId },

    #[error("process {pid} is already traced")]
    AlreadyTraced { pid: ProcessId },

    #[error("failed to attach to process {pid}: {reason}")]
    Other { pid: ProcessId, reason: String },
}

/// Process filesystem lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    #[error("no readable command line for process {pid}")]
    NotFound { pid: ProcessId },

    #[error("invalid process id: {input:?}")]
    InvalidProcessId { input: String },
}

/// Command protocol decoding failures. These are dropped without a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("message exceeds {limit} bytes")]
    MessageTooLarge { limit: usize },
}

/// Unified error type for the fuzzing agent.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Attach(#[from] AttachError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invalid target: {reason}")]
    InvalidTarget { reason: String },

    #[error("no targets to monitor")]
    NoTargets,

    #[error("monitor already started")]
    AlreadyStarted,

    #[error("monitor stopped during start")]
    Interrupted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the stable error code for this error.
    ///
    /// - 10-19: registry and discovery
    /// - 20-29: launch and attach
    /// - 30-39: protocol
    /// - 40-49: lifecycle
    /// - 60-69: I/O
    pub fn code(&self) -> u32 {
        match self {
            Error::Registry(RegistryError::CapacityExceeded { .. }) => 10,
            Error::Registry(RegistryError::Duplicate { .. }) => 11,
            Error::Discovery(DiscoveryError::NotFound { .. }) => 12,
            Error::Discovery(DiscoveryError::InvalidProcessId { .. }) => 13,
            Error::InvalidTarget { .. } => 14,
            Error::Launch(LaunchError::EmptyCommandLine) => 20,
            Error::Launch(LaunchError::ExecNotFound { .. }) => 21,
            Error::Launch(LaunchError::SpawnFailed { .. }) => 22,
            Error::Launch(LaunchError::DiedBeforeLiveness { .. }) => 23,
            Error::Attach(AttachError::PermissionDenied { .. }) => 24,
            Error::Attach(AttachError::NoSuchProcess { .. }) => 25,
            Error::Attach(AttachError::AlreadyTraced { .. }) => 26,
            Error::Attach(AttachError::Other { .. }) => 27,
            Error::Protocol(ProtocolError::Malformed(_)) => 30,
            Error::Protocol(ProtocolError::UnknownCommand(_)) => 31,
            Error::Protocol(ProtocolError::MessageTooLarge { .. }) => 32,
            Error::NoTargets => 40,
            Error::AlreadyStarted => 41,
            Error::Interrupted => 42,
            Error::Io(_) => 60,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Registry(_) | Error::InvalidTarget { .. } => ErrorCategory::Registry,
            Error::Discovery(_) => ErrorCategory::Discovery,
            Error::Launch(_) => ErrorCategory::Launch,
            Error::Attach(_) => ErrorCategory::Attach,
            Error::Protocol(_) => ErrorCategory::Protocol,
            Error::NoTargets | Error::AlreadyStarted | Error::Interrupted => {
                ErrorCategory::Lifecycle
            }
            Error::Io(_) => ErrorCategory::Io,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Registry(RegistryError::CapacityExceeded { .. }) => {
                "Raise supervisor.capacity in agent.toml or register fewer targets."
            }
            Error::Registry(RegistryError::Duplicate { .. }) => {
                "Each command line may be registered once. Kill the session before starting again."
            }
            Error::Discovery(_) => {
                "The process exited or its /proc entry is not readable by the agent user."
            }
            Error::InvalidTarget { .. } => "Check the target entries sent with the start command.",
            Error::Launch(_) => {
                "Use an absolute path to an existing executable. Check the agent log for exec errors."
            }
            Error::Attach(AttachError::PermissionDenied { .. }) => {
                "Run the agent as root or relax kernel.yama.ptrace_scope."
            }
            Error::Attach(AttachError::AlreadyTraced { .. }) => {
                "Another debugger or tracer holds the process. Detach it first."
            }
            Error::Attach(_) => "Verify the process id is alive before starting the session.",
            Error::Protocol(_) => "Send one JSON object per request: {\"command\": ..., \"data\": ...}.",
            Error::NoTargets => "Register at least one target before starting supervision.",
            Error::AlreadyStarted | Error::Interrupted => {
                "Start a new session; a monitor supervises one batch of targets."
            }
            Error::Io(_) => "Check permissions and system resources, then retry.",
        }
    }
}
