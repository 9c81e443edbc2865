//! Process and target identity types.
//!
//! A supervised target is tracked by a [`TargetId`] for its whole lifetime in a
//! registry, while its [`ProcessId`] changes when the target is (re)launched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Process ID wrapper with display formatting.
///
/// `ProcessId(0)` means "no process assigned yet".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// Placeholder for targets the OS has not assigned a process to.
    pub const NONE: ProcessId = ProcessId(0);

    /// Returns true when no process is assigned.
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The raw value as the signed type used by the kernel interfaces.
    pub fn as_raw(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        ProcessId(pid)
    }
}

/// Error returned when a string is not a usable process id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a process id: {0:?}")]
pub struct ParseProcessIdError(pub String);

impl FromStr for ProcessId {
    type Err = ParseProcessIdError;

    /// Accepts only plain decimal digits (surrounding whitespace is trimmed).
    /// Zero, signs, and overflow are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseProcessIdError(s.to_string()));
        }
        match trimmed.parse::<u32>() {
            Ok(0) | Err(_) => Err(ParseProcessIdError(s.to_string())),
            Ok(pid) if pid > i32::MAX as u32 => Err(ParseProcessIdError(s.to_string())),
            Ok(pid) => Ok(ProcessId(pid)),
        }
    }
}

/// Registry-assigned identifier, stable across launches of the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub u64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_id_parse() {
        assert_eq!("1234".parse::<ProcessId>().unwrap(), ProcessId(1234));
        assert_eq!(" 42\n".parse::<ProcessId>().unwrap(), ProcessId(42));
    }

    #[test]
    fn test_process_id_parse_rejects_garbage() {
        assert!("".parse::<ProcessId>().is_err());
        assert!("0".parse::<ProcessId>().is_err());
        assert!("-5".parse::<ProcessId>().is_err());
        assert!("+5".parse::<ProcessId>().is_err());
        assert!("12ab".parse::<ProcessId>().is_err());
        assert!("99999999999".parse::<ProcessId>().is_err());
    }

    #[test]
    fn test_parse_error_message() {
        let err = "12ab".parse::<ProcessId>().unwrap_err();
        assert_eq!(err, ParseProcessIdError("12ab".to_string()));
        assert_eq!(err.to_string(), r#"not a process id: "12ab""#);
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_process_id_none() {
        assert!(ProcessId::NONE.is_none());
        assert!(ProcessId::default().is_none());
        assert!(!ProcessId(1).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(ProcessId(77).to_string(), "77");
        assert_eq!(TargetId(3).to_string(), "t3");
    }
}
