//! Process collection from the process filesystem.

pub mod cmdline;
pub mod discovery;

pub use cmdline::{record_matches, to_display_string};
pub use discovery::ProcessDiscovery;
