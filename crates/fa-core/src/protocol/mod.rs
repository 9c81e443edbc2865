//! Command protocol: JSON requests over TCP driving per-connection monitors.

pub mod framing;
pub mod listener;
pub mod messages;
pub mod session;

pub use framing::FrameBuffer;
pub use listener::{bind, handle_connection, serve};
pub use messages::{parse_targets, Request, Response, ResponseData, StatusEntry, TargetSpec};
pub use session::{MonitorFactory, Session};
