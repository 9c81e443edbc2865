//! Request and response types for the command protocol.
//!
//! Requests are `{"command": <name>, "data": <payload>}` objects. Responses
//! are written in the literal form `{"command": "<name>", "data": <value>}`,
//! with a space after every colon and comma.

use fa_common::{ProtocolError, TargetKind, TargetView};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use std::io;

/// A decoded request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Ping,
    Kill,
    Stop,
    /// Raw `data` payload; decoded by [`parse_targets`] so a bad payload
    /// still gets a `failed` response.
    Start(Value),
    Status,
}

impl Request {
    /// Decode one JSON value. Errors mean the request is dropped unanswered.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let object = value
            .as_object()
            .ok_or_else(|| ProtocolError::Malformed("request is not an object".into()))?;
        let command = object
            .get("command")
            .ok_or_else(|| ProtocolError::Malformed("missing command".into()))?
            .as_str()
            .ok_or_else(|| ProtocolError::Malformed("command is not a string".into()))?;

        match command {
            "ping" => Ok(Request::Ping),
            "kill" => Ok(Request::Kill),
            "stop" => Ok(Request::Stop),
            "status" => Ok(Request::Status),
            "start" => Ok(Request::Start(
                object.get("data").cloned().unwrap_or(Value::Null),
            )),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::Kill => "kill",
            Request::Stop => "stop",
            Request::Start(_) => "start",
            Request::Status => "status",
        }
    }
}

/// One element of a `start` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub kind: TargetKind,
    pub input: String,
}

/// Decode a `start` payload into target specs.
///
/// The payload must be a non-empty array. `process` wins over `command`
/// when an element carries both; a numeric `process` is accepted.
pub fn parse_targets(data: &Value) -> Result<Vec<TargetSpec>, ProtocolError> {
    let items = data
        .as_array()
        .ok_or_else(|| ProtocolError::Malformed("start payload is not an array".into()))?;
    if items.is_empty() {
        return Err(ProtocolError::Malformed("start payload is empty".into()));
    }

    items
        .iter()
        .map(|item| {
            if let Some(process) = item.get("process") {
                let input = match process {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return Err(ProtocolError::Malformed("process is not a pid".into())),
                };
                return Ok(TargetSpec {
                    kind: TargetKind::ExistingProcess,
                    input,
                });
            }
            match item.get("command").and_then(Value::as_str) {
                Some(command) => Ok(TargetSpec {
                    kind: TargetKind::Command,
                    input: command.to_string(),
                }),
                None => Err(ProtocolError::Malformed(
                    "target has neither command nor process".into(),
                )),
            }
        })
        .collect()
}

/// One `status` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    pub running: u8,
    pub state: u8,
    pub target_type: u8,
    pub process_id: u32,
    pub command_line: String,
    pub exit_code: i32,
    pub signal_number: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_string: Option<String>,
}

impl From<&TargetView> for StatusEntry {
    fn from(view: &TargetView) -> Self {
        Self {
            running: u8::from(view.running),
            state: view.state.code(),
            target_type: view.kind.code(),
            process_id: view.process_id.0,
            command_line: view.command_line.clone(),
            exit_code: view.exit_code.unwrap_or(0),
            signal_number: view.last_signal.unwrap_or(0),
            signal_string: view.signal_description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseData {
    Text(&'static str),
    Targets(Vec<StatusEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    pub command: &'static str,
    pub data: ResponseData,
}

impl Response {
    pub fn pong() -> Self {
        Self::text("ping", "pong")
    }

    /// `success` or `failed` for `command`.
    pub fn outcome(command: &'static str, ok: bool) -> Self {
        Self::text(command, if ok { "success" } else { "failed" })
    }

    pub fn status_ok() -> Self {
        Self::text("status", "OK")
    }

    pub fn status(views: &[TargetView]) -> Self {
        Self {
            command: "status",
            data: ResponseData::Targets(views.iter().map(StatusEntry::from).collect()),
        }
    }

    fn text(command: &'static str, data: &'static str) -> Self {
        Self {
            command,
            data: ResponseData::Text(data),
        }
    }

    /// Serialize in the wire layout.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut serializer = serde_json::Serializer::with_formatter(Vec::new(), WireFormatter);
        self.serialize(&mut serializer)?;
        Ok(serializer.into_inner())
    }
}

/// Compact JSON with `": "` and `", "` separators.
struct WireFormatter;

impl Formatter for WireFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
