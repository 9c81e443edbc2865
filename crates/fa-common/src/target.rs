//! Supervised target model.
//!
//! A [`Target`] is one process under supervision: either a command line the
//! agent launches itself, or a process that already exists and is attached to.
//! State only moves forward:
//!
//! ```text
//! Uninitialized ──> Monitoring ──> Issue | Exited | Killed
//!       │
//!       └──> Error   (launch/attach phase failed)
//! ```
//!
//! Reaching a terminal state ends supervision of that process incarnation; a
//! fresh registration is needed to monitor the command line again.

use crate::id::{ProcessId, TargetId};
use serde::{Deserialize, Serialize};

/// Byte that separates arguments in a command line record.
pub const ARG_SEPARATOR: u8 = 0;

/// How a target came under supervision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Launched by the agent from a space-delimited command line.
    Command,
    /// Pre-existing process attached to by pid.
    ExistingProcess,
}

impl TargetKind {
    /// Numeric code used on the wire.
    pub fn code(self) -> u8 {
        match self {
            TargetKind::Command => 0,
            TargetKind::ExistingProcess => 1,
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Command => write!(f, "command"),
            TargetKind::ExistingProcess => write!(f, "process"),
        }
    }
}

/// Supervision state of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    Uninitialized,
    /// The launch/attach phase failed.
    Error,
    Monitoring,
    /// Died with a core dump (crash).
    Issue,
    Exited,
    /// Terminated by a signal without a core dump.
    Killed,
}

impl TargetState {
    /// Numeric code used on the wire.
    pub fn code(self) -> u8 {
        match self {
            TargetState::Uninitialized => 0,
            TargetState::Error => 1,
            TargetState::Monitoring => 2,
            TargetState::Issue => 3,
            TargetState::Exited => 4,
            TargetState::Killed => 5,
        }
    }

    /// States that end supervision of the current incarnation.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TargetState::Error | TargetState::Issue | TargetState::Exited | TargetState::Killed
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_advance_to(self, next: TargetState) -> bool {
        use TargetState::*;
        matches!(
            (self, next),
            (Uninitialized, Error)
                | (Uninitialized, Monitoring)
                | (Monitoring, Issue)
                | (Monitoring, Exited)
                | (Monitoring, Killed)
        )
    }
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TargetState::Uninitialized => "uninitialized",
            TargetState::Error => "error",
            TargetState::Monitoring => "monitoring",
            TargetState::Issue => "issue",
            TargetState::Exited => "exited",
            TargetState::Killed => "killed",
        };
        write!(f, "{s}")
    }
}

/// One supervised entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    kind: TargetKind,
    command_line: String,
    exec_command_line: Vec<u8>,
    process_id: ProcessId,
    running: bool,
    state: TargetState,
    last_signal: Option<i32>,
    exit_code: Option<i32>,
    signal_description: Option<String>,
    detach_requested: bool,
    traced: bool,
    initial_stop_pending: bool,
}

impl Target {
    fn new(kind: TargetKind, command_line: String, exec_command_line: Vec<u8>) -> Self {
        Target {
            kind,
            command_line,
            exec_command_line,
            process_id: ProcessId::NONE,
            running: false,
            state: TargetState::Uninitialized,
            last_signal: None,
            exit_code: None,
            signal_description: None,
            detach_requested: false,
            traced: false,
            initial_stop_pending: false,
        }
    }

    /// A command the agent will launch. The exec form replaces every space
    /// with [`ARG_SEPARATOR`]; the caller's text is never modified.
    pub fn command(command_line: &str) -> Self {
        let exec = command_line
            .bytes()
            .map(|b| if b == b' ' { ARG_SEPARATOR } else { b })
            .collect();
        Target::new(TargetKind::Command, command_line.to_string(), exec)
    }

    /// A pre-existing process. `record` is its raw command line record and
    /// `command_line` the space-joined rendering of it.
    pub fn existing(pid: ProcessId, command_line: String, record: Vec<u8>) -> Self {
        let mut target = Target::new(TargetKind::ExistingProcess, command_line, record);
        target.process_id = pid;
        target.running = !pid.is_none();
        target
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Command line with arguments separated by [`ARG_SEPARATOR`], as the
    /// process filesystem records it.
    pub fn exec_command_line(&self) -> &[u8] {
        &self.exec_command_line
    }

    /// Argument vector split from the exec form. Runs of separators collapse.
    pub fn argv(&self) -> Vec<&[u8]> {
        self.exec_command_line
            .split(|b| *b == ARG_SEPARATOR)
            .filter(|arg| !arg.is_empty())
            .collect()
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn state(&self) -> TargetState {
        self.state
    }

    pub fn last_signal(&self) -> Option<i32> {
        self.last_signal
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn signal_description(&self) -> Option<&str> {
        self.signal_description.as_deref()
    }

    pub fn detach_requested(&self) -> bool {
        self.detach_requested
    }

    /// True once this agent holds a trace on the current process.
    pub fn is_traced(&self) -> bool {
        self.traced
    }

    /// Record a process found running before launch.
    pub fn observe_running_instance(&mut self, pid: ProcessId) {
        self.process_id = pid;
        self.running = !pid.is_none();
    }

    /// Record a fresh traced launch. The first trace-stop of the new process
    /// (the post-exec trap) is expected and will be suppressed.
    pub fn mark_launched(&mut self, pid: ProcessId) {
        self.process_id = pid;
        self.running = !pid.is_none();
        self.traced = self.running;
        self.initial_stop_pending = self.running;
        self.last_signal = None;
        self.exit_code = None;
        self.signal_description = None;
    }

    /// Record a successful trace-attach. The attach stop will be suppressed.
    pub fn mark_attached(&mut self) {
        self.running = !self.process_id.is_none();
        self.traced = self.running;
        self.initial_stop_pending = self.running;
    }

    /// Forget the trace without changing state, after a detach or when the
    /// process is no longer waitable by this supervisor.
    pub fn untrace(&mut self) {
        self.traced = false;
        self.initial_stop_pending = false;
        self.detach_requested = false;
    }

    /// Consume the expected initial stop, returning whether it was pending.
    pub fn take_initial_stop(&mut self) -> bool {
        std::mem::take(&mut self.initial_stop_pending)
    }

    /// Ask for the next trace-stop to end in a detach instead of a continue.
    /// Only meaningful for attached processes.
    pub fn request_detach(&mut self) {
        if self.kind == TargetKind::ExistingProcess {
            self.detach_requested = true;
        }
    }

    /// Move to `next` if the state machine allows it.
    pub fn advance(&mut self, next: TargetState) -> bool {
        if !self.state.can_advance_to(next) {
            return false;
        }
        self.state = next;
        if next == TargetState::Error {
            self.running = false;
            self.traced = false;
        }
        true
    }

    /// Crash with a core dump.
    pub fn record_dumped(&mut self, signal: i32, description: Option<String>) -> bool {
        if !self.advance(TargetState::Issue) {
            return false;
        }
        self.last_signal = Some(signal);
        self.signal_description = description;
        self.exit_code = None;
        self.finish();
        true
    }

    /// Normal exit.
    pub fn record_exited(&mut self, code: i32) -> bool {
        if !self.advance(TargetState::Exited) {
            return false;
        }
        self.exit_code = Some(code);
        self.last_signal = None;
        self.signal_description = None;
        self.finish();
        true
    }

    /// Terminated by a signal without a core dump.
    pub fn record_killed(&mut self, signal: i32, description: Option<String>) -> bool {
        if !self.advance(TargetState::Killed) {
            return false;
        }
        self.last_signal = Some(signal);
        self.signal_description = description;
        self.exit_code = None;
        self.finish();
        true
    }

    fn finish(&mut self) {
        self.running = false;
        self.traced = false;
        self.initial_stop_pending = false;
        self.detach_requested = false;
    }

    /// Point-in-time copy for status reporting.
    pub fn view(&self, id: TargetId) -> TargetView {
        TargetView {
            id,
            kind: self.kind,
            command_line: self.command_line.clone(),
            process_id: self.process_id,
            running: self.running,
            state: self.state,
            last_signal: self.last_signal,
            exit_code: self.exit_code,
            signal_description: self.signal_description.clone(),
            detach_requested: self.detach_requested,
        }
    }
}

/// Owned snapshot of a target, safe to hand to other threads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetView {
    pub id: TargetId,
    pub kind: TargetKind,
    pub command_line: String,
    pub process_id: ProcessId,
    pub running: bool,
    pub state: TargetState,
    pub last_signal: Option<i32>,
    pub exit_code: Option<i32>,
    pub signal_description: Option<String>,
    pub detach_requested: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn monitoring(cmd: &str) -> Target {
        let mut target = Target::command(cmd);
        target.mark_launched(ProcessId(100));
        assert!(target.advance(TargetState::Monitoring));
        target
    }

    #[test]
    fn test_command_exec_form() {
        let target = Target::command("/bin/sleep 5");
        assert_eq!(target.command_line(), "/bin/sleep 5");
        assert_eq!(target.exec_command_line(), b"/bin/sleep\x005");
        assert_eq!(target.argv(), vec![&b"/bin/sleep"[..], &b"5"[..]]);
        assert_eq!(target.process_id(), ProcessId::NONE);
        assert!(!target.is_running());
        assert_eq!(target.state(), TargetState::Uninitialized);
    }

    #[test]
    fn test_argv_collapses_repeated_spaces() {
        let target = Target::command("  /bin/echo   a  b ");
        assert_eq!(
            target.argv(),
            vec![&b"/bin/echo"[..], &b"a"[..], &b"b"[..]]
        );
    }

    #[test]
    fn test_existing_process() {
        let target = Target::existing(
            ProcessId(42),
            "/usr/bin/daemon -f".to_string(),
            b"/usr/bin/daemon\0-f\0".to_vec(),
        );
        assert_eq!(target.kind(), TargetKind::ExistingProcess);
        assert!(target.is_running());
        assert!(!target.is_traced());
    }

    #[test]
    fn test_exit_clears_signal_fields() {
        let mut target = monitoring("/bin/true");
        assert!(target.record_exited(0));
        assert_eq!(target.state(), TargetState::Exited);
        assert_eq!(target.exit_code(), Some(0));
        assert_eq!(target.last_signal(), None);
        assert_eq!(target.signal_description(), None);
        assert!(!target.is_running());
    }

    #[test]
    fn test_dump_clears_exit_code() {
        let mut target = monitoring("/bin/crash");
        assert!(target.record_dumped(11, Some("Segmentation fault".into())));
        assert_eq!(target.state(), TargetState::Issue);
        assert_eq!(target.last_signal(), Some(11));
        assert_eq!(target.exit_code(), None);
        assert_eq!(target.signal_description(), Some("Segmentation fault"));
    }

    #[test]
    fn test_killed_is_distinct_from_exited() {
        let mut target = monitoring("/bin/sleep 100");
        assert!(target.record_killed(9, Some("Killed".into())));
        assert_eq!(target.state(), TargetState::Killed);
        assert_ne!(target.state(), TargetState::Exited);
        assert_eq!(target.last_signal(), Some(9));
    }

    #[test]
    fn test_terminal_state_never_reverts() {
        let mut target = monitoring("/bin/true");
        assert!(target.record_exited(3));
        assert!(!target.advance(TargetState::Monitoring));
        assert!(!target.record_dumped(11, None));
        assert!(!target.record_killed(9, None));
        assert_eq!(target.state(), TargetState::Exited);
        assert_eq!(target.exit_code(), Some(3));
    }

    #[test]
    fn test_terminal_requires_monitoring() {
        let mut target = Target::command("/bin/true");
        assert!(!target.record_exited(0));
        assert_eq!(target.state(), TargetState::Uninitialized);
    }

    #[test]
    fn test_initial_stop_consumed_once() {
        let mut target = Target::command("/bin/true");
        target.mark_launched(ProcessId(7));
        assert!(target.take_initial_stop());
        assert!(!target.take_initial_stop());
    }

    #[test]
    fn test_detach_only_for_existing() {
        let mut cmd = Target::command("/bin/true");
        cmd.request_detach();
        assert!(!cmd.detach_requested());

        let mut existing = Target::existing(ProcessId(5), "x".into(), b"x\0".to_vec());
        existing.request_detach();
        assert!(existing.detach_requested());
    }

    #[test]
    fn test_wire_codes() {
        assert_eq!(TargetState::Uninitialized.code(), 0);
        assert_eq!(TargetState::Error.code(), 1);
        assert_eq!(TargetState::Monitoring.code(), 2);
        assert_eq!(TargetState::Issue.code(), 3);
        assert_eq!(TargetState::Exited.code(), 4);
        assert_eq!(TargetState::Killed.code(), 5);
        assert_eq!(TargetKind::Command.code(), 0);
        assert_eq!(TargetKind::ExistingProcess.code(), 1);
    }

    proptest! {
        #[test]
        fn prop_pid_zero_means_not_running(pid in 0u32..100_000) {
            let mut target = Target::command("/bin/true");
            target.mark_launched(ProcessId(pid));
            if pid == 0 {
                prop_assert!(!target.is_running());
            }
            let existing = Target::existing(ProcessId(pid), "x".into(), b"x\0".to_vec());
            if pid == 0 {
                prop_assert!(!existing.is_running());
            }
        }

        #[test]
        fn prop_exec_form_has_no_spaces(cmd in "[a-z/ ]{0,40}") {
            let target = Target::command(&cmd);
            prop_assert!(!target.exec_command_line().contains(&b' '));
            prop_assert_eq!(target.exec_command_line().len(), cmd.len());
            prop_assert_eq!(target.command_line(), cmd.as_str());
        }
    }
}
