//! Per-target reaction to child events.
//!
//! | event      | effect                                              |
//! |------------|-----------------------------------------------------|
//! | `Dumped`   | `Issue`, signal and description recorded           |
//! | `Exited`   | `Exited`, exit code recorded, signal fields cleared |
//! | `Killed`   | `Killed`, signal and description recorded          |
//! | `Stopped`  | detach if requested, otherwise continue            |
//!
//! The first trace-stop of each incarnation (post-exec `SIGTRAP` or attach
//! `SIGSTOP`) is swallowed; every other stop signal is re-injected on
//! continue so the target sees it.

use crate::action::{signal_name, ChildEvent};
use fa_common::Target;
use tracing::{debug, info, warn};

/// Follow-up action for the traced process after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Nothing to do (process is gone).
    None,
    /// Continue, optionally injecting a signal.
    Resume(Option<i32>),
    /// Trace-detach.
    Detach,
}

fn is_initial_stop_signal(signal: i32) -> bool {
    signal == libc::SIGTRAP || signal == libc::SIGSTOP
}

/// Apply `event` to `target` and decide what to do with the process.
pub fn apply_event(target: &mut Target, event: ChildEvent) -> Disposition {
    let pid = target.process_id();
    match event {
        ChildEvent::Dumped { signal } => {
            if target.record_dumped(signal, signal_name(signal)) {
                warn!(
                    pid = %pid,
                    command_line = %target.command_line(),
                    signal,
                    description = target.signal_description().unwrap_or(""),
                    "target crashed"
                );
            } else {
                debug!(pid = %pid, state = %target.state(), "late crash event ignored");
            }
            target.untrace();
            Disposition::None
        }
        ChildEvent::Exited { code } => {
            if target.record_exited(code) {
                info!(pid = %pid, command_line = %target.command_line(), code, "target exited");
            } else {
                debug!(pid = %pid, state = %target.state(), "late exit event ignored");
            }
            target.untrace();
            Disposition::None
        }
        ChildEvent::Killed { signal } => {
            if target.record_killed(signal, signal_name(signal)) {
                info!(
                    pid = %pid,
                    command_line = %target.command_line(),
                    signal,
                    "target killed by signal"
                );
            } else {
                debug!(pid = %pid, state = %target.state(), "late kill event ignored");
            }
            target.untrace();
            Disposition::None
        }
        ChildEvent::Stopped { signal } => {
            if target.detach_requested() {
                return Disposition::Detach;
            }
            if is_initial_stop_signal(signal) && target.take_initial_stop() {
                debug!(pid = %pid, signal, "initial trace-stop swallowed");
                return Disposition::Resume(None);
            }
            debug!(pid = %pid, signal, "forwarding stop signal");
            Disposition::Resume(Some(signal))
        }
    }
}
