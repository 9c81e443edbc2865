//! Kernel-facing process control.
//!
//! [`ProcessControl`] is the seam between supervision logic and the tracing
//! syscalls. [`PtraceControl`] is the real implementation; tests substitute a
//! scripted double.
//!
//! Tracees are bound to the tracer *thread*: every method except
//! [`ProcessControl::signal`] must be called from the thread that spawned or
//! attached the process.

use fa_common::ProcessId;
use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::ffi::{CStr, OsStr};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::sync::Mutex;

/// A state change reported for a traced child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildEvent {
    /// Terminated by a signal and dumped core.
    Dumped { signal: i32 },
    /// Exited normally.
    Exited { code: i32 },
    /// Terminated by a signal without a core dump.
    Killed { signal: i32 },
    /// Trace-stop awaiting continue or detach.
    Stopped { signal: i32 },
}

impl ChildEvent {
    /// Whether the process is gone after this event.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ChildEvent::Stopped { .. })
    }
}

/// Outcome of a non-blocking wait on one pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollResult {
    Event(ChildEvent),
    /// No state change yet.
    Pending,
    /// Not (or no longer) a waitable child of this tracer.
    Gone,
}

/// Process control operations used by the supervisor.
pub trait ProcessControl: Send + Sync {
    /// Fork, request tracing in the child, and exec `argv`. One attempt.
    fn spawn_traced(&self, argv: &[&[u8]]) -> io::Result<ProcessId>;

    /// Trace-attach to an existing process.
    fn attach(&self, pid: ProcessId) -> io::Result<()>;

    /// Send `signal` to `pid`. Safe from any thread.
    fn signal(&self, pid: ProcessId, signal: Signal) -> io::Result<()>;

    /// Continue a trace-stopped process, injecting `signal` if given.
    fn resume(&self, pid: ProcessId, signal: Option<i32>) -> io::Result<()>;

    /// Trace-detach, leaving the process stopped.
    fn detach(&self, pid: ProcessId) -> io::Result<()>;

    /// Non-blocking wait for the next state change of `pid`.
    fn poll(&self, pid: ProcessId) -> PollResult;
}

/// Classify a raw wait status.
pub fn classify_status(status: i32) -> Option<ChildEvent> {
    if libc::WIFEXITED(status) {
        Some(ChildEvent::Exited {
            code: libc::WEXITSTATUS(status),
        })
    } else if libc::WIFSIGNALED(status) {
        let signal = libc::WTERMSIG(status);
        if libc::WCOREDUMP(status) {
            Some(ChildEvent::Dumped { signal })
        } else {
            Some(ChildEvent::Killed { signal })
        }
    } else if libc::WIFSTOPPED(status) {
        Some(ChildEvent::Stopped {
            signal: libc::WSTOPSIG(status),
        })
    } else {
        None
    }
}

static STRSIGNAL_LOCK: Mutex<()> = Mutex::new(());

/// Platform description of a signal number, or `None` if unknown.
pub fn signal_name(signal: i32) -> Option<String> {
    if signal <= 0 || signal >= 65 {
        return None;
    }
    // strsignal may format unknown and real-time numbers into a static buffer.
    let _guard = STRSIGNAL_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    // SAFETY: strsignal returns a NUL-terminated string valid until the next call,
    // which the lock above serializes; it is copied before the guard drops.
    let ptr = unsafe { libc::strsignal(signal) };
    if ptr.is_null() {
        return None;
    }
    let text = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    if text.is_empty() || text.starts_with("Unknown signal") {
        None
    } else {
        Some(text)
    }
}

fn nix_pid(pid: ProcessId) -> Pid {
    Pid::from_raw(pid.as_raw())
}

/// Process control through ptrace(2) and waitpid(2).
#[derive(Debug, Default)]
pub struct PtraceControl;

impl PtraceControl {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessControl for PtraceControl {
    fn spawn_traced(&self, argv: &[&[u8]]) -> io::Result<ProcessId> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty argument vector"))?;

        let mut cmd = Command::new(OsStr::from_bytes(program));
        cmd.args(args.iter().map(|arg| OsStr::from_bytes(arg)));

        // SAFETY: traceme is async-signal-safe and touches no parent state.
        unsafe {
            cmd.pre_exec(|| ptrace::traceme().map_err(io::Error::from));
        }

        // Exec failures are reported here through std's close-on-exec pipe.
        let child = cmd.spawn()?;
        Ok(ProcessId(child.id()))
    }

    fn attach(&self, pid: ProcessId) -> io::Result<()> {
        ptrace::attach(nix_pid(pid)).map_err(io::Error::from)
    }

    fn signal(&self, pid: ProcessId, sig: Signal) -> io::Result<()> {
        signal::kill(nix_pid(pid), sig).map_err(io::Error::from)
    }

    fn resume(&self, pid: ProcessId, sig: Option<i32>) -> io::Result<()> {
        match sig {
            None | Some(0) => ptrace::cont(nix_pid(pid), None).map_err(io::Error::from),
            Some(raw) => match Signal::try_from(raw) {
                Ok(sig) => ptrace::cont(nix_pid(pid), Some(sig)).map_err(io::Error::from),
                Err(_) => {
                    // Real-time signals have no `Signal` variant.
                    // SAFETY: PTRACE_CONT takes the signal number in `data` and no pointers.
                    let rc = unsafe {
                        libc::ptrace(
                            libc::PTRACE_CONT,
                            pid.as_raw(),
                            std::ptr::null_mut::<libc::c_void>(),
                            raw as libc::c_long as *mut libc::c_void,
                        )
                    };
                    if rc == -1 {
                        Err(io::Error::last_os_error())
                    } else {
                        Ok(())
                    }
                }
            },
        }
    }

    fn detach(&self, pid: ProcessId) -> io::Result<()> {
        ptrace::detach(nix_pid(pid), Some(Signal::SIGSTOP)).map_err(io::Error::from)
    }

    fn poll(&self, pid: ProcessId) -> PollResult {
        let mut status: libc::c_int = 0;
        // SAFETY: status is a valid out-pointer for the duration of the call.
        let rc = unsafe {
            libc::waitpid(pid.as_raw(), &mut status, libc::WNOHANG | libc::__WALL)
        };
        if rc == 0 {
            return PollResult::Pending;
        }
        if rc == pid.as_raw() {
            return classify_status(status).map_or(PollResult::Pending, PollResult::Event);
        }
        match Errno::last() {
            Errno::EINTR => PollResult::Pending,
            _ => PollResult::Gone,
        }
    }
}
