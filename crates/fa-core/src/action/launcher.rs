//! Traced launch, attach, and termination of targets.

use super::control::{PollResult, ProcessControl};
use crate::collect::ProcessDiscovery;
use fa_common::{AttachError, LaunchError, ProcessId, Target};
use fa_config::SupervisorConfig;
use nix::sys::signal::Signal;
use std::ffi::OsStr;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retry and probe timing for launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchPolicy {
    /// Spawn attempts per launch.
    pub attempts: u32,
    /// Pause between failed attempts.
    pub retry_delay: Duration,
    /// Delay before re-reading the command line of a fresh process.
    pub alive_timeout: Duration,
}

impl Default for LaunchPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_secs(1),
            alive_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&SupervisorConfig> for LaunchPolicy {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            attempts: config.restart_counter.max(1),
            retry_delay: config.restart_delay(),
            alive_timeout: config.proc_alive_timeout(),
        }
    }
}

/// Launches, attaches, and signals targets on top of a [`ProcessControl`].
#[derive(Clone)]
pub struct ProcessController {
    control: Arc<dyn ProcessControl>,
    discovery: ProcessDiscovery,
    policy: LaunchPolicy,
}

impl std::fmt::Debug for ProcessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessController")
            .field("discovery", &self.discovery)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ProcessController {
    pub fn new(
        control: Arc<dyn ProcessControl>,
        discovery: ProcessDiscovery,
        policy: LaunchPolicy,
    ) -> Self {
        Self {
            control,
            discovery,
            policy,
        }
    }

    pub fn discovery(&self) -> &ProcessDiscovery {
        &self.discovery
    }

    /// Spawn `target` traced, retrying transient spawn failures, then probe
    /// that the process is still alive.
    ///
    /// The new process is left in its post-exec trace-stop; the supervision
    /// loop resumes it.
    pub fn launch(&self, target: &Target) -> Result<ProcessId, LaunchError> {
        let argv = target.argv();
        let Some(program) = argv.first() else {
            return Err(LaunchError::EmptyCommandLine);
        };
        let path = Path::new(OsStr::from_bytes(program));
        if !path.exists() {
            return Err(LaunchError::ExecNotFound {
                path: path.display().to_string(),
            });
        }

        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        let pid = loop {
            match self.control.spawn_traced(&argv) {
                Ok(pid) => break pid,
                Err(source) => {
                    warn!(
                        command_line = %target.command_line(),
                        attempt,
                        attempts,
                        error = %source,
                        "spawn failed"
                    );
                    if attempt >= attempts {
                        return Err(LaunchError::SpawnFailed {
                            path: path.display().to_string(),
                            attempts,
                            source,
                        });
                    }
                    attempt += 1;
                    thread::sleep(self.policy.retry_delay);
                }
            }
        };

        debug!(pid = %pid, command_line = %target.command_line(), "spawned traced process");
        thread::sleep(self.policy.alive_timeout);

        if self.discovery.read_command_line(pid).is_none() {
            self.reap(pid);
            return Err(LaunchError::DiedBeforeLiveness { pid });
        }

        info!(pid = %pid, command_line = %target.command_line(), "target launched");
        Ok(pid)
    }

    /// Trace-attach to `pid`. Not retried.
    pub fn attach(&self, pid: ProcessId) -> Result<(), AttachError> {
        self.control.attach(pid).map_err(|err| match err.raw_os_error() {
            Some(libc::ESRCH) => AttachError::NoSuchProcess { pid },
            Some(libc::EPERM) => match self.discovery.tracer_pid(pid) {
                Some(tracer) if !tracer.is_none() => AttachError::AlreadyTraced { pid },
                _ => AttachError::PermissionDenied { pid },
            },
            _ => AttachError::Other {
                pid,
                reason: err.to_string(),
            },
        })?;
        info!(pid = %pid, "attached to process");
        Ok(())
    }

    /// Send SIGKILL. A process that is already gone counts as success.
    pub fn kill(&self, pid: ProcessId) -> bool {
        self.send(pid, Signal::SIGKILL)
    }

    /// Send SIGSTOP so a traced process enters a trace-stop.
    pub fn interrupt(&self, pid: ProcessId) -> bool {
        self.send(pid, Signal::SIGSTOP)
    }

    fn send(&self, pid: ProcessId, signal: Signal) -> bool {
        match self.control.signal(pid, signal) {
            Ok(()) => true,
            Err(err) if err.raw_os_error() == Some(libc::ESRCH) => {
                debug!(pid = %pid, signal = %signal, "process already gone");
                true
            }
            Err(err) => {
                warn!(pid = %pid, signal = %signal, error = %err, "signal delivery failed");
                false
            }
        }
    }

    /// Trace-detach, delivering SIGSTOP. Failure is logged, not retried.
    pub fn detach(&self, pid: ProcessId) -> bool {
        match self.control.detach(pid) {
            Ok(()) => {
                info!(pid = %pid, "detached from process");
                true
            }
            Err(err) => {
                warn!(pid = %pid, error = %err, "detach failed");
                false
            }
        }
    }

    /// Continue a trace-stopped process.
    pub fn resume(&self, pid: ProcessId, signal: Option<i32>) -> bool {
        match self.control.resume(pid, signal) {
            Ok(()) => true,
            Err(err) => {
                log_resume_error(pid, &err);
                false
            }
        }
    }

    pub fn poll(&self, pid: ProcessId) -> PollResult {
        self.control.poll(pid)
    }

    /// Collect the exit status of a process that just died.
    fn reap(&self, pid: ProcessId) {
        for _ in 0..50 {
            match self.control.poll(pid) {
                PollResult::Event(event) if event.is_terminal() => return,
                PollResult::Event(_) => {
                    self.resume(pid, None);
                }
                PollResult::Gone => return,
                PollResult::Pending => thread::sleep(Duration::from_millis(10)),
            }
        }
        debug!(pid = %pid, "process not reaped after liveness failure");
    }
}

fn log_resume_error(pid: ProcessId, err: &io::Error) {
    if err.raw_os_error() == Some(libc::ESRCH) {
        debug!(pid = %pid, "resume raced with exit");
    } else {
        warn!(pid = %pid, error = %err, "resume failed");
    }
}
