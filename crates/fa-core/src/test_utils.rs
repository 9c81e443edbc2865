//! Test utilities for fa-core.
//!
//! This module provides test infrastructure including:
//! - A fake process filesystem rooted in a tempdir
//! - A scripted [`ProcessControl`] double that records every call
//! - A harness for tests that need real processes and ptrace
//! - Polling helpers

use crate::action::{ChildEvent, PollResult, ProcessControl, PtraceControl};
use fa_common::ProcessId;
use nix::sys::signal::Signal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// Polling
// ============================================================================

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

// ============================================================================
// Fake process filesystem
// ============================================================================

fn write_process(root: &Path, pid: ProcessId, record: &[u8]) {
    let dir = root.join(pid.to_string());
    std::fs::create_dir_all(&dir).expect("create fake pid dir");
    std::fs::write(dir.join("cmdline"), record).expect("write fake cmdline");
    let status = dir.join("status");
    if !status.exists() {
        std::fs::write(&status, status_file(ProcessId::NONE)).expect("write fake status");
    }
}

fn status_file(tracer: ProcessId) -> String {
    format!("Name:\tfake\nState:\tS (sleeping)\nTracerPid:\t{tracer}\nUid:\t0\t0\t0\t0\n")
}

/// Directory laid out like the process filesystem, removed on drop.
pub struct FakeProcTree {
    dir: tempfile::TempDir,
}

impl FakeProcTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create fake proc root"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Add (or overwrite) a process with the given raw command-line record.
    pub fn add_process(&self, pid: ProcessId, record: &[u8]) {
        write_process(self.root(), pid, record);
    }

    /// Add a non-process entry such as `self` or `sys`.
    pub fn add_entry(&self, name: &str) {
        std::fs::create_dir_all(self.root().join(name)).expect("create fake entry");
    }

    pub fn set_tracer(&self, pid: ProcessId, tracer: ProcessId) {
        let dir = self.root().join(pid.to_string());
        std::fs::create_dir_all(&dir).expect("create fake pid dir");
        std::fs::write(dir.join("status"), status_file(tracer)).expect("write fake status");
    }

    pub fn remove_process(&self, pid: ProcessId) {
        let _ = std::fs::remove_dir_all(self.root().join(pid.to_string()));
    }
}

impl Default for FakeProcTree {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Scripted process control
// ============================================================================

/// A call observed by [`ScriptedControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCall {
    Spawn(Vec<String>),
    Attach(ProcessId),
    Signal(ProcessId, i32),
    Resume(ProcessId, Option<i32>),
    Detach(ProcessId),
}

#[derive(Debug, Default)]
struct Script {
    calls: Vec<ControlCall>,
    events: HashMap<ProcessId, VecDeque<ChildEvent>>,
    live: HashSet<ProcessId>,
    spawned: Vec<ProcessId>,
    spawn_attempts: u32,
}

impl Script {
    fn push(&mut self, pid: ProcessId, event: ChildEvent) {
        self.live.insert(pid);
        self.events.entry(pid).or_default().push_back(event);
    }

    fn has_terminal(&self, pid: ProcessId) -> bool {
        self.events
            .get(&pid)
            .is_some_and(|queue| queue.iter().any(|e| e.is_terminal()))
    }
}

/// In-memory [`ProcessControl`] with kernel-like event sequencing.
///
/// - Spawned processes get pids from 4000 up, a command-line record in the
///   attached fake tree, and a queued post-exec `SIGTRAP` stop.
/// - A successful attach queues the attach `SIGSTOP` stop.
/// - `SIGKILL` to a live process queues `Killed`; `SIGSTOP` queues a stop.
/// - After a terminal event has been polled the pid is gone.
#[derive(Debug, Default)]
pub struct ScriptedControl {
    script: Mutex<Script>,
    proc_root: Option<PathBuf>,
    spawn_failures: u32,
    spawned_die: bool,
    attach_errors: HashMap<ProcessId, i32>,
    signal_errors: HashMap<ProcessId, i32>,
    detach_errors: HashMap<ProcessId, i32>,
}

const FIRST_SCRIPTED_PID: u32 = 4000;

impl ScriptedControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write spawned processes into `tree` so liveness probes see them.
    pub fn with_proc_tree(mut self, tree: &FakeProcTree) -> Self {
        self.proc_root = Some(tree.root().to_path_buf());
        self
    }

    /// Fail the first `count` spawns with `EAGAIN`.
    pub fn fail_spawns(mut self, count: u32) -> Self {
        self.spawn_failures = count;
        self
    }

    /// Spawned processes exit immediately with status 127.
    pub fn spawned_die(mut self) -> Self {
        self.spawned_die = true;
        self
    }

    pub fn fail_attach(mut self, pid: ProcessId, errno: i32) -> Self {
        self.attach_errors.insert(pid, errno);
        self
    }

    pub fn fail_signal(mut self, pid: ProcessId, errno: i32) -> Self {
        self.signal_errors.insert(pid, errno);
        self
    }

    pub fn fail_detach(mut self, pid: ProcessId, errno: i32) -> Self {
        self.detach_errors.insert(pid, errno);
        self
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn calls(&self) -> Vec<ControlCall> {
        self.script().calls.clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.script()
            .calls
            .iter()
            .filter(|c| matches!(c, ControlCall::Spawn(_)))
            .count()
    }

    pub fn spawned_pids(&self) -> Vec<ProcessId> {
        self.script().spawned.clone()
    }

    /// Queue an event for `pid`, making it a live tracee.
    pub fn push_event(&self, pid: ProcessId, event: ChildEvent) {
        self.script().push(pid, event);
    }
}

impl ProcessControl for ScriptedControl {
    fn spawn_traced(&self, argv: &[&[u8]]) -> io::Result<ProcessId> {
        let mut script = self.script();
        script.calls.push(ControlCall::Spawn(
            argv.iter()
                .map(|a| String::from_utf8_lossy(a).into_owned())
                .collect(),
        ));
        script.spawn_attempts += 1;
        if script.spawn_attempts <= self.spawn_failures {
            return Err(io::Error::from_raw_os_error(libc::EAGAIN));
        }

        let pid = ProcessId(FIRST_SCRIPTED_PID + script.spawned.len() as u32);
        script.spawned.push(pid);
        if self.spawned_die {
            script.push(pid, ChildEvent::Exited { code: 127 });
            return Ok(pid);
        }
        if let Some(root) = &self.proc_root {
            let mut record = argv.join(&0u8);
            record.push(0);
            write_process(root, pid, &record);
        }
        script.push(pid, ChildEvent::Stopped { signal: libc::SIGTRAP });
        Ok(pid)
    }

    fn attach(&self, pid: ProcessId) -> io::Result<()> {
        let mut script = self.script();
        script.calls.push(ControlCall::Attach(pid));
        if let Some(&errno) = self.attach_errors.get(&pid) {
            return Err(io::Error::from_raw_os_error(errno));
        }
        script.push(pid, ChildEvent::Stopped { signal: libc::SIGSTOP });
        Ok(())
    }

    fn signal(&self, pid: ProcessId, signal: Signal) -> io::Result<()> {
        let mut script = self.script();
        script.calls.push(ControlCall::Signal(pid, signal as i32));
        if let Some(&errno) = self.signal_errors.get(&pid) {
            return Err(io::Error::from_raw_os_error(errno));
        }
        if script.live.contains(&pid) && !script.has_terminal(pid) {
            match signal {
                Signal::SIGKILL => script.push(pid, ChildEvent::Killed { signal: libc::SIGKILL }),
                Signal::SIGSTOP => script.push(pid, ChildEvent::Stopped { signal: libc::SIGSTOP }),
                _ => {}
            }
        }
        Ok(())
    }

    fn resume(&self, pid: ProcessId, signal: Option<i32>) -> io::Result<()> {
        let mut script = self.script();
        script.calls.push(ControlCall::Resume(pid, signal));
        if script.live.contains(&pid) {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(libc::ESRCH))
        }
    }

    fn detach(&self, pid: ProcessId) -> io::Result<()> {
        let mut script = self.script();
        script.calls.push(ControlCall::Detach(pid));
        if let Some(&errno) = self.detach_errors.get(&pid) {
            return Err(io::Error::from_raw_os_error(errno));
        }
        script.live.remove(&pid);
        script.events.remove(&pid);
        Ok(())
    }

    fn poll(&self, pid: ProcessId) -> PollResult {
        let mut script = self.script();
        if !script.live.contains(&pid) {
            return PollResult::Gone;
        }
        let event = script.events.get_mut(&pid).and_then(VecDeque::pop_front);
        match event {
            Some(event) => {
                if event.is_terminal() {
                    script.live.remove(&pid);
                    script.events.remove(&pid);
                }
                PollResult::Event(event)
            }
            None => PollResult::Pending,
        }
    }
}

// ============================================================================
// Process Harness (no-mock integration tests)
// ============================================================================

/// Lightweight process harness for tests against real processes.
#[derive(Debug, Default)]
pub struct ProcessHarness;

impl ProcessHarness {
    /// Return true if the current platform supports spawning test processes.
    pub fn is_available() -> bool {
        if !Path::new("/proc").exists() {
            return false;
        }
        std::process::Command::new("sh")
            .arg("-c")
            .arg("true")
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Return true if this thread can trace a child it spawns.
    ///
    /// Containers commonly deny ptrace; live supervision tests skip then.
    pub fn ptrace_available() -> bool {
        if !Self::is_available() {
            return false;
        }
        let control = PtraceControl::new();
        let argv: [&[u8]; 1] = [b"/bin/true"];
        let Ok(pid) = control.spawn_traced(&argv) else {
            return false;
        };

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut stopped = false;
        while Instant::now() < deadline {
            match control.poll(pid) {
                PollResult::Event(ChildEvent::Stopped { .. }) => {
                    stopped = true;
                    break;
                }
                PollResult::Event(_) | PollResult::Gone => break,
                PollResult::Pending => thread::sleep(Duration::from_millis(5)),
            }
        }

        let _ = control.signal(pid, Signal::SIGKILL);
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            match control.poll(pid) {
                PollResult::Event(event) if event.is_terminal() => break,
                PollResult::Event(_) => {
                    let _ = control.resume(pid, None);
                }
                PollResult::Gone => break,
                PollResult::Pending => thread::sleep(Duration::from_millis(5)),
            }
        }
        stopped
    }

    /// Spawn an untraced `sleep` child, killed when the handle drops.
    pub fn spawn_sleep(&self, seconds: u64) -> io::Result<ProcessHandle> {
        let child = std::process::Command::new("sleep")
            .arg(seconds.max(1).to_string())
            .spawn()?;
        Ok(ProcessHandle {
            pid: ProcessId(child.id()),
            child: Mutex::new(child),
        })
    }
}

/// Handle to a process spawned by [`ProcessHarness`].
pub struct ProcessHandle {
    pid: ProcessId,
    child: Mutex<std::process::Child>,
}

impl ProcessHandle {
    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// Process state letter from `/proc/<pid>/stat` (R, S, T, t, Z, ...).
    pub fn state(&self) -> Option<char> {
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", self.pid)).ok()?;
        let comm_end = stat.rfind(')')?;
        stat.get(comm_end + 2..)?.chars().next()
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state(), Some('T') | Some('t'))
    }

    pub fn is_running(&self) -> bool {
        let Ok(mut child) = self.child.lock() else {
            return false;
        };
        matches!(child.try_wait(), Ok(None))
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
