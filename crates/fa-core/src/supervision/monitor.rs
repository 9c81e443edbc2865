//! Monitor: one batch of targets and the loop that supervises them.
//!
//! Threading model:
//! - [`Monitor::start`] runs the launch/attach phase and then the supervision
//!   loop on the calling thread. Linux binds tracees to the tracer thread, so
//!   every continue, detach, and wait happens there.
//! - [`Monitor::add_target`], [`Monitor::terminate`], [`Monitor::stop`], and
//!   [`Monitor::snapshot`] may be called from any thread. `terminate` only
//!   sends signals and records what the loop must still reap or detach.
//!
//! The registry lock is never held across a syscall that can block or sleep.

use super::registry::TargetRegistry;
use super::state_machine::{apply_event, Disposition};
use crate::action::{ChildEvent, LaunchPolicy, PollResult, ProcessControl, ProcessController};
use crate::collect::{to_display_string, ProcessDiscovery};
use fa_common::{
    DiscoveryError, Error, LaunchError, ProcessId, Result, Target, TargetId, TargetKind,
    TargetState, TargetView,
};
use fa_config::SupervisorConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What the loop still owes a process removed from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retirement {
    /// Killed child; collect its exit status.
    Reap,
    /// Attached process; detach on its next trace-stop.
    Detach,
}

#[derive(Debug)]
struct Shared {
    registry: TargetRegistry,
    retired: BTreeMap<ProcessId, Retirement>,
}

/// Supervisor for one batch of targets.
pub struct Monitor {
    shared: Mutex<Shared>,
    controller: ProcessController,
    start_attempts: u32,
    poll_interval: Duration,
    shutdown_grace: Duration,
    running: AtomicBool,
    stop_requested: AtomicBool,
    started: AtomicBool,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("running", &self.is_running())
            .field("targets", &self.target_count())
            .finish_non_exhaustive()
    }
}

impl Monitor {
    pub fn new(config: &SupervisorConfig, control: Arc<dyn ProcessControl>) -> Self {
        let controller = ProcessController::new(
            control,
            ProcessDiscovery::new(&config.proc_root),
            LaunchPolicy::from(config),
        );
        Self {
            shared: Mutex::new(Shared {
                registry: TargetRegistry::new(config.capacity),
                retired: BTreeMap::new(),
            }),
            controller,
            start_attempts: config.start_attempts.max(1),
            poll_interval: config.poll_interval(),
            shutdown_grace: config.shutdown_grace(),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            started: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a target before [`Monitor::start`].
    ///
    /// `input` is a space-delimited command line for [`TargetKind::Command`]
    /// or a decimal process id for [`TargetKind::ExistingProcess`].
    pub fn add_target(&self, kind: TargetKind, input: &str) -> Result<TargetId> {
        if self.started.load(Ordering::SeqCst) {
            return Err(Error::AlreadyStarted);
        }
        let target = match kind {
            TargetKind::Command => self.command_target(input)?,
            TargetKind::ExistingProcess => self.existing_target(input)?,
        };
        let command_line = target.command_line().to_string();
        let pid = target.process_id();
        let id = {
            let mut shared = self.lock();
            // `start` flips the flag under this lock, so a target added here
            // is always seen by the launch phase.
            if self.started.load(Ordering::SeqCst) {
                return Err(Error::AlreadyStarted);
            }
            shared.registry.add(target)?
        };
        info!(
            target_id = %id,
            kind = %kind,
            pid = %pid,
            command_line = %command_line,
            "target registered"
        );
        Ok(id)
    }

    fn command_target(&self, input: &str) -> Result<Target> {
        if input.trim().is_empty() {
            return Err(Error::InvalidTarget {
                reason: "empty command line".to_string(),
            });
        }
        let mut target = Target::command(input);
        let pattern = target.exec_command_line();
        // One extra byte so "/bin/sleep 5" does not match "/bin/sleep 50".
        if let Some(pid) = self
            .controller
            .discovery()
            .find_pid_by_command_line(pattern, pattern.len() + 1)
        {
            debug!(pid = %pid, command_line = %input, "found running instance");
            target.observe_running_instance(pid);
        }
        Ok(target)
    }

    fn existing_target(&self, input: &str) -> Result<Target> {
        let pid = input
            .parse::<ProcessId>()
            .map_err(|_| DiscoveryError::InvalidProcessId {
                input: input.to_string(),
            })?;
        let record = self
            .controller
            .discovery()
            .read_command_line(pid)
            .ok_or(DiscoveryError::NotFound { pid })?;
        Ok(Target::existing(pid, to_display_string(&record), record))
    }

    /// Launch or attach every target, then supervise until [`Monitor::stop`].
    ///
    /// Single-shot. If any target cannot be brought under supervision it is
    /// marked `Error`, every target is terminated, and the error is returned.
    pub fn start(&self) -> Result<()> {
        {
            let _shared = self.lock();
            if self.started.swap(true, Ordering::SeqCst) {
                return Err(Error::AlreadyStarted);
            }
        }
        self.running.store(true, Ordering::SeqCst);

        let result = self.launch_all();
        match &result {
            Ok(()) => {
                info!(targets = self.target_count(), "supervision started");
                self.supervise();
                info!("supervision stopped");
            }
            Err(err) => {
                warn!(error = %err, code = err.code(), "start failed, rolling back");
                self.terminate();
                self.drain();
            }
        }

        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Ask the loop to exit. Takes effect within one poll interval.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Release every target: kill launched ones, stop-and-detach attached
    /// ones, drop the rest. Empties the registry. Returns whether every
    /// signal was delivered.
    pub fn terminate(&self) -> bool {
        let mut actions = Vec::new();
        {
            let mut shared = self.lock();
            for (id, mut target) in shared.registry.drain() {
                let pid = target.process_id();
                if pid.is_none() || !target.is_running() {
                    debug!(target_id = %id, "released without signal");
                    continue;
                }
                match target.kind() {
                    TargetKind::Command => {
                        if target.is_traced() {
                            shared.retired.insert(pid, Retirement::Reap);
                        }
                        actions.push((pid, Retirement::Reap));
                    }
                    TargetKind::ExistingProcess if target.is_traced() => {
                        target.request_detach();
                        shared.retired.insert(pid, Retirement::Detach);
                        actions.push((pid, Retirement::Detach));
                    }
                    TargetKind::ExistingProcess => {
                        debug!(target_id = %id, pid = %pid, "released untraced process");
                    }
                }
            }
        }

        let mut ok = true;
        for (pid, action) in actions {
            ok &= match action {
                Retirement::Reap => self.controller.kill(pid),
                Retirement::Detach => self.controller.interrupt(pid),
            };
        }
        info!(ok, "targets terminated");
        ok
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn target_count(&self) -> usize {
        self.lock().registry.len()
    }

    /// Consistent copy of every target, in registration order.
    pub fn snapshot(&self) -> Vec<TargetView> {
        self.lock().registry.snapshot()
    }

    /// Processes removed from the registry that still await reap or detach.
    pub fn pending_retirements(&self) -> usize {
        self.lock().retired.len()
    }

    fn launch_all(&self) -> Result<()> {
        let ids = self.lock().registry.ids();
        if ids.is_empty() {
            return Err(Error::NoTargets);
        }

        for &id in &ids {
            if self.stop_requested.load(Ordering::SeqCst) {
                return Err(Error::Interrupted);
            }
            let Some(target) = self.lock().registry.get(id).cloned() else {
                return Err(Error::Interrupted);
            };
            match target.kind() {
                TargetKind::Command => self.launch_command(id, &target)?,
                TargetKind::ExistingProcess => self.attach_existing(id, &target)?,
            }
        }

        let mut shared = self.lock();
        for id in ids {
            if let Some(target) = shared.registry.get_mut(id) {
                target.advance(TargetState::Monitoring);
            }
        }
        Ok(())
    }

    fn launch_command(&self, id: TargetId, target: &Target) -> Result<()> {
        let mut last_error = None;
        for cycle in 1..=self.start_attempts {
            match self.controller.launch(target) {
                Ok(pid) => return self.record_launch(id, pid),
                Err(err) => {
                    warn!(
                        target_id = %id,
                        command_line = %target.command_line(),
                        cycle,
                        cycles = self.start_attempts,
                        error = %err,
                        "launch failed"
                    );
                    let permanent = matches!(
                        err,
                        LaunchError::EmptyCommandLine | LaunchError::ExecNotFound { .. }
                    );
                    last_error = Some(err);
                    if permanent || self.stop_requested.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }
        }
        self.mark_error(id);
        Err(last_error.map_or(Error::Interrupted, Error::from))
    }

    fn record_launch(&self, id: TargetId, pid: ProcessId) -> Result<()> {
        let mut shared = self.lock();
        if let Some(target) = shared.registry.get_mut(id) {
            target.mark_launched(pid);
            return Ok(());
        }
        // Terminated while launching.
        shared.retired.insert(pid, Retirement::Reap);
        drop(shared);
        self.controller.kill(pid);
        Err(Error::Interrupted)
    }

    fn attach_existing(&self, id: TargetId, target: &Target) -> Result<()> {
        let pid = target.process_id();
        if let Err(err) = self.controller.attach(pid) {
            self.mark_error(id);
            return Err(err.into());
        }
        let mut shared = self.lock();
        if let Some(target) = shared.registry.get_mut(id) {
            target.mark_attached();
            return Ok(());
        }
        // Terminated while attaching; the attach stop triggers the detach.
        shared.retired.insert(pid, Retirement::Detach);
        Err(Error::Interrupted)
    }

    fn mark_error(&self, id: TargetId) {
        if let Some(target) = self.lock().registry.get_mut(id) {
            target.advance(TargetState::Error);
        }
    }

    fn supervise(&self) {
        while !self.stop_requested.load(Ordering::SeqCst) {
            if !self.poll_round(false) {
                thread::sleep(self.poll_interval);
            }
        }
        self.drain();
    }

    /// Keep reaping and detaching retired processes until none remain or the
    /// shutdown grace period runs out.
    fn drain(&self) {
        let deadline = Instant::now() + self.shutdown_grace;
        loop {
            let remaining = self.pending_retirements();
            if remaining == 0 {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(remaining, "shutdown grace expired with pending processes");
                return;
            }
            if !self.poll_round(true) {
                thread::sleep(self.poll_interval.min(deadline - now));
            }
        }
    }

    /// One non-blocking wait over every tracked pid. Returns whether any
    /// event was handled.
    fn poll_round(&self, retired_only: bool) -> bool {
        let pids: BTreeSet<ProcessId> = {
            let shared = self.lock();
            let mut pids: BTreeSet<ProcessId> = shared.retired.keys().copied().collect();
            if !retired_only {
                pids.extend(shared.registry.traced_pids());
            }
            pids
        };

        let mut progressed = false;
        for pid in pids {
            match self.controller.poll(pid) {
                PollResult::Event(event) => {
                    progressed = true;
                    self.dispatch(pid, event);
                }
                PollResult::Pending => {}
                PollResult::Gone => self.forget(pid),
            }
        }
        progressed
    }

    fn dispatch(&self, pid: ProcessId, event: ChildEvent) {
        let disposition = {
            let mut shared = self.lock();
            if let Some(&retirement) = shared.retired.get(&pid) {
                if event.is_terminal() {
                    shared.retired.remove(&pid);
                    debug!(pid = %pid, ?event, "retired process ended");
                    Disposition::None
                } else {
                    match retirement {
                        Retirement::Detach => Disposition::Detach,
                        Retirement::Reap => Disposition::Resume(None),
                    }
                }
            } else if let Some(target) = shared.registry.find_mut(pid) {
                apply_event(target, event)
            } else if let ChildEvent::Stopped { signal } = event {
                debug!(pid = %pid, signal, "continuing untracked process");
                Disposition::Resume(Some(signal))
            } else {
                debug!(pid = %pid, ?event, "event for untracked process");
                Disposition::None
            }
        };

        match disposition {
            Disposition::None => {}
            Disposition::Resume(signal) => {
                self.controller.resume(pid, signal);
            }
            Disposition::Detach => {
                self.controller.detach(pid);
                let mut shared = self.lock();
                shared.retired.remove(&pid);
                if let Some(target) = shared.registry.find_mut(pid) {
                    target.untrace();
                }
            }
        }
    }

    fn forget(&self, pid: ProcessId) {
        let mut shared = self.lock();
        if shared.retired.remove(&pid).is_some() {
            debug!(pid = %pid, "retired process no longer waitable");
        }
        if let Some(target) = shared.registry.find_mut(pid) {
            if target.is_traced() {
                warn!(pid = %pid, command_line = %target.command_line(), "lost trace on target");
                target.untrace();
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if self.target_count() > 0 {
            self.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{wait_until, ControlCall, FakeProcTree, ScriptedControl};
    use fa_common::RegistryError;

    const WAIT: Duration = Duration::from_secs(5);

    fn config(tree: &FakeProcTree) -> SupervisorConfig {
        SupervisorConfig {
            capacity: 4,
            restart_counter: 2,
            restart_delay_ms: 0,
            start_attempts: 2,
            proc_alive_timeout_ms: 0,
            poll_interval_ms: 5,
            shutdown_grace_ms: 1000,
            proc_root: tree.root().to_path_buf(),
        }
    }

    fn run(monitor: &Arc<Monitor>) -> thread::JoinHandle<Result<()>> {
        let monitor = Arc::clone(monitor);
        thread::Builder::new()
            .name("fa-supervisor".into())
            .spawn(move || monitor.start())
            .unwrap()
    }

    fn state_of(monitor: &Monitor, pid: ProcessId) -> Option<TargetState> {
        monitor
            .snapshot()
            .into_iter()
            .find(|v| v.process_id == pid)
            .map(|v| v.state)
    }

    fn monitoring(monitor: &Monitor) -> bool {
        let snapshot = monitor.snapshot();
        !snapshot.is_empty() && snapshot.iter().all(|v| v.state == TargetState::Monitoring)
    }

    #[test]
    fn test_add_command_target() {
        let tree = FakeProcTree::new();
        let monitor = Monitor::new(&config(&tree), Arc::new(ScriptedControl::new()));
        monitor.add_target(TargetKind::Command, "/bin/sleep 5").unwrap();

        let view = &monitor.snapshot()[0];
        assert_eq!(view.kind, TargetKind::Command);
        assert_eq!(view.command_line, "/bin/sleep 5");
        assert_eq!(view.process_id, ProcessId::NONE);
        assert!(!view.running);
        assert_eq!(view.state, TargetState::Uninitialized);
    }

    #[test]
    fn test_add_command_target_finds_running_instance() {
        let tree = FakeProcTree::new();
        tree.add_process(ProcessId(900), b"/bin/sleep\050\0");
        tree.add_process(ProcessId(901), b"/bin/sleep\05\0");
        let monitor = Monitor::new(&config(&tree), Arc::new(ScriptedControl::new()));
        monitor.add_target(TargetKind::Command, "/bin/sleep 5").unwrap();

        let view = &monitor.snapshot()[0];
        assert_eq!(view.process_id, ProcessId(901));
        assert!(view.running);
    }

    #[test]
    fn test_add_existing_target() {
        let tree = FakeProcTree::new();
        tree.add_process(ProcessId(1234), b"/usr/bin/target\0--port\08080\0");
        let monitor = Monitor::new(&config(&tree), Arc::new(ScriptedControl::new()));
        monitor.add_target(TargetKind::ExistingProcess, "1234").unwrap();

        let view = &monitor.snapshot()[0];
        assert_eq!(view.kind, TargetKind::ExistingProcess);
        assert_eq!(view.command_line, "/usr/bin/target --port 8080");
        assert_eq!(view.process_id, ProcessId(1234));
        assert!(view.running);
    }

    #[test]
    fn test_add_existing_target_errors() {
        let tree = FakeProcTree::new();
        let monitor = Monitor::new(&config(&tree), Arc::new(ScriptedControl::new()));

        let err = monitor.add_target(TargetKind::ExistingProcess, "12ab").unwrap_err();
        assert!(matches!(err, Error::Discovery(DiscoveryError::InvalidProcessId { .. })));
        let err = monitor.add_target(TargetKind::ExistingProcess, "4321").unwrap_err();
        assert!(matches!(err, Error::Discovery(DiscoveryError::NotFound { .. })));
        let err = monitor.add_target(TargetKind::Command, "  ").unwrap_err();
        assert!(matches!(err, Error::InvalidTarget { .. }));
        assert_eq!(monitor.target_count(), 0);
    }

    #[test]
    fn test_duplicate_and_capacity() {
        let tree = FakeProcTree::new();
        let monitor = Monitor::new(&config(&tree), Arc::new(ScriptedControl::new()));
        monitor.add_target(TargetKind::Command, "/bin/a").unwrap();
        let err = monitor.add_target(TargetKind::Command, "/bin/a").unwrap_err();
        assert!(matches!(err, Error::Registry(RegistryError::Duplicate { .. })));

        for name in ["/bin/b", "/bin/c", "/bin/d"] {
            monitor.add_target(TargetKind::Command, name).unwrap();
        }
        let err = monitor.add_target(TargetKind::Command, "/bin/e").unwrap_err();
        assert!(matches!(
            err,
            Error::Registry(RegistryError::CapacityExceeded { capacity: 4 })
        ));
        assert_eq!(monitor.target_count(), 4);
    }

    #[test]
    fn test_start_without_targets() {
        let tree = FakeProcTree::new();
        let monitor = Monitor::new(&config(&tree), Arc::new(ScriptedControl::new()));
        assert!(matches!(monitor.start(), Err(Error::NoTargets)));
        assert!(!monitor.is_running());
        assert!(matches!(monitor.start(), Err(Error::AlreadyStarted)));
    }

    #[test]
    fn test_launch_and_exit() {
        let tree = FakeProcTree::new();
        let control = Arc::new(ScriptedControl::new().with_proc_tree(&tree));
        let monitor = Arc::new(Monitor::new(&config(&tree), control.clone()));
        monitor.add_target(TargetKind::Command, "/bin/sh -c true").unwrap();

        let handle = run(&monitor);
        assert!(wait_until(WAIT, || monitoring(&monitor)));
        let pid = monitor.snapshot()[0].process_id;
        // The post-exec trap is swallowed.
        assert!(wait_until(WAIT, || control
            .calls()
            .contains(&ControlCall::Resume(pid, None))));

        control.push_event(pid, ChildEvent::Exited { code: 0 });
        assert!(wait_until(WAIT, || state_of(&monitor, pid)
            == Some(TargetState::Exited)));
        let view = &monitor.snapshot()[0];
        assert_eq!(view.exit_code, Some(0));
        assert_eq!(view.last_signal, None);
        assert!(!view.running);
        assert!(monitor.is_running());

        monitor.stop();
        handle.join().unwrap().unwrap();
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_crash_is_issue_and_signals_forwarded() {
        let tree = FakeProcTree::new();
        let control = Arc::new(ScriptedControl::new().with_proc_tree(&tree));
        let monitor = Arc::new(Monitor::new(&config(&tree), control.clone()));
        monitor.add_target(TargetKind::Command, "/bin/sh").unwrap();

        let handle = run(&monitor);
        assert!(wait_until(WAIT, || monitoring(&monitor)));
        let pid = monitor.snapshot()[0].process_id;

        control.push_event(pid, ChildEvent::Stopped { signal: libc::SIGSEGV });
        assert!(wait_until(WAIT, || control
            .calls()
            .contains(&ControlCall::Resume(pid, Some(libc::SIGSEGV)))));
        control.push_event(pid, ChildEvent::Dumped { signal: libc::SIGSEGV });
        assert!(wait_until(WAIT, || state_of(&monitor, pid)
            == Some(TargetState::Issue)));
        assert_eq!(monitor.snapshot()[0].last_signal, Some(libc::SIGSEGV));

        monitor.stop();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_start_failure_rolls_back() {
        let tree = FakeProcTree::new();
        tree.add_process(ProcessId(777), b"/usr/bin/other\0");
        let control = Arc::new(
            ScriptedControl::new()
                .with_proc_tree(&tree)
                .fail_attach(ProcessId(777), libc::EPERM),
        );
        let monitor = Monitor::new(&config(&tree), control.clone());
        monitor.add_target(TargetKind::Command, "/bin/sh").unwrap();
        monitor.add_target(TargetKind::ExistingProcess, "777").unwrap();

        let err = monitor.start().unwrap_err();
        assert!(matches!(err, Error::Attach(_)));
        assert!(monitor.snapshot().is_empty());
        assert_eq!(monitor.pending_retirements(), 0);
        assert!(!monitor.is_running());

        let spawned = control.spawned_pids();
        assert_eq!(spawned.len(), 1);
        assert!(control
            .calls()
            .contains(&ControlCall::Signal(spawned[0], libc::SIGKILL)));
    }

    #[test]
    fn test_launch_failure_marks_error_and_aborts() {
        let tree = FakeProcTree::new();
        let control = Arc::new(ScriptedControl::new().with_proc_tree(&tree).fail_spawns(100));
        let monitor = Monitor::new(&config(&tree), control.clone());
        monitor.add_target(TargetKind::Command, "/bin/sh").unwrap();

        let err = monitor.start().unwrap_err();
        assert!(matches!(err, Error::Launch(LaunchError::SpawnFailed { .. })));
        // restart_counter (2) attempts per cycle, start_attempts (2) cycles.
        assert_eq!(control.spawn_count(), 4);
        assert!(monitor.snapshot().is_empty());
    }

    #[test]
    fn test_missing_executable_not_retried() {
        let tree = FakeProcTree::new();
        let control = Arc::new(ScriptedControl::new().with_proc_tree(&tree));
        let monitor = Monitor::new(&config(&tree), control.clone());
        monitor.add_target(TargetKind::Command, "/nonexistent/target").unwrap();

        let err = monitor.start().unwrap_err();
        assert!(matches!(err, Error::Launch(LaunchError::ExecNotFound { .. })));
        assert_eq!(control.spawn_count(), 0);
    }

    #[test]
    fn test_terminate_kills_and_detaches() {
        let tree = FakeProcTree::new();
        tree.add_process(ProcessId(555), b"/usr/bin/daemon\0");
        let control = Arc::new(ScriptedControl::new().with_proc_tree(&tree));
        let monitor = Arc::new(Monitor::new(&config(&tree), control.clone()));
        monitor.add_target(TargetKind::Command, "/bin/sh").unwrap();
        monitor.add_target(TargetKind::ExistingProcess, "555").unwrap();

        let handle = run(&monitor);
        assert!(wait_until(WAIT, || monitoring(&monitor)));
        let launched = monitor.snapshot()[0].process_id;
        assert!(wait_until(WAIT, || control
            .calls()
            .contains(&ControlCall::Resume(ProcessId(555), None))));

        assert!(monitor.terminate());
        assert!(monitor.snapshot().is_empty());
        assert!(wait_until(WAIT, || monitor.pending_retirements() == 0));

        let calls = control.calls();
        assert!(calls.contains(&ControlCall::Signal(launched, libc::SIGKILL)));
        assert!(calls.contains(&ControlCall::Signal(ProcessId(555), libc::SIGSTOP)));
        assert!(calls.contains(&ControlCall::Detach(ProcessId(555))));
        assert!(!calls.contains(&ControlCall::Signal(ProcessId(555), libc::SIGKILL)));

        monitor.stop();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_terminate_before_start_releases() {
        let tree = FakeProcTree::new();
        let control = Arc::new(ScriptedControl::new());
        let monitor = Monitor::new(&config(&tree), control.clone());
        monitor.add_target(TargetKind::Command, "/bin/a").unwrap();
        monitor.add_target(TargetKind::Command, "/bin/b").unwrap();

        assert!(monitor.terminate());
        assert!(monitor.snapshot().is_empty());
        assert!(control.calls().is_empty());
    }

    #[test]
    fn test_stop_latency_is_bounded() {
        let tree = FakeProcTree::new();
        let control = Arc::new(ScriptedControl::new().with_proc_tree(&tree));
        let monitor = Arc::new(Monitor::new(&config(&tree), control));
        monitor.add_target(TargetKind::Command, "/bin/sh").unwrap();

        let handle = run(&monitor);
        assert!(wait_until(WAIT, || monitoring(&monitor)));
        let start = Instant::now();
        monitor.stop();
        handle.join().unwrap().unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_add_after_start_rejected() {
        let tree = FakeProcTree::new();
        let control = Arc::new(ScriptedControl::new().with_proc_tree(&tree));
        let monitor = Arc::new(Monitor::new(&config(&tree), control));
        monitor.add_target(TargetKind::Command, "/bin/sh").unwrap();

        let handle = run(&monitor);
        assert!(wait_until(WAIT, || monitoring(&monitor)));
        assert!(matches!(
            monitor.add_target(TargetKind::Command, "/bin/true"),
            Err(Error::AlreadyStarted)
        ));
        monitor.stop();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_add_racing_start_is_launched_or_rejected() {
        for _ in 0..20 {
            let tree = FakeProcTree::new();
            let control = Arc::new(ScriptedControl::new().with_proc_tree(&tree));
            let monitor = Arc::new(Monitor::new(&config(&tree), control.clone()));
            monitor.add_target(TargetKind::Command, "/bin/sh").unwrap();

            let barrier = Arc::new(std::sync::Barrier::new(2));
            let adder = {
                let monitor = Arc::clone(&monitor);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (1..4)
                        .filter(|n| {
                            monitor
                                .add_target(TargetKind::Command, &format!("/bin/sh -c {n}"))
                                .is_ok()
                        })
                        .count()
                })
            };
            barrier.wait();
            let handle = run(&monitor);
            let added = adder.join().unwrap();

            assert!(wait_until(WAIT, || monitoring(&monitor)));
            let snapshot = monitor.snapshot();
            assert_eq!(snapshot.len(), added + 1);
            for view in &snapshot {
                assert!(!view.process_id.is_none(), "{view:?}");
                assert!(view.running, "{view:?}");
            }
            assert_eq!(control.spawn_count(), snapshot.len());

            monitor.stop();
            handle.join().unwrap().unwrap();
        }
    }

    #[test]
    fn test_drop_terminates() {
        let tree = FakeProcTree::new();
        tree.add_process(ProcessId(808), b"/bin/cat\0");
        let control = Arc::new(ScriptedControl::new());
        {
            let monitor = Monitor::new(&config(&tree), control.clone());
            monitor.add_target(TargetKind::Command, "/bin/cat").unwrap();
        }
        // The running instance found at registration is killed.
        assert!(control
            .calls()
            .contains(&ControlCall::Signal(ProcessId(808), libc::SIGKILL)));
    }
}
