//! Process discovery through the process filesystem.

use super::cmdline::record_matches;
use fa_common::ProcessId;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Reads the live process set from a process filesystem root.
///
/// The root is configurable so tests can point it at a fake tree.
#[derive(Debug, Clone)]
pub struct ProcessDiscovery {
    root: PathBuf,
}

impl Default for ProcessDiscovery {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcessDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Numeric entries under the root, in directory order.
    pub fn list_pids(&self) -> Vec<ProcessId> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse::<ProcessId>().ok())
            .collect()
    }

    /// First process whose record starts with the first `length` bytes of
    /// `pattern`. Entries that vanish or cannot be read are skipped.
    pub fn find_pid_by_command_line(&self, pattern: &[u8], length: usize) -> Option<ProcessId> {
        self.list_pids().into_iter().find(|&pid| {
            self.read_command_line(pid)
                .is_some_and(|record| record_matches(&record, pattern, length))
        })
    }

    /// Full raw record for `pid`, or `None` when it is missing or empty
    /// (kernel threads and exited processes have empty records).
    pub fn read_command_line(&self, pid: ProcessId) -> Option<Vec<u8>> {
        let mut file = File::open(self.pid_path(pid).join("cmdline")).ok()?;
        let mut record = Vec::new();
        file.read_to_end(&mut record).ok()?;
        if record.is_empty() {
            None
        } else {
            Some(record)
        }
    }

    /// Current tracer of `pid` from its status file. `Some(ProcessId::NONE)`
    /// means "not traced".
    pub fn tracer_pid(&self, pid: ProcessId) -> Option<ProcessId> {
        let content = std::fs::read_to_string(self.pid_path(pid).join("status")).ok()?;
        content.lines().find_map(|line| {
            let value = line.strip_prefix("TracerPid:")?.trim();
            value.parse::<u32>().ok().map(ProcessId)
        })
    }

    fn pid_path(&self, pid: ProcessId) -> PathBuf {
        self.root.join(pid.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeProcTree;

    #[test]
    fn test_read_command_line() {
        let tree = FakeProcTree::new();
        tree.add_process(ProcessId(10), b"/bin/sleep\05\0");
        let discovery = ProcessDiscovery::new(tree.root());

        assert_eq!(
            discovery.read_command_line(ProcessId(10)).as_deref(),
            Some(&b"/bin/sleep\05\0"[..])
        );
        assert_eq!(discovery.read_command_line(ProcessId(11)), None);
    }

    #[test]
    fn test_empty_record_is_none() {
        let tree = FakeProcTree::new();
        tree.add_process(ProcessId(2), b"");
        let discovery = ProcessDiscovery::new(tree.root());
        assert_eq!(discovery.read_command_line(ProcessId(2)), None);
    }

    #[test]
    fn test_large_record() {
        let tree = FakeProcTree::new();
        let mut record = b"/usr/bin/target".to_vec();
        for i in 0..2000 {
            record.push(0);
            record.extend_from_slice(format!("--arg{i}").as_bytes());
        }
        record.push(0);
        tree.add_process(ProcessId(77), &record);
        let discovery = ProcessDiscovery::new(tree.root());
        assert_eq!(discovery.read_command_line(ProcessId(77)), Some(record));
    }

    #[test]
    fn test_list_pids_skips_non_numeric() {
        let tree = FakeProcTree::new();
        tree.add_process(ProcessId(1), b"/sbin/init\0");
        tree.add_process(ProcessId(300), b"/bin/sh\0");
        tree.add_entry("self");
        tree.add_entry("sys");
        let discovery = ProcessDiscovery::new(tree.root());

        let mut pids = discovery.list_pids();
        pids.sort();
        assert_eq!(pids, vec![ProcessId(1), ProcessId(300)]);
    }

    #[test]
    fn test_find_pid_by_command_line() {
        let tree = FakeProcTree::new();
        tree.add_process(ProcessId(5), b"/bin/sleep\010\0");
        tree.add_process(ProcessId(6), b"/bin/sleep\05\0");
        tree.add_process(ProcessId(7), b"");
        let discovery = ProcessDiscovery::new(tree.root());

        let pattern = b"/bin/sleep\05";
        assert_eq!(
            discovery.find_pid_by_command_line(pattern, pattern.len() + 1),
            Some(ProcessId(6))
        );
        assert_eq!(discovery.find_pid_by_command_line(b"/bin/true", 10), None);
    }

    #[test]
    fn test_missing_root() {
        let discovery = ProcessDiscovery::new("/nonexistent/proc-root");
        assert!(discovery.list_pids().is_empty());
        assert_eq!(discovery.find_pid_by_command_line(b"x", 1), None);
    }

    #[test]
    fn test_tracer_pid() {
        let tree = FakeProcTree::new();
        tree.add_process(ProcessId(40), b"/bin/cat\0");
        tree.set_tracer(ProcessId(40), ProcessId(39));
        tree.add_process(ProcessId(41), b"/bin/cat\0");
        tree.set_tracer(ProcessId(41), ProcessId::NONE);
        let discovery = ProcessDiscovery::new(tree.root());

        assert_eq!(discovery.tracer_pid(ProcessId(40)), Some(ProcessId(39)));
        assert_eq!(discovery.tracer_pid(ProcessId(41)), Some(ProcessId::NONE));
        assert_eq!(discovery.tracer_pid(ProcessId(42)), None);
    }

    #[test]
    fn test_live_self_record() {
        let discovery = ProcessDiscovery::default();
        if !discovery.root().exists() {
            return;
        }
        let me = ProcessId(std::process::id());
        let record = discovery.read_command_line(me).expect("own cmdline");
        assert!(!record.is_empty());
    }
}
