//! Capacity-bounded, insertion-ordered target registry.

use fa_common::{ProcessId, RegistryError, Target, TargetId, TargetView};

#[derive(Debug, Clone)]
struct Entry {
    id: TargetId,
    target: Target,
}

/// Ordered collection of targets with unique command lines.
///
/// Not synchronized; the owning monitor guards it with a lock.
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    entries: Vec<Entry>,
    capacity: usize,
    next_id: u64,
}

impl TargetRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity.min(64)),
            capacity,
            next_id: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `target`. On error the registry is unchanged.
    pub fn add(&mut self, target: Target) -> Result<TargetId, RegistryError> {
        if self.entries.len() >= self.capacity {
            return Err(RegistryError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        if self
            .entries
            .iter()
            .any(|e| e.target.command_line() == target.command_line())
        {
            return Err(RegistryError::Duplicate {
                command_line: target.command_line().to_string(),
            });
        }
        let id = TargetId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, target });
        Ok(id)
    }

    /// Remove the entry holding `pid`. Returns whether one was found.
    pub fn remove(&mut self, pid: ProcessId) -> bool {
        if pid.is_none() {
            return false;
        }
        match self.entries.iter().position(|e| e.target.process_id() == pid) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn find(&self, pid: ProcessId) -> Option<&Target> {
        if pid.is_none() {
            return None;
        }
        self.entries
            .iter()
            .find(|e| e.target.process_id() == pid)
            .map(|e| &e.target)
    }

    pub fn find_mut(&mut self, pid: ProcessId) -> Option<&mut Target> {
        if pid.is_none() {
            return None;
        }
        self.entries
            .iter_mut()
            .find(|e| e.target.process_id() == pid)
            .map(|e| &mut e.target)
    }

    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.entries.iter().find(|e| e.id == id).map(|e| &e.target)
    }

    pub fn get_mut(&mut self, id: TargetId) -> Option<&mut Target> {
        self.entries
            .iter_mut()
            .find(|e| e.id == id)
            .map(|e| &mut e.target)
    }

    /// Ids in registration order.
    pub fn ids(&self) -> Vec<TargetId> {
        self.entries.iter().map(|e| e.id).collect()
    }

    /// Pids of targets this supervisor currently traces.
    pub fn traced_pids(&self) -> Vec<ProcessId> {
        self.entries
            .iter()
            .filter(|e| e.target.is_traced())
            .map(|e| e.target.process_id())
            .collect()
    }

    /// Point-in-time copy of every target, in registration order.
    pub fn snapshot(&self) -> Vec<TargetView> {
        self.entries.iter().map(|e| e.target.view(e.id)).collect()
    }

    /// Remove and return every target, in registration order.
    pub fn drain(&mut self) -> Vec<(TargetId, Target)> {
        self.entries.drain(..).map(|e| (e.id, e.target)).collect()
    }
}
