//! Process table - slot allocation and lookup

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use super::{Process, ProcessId, ProcessState};

/// Fixed-capacity process table
///
/// Occupied slots live in `processes`. A slot returns to the free pool only
/// when its zombie is reaped; freed slots are reused most-recent-first, and
/// slots that were never used are handed out in ascending order.
pub struct ProcessTable {
    /// Alive and zombie processes indexed by PID
    processes: BTreeMap<ProcessId, Process>,

    /// Reaped slots, most recently released last
    released: Vec<ProcessId>,

    /// First slot that has never been handed out
    next_fresh: usize,

    capacity: usize,
}

impl ProcessTable {
    pub fn new(capacity: usize) -> Self {
        ProcessTable {
            processes: BTreeMap::new(),
            released: Vec::new(),
            next_fresh: 0,
            capacity,
        }
    }

    /// Take a slot from the free pool and install an empty alive process
    pub fn acquire(&mut self, max_fileid: usize) -> Option<ProcessId> {
        let pid = match self.released.pop() {
            Some(pid) => pid,
            None if self.next_fresh < self.capacity => {
                let pid = ProcessId::new(self.next_fresh);
                self.next_fresh += 1;
                pid
            }
            None => return None,
        };
        self.processes.insert(pid, Process::new(pid, max_fileid));
        Some(pid)
    }

    /// Remove a process and return its slot to the free pool
    pub fn release(&mut self, pid: ProcessId) -> Option<Process> {
        let process = self.processes.remove(&pid)?;
        self.released.push(pid);
        Some(process)
    }

    pub fn get(&self, pid: ProcessId) -> Option<&Process> {
        self.processes.get(&pid)
    }

    pub fn get_mut(&mut self, pid: ProcessId) -> Option<&mut Process> {
        self.processes.get_mut(&pid)
    }

    /// Like `get_mut`, for slots whose presence is a structural invariant
    pub(crate) fn expect_mut(&mut self, pid: ProcessId) -> &mut Process {
        match self.processes.get_mut(&pid) {
            Some(p) => p,
            None => panic!("process table: pid {} vanished while in use", pid),
        }
    }

    pub fn state_of(&self, pid: ProcessId) -> ProcessState {
        self.processes
            .get(&pid)
            .map_or(ProcessState::Free, |p| p.state)
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// First occupied slot at or after `from`
    pub fn next_occupied(&self, from: ProcessId) -> Option<&Process> {
        self.processes.range(from..).next().map(|(_, p)| p)
    }

    /// Init's exit status once it is a zombie
    pub fn init_exit_status(&self) -> Option<i32> {
        self.processes
            .get(&ProcessId::INIT)
            .filter(|p| p.is_zombie())
            .map(|p| p.exit_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_slots_are_ascending() {
        let mut table = ProcessTable::new(4);
        let pids: Vec<_> = (0..4).filter_map(|_| table.acquire(2)).collect();
        assert_eq!(
            pids,
            [0, 1, 2, 3].map(ProcessId::new)
        );
        assert_eq!(table.acquire(2), None);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn released_slots_are_reused_last_in_first_out() {
        let mut table = ProcessTable::new(8);
        for _ in 0..5 {
            table.acquire(2);
        }
        table.release(ProcessId::new(2));
        table.release(ProcessId::new(4));
        assert_eq!(table.acquire(2), Some(ProcessId::new(4)));
        assert_eq!(table.acquire(2), Some(ProcessId::new(2)));
        assert_eq!(table.acquire(2), Some(ProcessId::new(5)));
    }

    #[test]
    fn state_of_reports_free_for_empty_slots() {
        let mut table = ProcessTable::new(3);
        let pid = table.acquire(1).unwrap();
        assert_eq!(table.state_of(pid), ProcessState::Alive);
        table.get_mut(pid).unwrap().state = ProcessState::Zombie;
        assert_eq!(table.state_of(pid), ProcessState::Zombie);
        table.release(pid);
        assert_eq!(table.state_of(pid), ProcessState::Free);
        assert!(table.release(pid).is_none());
    }

    #[test]
    fn next_occupied_skips_holes() {
        let mut table = ProcessTable::new(6);
        for _ in 0..5 {
            table.acquire(1);
        }
        table.release(ProcessId::new(2));
        table.release(ProcessId::new(3));
        let next = table.next_occupied(ProcessId::new(2)).map(|p| p.id);
        assert_eq!(next, Some(ProcessId::new(4)));
        assert!(table.next_occupied(ProcessId::new(5)).is_none());
    }

    #[test]
    fn init_exit_status_needs_zombie_init() {
        let mut table = ProcessTable::new(3);
        table.acquire(1);
        let init = table.acquire(1).unwrap();
        assert_eq!(table.init_exit_status(), None);
        let p = table.get_mut(init).unwrap();
        p.exit_value = 42;
        p.state = ProcessState::Zombie;
        assert_eq!(table.init_exit_status(), Some(42));
    }
}
