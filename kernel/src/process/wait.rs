//! Waiting for and reaping child processes

use super::ProcessId;
use crate::error::{KResult, KernelError};
use crate::state::{Kernel, KernelGuard};

impl Kernel {
    /// Wait for a child to become a zombie and reap it
    ///
    /// `Some(pid)` waits for that child; `None` takes whichever child exited
    /// first, failing at once if the caller has no children at all. Returns
    /// the reaped pid and its exit status.
    pub fn wait_child(&self, target: Option<ProcessId>) -> KResult<(ProcessId, i32)> {
        let mut g = self.lock();
        let me = g.require_current_pid()?;

        let child = match target {
            Some(pid) => wait_for(&mut g, me, pid)?,
            None => wait_for_any(&mut g, me)?,
        };
        let status = reap(&mut g, me, child);
        Ok((child, status))
    }
}

fn wait_for(g: &mut KernelGuard<'_>, me: ProcessId, pid: ProcessId) -> KResult<ProcessId> {
    if pid == ProcessId::IDLE || pid.as_usize() >= g.procs.capacity() {
        log::debug!("wait_child: pid {} out of range", pid);
        return Err(KernelError::InvalidHandle);
    }

    loop {
        match g.procs.get(pid) {
            Some(child) if child.parent == Some(me) => {
                if child.is_zombie() {
                    return Ok(pid);
                }
            }
            _ => {
                log::debug!("wait_child: {} is not a child of {}", pid, me);
                return Err(KernelError::NotFound);
            }
        }
        let cv = g.procs.expect_mut(me).child_exit.clone();
        g.wait(&cv);
    }
}

fn wait_for_any(g: &mut KernelGuard<'_>, me: ProcessId) -> KResult<ProcessId> {
    loop {
        let parent = g.procs.expect_mut(me);
        if parent.children.is_empty() {
            return Err(KernelError::NotFound);
        }
        if let Some(&child) = parent.exited.front() {
            return Ok(child);
        }
        let cv = parent.child_exit.clone();
        g.wait(&cv);
    }
}

/// Free a zombie child's slot and return its exit status
fn reap(g: &mut KernelGuard<'_>, parent: ProcessId, child: ProcessId) -> i32 {
    g.procs.expect_mut(parent).unlink_child(child);
    let zombie = match g.procs.release(child) {
        Some(zombie) => zombie,
        None => panic!("wait_child: zombie {} vanished before reaping", child),
    };
    for tid in &zombie.threads {
        g.threads.remove(*tid);
    }
    log::debug!("wait_child: {} reaped {} (status {})", parent, child, zombie.exit_value);
    zombie.exit_value
}
