//! Process creation
//!
//! `exec` builds the whole process record under the kernel lock and only then
//! wakes the main thread, so the new thread never observes a half-built
//! process. Slots 0 (idle) and 1 (init) are parentless; every later process
//! becomes a child of the caller and shares the caller's open streams.

use alloc::sync::Arc;

use super::ProcessId;
use crate::error::{KResult, KernelError};
use crate::ipc::fd;
use crate::process::Task;
use crate::state::{Kernel, KernelGuard};
use crate::task::thread::{self, ThreadRole};

impl Kernel {
    /// Create a process running `task` with a private copy of `args`
    ///
    /// With `task == None` the slot is taken but no thread is started; the
    /// idle process is created this way.
    pub fn exec(&self, task: Option<Task>, args: &[u8]) -> KResult<ProcessId> {
        let mut g = self.lock();
        let caller = g.current_pid();
        let max_fileid = g.config().max_fileid;

        let pid = match g.procs.acquire(max_fileid) {
            Some(pid) => pid,
            None => {
                log::warn!("exec: process table full ({} slots)", g.procs.capacity());
                return Err(KernelError::ResourceExhausted);
            }
        };

        // Processes created from outside any kernel thread belong to init.
        let parent = match caller {
            _ if pid <= ProcessId::INIT => None,
            Some(caller) => Some(caller),
            None => g.procs.get(ProcessId::INIT).map(|_| ProcessId::INIT),
        };
        if let Some(parent) = parent {
            g.procs.expect_mut(parent).add_child(pid);
            g.procs.expect_mut(pid).parent = Some(parent);
        }
        if let Some(caller) = caller.filter(|_| parent == caller) {
            // Inherit the caller's streams by reference
            let inherited = g.procs.expect_mut(caller).fidt.clone();
            for fcb in inherited.open_fcbs() {
                g.files.incref(fcb);
            }
            g.procs.expect_mut(pid).fidt = inherited;
        }

        let args: Arc<[u8]> = Arc::from(args);
        let arg_len = args.len();
        {
            let child = g.procs.expect_mut(pid);
            child.main_task = task;
            child.arg_len = arg_len;
            child.args = Some(args.clone());
        }

        if let Some(task) = task {
            if let Err(e) = thread::spawn_thread(&mut g, pid, task, args, ThreadRole::Main) {
                log::warn!("exec: main thread for process {} failed: {}", pid, e);
                discard(&mut g, pid);
                return Err(e);
            }
        }

        log::info!(
            "exec: created process {} (parent {:?}, {} arg bytes)",
            pid,
            parent.map(ProcessId::as_usize),
            arg_len
        );
        Ok(pid)
    }

    /// Boot the process tree: idle must land in slot 0 and init in slot 1
    pub fn start(&self, init: Task, args: &[u8]) -> KResult<()> {
        let idle = self.exec(None, &[])?;
        if idle != ProcessId::IDLE {
            panic!("kernel: idle process created as pid {}", idle);
        }
        let init_pid = self.exec(Some(init), args)?;
        if init_pid != ProcessId::INIT {
            panic!("kernel: init process created as pid {}", init_pid);
        }
        log::info!("kernel: idle and init are up");
        Ok(())
    }
}

/// Undo a process whose main thread could not be started
fn discard(g: &mut KernelGuard<'_>, pid: ProcessId) {
    let Some(process) = g.procs.release(pid) else {
        return;
    };
    if let Some(parent) = process.parent.and_then(|p| g.procs.get_mut(p)) {
        parent.unlink_child(pid);
    }
    for fcb in process.fidt.open_fcbs() {
        fd::release(g, fcb);
    }
}
