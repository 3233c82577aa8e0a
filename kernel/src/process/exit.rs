//! Process termination
//!
//! A process ends when its last thread calls `thread_exit`; `exit` only
//! records the exit value first, and for init drains every remaining child.
//! Teardown runs with the kernel lock held:
//!
//! 1. children and unreaped zombies move to init (skipped for init itself)
//! 2. the process joins its parent's exited queue and the parent is woken
//! 3. arguments are released and every descriptor is closed
//! 4. exited thread records nobody is joining are reclaimed
//! 5. the slot becomes a zombie until the parent reaps it

use core::mem;

use super::{ProcessId, ProcessState};
use crate::ipc::fd;
use crate::state::{Kernel, KernelGuard};
use crate::task::thread;

impl Kernel {
    /// Terminate the calling process's current thread with `code` as the
    /// process exit value
    pub fn exit(&self, code: i32) -> ! {
        let pid = {
            let mut g = self.lock();
            let pid = g.current_pid();
            if let Some(pid) = pid {
                g.procs.expect_mut(pid).exit_value = code;
            }
            pid
        };

        if pid == Some(ProcessId::INIT) {
            log::info!("init: exiting with {}, reaping remaining children", code);
            while let Ok((child, status)) = self.wait_child(None) {
                log::debug!("init: reaped {} (status {})", child, status);
            }
        }

        self.thread_exit(code)
    }

    pub fn get_pid(&self) -> Option<ProcessId> {
        self.lock().current_pid()
    }

    /// Parent of the calling process; `None` for parentless processes
    pub fn get_ppid(&self) -> Option<ProcessId> {
        let g = self.lock();
        let pid = g.current_pid()?;
        g.procs.get(pid)?.parent
    }
}

/// Turn `pid` into a zombie; called by its last exiting thread
pub(crate) fn finish_process(g: &mut KernelGuard<'_>, pid: ProcessId) {
    if !pid.is_init() {
        let (children, exited, parent) = {
            let p = g.procs.expect_mut(pid);
            (mem::take(&mut p.children), mem::take(&mut p.exited), p.parent)
        };

        if !children.is_empty() {
            for &child in &children {
                g.procs.expect_mut(child).parent = Some(ProcessId::INIT);
            }
            let init = match g.procs.get_mut(ProcessId::INIT) {
                Some(init) => init,
                None => panic!("kernel: init missing while orphaning children of {}", pid),
            };
            init.children.extend(children);
            let woke_init = !exited.is_empty();
            init.exited.extend(exited);
            let init_cv = init.child_exit.clone();
            if woke_init {
                g.broadcast(&init_cv);
            }
        }

        if let Some(parent) = parent {
            let p = g.procs.expect_mut(parent);
            p.exited.push_back(pid);
            let cv = p.child_exit.clone();
            g.broadcast(&cv);
        }
    }

    let open = {
        let p = g.procs.expect_mut(pid);
        p.args = None;
        p.fidt.drain()
    };
    for fcb in open {
        fd::release(g, fcb);
    }

    let threads = g.procs.expect_mut(pid).threads.clone();
    for tid in threads {
        if g.threads.get(tid).map_or(false, |t| t.reclaimable()) {
            thread::reclaim(g, tid);
        }
    }

    let exit_value = {
        let p = g.procs.expect_mut(pid);
        p.state = ProcessState::Zombie;
        p.exit_value
    };
    log::info!("exit: process {} is a zombie (status {})", pid, exit_value);

    if pid.is_init() {
        let halt = g.kernel().halt_cv().clone();
        g.broadcast(&halt);
    }
}
