//! Per-process thread records
//!
//! A thread record holds what the process layer knows about one thread: its
//! task, private argument copy, exit value and join/detach state. The
//! execution context itself belongs to the scheduler; `ThreadTable` maps the
//! scheduler's context id back to the record.
//!
//! Record lifetime:
//! - created by `exec` (the main thread) or `create_thread`
//! - reclaimed by the last joiner, by a detached thread's own exit when
//!   nobody is joining, by its process's teardown once exited, or when the
//!   process is reaped

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::fmt;

use crate::error::{KResult, KernelError};
use crate::process::{ProcessId, Task};
use crate::state::{Kernel, KernelGuard};
use crate::task::condvar::CondVar;
use crate::task::scheduler::SchedTid;

/// Syscall-level thread identity; `NOTHREAD` means "none"
pub type Tid = u64;

/// The "no such thread" sentinel
pub const NOTHREAD: Tid = 0;

/// Thread handle; never reused within one kernel instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Parse a syscall tid
    pub fn from_tid(tid: Tid) -> Option<Self> {
        (tid != NOTHREAD).then_some(ThreadId(tid))
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the trampoline leaves once the task returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ThreadRole {
    /// Created by exec; returning is `exit`
    Main,
    /// Created by `create_thread`; returning is `thread_exit`
    Secondary,
}

/// Process-level view of one thread
pub struct ThreadRecord {
    pub tid: ThreadId,
    pub owner: ProcessId,
    /// Scheduler context, cleared once the thread has exited
    pub ctx: Option<SchedTid>,
    pub task: Task,
    pub args: Arc<[u8]>,
    pub exit_value: i32,
    pub exited: bool,
    pub detached: bool,
    /// Joiners currently sleeping on `exit_cv`
    pub waiters: usize,
    pub exit_cv: Arc<CondVar>,
}

impl ThreadRecord {
    fn new(tid: ThreadId, owner: ProcessId, task: Task, args: Arc<[u8]>) -> Self {
        ThreadRecord {
            tid,
            owner,
            ctx: None,
            task,
            args,
            exit_value: 0,
            exited: false,
            detached: false,
            waiters: 0,
            exit_cv: CondVar::shared(),
        }
    }

    /// Nothing can observe this record any more
    pub fn reclaimable(&self) -> bool {
        self.exited && self.waiters == 0
    }
}

/// All thread records in the kernel
pub struct ThreadTable {
    records: BTreeMap<ThreadId, ThreadRecord>,
    contexts: BTreeMap<SchedTid, ThreadId>,
    next: u64,
}

impl ThreadTable {
    pub fn new() -> Self {
        ThreadTable {
            records: BTreeMap::new(),
            contexts: BTreeMap::new(),
            next: 1, // 0 is NOTHREAD
        }
    }

    fn insert(&mut self, owner: ProcessId, task: Task, args: Arc<[u8]>) -> ThreadId {
        let tid = ThreadId(self.next);
        self.next += 1;
        self.records
            .insert(tid, ThreadRecord::new(tid, owner, task, args));
        tid
    }

    pub fn get(&self, tid: ThreadId) -> Option<&ThreadRecord> {
        self.records.get(&tid)
    }

    pub fn get_mut(&mut self, tid: ThreadId) -> Option<&mut ThreadRecord> {
        self.records.get_mut(&tid)
    }

    /// Thread running on scheduler context `ctx`
    pub fn by_context(&self, ctx: SchedTid) -> Option<ThreadId> {
        self.contexts.get(&ctx).copied()
    }

    fn bind(&mut self, ctx: SchedTid, tid: ThreadId) {
        self.contexts.insert(ctx, tid);
        if let Some(record) = self.records.get_mut(&tid) {
            record.ctx = Some(ctx);
        }
    }

    fn unbind(&mut self, tid: ThreadId) {
        if let Some(ctx) = self.records.get_mut(&tid).and_then(|r| r.ctx.take()) {
            self.contexts.remove(&ctx);
        }
    }

    pub(crate) fn remove(&mut self, tid: ThreadId) -> Option<ThreadRecord> {
        self.unbind(tid);
        self.records.remove(&tid)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a thread record in `owner` and start a context for it
///
/// The context is only woken after the record is linked into the process and
/// counted, all under the kernel lock, so the new thread never sees a
/// half-built process.
pub(crate) fn spawn_thread(
    g: &mut KernelGuard<'_>,
    owner: ProcessId,
    task: Task,
    args: Arc<[u8]>,
    role: ThreadRole,
) -> KResult<ThreadId> {
    let tid = g.threads.insert(owner, task, args);
    g.procs.expect_mut(owner).threads.push(tid);

    let kernel = g.kernel().clone();
    let entry = Box::new(move || thread_entry(kernel, tid, role));
    let ctx = match g.sched().spawn(entry) {
        Ok(ctx) => ctx,
        Err(e) => {
            log::warn!("thread: cannot start thread for process {}: {}", owner, e);
            reclaim(g, tid);
            return Err(KernelError::ResourceExhausted);
        }
    };

    g.threads.bind(ctx, tid);
    g.procs.expect_mut(owner).thread_count += 1;
    g.sched().wake(ctx);
    log::debug!("thread: started thread {} ({:?}) in process {}", tid, role, owner);
    Ok(tid)
}

/// Drop a thread record and unlink it from its process
pub(crate) fn reclaim(g: &mut KernelGuard<'_>, tid: ThreadId) {
    if let Some(record) = g.threads.remove(tid) {
        if let Some(process) = g.procs.get_mut(record.owner) {
            process.threads.retain(|&t| t != tid);
        }
        log::trace!("thread: reclaimed thread {} of process {}", tid, record.owner);
    }
}

/// Common trampoline: run the stored task, then leave through exit
fn thread_entry(kernel: Kernel, tid: ThreadId, role: ThreadRole) {
    let (task, args) = {
        let g = kernel.lock();
        match g.threads.get(tid) {
            Some(record) => (record.task, record.args.clone()),
            None => panic!("thread: record {} vanished before its first run", tid),
        }
    };

    let code = task(&kernel, &args);

    match role {
        ThreadRole::Main => kernel.exit(code),
        ThreadRole::Secondary => kernel.thread_exit(code),
    }
}

impl Kernel {
    /// Start another thread in the calling process
    pub fn create_thread(&self, task: Option<Task>, args: &[u8]) -> KResult<ThreadId> {
        let task = task.ok_or(KernelError::InvalidArgument)?;
        let mut g = self.lock();
        let owner = g.require_current_pid()?;
        spawn_thread(&mut g, owner, task, Arc::from(args), ThreadRole::Secondary)
    }

    /// Handle of the calling thread
    pub fn thread_self(&self) -> Option<ThreadId> {
        self.lock().current_thread()
    }

    /// Wait for `tid` to exit and collect its exit value
    ///
    /// Fails for the caller itself, for threads outside the caller's
    /// process, and for detached threads, including ones detached while the
    /// caller slept. The last joiner reclaims the record.
    pub fn thread_join(&self, tid: ThreadId) -> KResult<i32> {
        let mut g = self.lock();
        let me = g.current_thread().ok_or(KernelError::InvalidState)?;
        let pid = g.require_current_pid()?;

        if tid == me {
            log::debug!("thread_join: thread {} tried to join itself", tid);
            return Err(KernelError::InvalidState);
        }
        let exit_cv = match g.threads.get_mut(tid) {
            Some(t) if t.owner == pid => {
                if t.detached {
                    return Err(KernelError::InvalidState);
                }
                t.waiters += 1;
                t.exit_cv.clone()
            }
            _ => return Err(KernelError::NotFound),
        };

        loop {
            match g.threads.get(tid) {
                Some(t) if !t.exited && !t.detached => {}
                _ => break,
            }
            g.wait(&exit_cv);
        }

        // Our waiter count kept the record alive.
        let (detached, exit_value, reclaim_now) = match g.threads.get_mut(tid) {
            Some(t) => {
                t.waiters -= 1;
                (t.detached, t.exit_value, t.waiters == 0 && t.exited)
            }
            None => panic!("thread_join: record {} reclaimed under a waiter", tid),
        };

        if detached {
            if reclaim_now {
                reclaim(&mut g, tid);
            }
            log::debug!("thread_join: thread {} was detached", tid);
            return Err(KernelError::InvalidState);
        }

        if reclaim_now {
            reclaim(&mut g, tid);
        }
        Ok(exit_value)
    }

    /// Make `tid` unjoinable and wake every joiner
    pub fn thread_detach(&self, tid: ThreadId) -> KResult<()> {
        let mut g = self.lock();
        let pid = g.require_current_pid()?;
        let exit_cv = match g.threads.get_mut(tid) {
            Some(t) if t.owner == pid => {
                if t.exited {
                    return Err(KernelError::InvalidState);
                }
                t.detached = true;
                t.exit_cv.clone()
            }
            _ => return Err(KernelError::NotFound),
        };
        g.broadcast(&exit_cv);
        Ok(())
    }

    /// Terminate the calling thread
    ///
    /// The last thread of a process tears the process down and leaves it a
    /// zombie for its parent to reap.
    pub fn thread_exit(&self, code: i32) -> ! {
        let mut g = self.lock();
        let tid = match g.current_thread() {
            Some(tid) => tid,
            None => panic!("thread_exit called outside a kernel thread"),
        };

        let (owner, exit_cv) = match g.threads.get_mut(tid) {
            Some(t) => {
                t.exit_value = code;
                t.exited = true;
                (t.owner, t.exit_cv.clone())
            }
            None => panic!("thread_exit: no record for running thread {}", tid),
        };
        g.threads.unbind(tid);

        let remaining = {
            let process = g.procs.expect_mut(owner);
            process.thread_count -= 1;
            process.thread_count
        };
        g.broadcast(&exit_cv);

        if remaining == 0 {
            crate::process::exit::finish_process(&mut g, owner);
        } else if g.threads.get(tid).map_or(false, |t| t.detached && t.waiters == 0) {
            reclaim(&mut g, tid);
        }

        log::debug!("thread_exit: thread {} of process {} exited with {}", tid, owner, code);
        drop(g);
        self.scheduler().exit_current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &Kernel, _: &[u8]) -> i32 {
        0
    }

    #[test]
    fn thread_ids_start_after_nothread() {
        let mut table = ThreadTable::new();
        let a = table.insert(ProcessId::INIT, noop, Arc::from(&[][..]));
        let b = table.insert(ProcessId::INIT, noop, Arc::from(&[1u8, 2][..]));
        assert_eq!(a.as_u64(), 1);
        assert_eq!(b.as_u64(), 2);
        assert_eq!(ThreadId::from_tid(NOTHREAD), None);
        assert_eq!(&*table.get(b).unwrap().args, &[1, 2]);
    }

    #[test]
    fn context_binding_follows_record() {
        let mut table = ThreadTable::new();
        let tid = table.insert(ProcessId::INIT, noop, Arc::from(&[][..]));
        table.bind(40, tid);
        assert_eq!(table.by_context(40), Some(tid));
        assert_eq!(table.get(tid).unwrap().ctx, Some(40));

        table.unbind(tid);
        assert_eq!(table.by_context(40), None);
        assert!(table.get(tid).is_some());

        table.bind(41, tid);
        assert!(table.remove(tid).is_some());
        assert_eq!(table.by_context(41), None);
        assert!(table.is_empty());
    }

    #[test]
    fn reclaimable_needs_exit_and_no_waiters() {
        let mut table = ThreadTable::new();
        let tid = table.insert(ProcessId::INIT, noop, Arc::from(&[][..]));
        let record = table.get_mut(tid).unwrap();
        assert!(!record.reclaimable());
        record.exited = true;
        record.waiters = 1;
        assert!(!record.reclaimable());
        record.waiters = 0;
        assert!(record.reclaimable());
    }
}
