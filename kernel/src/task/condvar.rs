//! Condition variables over the kernel lock
//!
//! A `CondVar` is only a FIFO of sleeping scheduler contexts. Waiting and
//! signalling go through [`crate::KernelGuard`], which owns the kernel lock:
//! the waiter is queued while the lock is held, the lock is released, the
//! context blocks, and the lock is re-taken before the waiter looks at any
//! state again. Wakeups are hints; every caller re-checks its predicate.

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use spin::Mutex;

use super::scheduler::{SchedTid, Scheduler};

/// Queue of contexts sleeping on one condition
pub struct CondVar {
    /// Sleeping contexts, oldest first
    waiters: Mutex<VecDeque<SchedTid>>,
}

impl CondVar {
    pub fn new() -> Self {
        CondVar {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Allocate a shareable condition variable
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Queue `ctx`; the caller still holds the kernel lock
    pub(crate) fn enqueue(&self, ctx: SchedTid) {
        let mut waiters = self.waiters.lock();
        if !waiters.contains(&ctx) {
            waiters.push_back(ctx);
        }
    }

    /// Drop `ctx` from the queue if a timeout left it there
    pub(crate) fn remove(&self, ctx: SchedTid) {
        self.waiters.lock().retain(|&w| w != ctx);
    }

    /// Wake the oldest waiter, if any
    pub fn signal(&self, sched: &dyn Scheduler) {
        let next = self.waiters.lock().pop_front();
        if let Some(ctx) = next {
            sched.wake(ctx);
        }
    }

    /// Wake every waiter
    pub fn broadcast(&self, sched: &dyn Scheduler) {
        let drained: VecDeque<SchedTid> = core::mem::take(&mut *self.waiters.lock());
        for ctx in drained {
            sched.wake(ctx);
        }
    }

    /// Number of contexts currently queued
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CondVar {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CondVar")
            .field("waiters", &self.waiter_count())
            .finish()
    }
}
