//! Scheduler seam
//!
//! The dispatcher that owns CPU contexts is not part of this core. Everything
//! the core needs from it is captured by [`Scheduler`]:
//!
//! ```text
//!   spawn(entry) ──> context created, NOT runnable
//!   wake(ctx)    ──> runnable (a wake before block is remembered)
//!   block(dl)    ──> sleep until woken or until deadline `dl` passes
//!   exit_current ──> the calling context never runs again
//! ```
//!
//! Blocking always happens with the kernel lock released; `CondVar` registers
//! the waiter while the lock is still held, so the permit semantics of
//! `wake` are what rule out missed wakeups.

use alloc::boxed::Box;
use core::fmt;

/// Scheduler-level context identifier
pub type SchedTid = u64;

/// Body of a freshly spawned context
pub type ContextEntry = Box<dyn FnOnce() + Send + 'static>;

/// Why `Scheduler::block` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Another context called `wake`
    Woken,
    /// The deadline passed first
    TimedOut,
}

/// The scheduler could not create another context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnError;

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scheduler could not spawn a context")
    }
}

/// Dispatcher primitives consumed by the process/thread core
///
/// # Contract
///
/// Implementations must:
/// - keep a spawned context blocked until its first `wake`
/// - remember a `wake` delivered to a context that is not yet blocked, so
///   the next `block` returns immediately
/// - return from `block` with `TimedOut` once the absolute deadline (in the
///   `now_ms` clock) has passed, even if nobody wakes the context
pub trait Scheduler: Send + Sync {
    /// Create a new context running `entry`; it stays blocked until woken
    fn spawn(&self, entry: ContextEntry) -> Result<SchedTid, SpawnError>;

    /// Make `ctx` runnable
    fn wake(&self, ctx: SchedTid);

    /// Suspend the calling context until woken or until `deadline` (ms)
    fn block(&self, deadline: Option<u64>) -> WakeReason;

    /// The calling context, if it is one the scheduler knows about
    fn current(&self) -> Option<SchedTid>;

    /// Monotonic clock in milliseconds
    fn now_ms(&self) -> u64;

    /// Terminate the calling context
    fn exit_current(&self) -> !;
}
