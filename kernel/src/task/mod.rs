//! Execution contexts and thread records
//!
//! - `scheduler` - the dispatcher seam (spawn/block/wake/current)
//! - `condvar` - condition variables over the kernel lock
//! - `thread` - per-process thread records: create, join, detach, exit
//! - `host` - std-thread backed scheduler (feature `host`)

pub mod condvar;
#[cfg(feature = "host")]
pub mod host;
pub mod scheduler;
pub mod thread;

pub use condvar::CondVar;
pub use scheduler::{SchedTid, Scheduler, SpawnError, WakeReason};
pub use thread::{ThreadId, ThreadRecord, Tid, NOTHREAD};
