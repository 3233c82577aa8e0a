//! Process, thread and IPC core of a single-image multiprogramming kernel
//!
//! The crate is organised the way the rest of the kernel is:
//! - `process` - process table, parent/child tree, zombie protocol, process info
//! - `task` - scheduler seam, condition variables, per-process thread records
//! - `ipc` - descriptor tables, stream dispatch and pipes
//! - `socket` - port table and the listener/peer handshake built on pipes
//! - `syscall` - sentinel-returning system call surface
//!
//! All state lives in one [`KernelState`] behind a single lock (see `state`).
//! The scheduler itself is an external collaborator reached through the
//! [`task::Scheduler`] trait; the `host` feature supplies a std-thread backed
//! implementation used by the tests.

#![no_std]

extern crate alloc;

#[cfg(feature = "host")]
extern crate std;

pub mod config;
pub mod error;
pub mod ipc;
#[cfg(feature = "host")]
pub mod logger;
pub mod process;
pub mod socket;
pub mod state;
pub mod syscall;
pub mod task;

pub use config::KernelConfig;
pub use error::{KResult, KernelError};
pub use process::{ProcessId, ProcessState, Task};
pub use state::{Kernel, KernelGuard, KernelState};
pub use task::thread::ThreadId;
