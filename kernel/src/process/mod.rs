//! Process management
//!
//! A process is a slot in the process table with a parent link, a list of
//! children, one or more threads and a descriptor table. Its lifetime is
//! driven by its threads: the last `thread_exit` turns it into a zombie and
//! the parent's `wait_child` frees the slot.
//!
//! Slot 0 is the idle process and slot 1 is init; both are created by
//! [`crate::Kernel::start`] and neither has a parent.

pub mod creation;
pub mod exit;
pub mod manager;
pub mod procinfo;
pub mod process;
pub mod wait;

pub use manager::ProcessTable;
pub use procinfo::ProcInfo;
pub use process::{Pid, Process, ProcessId, ProcessState, Task, NOPROC};
