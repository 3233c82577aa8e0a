//! Inter-Process Communication (IPC) module
//!
//! - File descriptors (fd.rs) - FCB table, per-process descriptor tables and
//!   read/write/close dispatch
//! - Pipes (pipe.rs) - bounded unidirectional byte streams

pub mod fd;
pub mod pipe;

pub use fd::{FcbId, Fid, FidTable, FileTable, StreamOps, NOFILE};
pub use pipe::{PipeBuffer, PipeFds, PipeId, PipeTable};
