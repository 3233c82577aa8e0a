//! Kernel error kinds
//!
//! Internal operations return [`KResult`]. The syscall layer folds every
//! error into the sentinel of the call (`NOPROC`, `NOFILE`, `-1`, ...), so the
//! kind only matters for logging and for callers of the `Result` API.

use core::fmt;

/// Why a kernel operation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No free process slot, descriptor, file object or execution context
    ResourceExhausted,
    /// Out-of-range or type-mismatched identity (pid, fid, tid)
    InvalidHandle,
    /// Operation illegal in the current socket/thread/process state
    InvalidState,
    /// Operation past a closed pipe endpoint
    PeerClosed,
    /// Connect was not admitted before its deadline
    Timeout,
    /// Unknown thread, or a pid that is not a child of the caller
    NotFound,
    /// Malformed argument: null task, bad port, short buffer
    InvalidArgument,
}

impl KernelError {
    /// Short static name, used in log lines
    pub fn as_str(&self) -> &'static str {
        match self {
            KernelError::ResourceExhausted => "resource exhausted",
            KernelError::InvalidHandle => "invalid handle",
            KernelError::InvalidState => "invalid state",
            KernelError::PeerClosed => "peer closed",
            KernelError::Timeout => "timed out",
            KernelError::NotFound => "not found",
            KernelError::InvalidArgument => "invalid argument",
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type used throughout the kernel core
pub type KResult<T> = Result<T, KernelError>;
