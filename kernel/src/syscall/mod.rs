//! System call surface
//!
//! Thin wrappers over the `Result` API on [`crate::Kernel`] that fold every
//! error into the sentinel the call is documented to return:
//!
//! | call kind            | success      | failure    |
//! |----------------------|--------------|------------|
//! | process identity     | pid          | `NOPROC`   |
//! | thread identity      | tid          | `NOTHREAD` |
//! | descriptor           | fid          | `NOFILE`   |
//! | status               | 0 / count    | -1         |
//!
//! The error kind itself is logged at debug level.

pub mod io;
pub mod process;
pub mod socket;
pub mod thread;

use crate::error::KResult;

pub use crate::config::NOPORT;
pub use crate::ipc::fd::NOFILE;
pub use crate::process::NOPROC;
pub use crate::task::thread::NOTHREAD;

/// Fold a status-only result into 0 / -1
pub(crate) fn status(call: &str, result: KResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            log::debug!("{}: {}", call, e);
            -1
        }
    }
}

/// Fold a byte count into count / -1
pub(crate) fn count(call: &str, result: KResult<usize>) -> i32 {
    match result {
        Ok(n) => i32::try_from(n).unwrap_or(i32::MAX),
        Err(e) => {
            log::debug!("{}: {}", call, e);
            -1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;

    #[test]
    fn counts_saturate_instead_of_wrapping() {
        assert_eq!(count("t", Ok(12)), 12);
        assert_eq!(count("t", Ok(i32::MAX as usize + 1)), i32::MAX);
        assert_eq!(count("t", Err(KernelError::PeerClosed)), -1);
    }
}
