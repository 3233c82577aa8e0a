//! Kernel table sizes and capacities
//!
//! Every fixed-size table in the core takes its bound from a [`KernelConfig`]
//! handed to [`crate::Kernel::new`]. The defaults match a full-size kernel;
//! tests shrink them to exercise exhaustion paths.

use crate::error::{KResult, KernelError};

/// Default number of process table slots
pub const MAX_PROC: usize = 65536;

/// Default number of descriptor slots per process
pub const MAX_FILEID: usize = 16;

/// Default number of open stream objects system-wide
pub const MAX_FILES: usize = 4096;

/// Default pipe capacity in bytes
pub const PIPE_BUFFER_SIZE: usize = 8192;

/// Default highest usable port number
pub const MAX_PORT: u16 = 1023;

/// The wildcard port: sockets may be created on it but never listen on it
pub const NOPORT: u16 = 0;

/// Argument bytes copied into each process info record
pub const PROCINFO_MAX_ARGS_SIZE: usize = 128;

/// Table sizes for one kernel instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Process table slots, including idle (0) and init (1)
    pub max_proc: usize,
    /// Descriptor slots per process
    pub max_fileid: usize,
    /// File control blocks shared by all processes
    pub max_files: usize,
    /// Capacity C of every pipe
    pub pipe_buffer_size: usize,
    /// Port table covers `0..=max_port`
    pub max_port: u16,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            max_proc: MAX_PROC,
            max_fileid: MAX_FILEID,
            max_files: MAX_FILES,
            pipe_buffer_size: PIPE_BUFFER_SIZE,
            max_port: MAX_PORT,
        }
    }
}

impl KernelConfig {
    pub fn with_max_proc(mut self, max_proc: usize) -> Self {
        self.max_proc = max_proc;
        self
    }

    pub fn with_max_fileid(mut self, max_fileid: usize) -> Self {
        self.max_fileid = max_fileid;
        self
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_pipe_buffer_size(mut self, size: usize) -> Self {
        self.pipe_buffer_size = size;
        self
    }

    pub fn with_max_port(mut self, max_port: u16) -> Self {
        self.max_port = max_port;
        self
    }

    /// Reject configurations the core cannot boot with
    ///
    /// Idle and init need two process slots; a pipe needs at least one byte
    /// of buffer; a process needs at least one descriptor slot; and the port
    /// table needs at least one port besides `NOPORT`.
    pub fn validate(&self) -> KResult<()> {
        if self.max_proc < 2 {
            log::error!("config: max_proc={} leaves no room for idle and init", self.max_proc);
            return Err(KernelError::InvalidArgument);
        }
        if self.pipe_buffer_size == 0 {
            log::error!("config: pipe_buffer_size must be non-zero");
            return Err(KernelError::InvalidArgument);
        }
        if self.max_fileid == 0 || self.max_files == 0 {
            log::error!(
                "config: max_fileid={} max_files={} must both be non-zero",
                self.max_fileid,
                self.max_files
            );
            return Err(KernelError::InvalidArgument);
        }
        if self.max_port == NOPORT {
            log::error!("config: max_port must be above NOPORT");
            return Err(KernelError::InvalidArgument);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(KernelConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_single_process_slot() {
        let cfg = KernelConfig::default().with_max_proc(1);
        assert_eq!(cfg.validate(), Err(KernelError::InvalidArgument));
    }

    #[test]
    fn rejects_empty_pipe_and_port_table() {
        assert!(KernelConfig::default().with_pipe_buffer_size(0).validate().is_err());
        assert!(KernelConfig::default().with_max_port(NOPORT).validate().is_err());
        assert!(KernelConfig::default().with_max_fileid(0).validate().is_err());
    }

    #[test]
    fn builders_override_fields() {
        let cfg = KernelConfig::default()
            .with_max_proc(8)
            .with_max_fileid(4)
            .with_max_files(32)
            .with_pipe_buffer_size(16)
            .with_max_port(7);
        assert_eq!(cfg.max_proc, 8);
        assert_eq!(cfg.max_fileid, 4);
        assert_eq!(cfg.max_files, 32);
        assert_eq!(cfg.pipe_buffer_size, 16);
        assert_eq!(cfg.max_port, 7);
        assert!(cfg.validate().is_ok());
    }
}
