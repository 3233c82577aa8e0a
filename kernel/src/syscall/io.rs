//! Stream system calls: pipe creation and read/write/close dispatch

use super::{count, status};
use crate::ipc::fd::Fid;
use crate::ipc::pipe::PipeFds;
use crate::state::Kernel;

/// Largest transfer whose byte count fits the `i32` return value
pub const MAX_TRANSFER: usize = i32::MAX as usize;

impl Kernel {
    /// `Pipe(pipe) -> 0 | -1`; fills in both descriptors on success
    pub fn sys_pipe(&self, pipe: &mut PipeFds) -> i32 {
        log::debug!("sys_pipe");
        match self.pipe() {
            Ok(fds) => {
                *pipe = fds;
                0
            }
            Err(e) => {
                log::debug!("sys_pipe: {}", e);
                -1
            }
        }
    }

    /// `Read(fid, buf) -> bytes | -1`; 0 means end of stream
    ///
    /// At most [`MAX_TRANSFER`] bytes move per call.
    pub fn sys_read(&self, fid: Fid, buf: &mut [u8]) -> i32 {
        log::trace!("sys_read: fid={} len={}", fid, buf.len());
        let len = buf.len().min(MAX_TRANSFER);
        count("sys_read", self.read(fid, &mut buf[..len]))
    }

    /// `Write(fid, buf) -> bytes | -1`
    pub fn sys_write(&self, fid: Fid, buf: &[u8]) -> i32 {
        log::trace!("sys_write: fid={} len={}", fid, buf.len());
        let len = buf.len().min(MAX_TRANSFER);
        count("sys_write", self.write(fid, &buf[..len]))
    }

    /// `Close(fid) -> 0 | -1`
    pub fn sys_close(&self, fid: Fid) -> i32 {
        log::debug!("sys_close: fid={}", fid);
        status("sys_close", self.close(fid))
    }
}
