//! Socket system calls

use super::status;
use crate::ipc::fd::{Fid, NOFILE};
use crate::socket::{Port, ShutdownMode};
use crate::state::Kernel;

fn port_from_raw(port: i32) -> Option<Port> {
    Port::try_from(port).ok()
}

impl Kernel {
    /// `Socket(port) -> fid | NOFILE`
    pub fn sys_socket(&self, port: i32) -> Fid {
        log::debug!("sys_socket: port={}", port);
        let Some(port) = port_from_raw(port) else {
            return NOFILE;
        };
        match self.socket(port) {
            Ok(fid) => fid,
            Err(e) => {
                log::debug!("sys_socket: {}", e);
                NOFILE
            }
        }
    }

    /// `Listen(fid) -> 0 | -1`
    pub fn sys_listen(&self, fid: Fid) -> i32 {
        log::debug!("sys_listen: fid={}", fid);
        status("sys_listen", self.listen(fid))
    }

    /// `Accept(fid) -> fid | NOFILE`
    pub fn sys_accept(&self, fid: Fid) -> Fid {
        log::debug!("sys_accept: fid={}", fid);
        match self.accept(fid) {
            Ok(peer) => peer,
            Err(e) => {
                log::debug!("sys_accept: {}", e);
                NOFILE
            }
        }
    }

    /// `Connect(fid, port, timeout_ms) -> 0 | -1`
    pub fn sys_connect(&self, fid: Fid, port: i32, timeout_ms: u64) -> i32 {
        log::debug!("sys_connect: fid={} port={} timeout={}ms", fid, port, timeout_ms);
        let Some(port) = port_from_raw(port) else {
            return -1;
        };
        status("sys_connect", self.connect(fid, port, timeout_ms))
    }

    /// `ShutDown(fid, how) -> 0 | -1`; `how` is 1 (read), 2 (write) or 3 (both)
    pub fn sys_shutdown(&self, fid: Fid, how: i32) -> i32 {
        log::debug!("sys_shutdown: fid={} how={}", fid, how);
        let Some(mode) = ShutdownMode::from_raw(how) else {
            return -1;
        };
        status("sys_shutdown", self.shutdown(fid, mode))
    }
}
