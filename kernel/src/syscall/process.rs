//! Process system calls

use super::NOPROC;
use crate::ipc::fd::{Fid, NOFILE};
use crate::process::{Pid, ProcessId, Task};
use crate::state::Kernel;

impl Kernel {
    /// `Exec(task, args) -> pid | NOPROC`
    pub fn sys_exec(&self, task: Option<Task>, args: &[u8]) -> Pid {
        log::debug!("sys_exec: {} arg bytes, task={}", args.len(), task.is_some());
        match self.exec(task, args) {
            Ok(pid) => pid.as_pid(),
            Err(e) => {
                log::debug!("sys_exec: {}", e);
                NOPROC
            }
        }
    }

    /// `Exit(code)`; never returns
    pub fn sys_exit(&self, code: i32) -> ! {
        log::debug!("sys_exit: code={}", code);
        self.exit(code)
    }

    /// `WaitChild(pid | NOPROC, status) -> pid | NOPROC`
    ///
    /// `NOPROC` waits for any child. The child's exit status is stored in
    /// `status` when one is given.
    pub fn sys_wait_child(&self, pid: Pid, status: Option<&mut i32>) -> Pid {
        log::debug!("sys_wait_child: pid={}", pid);
        let target = if pid == NOPROC {
            None
        } else {
            match ProcessId::from_pid(pid) {
                Some(pid) => Some(pid),
                None => return NOPROC,
            }
        };
        match self.wait_child(target) {
            Ok((child, exit_value)) => {
                if let Some(status) = status {
                    *status = exit_value;
                }
                child.as_pid()
            }
            Err(e) => {
                log::debug!("sys_wait_child: {}", e);
                NOPROC
            }
        }
    }

    pub fn sys_get_pid(&self) -> Pid {
        self.get_pid().map_or(NOPROC, ProcessId::as_pid)
    }

    /// Parent pid, or `NOPROC` for a parentless process
    pub fn sys_get_ppid(&self) -> Pid {
        self.get_ppid().map_or(NOPROC, ProcessId::as_pid)
    }

    /// `OpenInfo() -> fid | NOFILE`
    pub fn sys_open_info(&self) -> Fid {
        log::debug!("sys_open_info");
        match self.open_info() {
            Ok(fid) => fid,
            Err(e) => {
                log::debug!("sys_open_info: {}", e);
                NOFILE
            }
        }
    }
}
