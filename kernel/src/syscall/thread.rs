//! Thread system calls

use super::{status, NOTHREAD};
use crate::process::Task;
use crate::state::Kernel;
use crate::task::thread::{ThreadId, Tid};

impl Kernel {
    /// `CreateThread(task, args) -> tid | NOTHREAD`
    pub fn sys_create_thread(&self, task: Option<Task>, args: &[u8]) -> Tid {
        log::debug!("sys_create_thread: {} arg bytes", args.len());
        match self.create_thread(task, args) {
            Ok(tid) => tid.as_u64(),
            Err(e) => {
                log::debug!("sys_create_thread: {}", e);
                NOTHREAD
            }
        }
    }

    pub fn sys_thread_self(&self) -> Tid {
        self.thread_self().map_or(NOTHREAD, ThreadId::as_u64)
    }

    /// `ThreadJoin(tid, exitval) -> 0 | -1`
    pub fn sys_thread_join(&self, tid: Tid, exitval: Option<&mut i32>) -> i32 {
        log::debug!("sys_thread_join: tid={}", tid);
        let Some(tid) = ThreadId::from_tid(tid) else {
            return -1;
        };
        match self.thread_join(tid) {
            Ok(value) => {
                if let Some(exitval) = exitval {
                    *exitval = value;
                }
                0
            }
            Err(e) => {
                log::debug!("sys_thread_join: {}", e);
                -1
            }
        }
    }

    /// `ThreadDetach(tid) -> 0 | -1`
    pub fn sys_thread_detach(&self, tid: Tid) -> i32 {
        log::debug!("sys_thread_detach: tid={}", tid);
        match ThreadId::from_tid(tid) {
            Some(tid) => status("sys_thread_detach", self.thread_detach(tid)),
            None => -1,
        }
    }

    /// `ThreadExit(code)`; never returns
    pub fn sys_thread_exit(&self, code: i32) -> ! {
        log::debug!("sys_thread_exit: code={}", code);
        self.thread_exit(code)
    }
}
