//! Process information stream
//!
//! `open_info` returns a read-only stream; each read yields one fixed-size
//! [`ProcInfo`] record for the next occupied process slot, in ascending pid
//! order starting at init. A read returning 0 means the table has been
//! walked.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::{Pid, Process, ProcessId, NOPROC};
use crate::config::PROCINFO_MAX_ARGS_SIZE;
use crate::error::{KResult, KernelError};
use crate::ipc::fd::{self, Fid, StreamOps};
use crate::state::{Kernel, KernelGuard};

/// Snapshot of one process table entry
///
/// Wire layout (little endian, `RECORD_SIZE` bytes):
///
/// | offset | size | field          |
/// |--------|------|----------------|
/// | 0      | 4    | pid            |
/// | 4      | 4    | ppid           |
/// | 8      | 4    | alive (0 or 1) |
/// | 12     | 4    | thread_count   |
/// | 16     | 8    | main_task      |
/// | 24     | 4    | argl           |
/// | 28     | 128  | args           |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcInfo {
    pub pid: Pid,
    /// `NOPROC` for parentless processes
    pub ppid: Pid,
    pub alive: bool,
    pub thread_count: u32,
    /// Identity of the main task (0 for a process created without one)
    pub main_task: u64,
    /// Full argument length, even when `args` holds only a prefix
    pub argl: u32,
    pub args: [u8; PROCINFO_MAX_ARGS_SIZE],
}

impl ProcInfo {
    pub const RECORD_SIZE: usize = 28 + PROCINFO_MAX_ARGS_SIZE;

    pub fn from_process(p: &Process) -> Self {
        let mut args = [0u8; PROCINFO_MAX_ARGS_SIZE];
        if let Some(bytes) = &p.args {
            let n = bytes.len().min(PROCINFO_MAX_ARGS_SIZE);
            args[..n].copy_from_slice(&bytes[..n]);
        }
        ProcInfo {
            pid: p.id.as_pid(),
            ppid: p.parent.map_or(NOPROC, ProcessId::as_pid),
            alive: !p.is_zombie(),
            thread_count: p.thread_count as u32,
            main_task: p.task_identity() as u64,
            argl: p.arg_len as u32,
            args,
        }
    }

    /// The argument bytes actually carried by this record
    pub fn arg_bytes(&self) -> &[u8] {
        let n = (self.argl as usize).min(PROCINFO_MAX_ARGS_SIZE);
        &self.args[..n]
    }

    pub fn to_bytes(&self) -> [u8; Self::RECORD_SIZE] {
        let mut out = [0u8; Self::RECORD_SIZE];
        out[0..4].copy_from_slice(&self.pid.to_le_bytes());
        out[4..8].copy_from_slice(&self.ppid.to_le_bytes());
        out[8..12].copy_from_slice(&(self.alive as u32).to_le_bytes());
        out[12..16].copy_from_slice(&self.thread_count.to_le_bytes());
        out[16..24].copy_from_slice(&self.main_task.to_le_bytes());
        out[24..28].copy_from_slice(&self.argl.to_le_bytes());
        out[28..].copy_from_slice(&self.args);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::RECORD_SIZE {
            return None;
        }
        let u32_at = |at: usize| u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let mut main_task = [0u8; 8];
        main_task.copy_from_slice(&buf[16..24]);
        let mut args = [0u8; PROCINFO_MAX_ARGS_SIZE];
        args.copy_from_slice(&buf[28..Self::RECORD_SIZE]);
        Some(ProcInfo {
            pid: u32_at(0) as i32,
            ppid: u32_at(4) as i32,
            alive: u32_at(8) != 0,
            thread_count: u32_at(12),
            main_task: u64::from_le_bytes(main_task),
            argl: u32_at(24),
            args,
        })
    }
}

/// Cursor over the process table
pub struct ProcInfoStream {
    /// Next slot to look at
    cursor: AtomicUsize,
}

impl ProcInfoStream {
    pub fn new() -> Self {
        ProcInfoStream {
            cursor: AtomicUsize::new(ProcessId::INIT.as_usize()),
        }
    }
}

impl Default for ProcInfoStream {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamOps for ProcInfoStream {
    fn read(&self, g: &mut KernelGuard<'_>, buf: &mut [u8]) -> KResult<usize> {
        if buf.len() < ProcInfo::RECORD_SIZE {
            return Err(KernelError::InvalidArgument);
        }
        let from = ProcessId::new(self.cursor.load(Ordering::Acquire));
        let info = match g.procs.next_occupied(from) {
            Some(p) => ProcInfo::from_process(p),
            None => return Ok(0),
        };
        self.cursor.store(info.pid as usize + 1, Ordering::Release);
        buf[..ProcInfo::RECORD_SIZE].copy_from_slice(&info.to_bytes());
        Ok(ProcInfo::RECORD_SIZE)
    }

    fn write(&self, _g: &mut KernelGuard<'_>, _buf: &[u8]) -> KResult<usize> {
        Err(KernelError::InvalidHandle)
    }

    fn close(&self, _g: &mut KernelGuard<'_>) -> KResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "procinfo"
    }
}

impl Kernel {
    /// Open a process information stream in the calling process
    pub fn open_info(&self) -> KResult<Fid> {
        let mut g = self.lock();
        let (fid, fcb) = fd::reserve_one(&mut g)?;
        g.files.attach(fcb, Arc::new(ProcInfoStream::new()));
        Ok(fid)
    }
}
