//! Process record and lifecycle state

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::ipc::fd::FidTable;
use crate::state::Kernel;
use crate::task::condvar::CondVar;
use crate::task::thread::ThreadId;

/// Entry point of a process or thread
///
/// The task receives the kernel it runs on and its private copy of the
/// argument bytes; the return value becomes the thread's exit value.
pub type Task = fn(&Kernel, &[u8]) -> i32;

/// Syscall-level process identity; `NOPROC` means "none"
pub type Pid = i32;

/// The "no such process" sentinel
pub const NOPROC: Pid = -1;

/// Process ID type (index into the process table)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(usize);

impl ProcessId {
    /// The idle process, created first with no task
    pub const IDLE: ProcessId = ProcessId(0);
    /// The init process, parent of last resort
    pub const INIT: ProcessId = ProcessId(1);

    pub const fn new(id: usize) -> Self {
        ProcessId(id)
    }

    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Syscall representation
    pub fn as_pid(self) -> Pid {
        self.0 as Pid
    }

    /// Parse a syscall pid; negative values have no process
    pub fn from_pid(pid: Pid) -> Option<Self> {
        usize::try_from(pid).ok().map(ProcessId)
    }

    pub fn is_init(self) -> bool {
        self == Self::INIT
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a process table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Slot is in the free pool
    Free,
    /// At least one thread may still run
    Alive,
    /// Every thread has exited; waiting for the parent to reap it
    Zombie,
}

/// One process table entry
pub struct Process {
    pub id: ProcessId,
    pub state: ProcessState,

    /// `None` for idle, init, and processes created outside any process
    pub parent: Option<ProcessId>,
    /// Live and zombie children, newest first
    pub children: VecDeque<ProcessId>,
    /// Zombie children not yet reaped, in the order they exited
    pub exited: VecDeque<ProcessId>,

    /// Threads that have not yet called `thread_exit`
    pub thread_count: usize,
    pub main_task: Option<Task>,
    /// Private copy of the exec arguments; dropped at teardown
    pub args: Option<Arc<[u8]>>,
    /// Argument length as passed to exec, kept after the bytes are released
    pub arg_len: usize,
    pub exit_value: i32,

    pub fidt: FidTable,
    /// Thread records owned by this process, oldest first
    pub threads: Vec<ThreadId>,
    /// Broadcast whenever a child becomes a zombie
    pub child_exit: Arc<CondVar>,
}

impl Process {
    pub fn new(id: ProcessId, max_fileid: usize) -> Self {
        Process {
            id,
            state: ProcessState::Alive,
            parent: None,
            children: VecDeque::new(),
            exited: VecDeque::new(),
            thread_count: 0,
            main_task: None,
            args: None,
            arg_len: 0,
            exit_value: 0,
            fidt: FidTable::new(max_fileid),
            threads: Vec::new(),
            child_exit: CondVar::shared(),
        }
    }

    pub fn is_zombie(&self) -> bool {
        self.state == ProcessState::Zombie
    }

    pub fn add_child(&mut self, child: ProcessId) {
        self.children.push_front(child);
    }

    /// Forget `child` in both the children and exited lists
    pub fn unlink_child(&mut self, child: ProcessId) {
        self.children.retain(|&c| c != child);
        self.exited.retain(|&c| c != child);
    }

    /// Identity of the main task, used by process info
    pub fn task_identity(&self) -> usize {
        self.main_task.map_or(0, |task| task as usize)
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("exited", &self.exited)
            .field("thread_count", &self.thread_count)
            .finish()
    }
}
