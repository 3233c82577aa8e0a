//! The kernel instance and its single lock
//!
//! # Lock discipline
//!
//! All process, thread, descriptor, pipe, socket and port state lives in one
//! [`KernelState`] behind one `spin::Mutex`. Every operation in this crate
//! takes the lock through [`Kernel::lock`], works on the state, and releases
//! it on return. The only places the lock is dropped mid-operation are
//! [`KernelGuard::wait`] and [`KernelGuard::timed_wait`], which:
//!
//! 1. queue the calling context on the condition variable (lock held)
//! 2. release the lock and block in the scheduler
//! 3. re-take the lock before returning
//!
//! so no operation ever observes another one half-done. Condition variables
//! only have their own tiny lock for the waiter list, always taken inside the
//! kernel lock or with no other lock held.

use alloc::sync::Arc;
use core::ops::{Deref, DerefMut};
use spin::{Mutex, MutexGuard};

use crate::config::KernelConfig;
use crate::error::{KResult, KernelError};
use crate::ipc::fd::FileTable;
use crate::ipc::pipe::PipeTable;
use crate::process::manager::ProcessTable;
use crate::process::{ProcessId, ProcessState};
use crate::socket::{PortTable, RequestTable, SocketTable};
use crate::task::condvar::CondVar;
use crate::task::scheduler::{Scheduler, WakeReason};
use crate::task::thread::{ThreadId, ThreadTable};

/// Everything protected by the kernel lock
pub struct KernelState {
    config: KernelConfig,
    pub(crate) procs: ProcessTable,
    pub(crate) threads: ThreadTable,
    pub(crate) files: FileTable,
    pub(crate) pipes: PipeTable,
    pub(crate) sockets: SocketTable,
    pub(crate) ports: PortTable,
    pub(crate) requests: RequestTable,
}

impl KernelState {
    fn new(config: KernelConfig) -> Self {
        KernelState {
            procs: ProcessTable::new(config.max_proc),
            threads: ThreadTable::new(),
            files: FileTable::new(config.max_files),
            pipes: PipeTable::new(),
            sockets: SocketTable::new(),
            ports: PortTable::new(config.max_port),
            requests: RequestTable::new(),
            config,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }
}

struct KernelInner {
    sched: Arc<dyn Scheduler>,
    state: Mutex<KernelState>,
    /// Broadcast when init becomes a zombie
    halt: Arc<CondVar>,
}

/// Handle to one kernel instance
///
/// Cloning is cheap; every task receives a reference to the kernel it runs
/// on and makes its system calls through it.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

impl Kernel {
    /// Create an empty kernel on top of `sched`
    ///
    /// No process exists yet; [`Kernel::start`] creates idle and init.
    pub fn new(sched: Arc<dyn Scheduler>, config: KernelConfig) -> KResult<Kernel> {
        config.validate()?;
        log::info!(
            "kernel: max_proc={} max_fileid={} max_files={} pipe_buffer_size={} max_port={}",
            config.max_proc,
            config.max_fileid,
            config.max_files,
            config.pipe_buffer_size,
            config.max_port
        );
        Ok(Kernel {
            inner: Arc::new(KernelInner {
                sched,
                state: Mutex::new(KernelState::new(config)),
                halt: CondVar::shared(),
            }),
        })
    }

    /// Take the kernel lock
    pub fn lock(&self) -> KernelGuard<'_> {
        KernelGuard {
            kernel: self,
            guard: Some(self.inner.state.lock()),
        }
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.inner.sched
    }

    /// Copy of the configuration the kernel was built with
    pub fn config(&self) -> KernelConfig {
        self.lock().config().clone()
    }

    pub(crate) fn halt_cv(&self) -> &Arc<CondVar> {
        &self.inner.halt
    }

    /// State of a process table slot
    pub fn process_state(&self, pid: ProcessId) -> ProcessState {
        self.lock().procs.state_of(pid)
    }

    /// Number of occupied process slots (alive or zombie)
    pub fn process_count(&self) -> usize {
        self.lock().procs.len()
    }

    /// Sleep once on the halt condition
    ///
    /// Returns init's exit status once init is a zombie. `None` means the
    /// caller was woken for another reason (a host-side panic report, for
    /// instance) and should look around before calling again.
    pub fn wait_for_halt(&self) -> Option<i32> {
        let mut g = self.lock();
        if let Some(code) = g.procs.init_exit_status() {
            return Some(code);
        }
        let halt = self.inner.halt.clone();
        g.wait(&halt);
        g.procs.init_exit_status()
    }
}

/// The kernel lock, held
///
/// Dereferences to [`KernelState`]. Blocking helpers release and re-take the
/// lock internally; see the module documentation.
pub struct KernelGuard<'k> {
    kernel: &'k Kernel,
    /// `None` only while a wait has the lock released
    guard: Option<MutexGuard<'k, KernelState>>,
}

impl<'k> KernelGuard<'k> {
    pub fn kernel(&self) -> &'k Kernel {
        self.kernel
    }

    pub fn sched(&self) -> &'k dyn Scheduler {
        &*self.kernel.inner.sched
    }

    pub fn now_ms(&self) -> u64 {
        self.sched().now_ms()
    }

    /// Sleep on `cv` until signalled
    ///
    /// Wakeups may be spurious; callers loop on their predicate.
    pub fn wait(&mut self, cv: &Arc<CondVar>) {
        self.sleep_on(cv, None);
    }

    /// Sleep on `cv` until signalled or until the absolute `deadline` (ms)
    pub fn timed_wait(&mut self, cv: &Arc<CondVar>, deadline: u64) -> WakeReason {
        self.sleep_on(cv, Some(deadline))
    }

    fn sleep_on(&mut self, cv: &Arc<CondVar>, deadline: Option<u64>) -> WakeReason {
        let sched = self.sched();
        let ctx = match sched.current() {
            Some(ctx) => ctx,
            None => panic!("kernel: blocking wait outside a scheduler context"),
        };

        cv.enqueue(ctx);
        self.guard = None;
        let reason = sched.block(deadline);
        self.guard = Some(self.kernel.inner.state.lock());
        cv.remove(ctx);
        reason
    }

    /// Wake the oldest waiter on `cv`
    pub fn signal(&self, cv: &CondVar) {
        cv.signal(self.sched());
    }

    /// Wake every waiter on `cv`
    pub fn broadcast(&self, cv: &CondVar) {
        cv.broadcast(self.sched());
    }

    /// Thread record of the calling context
    pub fn current_thread(&self) -> Option<ThreadId> {
        let ctx = self.sched().current()?;
        self.threads.by_context(ctx)
    }

    /// Process of the calling context
    pub fn current_pid(&self) -> Option<ProcessId> {
        let tid = self.current_thread()?;
        self.threads.get(tid).map(|t| t.owner)
    }

    /// Process of the calling context, or `InvalidState` outside a kernel thread
    pub fn require_current_pid(&self) -> KResult<ProcessId> {
        self.current_pid().ok_or_else(|| {
            log::debug!("kernel: call made outside any process");
            KernelError::InvalidState
        })
    }
}

impl Deref for KernelGuard<'_> {
    type Target = KernelState;

    fn deref(&self) -> &KernelState {
        match &self.guard {
            Some(guard) => &**guard,
            None => unreachable!("kernel lock used while released for a wait"),
        }
    }
}

impl DerefMut for KernelGuard<'_> {
    fn deref_mut(&mut self) -> &mut KernelState {
        match &mut self.guard {
            Some(guard) => &mut **guard,
            None => unreachable!("kernel lock used while released for a wait"),
        }
    }
}
