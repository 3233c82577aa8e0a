//! Std-thread backed scheduler for running the kernel core on a host
//!
//! Every scheduler context is an OS thread parked on its own permit:
//!
//! ```text
//!   spawn ──> thread started, parked until the first wake
//!   wake  ──> permit = true, notify
//!   block ──> wait until permit (or deadline), consume it
//!   exit_current ──> unwind to the bottom of the context's thread
//! ```
//!
//! The calling OS thread can be adopted as a context so it can block on
//! kernel condition variables; [`boot`] does this for the boot context and
//! then sleeps until init becomes a zombie. A panic inside a kernel thread
//! is handed back to the boot context and re-raised there.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::any::Any;
use core::cell::Cell;
use core::sync::atomic::{AtomicU64, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use super::scheduler::{ContextEntry, SchedTid, Scheduler, SpawnError, WakeReason};
use crate::config::KernelConfig;
use crate::process::Task;
use crate::state::Kernel;

std::thread_local! {
    /// (scheduler identity, context id) of the calling OS thread
    static CURRENT: Cell<Option<(usize, SchedTid)>> = const { Cell::new(None) };
}

/// Unwind payload used by `exit_current`
struct ContextExit;

/// Wake permit of one context
struct HostContext {
    permit: Mutex<bool>,
    cv: Condvar,
}

impl HostContext {
    fn new() -> Self {
        HostContext {
            permit: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn permit(&self) -> MutexGuard<'_, bool> {
        self.permit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake(&self) {
        *self.permit() = true;
        self.cv.notify_one();
    }

    /// Consume the permit, sleeping until one arrives or `deadline` passes
    fn park(&self, epoch: Instant, deadline: Option<u64>) -> WakeReason {
        let mut permit = self.permit();
        loop {
            if *permit {
                *permit = false;
                return WakeReason::Woken;
            }
            permit = match deadline {
                None => self.cv.wait(permit).unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = elapsed_ms(epoch);
                    if now >= deadline {
                        return WakeReason::TimedOut;
                    }
                    let timeout = Duration::from_millis(deadline - now);
                    match self.cv.wait_timeout(permit, timeout) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
            };
        }
    }
}

fn elapsed_ms(epoch: Instant) -> u64 {
    epoch.elapsed().as_millis() as u64
}

struct Shared {
    contexts: spin::Mutex<BTreeMap<SchedTid, Arc<HostContext>>>,
    next: AtomicU64,
    epoch: Instant,
    /// First panic raised by a kernel thread
    panic: Mutex<Option<Box<dyn Any + Send>>>,
    /// Context woken when a kernel thread panics
    boot: spin::Mutex<Option<SchedTid>>,
}

impl Shared {
    fn context(&self, ctx: SchedTid) -> Option<Arc<HostContext>> {
        self.contexts.lock().get(&ctx).cloned()
    }

    fn report_panic(&self, payload: Box<dyn Any + Send>) {
        {
            let mut slot = self.panic.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(payload);
            }
        }
        let boot = *self.boot.lock();
        if let Some(ctx) = boot.and_then(|b| self.context(b)) {
            ctx.wake();
        }
    }
}

/// Scheduler running each context on its own OS thread
pub struct HostScheduler {
    shared: Arc<Shared>,
}

impl HostScheduler {
    pub fn new() -> Self {
        HostScheduler {
            shared: Arc::new(Shared {
                contexts: spin::Mutex::new(BTreeMap::new()),
                next: AtomicU64::new(1),
                epoch: Instant::now(),
                panic: Mutex::new(None),
                boot: spin::Mutex::new(None),
            }),
        }
    }

    /// Identity distinguishing this scheduler's contexts from another's
    fn key(&self) -> usize {
        Arc::as_ptr(&self.shared) as usize
    }

    fn register(&self) -> (SchedTid, Arc<HostContext>) {
        let id = self.shared.next.fetch_add(1, Ordering::SeqCst);
        let ctx = Arc::new(HostContext::new());
        self.shared.contexts.lock().insert(id, ctx.clone());
        (id, ctx)
    }

    /// Make the calling OS thread a context of this scheduler
    ///
    /// The first adopted thread also receives panic reports.
    pub fn adopt_current(&self) -> SchedTid {
        let (id, _) = self.register();
        let key = self.key();
        CURRENT.with(|c| c.set(Some((key, id))));
        self.shared.boot.lock().get_or_insert(id);
        id
    }

    /// Panic raised by a kernel thread, if any
    pub fn take_panic(&self) -> Option<Box<dyn Any + Send>> {
        self.shared
            .panic
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Contexts that have not finished yet, adopted ones included
    pub fn live_contexts(&self) -> usize {
        self.shared.contexts.lock().len()
    }
}

impl Default for HostScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for HostScheduler {
    fn spawn(&self, entry: ContextEntry) -> Result<SchedTid, SpawnError> {
        let (id, ctx) = self.register();
        let shared = self.shared.clone();
        let key = self.key();

        let spawned = thread::Builder::new()
            .name(std::format!("kctx-{}", id))
            .spawn(move || {
                CURRENT.with(|c| c.set(Some((key, id))));
                ctx.park(shared.epoch, None);
                let outcome = panic::catch_unwind(AssertUnwindSafe(entry));
                shared.contexts.lock().remove(&id);
                if let Err(payload) = outcome {
                    if !payload.is::<ContextExit>() {
                        shared.report_panic(payload);
                    }
                }
            });

        match spawned {
            Ok(_) => Ok(id),
            Err(e) => {
                self.shared.contexts.lock().remove(&id);
                log::error!("host: cannot start OS thread for context {}: {}", id, e);
                Err(SpawnError)
            }
        }
    }

    fn wake(&self, ctx: SchedTid) {
        if let Some(context) = self.shared.context(ctx) {
            context.wake();
        }
    }

    fn block(&self, deadline: Option<u64>) -> WakeReason {
        let context = match self.current().and_then(|id| self.shared.context(id)) {
            Some(context) => context,
            None => panic!("host: block called outside a scheduler context"),
        };
        context.park(self.shared.epoch, deadline)
    }

    fn current(&self) -> Option<SchedTid> {
        let key = self.key();
        CURRENT
            .with(|c| c.get())
            .filter(|&(owner, _)| owner == key)
            .map(|(_, id)| id)
    }

    fn now_ms(&self) -> u64 {
        elapsed_ms(self.shared.epoch)
    }

    fn exit_current(&self) -> ! {
        panic::resume_unwind(Box::new(ContextExit))
    }
}

/// Boot a kernel with the default configuration and run `init` to completion
///
/// Returns init's exit status. A panic in any kernel thread is re-raised on
/// the calling thread.
pub fn boot(init: Task, args: &[u8]) -> i32 {
    boot_with(KernelConfig::default(), init, args)
}

/// Like [`boot`] with explicit table sizes
pub fn boot_with(config: KernelConfig, init: Task, args: &[u8]) -> i32 {
    crate::logger::init();

    let sched = Arc::new(HostScheduler::new());
    sched.adopt_current();
    let kernel = match Kernel::new(sched.clone(), config) {
        Ok(kernel) => kernel,
        Err(e) => panic!("boot: unusable kernel configuration: {}", e),
    };
    if let Err(e) = kernel.start(init, args) {
        panic!("boot: cannot start init: {}", e);
    }

    loop {
        if let Some(payload) = sched.take_panic() {
            panic::resume_unwind(payload);
        }
        if let Some(status) = kernel.wait_for_halt() {
            log::info!("boot: init exited with {}", status);
            return status;
        }
    }
}
