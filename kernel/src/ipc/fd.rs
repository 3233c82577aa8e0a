//! File descriptors and stream dispatch
//!
//! Two tables cooperate:
//! - [`FileTable`] - system-wide file control blocks (FCBs). Each FCB holds a
//!   reference count and the stream object behind it.
//! - [`FidTable`] - per-process array mapping small integers (fids) to FCBs.
//!   Child processes start with a copy of the parent's array and one extra
//!   reference on every FCB in it, so streams are shared, not duplicated.
//!
//! When an FCB's count reaches zero its stream's `close` runs under the
//! kernel lock.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use crate::error::{KResult, KernelError};
use crate::socket::SocketId;
use crate::state::{Kernel, KernelGuard};

/// Syscall-level descriptor
pub type Fid = i32;

/// The "no such descriptor" sentinel
pub const NOFILE: Fid = -1;

/// Handle of one file control block
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FcbId(u64);

impl FcbId {
    #[cfg(test)]
    pub(crate) fn test_id(n: u64) -> Self {
        FcbId(n)
    }
}

/// Operations every stream object provides
///
/// All calls run with the kernel lock held; blocking implementations sleep
/// through the guard.
pub trait StreamOps: Send + Sync {
    fn read(&self, g: &mut KernelGuard<'_>, buf: &mut [u8]) -> KResult<usize>;

    fn write(&self, g: &mut KernelGuard<'_>, buf: &[u8]) -> KResult<usize>;

    /// Release the stream; runs once, when the last descriptor goes away
    fn close(&self, g: &mut KernelGuard<'_>) -> KResult<()>;

    /// Socket behind this stream, if it is one
    fn as_socket(&self) -> Option<SocketId> {
        None
    }

    /// Short type name for logs
    fn name(&self) -> &'static str;
}

/// A file control block
pub struct FileControlBlock {
    refcount: usize,
    /// `None` between reservation and attachment
    stream: Option<Arc<dyn StreamOps>>,
}

impl fmt::Debug for FileControlBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileControlBlock")
            .field("refcount", &self.refcount)
            .field("stream", &self.stream.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// System-wide FCB table
pub struct FileTable {
    fcbs: BTreeMap<FcbId, FileControlBlock>,
    next: u64,
    capacity: usize,
}

impl FileTable {
    pub fn new(capacity: usize) -> Self {
        FileTable {
            fcbs: BTreeMap::new(),
            next: 0,
            capacity,
        }
    }

    /// FCBs that can still be allocated
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.fcbs.len())
    }

    pub fn len(&self) -> usize {
        self.fcbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fcbs.is_empty()
    }

    /// Allocate an FCB with one reference and no stream yet
    fn allocate(&mut self) -> FcbId {
        let id = FcbId(self.next);
        self.next += 1;
        self.fcbs.insert(
            id,
            FileControlBlock {
                refcount: 1,
                stream: None,
            },
        );
        id
    }

    pub fn attach(&mut self, fcb: FcbId, stream: Arc<dyn StreamOps>) {
        if let Some(entry) = self.fcbs.get_mut(&fcb) {
            entry.stream = Some(stream);
        }
    }

    pub fn stream(&self, fcb: FcbId) -> Option<Arc<dyn StreamOps>> {
        self.fcbs.get(&fcb)?.stream.clone()
    }

    pub fn refcount(&self, fcb: FcbId) -> usize {
        self.fcbs.get(&fcb).map_or(0, |e| e.refcount)
    }

    pub fn incref(&mut self, fcb: FcbId) {
        if let Some(entry) = self.fcbs.get_mut(&fcb) {
            entry.refcount += 1;
        }
    }

    /// Drop one reference; returns the stream to close if it was the last
    fn decref(&mut self, fcb: FcbId) -> Option<Arc<dyn StreamOps>> {
        let entry = self.fcbs.get_mut(&fcb)?;
        entry.refcount -= 1;
        if entry.refcount > 0 {
            return None;
        }
        self.fcbs.remove(&fcb).and_then(|e| e.stream)
    }
}

/// Per-process descriptor table
#[derive(Debug, Clone)]
pub struct FidTable {
    slots: Vec<Option<FcbId>>,
}

impl FidTable {
    pub fn new(size: usize) -> Self {
        FidTable {
            slots: alloc::vec![None; size],
        }
    }

    fn index(&self, fid: Fid) -> Option<usize> {
        usize::try_from(fid).ok().filter(|&i| i < self.slots.len())
    }

    pub fn get(&self, fid: Fid) -> Option<FcbId> {
        self.slots[self.index(fid)?]
    }

    /// The `n` lowest free fids, or `None` if there are fewer than `n`
    pub fn free_slots(&self, n: usize) -> Option<Vec<Fid>> {
        let free: Vec<Fid> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i as Fid)
            .take(n)
            .collect();
        (free.len() == n).then_some(free)
    }

    fn install(&mut self, fid: Fid, fcb: FcbId) {
        if let Some(i) = self.index(fid) {
            self.slots[i] = Some(fcb);
        }
    }

    /// Clear a slot, returning what it held
    pub fn take(&mut self, fid: Fid) -> Option<FcbId> {
        let i = self.index(fid)?;
        self.slots[i].take()
    }

    /// Clear every slot
    pub fn drain(&mut self) -> Vec<FcbId> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }

    pub fn open_fcbs(&self) -> impl Iterator<Item = FcbId> + '_ {
        self.slots.iter().flatten().copied()
    }

    pub fn open_count(&self) -> usize {
        self.open_fcbs().count()
    }
}

/// Reserve `n` descriptors in the calling process, each with a fresh FCB
///
/// Either all `n` are reserved or nothing changes.
pub(crate) fn reserve(g: &mut KernelGuard<'_>, n: usize) -> KResult<Vec<(Fid, FcbId)>> {
    let pid = g.require_current_pid()?;
    let fids = match g.procs.expect_mut(pid).fidt.free_slots(n) {
        Some(fids) => fids,
        None => {
            log::debug!("fd: process {} has no {} free descriptors", pid, n);
            return Err(KernelError::ResourceExhausted);
        }
    };
    if g.files.available() < n {
        log::warn!("fd: file table full");
        return Err(KernelError::ResourceExhausted);
    }

    let mut reserved = Vec::with_capacity(n);
    for fid in fids {
        let fcb = g.files.allocate();
        g.procs.expect_mut(pid).fidt.install(fid, fcb);
        reserved.push((fid, fcb));
    }
    Ok(reserved)
}

pub(crate) fn reserve_one(g: &mut KernelGuard<'_>) -> KResult<(Fid, FcbId)> {
    let mut reserved = reserve(g, 1)?;
    reserved.pop().ok_or(KernelError::ResourceExhausted)
}

/// FCB and stream behind `fid` in the calling process
pub(crate) fn lookup(g: &KernelGuard<'_>, fid: Fid) -> KResult<(FcbId, Arc<dyn StreamOps>)> {
    let pid = g.require_current_pid()?;
    let fcb = g
        .procs
        .get(pid)
        .and_then(|p| p.fidt.get(fid))
        .ok_or(KernelError::InvalidHandle)?;
    let stream = g.files.stream(fcb).ok_or(KernelError::InvalidHandle)?;
    Ok((fcb, stream))
}

/// Drop one FCB reference, closing the stream on the last one
pub(crate) fn release(g: &mut KernelGuard<'_>, fcb: FcbId) {
    if let Some(stream) = g.files.decref(fcb) {
        log::trace!("fd: closing {} stream", stream.name());
        if let Err(e) = stream.close(g) {
            log::warn!("fd: closing {} stream failed: {}", stream.name(), e);
        }
    }
}

impl Kernel {
    /// Read up to `buf.len()` bytes from `fid`
    pub fn read(&self, fid: Fid, buf: &mut [u8]) -> KResult<usize> {
        let mut g = self.lock();
        let (fcb, stream) = lookup(&g, fid)?;
        // Hold the FCB across a blocking read so a concurrent close cannot
        // free the stream under us.
        g.files.incref(fcb);
        let result = stream.read(&mut g, buf);
        release(&mut g, fcb);
        result
    }

    /// Write up to `buf.len()` bytes to `fid`
    pub fn write(&self, fid: Fid, buf: &[u8]) -> KResult<usize> {
        let mut g = self.lock();
        let (fcb, stream) = lookup(&g, fid)?;
        g.files.incref(fcb);
        let result = stream.write(&mut g, buf);
        release(&mut g, fcb);
        result
    }

    /// Close `fid` in the calling process
    pub fn close(&self, fid: Fid) -> KResult<()> {
        let mut g = self.lock();
        let pid = g.require_current_pid()?;
        let fcb = g
            .procs
            .expect_mut(pid)
            .fidt
            .take(fid)
            .ok_or(KernelError::InvalidHandle)?;
        release(&mut g, fcb);
        Ok(())
    }
}
