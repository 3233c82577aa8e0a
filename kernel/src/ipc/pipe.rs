//! Pipe buffer implementation
//!
//! Pipes provide unidirectional byte streams. A pipe has at most one reader
//! end and one writer end; each end is closed independently and the pipe is
//! freed once both are gone. Socket peers reuse the same engine, two pipes
//! per connection.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::fd::{self, FcbId, Fid, StreamOps};
use crate::error::{KResult, KernelError};
use crate::state::{Kernel, KernelGuard};
use crate::task::condvar::CondVar;

/// Handle of one pipe in the pipe table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PipeId(u64);

/// Pipe buffer - a circular buffer with reader/writer endpoints
pub struct PipeBuffer {
    /// The buffer storage; its length is the capacity
    buffer: Vec<u8>,
    /// Read position in the circular buffer
    read_pos: usize,
    /// Write position in the circular buffer
    write_pos: usize,
    /// Number of bytes currently in the buffer
    len: usize,
    /// Reader endpoint; `None` once closed
    reader: Option<FcbId>,
    /// Writer endpoint; `None` once closed
    writer: Option<FcbId>,
    pub(crate) has_space: Arc<CondVar>,
    pub(crate) has_data: Arc<CondVar>,
}

impl PipeBuffer {
    pub fn new(capacity: usize, reader: FcbId, writer: FcbId) -> Self {
        PipeBuffer {
            buffer: alloc::vec![0; capacity],
            read_pos: 0,
            write_pos: 0,
            len: 0,
            reader: Some(reader),
            writer: Some(writer),
            has_space: CondVar::shared(),
            has_data: CondVar::shared(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Get the number of bytes available to read
    pub fn available(&self) -> usize {
        self.len
    }

    /// Get the space available for writing
    pub fn space(&self) -> usize {
        self.capacity() - self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    pub fn has_reader(&self) -> bool {
        self.reader.is_some()
    }

    pub fn has_writer(&self) -> bool {
        self.writer.is_some()
    }

    /// Move up to `buf.len()` buffered bytes into `buf`
    fn pop_into(&mut self, buf: &mut [u8]) -> usize {
        let to_read = buf.len().min(self.len);
        for byte in buf.iter_mut().take(to_read) {
            *byte = self.buffer[self.read_pos];
            self.read_pos = (self.read_pos + 1) % self.capacity();
        }
        self.len -= to_read;
        to_read
    }

    /// Copy as much of `buf` as fits
    fn push_from(&mut self, buf: &[u8]) -> usize {
        let to_write = buf.len().min(self.space());
        for &byte in buf.iter().take(to_write) {
            self.buffer[self.write_pos] = byte;
            self.write_pos = (self.write_pos + 1) % self.capacity();
        }
        self.len += to_write;
        to_write
    }

    fn both_closed(&self) -> bool {
        self.reader.is_none() && self.writer.is_none()
    }
}

/// All live pipes
pub struct PipeTable {
    pipes: BTreeMap<PipeId, PipeBuffer>,
    next: u64,
}

impl PipeTable {
    pub fn new() -> Self {
        PipeTable {
            pipes: BTreeMap::new(),
            next: 0,
        }
    }

    pub(crate) fn insert(&mut self, pipe: PipeBuffer) -> PipeId {
        let id = PipeId(self.next);
        self.next += 1;
        self.pipes.insert(id, pipe);
        id
    }

    pub fn get(&self, id: PipeId) -> Option<&PipeBuffer> {
        self.pipes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: PipeId) -> Option<&mut PipeBuffer> {
        self.pipes.get_mut(&id)
    }

    pub fn contains(&self, id: PipeId) -> bool {
        self.pipes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }
}

impl Default for PipeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Blocking read from the reader end of `id`
///
/// Sleeps while the pipe is empty and a writer remains. Returns 0 at end of
/// stream.
pub(crate) fn pipe_read(g: &mut KernelGuard<'_>, id: PipeId, buf: &mut [u8]) -> KResult<usize> {
    match g.pipes.get(id) {
        Some(pipe) if pipe.has_reader() => {}
        _ => return Err(KernelError::InvalidHandle),
    }
    if buf.is_empty() {
        return Ok(0);
    }

    loop {
        let pipe = g.pipes.get(id).ok_or(KernelError::InvalidHandle)?;
        if !pipe.has_reader() {
            return Err(KernelError::InvalidHandle);
        }
        if !pipe.is_empty() || !pipe.has_writer() {
            break;
        }
        let (has_space, has_data) = (pipe.has_space.clone(), pipe.has_data.clone());
        g.broadcast(&has_space);
        g.wait(&has_data);
    }

    let pipe = g.pipes.get_mut(id).ok_or(KernelError::InvalidHandle)?;
    let n = pipe.pop_into(buf);
    let has_space = pipe.has_space.clone();
    g.broadcast(&has_space);
    log::trace!("pipe {:?}: read {} bytes", id, n);
    Ok(n)
}

/// Blocking write to the writer end of `id`
///
/// Sleeps while the pipe is full and the reader remains; fails once the
/// reader is gone.
pub(crate) fn pipe_write(g: &mut KernelGuard<'_>, id: PipeId, buf: &[u8]) -> KResult<usize> {
    match g.pipes.get(id) {
        Some(pipe) if pipe.has_reader() && pipe.has_writer() => {}
        Some(_) => return Err(KernelError::PeerClosed),
        None => return Err(KernelError::InvalidHandle),
    }
    if buf.is_empty() {
        return Ok(0);
    }

    loop {
        let pipe = g.pipes.get(id).ok_or(KernelError::PeerClosed)?;
        if !pipe.has_reader() {
            log::debug!("pipe {:?}: reader closed during write", id);
            return Err(KernelError::PeerClosed);
        }
        if !pipe.has_writer() {
            return Err(KernelError::InvalidHandle);
        }
        if !pipe.is_full() {
            break;
        }
        let (has_space, has_data) = (pipe.has_space.clone(), pipe.has_data.clone());
        g.broadcast(&has_data);
        g.wait(&has_space);
    }

    let pipe = g.pipes.get_mut(id).ok_or(KernelError::PeerClosed)?;
    let n = pipe.push_from(buf);
    let has_data = pipe.has_data.clone();
    g.broadcast(&has_data);
    log::trace!("pipe {:?}: wrote {} bytes", id, n);
    Ok(n)
}

/// Close the reader end; idempotent
pub(crate) fn close_reader(g: &mut KernelGuard<'_>, id: PipeId) {
    let Some(pipe) = g.pipes.get_mut(id) else {
        return;
    };
    pipe.reader = None;
    if pipe.both_closed() {
        g.pipes.pipes.remove(&id);
        log::trace!("pipe {:?}: freed", id);
    } else {
        let has_space = pipe.has_space.clone();
        g.broadcast(&has_space);
    }
}

/// Close the writer end; idempotent
pub(crate) fn close_writer(g: &mut KernelGuard<'_>, id: PipeId) {
    let Some(pipe) = g.pipes.get_mut(id) else {
        return;
    };
    pipe.writer = None;
    if pipe.both_closed() {
        g.pipes.pipes.remove(&id);
        log::trace!("pipe {:?}: freed", id);
    } else {
        let has_data = pipe.has_data.clone();
        g.broadcast(&has_data);
    }
}

/// Read end of a pipe as a stream
pub struct PipeReader(pub PipeId);

/// Write end of a pipe as a stream
pub struct PipeWriter(pub PipeId);

impl StreamOps for PipeReader {
    fn read(&self, g: &mut KernelGuard<'_>, buf: &mut [u8]) -> KResult<usize> {
        pipe_read(g, self.0, buf)
    }

    fn write(&self, _g: &mut KernelGuard<'_>, _buf: &[u8]) -> KResult<usize> {
        Err(KernelError::InvalidHandle)
    }

    fn close(&self, g: &mut KernelGuard<'_>) -> KResult<()> {
        close_reader(g, self.0);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pipe-reader"
    }
}

impl StreamOps for PipeWriter {
    fn read(&self, _g: &mut KernelGuard<'_>, _buf: &mut [u8]) -> KResult<usize> {
        Err(KernelError::InvalidHandle)
    }

    fn write(&self, g: &mut KernelGuard<'_>, buf: &[u8]) -> KResult<usize> {
        pipe_write(g, self.0, buf)
    }

    fn close(&self, g: &mut KernelGuard<'_>) -> KResult<()> {
        close_writer(g, self.0);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "pipe-writer"
    }
}

/// Descriptors of a freshly created pipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeFds {
    pub read: Fid,
    pub write: Fid,
}

impl Default for PipeFds {
    fn default() -> Self {
        PipeFds {
            read: fd::NOFILE,
            write: fd::NOFILE,
        }
    }
}

impl Kernel {
    /// Create a pipe in the calling process
    pub fn pipe(&self) -> KResult<PipeFds> {
        let mut g = self.lock();
        let reserved = fd::reserve(&mut g, 2)?;
        let (read, reader) = reserved[0];
        let (write, writer) = reserved[1];

        let capacity = g.config().pipe_buffer_size;
        let id = g.pipes.insert(PipeBuffer::new(capacity, reader, writer));
        g.files.attach(reader, Arc::new(PipeReader(id)));
        g.files.attach(writer, Arc::new(PipeWriter(id)));

        log::debug!("pipe {:?}: read fid {}, write fid {}", id, read, write);
        Ok(PipeFds { read, write })
    }
}
