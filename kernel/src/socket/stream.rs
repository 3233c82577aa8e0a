//! Listener/peer handshake and socket streams
//!
//! ```text
//!   connect                          accept
//!   ───────                          ──────
//!   queue request on listener ──┐
//!   signal req_available        └──> pop oldest request
//!   sleep on connected_cv            new peer socket on the listener's port
//!        (bounded by timeout)        two pipes, one per direction
//!                              <──── admitted = true, signal connected_cv
//!   withdraw request, return
//! ```
//!
//! Accept and connect pin the sockets they sleep on with `refcount`; a socket
//! closed while pinned is only marked closed, and the last unpin frees it.

use alloc::sync::Arc;

use super::types::{ConnectionRequest, ListenerState, PeerState, Port, ShutdownMode, SocketCb, SocketKind};
use super::{RequestId, SocketId};
use crate::config::NOPORT;
use crate::error::{KResult, KernelError};
use crate::ipc::fd::{self, FcbId, Fid, StreamOps};
use crate::ipc::pipe::{self, PipeBuffer};
use crate::state::{Kernel, KernelGuard};
use crate::task::condvar::CondVar;
use crate::task::scheduler::WakeReason;

/// A socket as seen through a descriptor
pub struct SocketStream(pub SocketId);

impl StreamOps for SocketStream {
    fn read(&self, g: &mut KernelGuard<'_>, buf: &mut [u8]) -> KResult<usize> {
        match peer_state(g, self.0)?.read_pipe {
            Some(pipe) => pipe::pipe_read(g, pipe, buf),
            None => Err(KernelError::InvalidState),
        }
    }

    fn write(&self, g: &mut KernelGuard<'_>, buf: &[u8]) -> KResult<usize> {
        match peer_state(g, self.0)?.write_pipe {
            Some(pipe) => pipe::pipe_write(g, pipe, buf),
            None => Err(KernelError::InvalidState),
        }
    }

    fn close(&self, g: &mut KernelGuard<'_>) -> KResult<()> {
        close_socket(g, self.0);
        Ok(())
    }

    fn as_socket(&self) -> Option<SocketId> {
        Some(self.0)
    }

    fn name(&self) -> &'static str {
        "socket"
    }
}

fn peer_state(g: &KernelGuard<'_>, id: SocketId) -> KResult<PeerState> {
    match g.sockets.get(id).map(|s| &s.kind) {
        Some(SocketKind::Peer(peer)) => Ok(*peer),
        Some(_) => Err(KernelError::InvalidState),
        None => Err(KernelError::InvalidHandle),
    }
}

/// Socket behind `fid` in the calling process
fn socket_of(g: &KernelGuard<'_>, fid: Fid) -> KResult<SocketId> {
    let (_, stream) = fd::lookup(g, fid)?;
    stream.as_socket().ok_or(KernelError::InvalidHandle)
}

/// Last descriptor of the socket went away
fn close_socket(g: &mut KernelGuard<'_>, id: SocketId) {
    let Some(socket) = g.sockets.get_mut(id) else {
        return;
    };
    socket.fcb = None;
    let port = socket.port;

    match &mut socket.kind {
        SocketKind::Unbound => {}
        SocketKind::Listener(listener) => {
            let req_available = listener.req_available.clone();
            let pending = core::mem::take(&mut listener.queue);
            g.ports.vacate(port, id);
            // Wake accept and connect calls so they see the port is gone.
            g.broadcast(&req_available);
            for request in pending {
                if let Some(connected_cv) = g.requests.get(request).map(|r| r.connected_cv.clone()) {
                    g.signal(&connected_cv);
                }
            }
            log::debug!("socket {:?}: listener on port {} closed", id, port);
        }
        SocketKind::Peer(peer) => {
            let (read_pipe, write_pipe) = (peer.read_pipe.take(), peer.write_pipe.take());
            if let Some(p) = read_pipe {
                pipe::close_reader(g, p);
            }
            if let Some(p) = write_pipe {
                pipe::close_writer(g, p);
            }
        }
    }

    if g.sockets.get(id).map_or(false, |s| s.refcount == 0) {
        g.sockets.remove(id);
    }
}

fn pin(g: &mut KernelGuard<'_>, id: SocketId) {
    if let Some(socket) = g.sockets.get_mut(id) {
        socket.refcount += 1;
    }
}

/// Drop a pin; frees the socket if it was closed in the meantime
fn unpin(g: &mut KernelGuard<'_>, id: SocketId) {
    let Some(socket) = g.sockets.get_mut(id) else {
        return;
    };
    socket.refcount -= 1;
    if socket.refcount == 0 && socket.is_closed() {
        g.sockets.remove(id);
        log::trace!("socket {:?}: freed after last pin", id);
    }
}

fn listener_mut<'a>(g: &'a mut KernelGuard<'_>, id: SocketId) -> Option<&'a mut ListenerState> {
    match g.sockets.get_mut(id).map(|s| &mut s.kind) {
        Some(SocketKind::Listener(listener)) => Some(listener),
        _ => None,
    }
}

/// Requester is still open and unbound
fn requester_ready(g: &KernelGuard<'_>, request: RequestId) -> bool {
    g.requests
        .get(request)
        .and_then(|r| g.sockets.get(r.peer))
        .map_or(false, |s| !s.is_closed() && s.kind.is_unbound())
}

fn accept_pinned(g: &mut KernelGuard<'_>, id: SocketId, port: Port, req_available: &Arc<CondVar>) -> KResult<Fid> {
    loop {
        if g.ports.get(port) != Some(id) {
            log::debug!("accept: listener {:?} left port {}", id, port);
            return Err(KernelError::InvalidState);
        }

        let next = listener_mut(g, id).and_then(|l| l.queue.pop_front());
        let Some(request) = next else {
            g.wait(req_available);
            continue;
        };
        if !requester_ready(g, request) {
            log::debug!("accept: dropping stale request {:?}", request);
            continue;
        }

        let (fid, fcb) = match fd::reserve_one(g) {
            Ok(reserved) => reserved,
            Err(e) => {
                if let Some(listener) = listener_mut(g, id) {
                    listener.queue.push_front(request);
                }
                return Err(e);
            }
        };

        let accepted = g.sockets.insert(SocketCb::new(port, fcb));
        g.files.attach(fcb, Arc::new(SocketStream(accepted)));
        connect_peers(g, accepted, request);
        log::debug!("accept: port {} connected, fid {}", port, fid);
        return Ok(fid);
    }
}

fn endpoint(g: &KernelGuard<'_>, id: SocketId) -> FcbId {
    match g.sockets.get(id).and_then(|s| s.fcb) {
        Some(fcb) => fcb,
        None => panic!("accept: socket {:?} has no descriptor", id),
    }
}

fn is_admitted(g: &KernelGuard<'_>, request: RequestId) -> bool {
    g.requests.get(request).map_or(false, |r| r.admitted)
}

/// Join the accepted socket and the requester with two pipes
fn connect_peers(g: &mut KernelGuard<'_>, accepted: SocketId, request: RequestId) {
    let (requester, connected_cv) = match g.requests.get_mut(request) {
        Some(r) => {
            r.admitted = true;
            (r.peer, r.connected_cv.clone())
        }
        None => panic!("accept: request {:?} vanished while admitted", request),
    };
    let accepted_fcb = endpoint(g, accepted);
    let requester_fcb = endpoint(g, requester);

    let capacity = g.config().pipe_buffer_size;
    let to_accepted = g.pipes.insert(PipeBuffer::new(capacity, accepted_fcb, requester_fcb));
    let to_requester = g.pipes.insert(PipeBuffer::new(capacity, requester_fcb, accepted_fcb));

    if let Some(s) = g.sockets.get_mut(accepted) {
        s.kind = SocketKind::Peer(PeerState {
            read_pipe: Some(to_accepted),
            write_pipe: Some(to_requester),
        });
    }
    if let Some(s) = g.sockets.get_mut(requester) {
        s.kind = SocketKind::Peer(PeerState {
            read_pipe: Some(to_requester),
            write_pipe: Some(to_accepted),
        });
    }
    g.signal(&connected_cv);
}

impl Kernel {
    /// Create an unbound socket on `port`
    pub fn socket(&self, port: Port) -> KResult<Fid> {
        let mut g = self.lock();
        if !g.ports.is_valid(port) {
            return Err(KernelError::InvalidArgument);
        }
        let (fid, fcb) = fd::reserve_one(&mut g)?;
        let id = g.sockets.insert(SocketCb::new(port, fcb));
        g.files.attach(fcb, Arc::new(SocketStream(id)));
        log::debug!("socket {:?}: fid {} on port {}", id, fid, port);
        Ok(fid)
    }

    /// Turn an unbound socket into the listener of its port
    pub fn listen(&self, fid: Fid) -> KResult<()> {
        let mut g = self.lock();
        let id = socket_of(&g, fid)?;
        let port = match g.sockets.get(id) {
            Some(s) if s.kind.is_unbound() => s.port,
            Some(_) => return Err(KernelError::InvalidState),
            None => return Err(KernelError::InvalidHandle),
        };
        if port == NOPORT {
            return Err(KernelError::InvalidArgument);
        }
        if !g.ports.install(port, id) {
            log::debug!("listen: port {} already has a listener", port);
            return Err(KernelError::InvalidState);
        }
        if let Some(s) = g.sockets.get_mut(id) {
            s.kind = SocketKind::Listener(ListenerState::new());
        }
        log::debug!("listen: socket {:?} listening on port {}", id, port);
        Ok(())
    }

    /// Wait for a connection on a listener and return the new peer's fid
    pub fn accept(&self, fid: Fid) -> KResult<Fid> {
        let mut g = self.lock();
        let id = socket_of(&g, fid)?;
        let (port, req_available) = match g.sockets.get(id) {
            Some(SocketCb {
                kind: SocketKind::Listener(l),
                port,
                ..
            }) => (*port, l.req_available.clone()),
            Some(_) => return Err(KernelError::InvalidState),
            None => return Err(KernelError::InvalidHandle),
        };

        pin(&mut g, id);
        let result = accept_pinned(&mut g, id, port, &req_available);
        unpin(&mut g, id);
        result
    }

    /// Connect an unbound socket to the listener on `port`
    ///
    /// Waits at most `timeout_ms` for an accept; a zero timeout never sleeps.
    /// Fails with `NotFound` if the listener closes while the caller waits.
    pub fn connect(&self, fid: Fid, port: Port, timeout_ms: u64) -> KResult<()> {
        let mut g = self.lock();
        let me = socket_of(&g, fid)?;
        if !g.ports.is_valid(port) {
            return Err(KernelError::InvalidArgument);
        }
        match g.sockets.get(me) {
            Some(s) if s.kind.is_unbound() => {}
            Some(_) => return Err(KernelError::InvalidState),
            None => return Err(KernelError::InvalidHandle),
        }
        let Some(listener) = g.ports.get(port) else {
            log::debug!("connect: nobody listens on port {}", port);
            return Err(KernelError::NotFound);
        };

        pin(&mut g, listener);
        pin(&mut g, me);

        let request = ConnectionRequest::new(me);
        let connected_cv = request.connected_cv.clone();
        let req = g.requests.insert(request);
        let req_available = match listener_mut(&mut g, listener) {
            Some(l) => {
                l.queue.push_back(req);
                l.req_available.clone()
            }
            None => panic!("connect: port {} maps to a non-listener", port),
        };
        g.signal(&req_available);

        let deadline = g.now_ms().saturating_add(timeout_ms);
        while !is_admitted(&g, req) && timeout_ms > 0 && g.ports.get(port) == Some(listener) {
            if g.timed_wait(&connected_cv, deadline) == WakeReason::TimedOut {
                break;
            }
        }
        let ok = is_admitted(&g, req);
        let listener_gone = g.ports.get(port) != Some(listener);

        g.requests.remove(req);
        if let Some(l) = listener_mut(&mut g, listener) {
            l.queue.retain(|&r| r != req);
        }
        unpin(&mut g, listener);
        unpin(&mut g, me);

        if ok {
            log::debug!("connect: socket {:?} connected to port {}", me, port);
            Ok(())
        } else if listener_gone {
            log::debug!("connect: listener on port {} closed while waiting", port);
            Err(KernelError::NotFound)
        } else {
            log::debug!("connect: port {} did not accept within {} ms", port, timeout_ms);
            Err(KernelError::Timeout)
        }
    }

    /// Close one or both directions of a peer socket
    pub fn shutdown(&self, fid: Fid, mode: ShutdownMode) -> KResult<()> {
        let mut g = self.lock();
        let id = socket_of(&g, fid)?;
        let (read_pipe, write_pipe) = match g.sockets.get_mut(id).map(|s| &mut s.kind) {
            Some(SocketKind::Peer(peer)) => (
                if mode.closes_read() { peer.read_pipe.take() } else { None },
                if mode.closes_write() { peer.write_pipe.take() } else { None },
            ),
            Some(_) => return Err(KernelError::InvalidState),
            None => return Err(KernelError::InvalidHandle),
        };
        if let Some(p) = read_pipe {
            pipe::close_reader(&mut g, p);
        }
        if let Some(p) = write_pipe {
            pipe::close_writer(&mut g, p);
        }
        Ok(())
    }
}
