//! Socket control blocks and connection requests

use alloc::collections::VecDeque;
use alloc::sync::Arc;

use super::{RequestId, SocketId};
use crate::ipc::fd::FcbId;
use crate::ipc::pipe::PipeId;
use crate::task::condvar::CondVar;

/// Port number; `NOPORT` (0) is the wildcard
pub type Port = u16;

/// Which direction(s) of a peer connection to close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    Read = 1,
    Write = 2,
    Both = 3,
}

impl ShutdownMode {
    /// Parse the syscall encoding
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(ShutdownMode::Read),
            2 => Some(ShutdownMode::Write),
            3 => Some(ShutdownMode::Both),
            _ => None,
        }
    }

    pub fn closes_read(self) -> bool {
        matches!(self, ShutdownMode::Read | ShutdownMode::Both)
    }

    pub fn closes_write(self) -> bool {
        matches!(self, ShutdownMode::Write | ShutdownMode::Both)
    }
}

/// Listener side: requests waiting for `accept`
#[derive(Debug)]
pub struct ListenerState {
    /// Pending requests, oldest first
    pub queue: VecDeque<RequestId>,
    pub req_available: Arc<CondVar>,
}

impl ListenerState {
    pub fn new() -> Self {
        ListenerState {
            queue: VecDeque::new(),
            req_available: CondVar::shared(),
        }
    }
}

impl Default for ListenerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Peer side: one pipe per direction, `None` once shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerState {
    pub read_pipe: Option<PipeId>,
    pub write_pipe: Option<PipeId>,
}

/// Socket state machine
///
/// `Unbound` moves to `Listener` through `listen` or to `Peer` through a
/// completed handshake; neither transition is ever undone.
#[derive(Debug)]
pub enum SocketKind {
    Unbound,
    Listener(ListenerState),
    Peer(PeerState),
}

impl SocketKind {
    pub fn is_unbound(&self) -> bool {
        matches!(self, SocketKind::Unbound)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SocketKind::Unbound => "unbound",
            SocketKind::Listener(_) => "listener",
            SocketKind::Peer(_) => "peer",
        }
    }
}

/// Socket control block
#[derive(Debug)]
pub struct SocketCb {
    pub kind: SocketKind,
    /// In-flight accept/connect calls holding the socket
    pub refcount: usize,
    /// Descriptor object; `None` once the socket has been closed
    pub fcb: Option<FcbId>,
    pub port: Port,
}

impl SocketCb {
    pub fn new(port: Port, fcb: FcbId) -> Self {
        SocketCb {
            kind: SocketKind::Unbound,
            refcount: 0,
            fcb: Some(fcb),
            port,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.fcb.is_none()
    }
}

/// A pending connect, owned by the connecting call
#[derive(Debug)]
pub struct ConnectionRequest {
    /// The connecting socket
    pub peer: SocketId,
    pub admitted: bool,
    pub connected_cv: Arc<CondVar>,
}

impl ConnectionRequest {
    pub fn new(peer: SocketId) -> Self {
        ConnectionRequest {
            peer,
            admitted: false,
            connected_cv: CondVar::shared(),
        }
    }
}
