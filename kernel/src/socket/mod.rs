//! Socket subsystem
//!
//! Connection-oriented local sockets addressed by port number. A listener
//! owns a port in the [`PortTable`]; `connect` queues a
//! [`ConnectionRequest`] on it and `accept` answers the request by joining
//! the two sides with a pair of pipes.

pub mod stream;
pub mod types;

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

pub use stream::SocketStream;
pub use types::{ConnectionRequest, Port, ShutdownMode, SocketCb, SocketKind};

/// Socket handle - unique identifier for a socket in the socket table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SocketId(u64);

impl SocketId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Handle of a pending connection request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

/// All live sockets
pub struct SocketTable {
    sockets: BTreeMap<SocketId, SocketCb>,
    next: u64,
}

impl SocketTable {
    pub fn new() -> Self {
        SocketTable {
            sockets: BTreeMap::new(),
            next: 0,
        }
    }

    pub(crate) fn insert(&mut self, socket: SocketCb) -> SocketId {
        let id = SocketId(self.next);
        self.next += 1;
        self.sockets.insert(id, socket);
        id
    }

    pub fn get(&self, id: SocketId) -> Option<&SocketCb> {
        self.sockets.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: SocketId) -> Option<&mut SocketCb> {
        self.sockets.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: SocketId) -> Option<SocketCb> {
        self.sockets.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}

impl Default for SocketTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending connection requests
pub struct RequestTable {
    requests: BTreeMap<RequestId, ConnectionRequest>,
    next: u64,
}

impl RequestTable {
    pub fn new() -> Self {
        RequestTable {
            requests: BTreeMap::new(),
            next: 0,
        }
    }

    pub(crate) fn insert(&mut self, request: ConnectionRequest) -> RequestId {
        let id = RequestId(self.next);
        self.next += 1;
        self.requests.insert(id, request);
        id
    }

    pub fn get(&self, id: RequestId) -> Option<&ConnectionRequest> {
        self.requests.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: RequestId) -> Option<&mut ConnectionRequest> {
        self.requests.get_mut(&id)
    }

    pub(crate) fn remove(&mut self, id: RequestId) -> Option<ConnectionRequest> {
        self.requests.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

impl Default for RequestTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Port table - maps each port to the listener installed on it
///
/// The single source of truth for "is this port being listened on".
pub struct PortTable {
    slots: Vec<Option<SocketId>>,
}

impl PortTable {
    /// Table covering ports `0..=max_port`
    pub fn new(max_port: Port) -> Self {
        PortTable {
            slots: alloc::vec![None; max_port as usize + 1],
        }
    }

    pub fn max_port(&self) -> Port {
        (self.slots.len() - 1) as Port
    }

    pub fn is_valid(&self, port: Port) -> bool {
        (port as usize) < self.slots.len()
    }

    /// Listener installed on `port`
    pub fn get(&self, port: Port) -> Option<SocketId> {
        self.slots.get(port as usize).copied().flatten()
    }

    /// Install `id` on a free port; returns false if taken or out of range
    pub fn install(&mut self, port: Port, id: SocketId) -> bool {
        match self.slots.get_mut(port as usize) {
            Some(slot) if slot.is_none() => {
                *slot = Some(id);
                true
            }
            _ => false,
        }
    }

    /// Clear `port` if `id` is the listener installed there
    pub fn vacate(&mut self, port: Port, id: SocketId) -> bool {
        match self.slots.get_mut(port as usize) {
            Some(slot) if *slot == Some(id) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    pub fn installed_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}
