use std::sync::{Arc, Mutex};

use meshline_net::Token;

use crate::event::Event;
use crate::framer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerState {
    Uninitialized,
    Connected,
    Disconnected,
    Dropped,
}

/// One peer's framed channel as tracked by the hub's `PeerTable`, or the
/// client's single upstream channel. The transport itself lives in the
/// `meshline-net` reactor, addressed by `token`; this struct carries the
/// identity/lifecycle state layered on top of it plus the locked outgoing
/// buffer application threads may write into without going through the
/// owning I/O task.
pub struct Connection {
    pub token: Token,
    pub state: PeerState,
    pub handshake_id: i8,
    pub peer_id: i8,
    pub missed_probes: u32,
    outgoing: Arc<Mutex<Vec<u8>>>,
}

impl Connection {
    pub fn new(token: Token, handshake_id: i8) -> Self {
        Self {
            token,
            state: PeerState::Uninitialized,
            handshake_id,
            peer_id: -1,
            missed_probes: 0,
            outgoing: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A cloneable handle onto this connection's outgoing buffer, usable
    /// from any thread; the owning I/O task drains it on each wake.
    pub fn outgoing_handle(&self) -> Arc<Mutex<Vec<u8>>> {
        self.outgoing.clone()
    }

    /// Encodes `event` and appends it under the buffer's lock; concurrent
    /// callers each get a single atomic encode-and-append, so frames never
    /// interleave on the wire.
    pub fn write_event(&self, event: &Event) {
        let bytes = framer::encode(event);
        self.outgoing.lock().unwrap().extend_from_slice(&bytes);
    }

    /// Raw passthrough: bypasses the framer entirely. Escape hatch for
    /// pre-framed or non-event bytes; must not be used for control events.
    pub fn write_raw(&self, bytes: &[u8]) {
        self.outgoing.lock().unwrap().extend_from_slice(bytes);
    }

    /// Takes and clears whatever is currently buffered, for the owning I/O
    /// task to hand to the reactor.
    pub fn take_outgoing(&self) -> Vec<u8> {
        let mut guard = self.outgoing.lock().unwrap();
        std::mem::take(&mut *guard)
    }
}
