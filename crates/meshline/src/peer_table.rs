use std::collections::HashMap;

use meshline_net::Token;
use meshline_utils::safe_assert_eq;
use tracing::warn;

use crate::connection::{Connection, PeerState};

/// All connections the hub currently knows about, indexed two ways.
///
/// Mutated only from the hub's I/O task (see the concurrency model this
/// type exists to support); there is no internal locking. A `Connection`
/// is reachable from at most one of the two indexes at a time: it either
/// still holds a handshake slot or has been bound to a peer slot, never
/// both.
#[derive(Default)]
pub struct PeerTable {
    connections: HashMap<Token, Connection>,
    by_handshake_id: HashMap<i8, Token>,
    by_peer_id: HashMap<i8, Token>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, conn: Connection) {
        let token = conn.token;
        let handshake_id = conn.handshake_id;
        self.by_handshake_id.insert(handshake_id, token);
        self.connections.insert(token, conn);
    }

    /// Moves the connection holding `handshake_id` into the peer index
    /// under `peer_id`, clearing its handshake slot. Rejects the bind if
    /// `peer_id` is already held by a `Connected` connection (duplicate
    /// identity); otherwise evicts whatever previously held that slot.
    ///
    /// Returns the token of a connection the caller must now close (the
    /// evicted incumbent), if any, or `None` on success/rejection.
    pub fn bind(&mut self, handshake_id: i8, peer_id: i8) -> BindOutcome {
        let Some(&token) = self.by_handshake_id.get(&handshake_id) else {
            return BindOutcome::UnknownHandshake;
        };

        if let Some(&incumbent_token) = self.by_peer_id.get(&peer_id) {
            let incumbent_connected =
                self.connections.get(&incumbent_token).is_some_and(|c| c.state == PeerState::Connected);
            if incumbent_connected {
                warn!(peer_id, "duplicate identity rejected, incumbent wins");
                return BindOutcome::DuplicateRejected;
            }
            self.by_peer_id.remove(&peer_id);
            let evicted = self.remove(incumbent_token);
            safe_assert_eq!(evicted.is_some(), true, "incumbent must have been present");

            self.by_handshake_id.remove(&handshake_id);
            self.by_peer_id.insert(peer_id, token);
            if let Some(conn) = self.connections.get_mut(&token) {
                conn.handshake_id = 0;
                conn.peer_id = peer_id;
                conn.state = PeerState::Connected;
            }
            return BindOutcome::Bound { evicted: Some(incumbent_token) };
        }

        self.by_handshake_id.remove(&handshake_id);
        self.by_peer_id.insert(peer_id, token);
        if let Some(conn) = self.connections.get_mut(&token) {
            conn.peer_id = peer_id;
            conn.state = PeerState::Connected;
        }
        BindOutcome::Bound { evicted: None }
    }

    pub fn lookup_by_peer(&self, peer_id: i8) -> Option<&Connection> {
        self.by_peer_id.get(&peer_id).and_then(|token| self.connections.get(token))
    }

    pub fn lookup_by_peer_mut(&mut self, peer_id: i8) -> Option<&mut Connection> {
        let token = *self.by_peer_id.get(&peer_id)?;
        self.connections.get_mut(&token)
    }

    pub fn lookup_by_handshake(&self, handshake_id: i8) -> Option<&Connection> {
        self.by_handshake_id.get(&handshake_id).and_then(|token| self.connections.get(token))
    }

    pub fn lookup_by_token(&self, token: Token) -> Option<&Connection> {
        self.connections.get(&token)
    }

    pub fn lookup_by_token_mut(&mut self, token: Token) -> Option<&mut Connection> {
        self.connections.get_mut(&token)
    }

    /// Removes whichever index currently holds `token` and returns the
    /// connection. Callers must close the underlying transport themselves.
    pub fn remove(&mut self, token: Token) -> Option<Connection> {
        let conn = self.connections.remove(&token)?;
        self.by_handshake_id.remove(&conn.handshake_id);
        if conn.peer_id >= 0 {
            self.by_peer_id.remove(&conn.peer_id);
        }
        Some(conn)
    }

    /// A snapshot of tokens for iteration by the liveness probe, taken
    /// without holding any reference into `self` so the caller may mutate
    /// connections by token while iterating.
    pub fn snapshot_tokens(&self) -> Vec<Token> {
        self.connections.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

pub enum BindOutcome {
    Bound { evicted: Option<Token> },
    DuplicateRejected,
    UnknownHandshake,
}
