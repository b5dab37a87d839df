use meshline_net::Token;
use meshline_utils::safe_assert;
use tracing::{debug, warn};

use crate::connection::PeerState;
use crate::control;
use crate::event::Event;
use crate::peer_table::{BindOutcome, PeerTable};

/// What the hub's I/O task must do after a `Router` decision, besides the
/// writes the router already performed on `Connection` outgoing buffers
/// (those need no reactor access; closing a transport does).
#[derive(Default)]
pub struct RouterActions {
    pub close: Vec<Token>,
}

/// The hub's routing decision table (spec §4.4), applied to one
/// `(source, event)` pair at a time. Owns nothing; operates on the
/// `PeerTable` passed in, which must only ever be touched from the hub's
/// I/O task.
pub struct Router<'cb> {
    pub local_id: i8,
    /// Invoked for events the hub delivers locally (`receiver == local_id`).
    /// A `Some` return is a reply to route back through this same table
    /// when the inbound event had `writeback` set.
    pub on_event: &'cb mut dyn FnMut(&Event) -> Option<Event>,
}

impl Router<'_> {
    /// `source` is `None` for events injected directly by the hub's own
    /// application code (via the public `send_event`) rather than received
    /// from a peer connection; control events always require a real
    /// source and are dropped otherwise.
    pub fn route(&mut self, table: &mut PeerTable, source: Option<Token>, event: Event) -> RouterActions {
        let mut actions = RouterActions::default();
        self.route_inner(table, source, event, &mut actions);
        actions
    }

    fn route_inner(&mut self, table: &mut PeerTable, source: Option<Token>, event: Event, actions: &mut RouterActions) {
        if control::is_control(event.id) {
            let Some(source) = source else {
                warn!(id = event.id, "control event cannot be injected without a source connection");
                return;
            };
            self.route_control(table, source, event, actions);
            return;
        }

        if event.receiver == self.local_id {
            let reply = (self.on_event)(&event);
            if let Some(reply) = reply.filter(|_| event.writeback) {
                self.route_inner(table, source, reply, actions);
            }
            return;
        }

        match table.lookup_by_peer(event.receiver) {
            None => debug!(receiver = event.receiver, "forwarded event to unknown receiver dropped"),
            Some(target) if target.state != PeerState::Connected => {
                let offline = Event::new(control::USER_OFFLINE, self.local_id, event.sender, false, vec![]);
                if let Some(source_conn) = source.and_then(|s| table.lookup_by_token(s)) {
                    source_conn.write_event(&offline);
                }
            }
            Some(target) => target.write_event(&event),
        }
    }

    fn route_control(&mut self, table: &mut PeerTable, source: Token, event: Event, actions: &mut RouterActions) {
        match event.id {
            control::CONNECTED => {
                let handshake_id = event.payload.first().copied().unwrap_or(0) as i8;
                safe_assert!(
                    table.lookup_by_token(source).is_some(),
                    "CONNECTED from a token not in the peer table"
                );
                match table.bind(handshake_id, event.sender) {
                    BindOutcome::Bound { evicted } => {
                        debug!(peer_id = event.sender, "peer connected");
                        actions.close.extend(evicted);
                    }
                    BindOutcome::DuplicateRejected => {
                        warn!(peer_id = event.sender, "duplicate CONNECTED rejected, incumbent kept");
                    }
                    BindOutcome::UnknownHandshake => {
                        warn!(handshake_id, "CONNECTED referenced unknown handshake id");
                    }
                }
            }
            control::DISCONNECTED => {
                if let Some(conn) = table.lookup_by_peer_mut(event.sender) {
                    conn.state = PeerState::Disconnected;
                    actions.close.push(conn.token);
                }
            }
            control::ALIVE_CONFIRM => {
                if let Some(conn) = table.lookup_by_peer_mut(event.sender) {
                    conn.missed_probes = 0;
                }
            }
            other => {
                warn!(id = other, "control event not valid inbound on hub, dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use meshline_net::Token;

    use super::*;
    use crate::connection::Connection;

    fn handshake_connected(table: &mut PeerTable, token: usize, handshake_id: i8, peer_id: i8) {
        table.add(Connection::new(Token(token), handshake_id));
        table.bind(handshake_id, peer_id);
    }

    #[test]
    fn forwards_event_to_connected_receiver() {
        let mut table = PeerTable::new();
        handshake_connected(&mut table, 1, 10, 2);
        handshake_connected(&mut table, 2, 11, 3);

        let mut noop = |_: &Event| None;
        let mut router = Router { local_id: 1, on_event: &mut noop };
        let event = Event::new(101, 2, 3, true, vec![1, 2, 3]);
        router.route(&mut table, Some(Token(1)), event);

        let bytes = table.lookup_by_peer(3).unwrap().take_outgoing();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn offline_receiver_gets_user_offline_reply() {
        let mut table = PeerTable::new();
        handshake_connected(&mut table, 1, 10, 2);
        table.add(Connection::new(Token(2), 11));
        table.bind(11, 3);
        table.lookup_by_peer_mut(3).unwrap().state = PeerState::Disconnected;

        let mut noop = |_: &Event| None;
        let mut router = Router { local_id: 1, on_event: &mut noop };
        router.route(&mut table, Some(Token(1)), Event::new(101, 2, 3, false, vec![]));

        let bytes = table.lookup_by_peer(2).unwrap().take_outgoing();
        let mut decoded = None;
        crate::framer::parse_all(&bytes, |e| decoded = Some(e));
        let reply = decoded.unwrap();
        assert_eq!(reply.id, control::USER_OFFLINE);
        assert_eq!(reply.receiver, 2);
    }

    #[test]
    fn connected_control_binds_handshake_to_peer() {
        let mut table = PeerTable::new();
        table.add(Connection::new(Token(1), 10));

        let mut noop = |_: &Event| None;
        let mut router = Router { local_id: 1, on_event: &mut noop };
        let connected = Event::new(control::CONNECTED, 2, 1, false, vec![10]);
        let actions = router.route(&mut table, Some(Token(1)), connected);

        assert!(actions.close.is_empty());
        assert_eq!(table.lookup_by_peer(2).unwrap().token, Token(1));
        assert_eq!(table.lookup_by_peer(2).unwrap().state, PeerState::Connected);
    }

    #[test]
    fn alive_confirm_resets_missed_probes() {
        let mut table = PeerTable::new();
        handshake_connected(&mut table, 1, 10, 2);
        table.lookup_by_peer_mut(2).unwrap().missed_probes = 3;

        let mut noop = |_: &Event| None;
        let mut router = Router { local_id: 1, on_event: &mut noop };
        router.route(&mut table, Some(Token(1)), Event::new(control::ALIVE_CONFIRM, 2, 1, false, vec![]));

        assert_eq!(table.lookup_by_peer(2).unwrap().missed_probes, 0);
    }

    #[test]
    fn local_delivery_invokes_callback_and_reroutes_reply() {
        let mut table = PeerTable::new();
        handshake_connected(&mut table, 1, 10, 2);
        handshake_connected(&mut table, 2, 11, 3);

        let mut reply_with = |e: &Event| Some(Event::new(102, 1, e.sender, false, vec![-1]));
        let mut router = Router { local_id: 1, on_event: &mut reply_with };
        let event = Event::new(101, 2, 1, true, vec![7]);
        router.route(&mut table, Some(Token(1)), event);

        let bytes = table.lookup_by_peer(2).unwrap().take_outgoing();
        assert!(!bytes.is_empty());
    }
}
