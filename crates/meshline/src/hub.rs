use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use meshline_net::{PollEvent, Reactor, Token, Waker};
use tracing::{debug, info, warn};

use crate::connection::{Connection, PeerState};
use crate::control;
use crate::error::MeshlineError;
use crate::event::Event;
use crate::framer;
use crate::peer_table::PeerTable;
use crate::router::Router;
use crate::timing::Repeater;

const PROBE_INTERVAL: Duration = Duration::from_secs(1);
const MAX_MISSED_PROBES: u32 = 5;

#[derive(Clone, Debug)]
pub struct HubConfig {
    pub port: u16,
    pub uds_path: Option<PathBuf>,
    pub local_id: i8,
}

/// Handle to a running hub I/O thread. Dropping this without calling
/// [`HubHandle::shutdown`] leaves the thread running detached.
pub struct HubHandle {
    port: u16,
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
    inject: Arc<Mutex<VecDeque<Event>>>,
    join: Option<JoinHandle<()>>,
}

impl HubHandle {
    /// Binds the configured listeners and starts the hub's I/O thread.
    /// Blocks until the listeners are bound (or binding fails), per the
    /// counting-synchronizer startup barrier: only bind and thread-creation
    /// failures are returned here, everything else reaches the application
    /// through `on_event`.
    pub fn spawn(
        config: HubConfig,
        mut on_event: impl FnMut(&Event) -> Option<Event> + Send + 'static,
    ) -> Result<Self, MeshlineError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(u16, Arc<Waker>), MeshlineError>>();
        let running = Arc::new(AtomicBool::new(true));
        let inject: Arc<Mutex<VecDeque<Event>>> = Arc::new(Mutex::new(VecDeque::new()));

        let running_thread = running.clone();
        let inject_thread = inject.clone();
        let local_id = config.local_id;
        let uds_path = config.uds_path.clone();
        let port = config.port;

        let join = thread::Builder::new()
            .name("meshline-hub".into())
            .spawn(move || {
                let mut reactor = match Reactor::new() {
                    Ok(reactor) => reactor,
                    Err(e) => {
                        let _ = ready_tx.send(Err(MeshlineError::Io(e)));
                        return;
                    }
                };

                let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
                let (_listen_token, bound_port) = match reactor.listen_tcp(bind_addr) {
                    Ok(v) => v,
                    Err(e) => {
                        let _ = ready_tx.send(Err(MeshlineError::Bind(bind_addr, e)));
                        return;
                    }
                };

                if let Some(path) = &uds_path
                    && let Err(e) = reactor.listen_uds(path)
                {
                    let _ = ready_tx.send(Err(MeshlineError::UdsBind(path.clone(), e)));
                    return;
                }

                let waker = reactor.waker();
                if ready_tx.send(Ok((bound_port, waker))).is_err() {
                    return;
                }

                run(reactor, local_id, running_thread, inject_thread, &mut on_event);
            })
            .map_err(MeshlineError::Io)?;

        let (bound_port, waker) = ready_rx.recv().map_err(|_| MeshlineError::Closed)??;

        Ok(Self { port: bound_port, running, waker, inject, join: Some(join) })
    }

    /// The TCP port actually bound, useful when `HubConfig.port` was 0.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Injects `event` into the routing table as if it had arrived with no
    /// originating connection. Control events are rejected by the router
    /// since they require a real peer source.
    pub fn send_event(&self, event: Event) {
        self.inject.lock().unwrap().push_back(event);
        let _ = self.waker.wake();
    }

    /// Requests the I/O thread stop and waits for it to exit.
    pub fn shutdown(mut self) -> Result<(), MeshlineError> {
        self.running.store(false, Ordering::Release);
        let _ = self.waker.wake();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        Ok(())
    }
}

impl Drop for HubHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.running.store(false, Ordering::Release);
            let _ = self.waker.wake();
        }
    }
}

fn run(
    mut reactor: Reactor,
    local_id: i8,
    running: Arc<AtomicBool>,
    inject: Arc<Mutex<VecDeque<Event>>>,
    on_event: &mut (dyn FnMut(&Event) -> Option<Event> + Send),
) {
    let mut table = PeerTable::new();
    let mut probe = Repeater::every(PROBE_INTERVAL);
    let mut next_handshake_id: u8 = 0;

    info!(local_id, "hub started");

    while running.load(Ordering::Acquire) {
        let mut close_queue: Vec<Token> = Vec::new();

        let poll_result = reactor.poll(Some(probe.remaining()), |event| match event {
            PollEvent::Accept { token, peer_label } => {
                let handshake_id = next_handshake_id as i8;
                next_handshake_id = next_handshake_id.wrapping_add(1);
                table.add(Connection::new(token, handshake_id));
                if let Some(conn) = table.lookup_by_token(token) {
                    let confirmed =
                        Event::new(control::CONFIRMED, local_id, 0, false, vec![i32::from(handshake_id)]);
                    conn.write_event(&confirmed);
                }
                debug!(peer = peer_label, handshake_id, "peer accepted");
                0
            }
            PollEvent::Data { token, bytes } => {
                let mut router = Router { local_id, on_event: &mut *on_event };
                framer::parse_all(bytes, |decoded| {
                    let actions = router.route(&mut table, Some(token), decoded);
                    close_queue.extend(actions.close);
                })
            }
            PollEvent::Disconnect { token } => {
                if let Some(mut conn) = table.remove(token) {
                    conn.state = PeerState::Dropped;
                    debug!(peer_id = conn.peer_id, "peer disconnected");
                }
                0
            }
            PollEvent::Woken => 0,
        });
        if let Err(e) = poll_result {
            warn!(error = %e, "hub reactor poll error");
            break;
        }

        for token in close_queue {
            table.remove(token);
            reactor.close(token);
        }

        for event in std::mem::take(&mut *inject.lock().unwrap()) {
            let mut router = Router { local_id, on_event: &mut *on_event };
            let actions = router.route(&mut table, None, event);
            for token in actions.close {
                table.remove(token);
                reactor.close(token);
            }
        }

        if probe.fired() {
            for token in table.snapshot_tokens() {
                let Some(conn) = table.lookup_by_token_mut(token) else { continue };
                if conn.state != PeerState::Connected {
                    continue;
                }
                conn.missed_probes += 1;
                if conn.missed_probes > MAX_MISSED_PROBES {
                    warn!(peer_id = conn.peer_id, "peer missed too many liveness probes, dropping");
                    conn.state = PeerState::Dropped;
                } else {
                    let alive = Event::new(control::ALIVE, local_id, conn.peer_id, false, vec![]);
                    conn.write_event(&alive);
                }
            }
        }

        for token in table.snapshot_tokens() {
            if let Some(conn) = table.lookup_by_token(token) {
                let bytes = conn.take_outgoing();
                if !bytes.is_empty() {
                    reactor.write_or_enqueue(token, &bytes);
                }
            }
        }
    }

    reactor.close_all();
    info!("hub stopped");
}
