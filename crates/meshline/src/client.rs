use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use meshline_net::{PollEvent, Reactor, Token, Waker};
use tracing::{debug, warn};

use crate::control;
use crate::error::MeshlineError;
use crate::event::Event;
use crate::framer;

const POLL_TIMEOUT: Duration = Duration::from_millis(200);
const RECONNECT_STEP: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub enum ClientTarget {
    Tcp(String, u16),
    Uds(PathBuf),
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub target: ClientTarget,
    pub local_id: i8,
    pub reconnect_delay: Duration,
}

/// Handle to a single peer connection's reconnect loop, running in a
/// background thread. Dropping this without calling [`ClientHandle::shutdown`]
/// leaves the thread running detached.
pub struct ClientHandle {
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
    outgoing: Arc<Mutex<Vec<u8>>>,
    connected: Arc<(Mutex<bool>, Condvar)>,
    join: Option<JoinHandle<()>>,
}

impl ClientHandle {
    /// Starts the reconnect loop. Returns once the I/O thread is running;
    /// connecting to the hub and completing the handshake happen in the
    /// background and are retried indefinitely, so a hub that is never
    /// reachable does not block this call the way `HubHandle::spawn`'s
    /// listener bind would.
    pub fn spawn(
        config: ClientConfig,
        mut on_event: impl FnMut(&Event) -> Option<Event> + Send + 'static,
    ) -> Result<Self, MeshlineError> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Arc<Waker>, MeshlineError>>();
        let running = Arc::new(AtomicBool::new(true));
        let outgoing: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
        let connected = Arc::new((Mutex::new(false), Condvar::new()));

        let running_thread = running.clone();
        let outgoing_thread = outgoing.clone();
        let connected_thread = connected.clone();

        let join = thread::Builder::new()
            .name("meshline-client".into())
            .spawn(move || {
                let mut reactor = match Reactor::new() {
                    Ok(reactor) => reactor,
                    Err(e) => {
                        let _ = ready_tx.send(Err(MeshlineError::Io(e)));
                        return;
                    }
                };
                let waker = reactor.waker();
                if ready_tx.send(Ok(waker)).is_err() {
                    return;
                }
                run(reactor, config, &running_thread, &outgoing_thread, &connected_thread, &mut on_event);
            })
            .map_err(MeshlineError::Io)?;

        let waker = ready_rx.recv().map_err(|_| MeshlineError::Closed)??;

        Ok(Self { running, waker, outgoing, connected, join: Some(join) })
    }

    /// Blocks the calling thread until the first `CONFIRMED`/`CONNECTED`
    /// handshake with the hub completes, or `timeout` elapses. This is the
    /// init barrier of spec.md §5; `spawn` itself does not block on it
    /// since the reconnect loop may spend an unbounded time retrying a hub
    /// that isn't reachable yet. Returns `false` on timeout; reconnects
    /// after the first success do not reset the flag.
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.connected;
        let guard = lock.lock().unwrap();
        if *guard {
            return true;
        }
        let (guard, _) = cvar.wait_timeout_while(guard, timeout, |connected| !*connected).unwrap();
        *guard
    }

    pub fn send_event(&self, event: &Event) {
        let bytes = framer::encode(event);
        self.outgoing.lock().unwrap().extend_from_slice(&bytes);
        let _ = self.waker.wake();
    }

    /// Raw passthrough, bypassing the framer. Must not be used for control
    /// events.
    pub fn send_data(&self, bytes: &[u8]) {
        self.outgoing.lock().unwrap().extend_from_slice(bytes);
        let _ = self.waker.wake();
    }

    /// Emits `DISCONNECTED` best-effort, then stops the I/O thread and
    /// waits for it to exit.
    pub fn shutdown(mut self) -> Result<(), MeshlineError> {
        self.send_event(&Event::new(control::DISCONNECTED, 0, 0, false, vec![]));
        self.running.store(false, Ordering::Release);
        let _ = self.waker.wake();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        Ok(())
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.running.store(false, Ordering::Release);
            let _ = self.waker.wake();
        }
    }
}

fn connect_once(reactor: &mut Reactor, target: &ClientTarget) -> io::Result<Token> {
    match target {
        ClientTarget::Tcp(host, port) => {
            let addr: SocketAddr = (host.as_str(), *port)
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address resolved for host"))?;
            reactor.connect_tcp(addr)
        }
        ClientTarget::Uds(path) => reactor.connect_uds(path),
    }
}

fn run(
    mut reactor: Reactor,
    config: ClientConfig,
    running: &AtomicBool,
    outgoing: &Mutex<Vec<u8>>,
    connected: &(Mutex<bool>, Condvar),
    on_event: &mut (dyn FnMut(&Event) -> Option<Event> + Send),
) {
    while running.load(Ordering::Acquire) {
        let token = match connect_once(&mut reactor, &config.target) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "client connect failed, retrying");
                wait(running, config.reconnect_delay);
                continue;
            }
        };
        debug!("connected to hub, awaiting handshake");

        let mut disconnected = false;
        while running.load(Ordering::Acquire) && !disconnected {
            let mut pending = Vec::new();

            let poll_result = reactor.poll(Some(POLL_TIMEOUT), |event| match event {
                PollEvent::Data { token: t, bytes } if t == token => framer::parse_all(bytes, |decoded| {
                    handle_inbound(config.local_id, &decoded, &mut pending, connected, &mut *on_event);
                }),
                PollEvent::Disconnect { token: t } if t == token => {
                    disconnected = true;
                    0
                }
                _ => 0,
            });
            if let Err(e) = poll_result {
                warn!(error = %e, "client reactor poll error");
                break;
            }

            if !pending.is_empty() {
                reactor.write_or_enqueue(token, &pending);
            }

            let app_bytes = std::mem::take(&mut *outgoing.lock().unwrap());
            if !app_bytes.is_empty() {
                reactor.write_or_enqueue(token, &app_bytes);
            }
        }

        reactor.close(token);
        if !running.load(Ordering::Acquire) {
            break;
        }
        debug!("disconnected from hub, will retry");
        wait(running, config.reconnect_delay);
    }

    reactor.close_all();
}

/// Sleeps in short slices so a `shutdown()` request interrupts the wait
/// promptly rather than blocking for the full reconnect delay.
fn wait(running: &AtomicBool, delay: Duration) {
    let mut waited = Duration::ZERO;
    while waited < delay && running.load(Ordering::Acquire) {
        let chunk = RECONNECT_STEP.min(delay - waited);
        thread::sleep(chunk);
        waited += chunk;
    }
}

fn handle_inbound(
    local_id: i8,
    event: &Event,
    pending: &mut Vec<u8>,
    connected: &(Mutex<bool>, Condvar),
    on_event: &mut (dyn FnMut(&Event) -> Option<Event> + Send),
) {
    match event.id {
        control::CONFIRMED => {
            let handshake_id = event.payload.first().copied().unwrap_or(0);
            debug!(handshake_id, "handshake confirmed");
            let reply = Event::new(control::CONNECTED, local_id, 0, false, vec![handshake_id]);
            pending.extend_from_slice(&framer::encode(&reply));
            let (lock, cvar) = connected;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }
        control::ALIVE => {
            let reply = Event::new(control::ALIVE_CONFIRM, local_id, 0, false, vec![]);
            pending.extend_from_slice(&framer::encode(&reply));
        }
        control::USER_OFFLINE => {
            on_event(event);
        }
        id if control::is_control(id) => {
            warn!(id, "unexpected control event from hub, dropped");
        }
        _ => {
            if let Some(reply) = on_event(event).filter(|_| event.writeback) {
                pending.extend_from_slice(&framer::encode(&reply));
            }
        }
    }
}
