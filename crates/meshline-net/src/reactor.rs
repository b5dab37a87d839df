use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mio::event::Source;
use mio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use mio::{Events, Interest, Poll, Token, Waker};
use tracing::{debug, warn};

use crate::stream::{FramedStream, StreamEvent};
use crate::transport::Transport;

const WAKE_TOKEN: Token = Token(usize::MAX);

enum Listener {
    Tcp(TcpListener),
    Uds(UnixListener, PathBuf),
}

enum Slot {
    Listener(Listener),
    Stream(FramedStream),
}

/// Event surfaced by [`Reactor::poll`]. Borrowed data (`Data`) is only valid
/// for the duration of the handler call.
pub enum PollEvent<'a> {
    Accept { token: Token, peer_label: String },
    Data { token: Token, bytes: &'a [u8] },
    Disconnect { token: Token },
    /// The reactor was woken via its [`Waker`] with no transport event
    /// attached — used to flush cross-thread writes or notice shutdown.
    Woken,
}

/// Owns a single `mio::Poll` and every listener/stream registered against
/// it. Not `Send` across uses that assume single ownership per I/O task —
/// exactly one task drives a given `Reactor`.
pub struct Reactor {
    poll: Poll,
    events: Events,
    waker: Arc<Waker>,
    slots: HashMap<Token, Slot>,
    next_token: usize,
}

impl Reactor {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        Ok(Self { poll, events: Events::with_capacity(256), waker, slots: HashMap::new(), next_token: 0 })
    }

    /// A cloneable handle other threads can use to interrupt a blocked
    /// `poll` call, e.g. after enqueuing a send on a stream this reactor
    /// owns.
    pub fn waker(&self) -> Arc<Waker> {
        self.waker.clone()
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    pub fn listen_tcp(&mut self, addr: SocketAddr) -> io::Result<(Token, u16)> {
        let mut listener = TcpListener::bind(addr)?;
        let bound_port = listener.local_addr()?.port();
        let token = self.alloc_token();
        listener.register(self.poll.registry(), token, Interest::READABLE)?;
        self.slots.insert(token, Slot::Listener(Listener::Tcp(listener)));
        debug!(port = bound_port, "tcp listener bound");
        Ok((token, bound_port))
    }

    pub fn listen_uds(&mut self, path: &Path) -> io::Result<Token> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let mut listener = UnixListener::bind(path)?;
        let token = self.alloc_token();
        listener.register(self.poll.registry(), token, Interest::READABLE)?;
        self.slots.insert(token, Slot::Listener(Listener::Uds(listener, path.to_path_buf())));
        debug!(path = %path.display(), "uds listener bound");
        Ok(token)
    }

    pub fn connect_tcp(&mut self, addr: SocketAddr) -> io::Result<Token> {
        let stream = TcpStream::connect(addr)?;
        self.register_stream(Transport::Tcp(stream))
    }

    pub fn connect_uds(&mut self, path: &Path) -> io::Result<Token> {
        let stream = UnixStream::connect(path)?;
        self.register_stream(Transport::Uds(stream))
    }

    fn register_stream(&mut self, transport: Transport) -> io::Result<Token> {
        let mut framed = FramedStream::new(transport)?;
        let token = self.alloc_token();
        framed.register(self.poll.registry(), token)?;
        self.slots.insert(token, Slot::Stream(framed));
        Ok(token)
    }

    pub fn write_or_enqueue(&mut self, token: Token, bytes: &[u8]) {
        let registry = self.poll.registry();
        if let Some(Slot::Stream(stream)) = self.slots.get_mut(&token) {
            stream.write_or_enqueue(registry, token, bytes);
        }
    }

    pub fn close(&mut self, token: Token) {
        let registry = self.poll.registry();
        match self.slots.remove(&token) {
            Some(Slot::Stream(mut stream)) => stream.close(registry),
            Some(Slot::Listener(Listener::Tcp(mut l))) => {
                let _ = l.deregister(registry);
            }
            Some(Slot::Listener(Listener::Uds(mut l, path))) => {
                let _ = l.deregister(registry);
                let _ = std::fs::remove_file(path);
            }
            None => {}
        }
    }

    pub fn close_all(&mut self) {
        let tokens: Vec<Token> = self.slots.keys().copied().collect();
        for token in tokens {
            self.close(token);
        }
    }

    /// Blocks up to `timeout` for readiness, dispatching every event to
    /// `on_event`. A `None` timeout blocks indefinitely until woken.
    /// `on_event`'s return value is only meaningful for `PollEvent::Data`:
    /// it's the number of leading bytes actually consumed, so the
    /// underlying stream can retain whatever wasn't (see
    /// [`crate::stream::FramedStream::poll_readable`]). Other variants'
    /// return value is ignored.
    pub fn poll(&mut self, timeout: Option<Duration>, mut on_event: impl FnMut(PollEvent<'_>) -> usize) -> io::Result<()> {
        self.poll.poll(&mut self.events, timeout)?;

        let mut accepted: Vec<(Token, Transport)> = Vec::new();
        let mut readable: Vec<Token> = Vec::new();
        let mut writable: Vec<Token> = Vec::new();
        let mut listener_tokens: Vec<Token> = Vec::new();
        let mut woken = false;

        for event in self.events.iter() {
            let token = event.token();
            if token == WAKE_TOKEN {
                woken = true;
                continue;
            }
            match self.slots.get(&token) {
                Some(Slot::Listener(_)) => listener_tokens.push(token),
                Some(Slot::Stream(_)) => {
                    if event.is_readable() {
                        readable.push(token);
                    }
                    if event.is_writable() {
                        writable.push(token);
                    }
                }
                None => {}
            }
        }

        for token in listener_tokens {
            self.accept_all(token, &mut accepted);
        }
        for (token, transport) in accepted {
            match FramedStream::new(transport) {
                Ok(mut framed) => {
                    if framed.register(self.poll.registry(), token).is_ok() {
                        let peer_label = framed.peer_label().to_string();
                        self.slots.insert(token, Slot::Stream(framed));
                        on_event(PollEvent::Accept { token, peer_label });
                    }
                }
                Err(e) => warn!(error = %e, "failed to wrap accepted transport"),
            }
        }

        for token in writable {
            let registry = self.poll.registry();
            if let Some(Slot::Stream(stream)) = self.slots.get_mut(&token) {
                stream.drain_backlog(registry, token);
            }
        }

        for token in readable {
            let mut disconnected = false;
            if let Some(Slot::Stream(stream)) = self.slots.get_mut(&token) {
                stream.poll_readable(|ev| match ev {
                    StreamEvent::Data(bytes) => on_event(PollEvent::Data { token, bytes }),
                    StreamEvent::Disconnected => {
                        disconnected = true;
                        0
                    }
                });
            }
            if disconnected {
                self.close(token);
                on_event(PollEvent::Disconnect { token });
            }
        }

        if woken {
            on_event(PollEvent::Woken);
        }

        Ok(())
    }

    fn accept_all(&mut self, token: Token, out: &mut Vec<(Token, Transport)>) {
        loop {
            let accepted = match self.slots.get(&token) {
                Some(Slot::Listener(Listener::Tcp(l))) => l.accept().map(|(s, _)| Transport::Tcp(s)),
                Some(Slot::Listener(Listener::Uds(l, _))) => l.accept().map(|(s, _)| Transport::Uds(s)),
                _ => return,
            };
            match accepted {
                Ok(transport) => {
                    let new_token = self.alloc_token();
                    out.push((new_token, transport));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "accept error");
                    break;
                }
            }
        }
    }
}
