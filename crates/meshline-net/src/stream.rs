use std::collections::VecDeque;
use std::io::{self, IoSlice, Read, Write};

use mio::event::Source;
use mio::{Interest, Registry, Token};
use tracing::{debug, trace, warn};

use crate::sigpipe;
use crate::transport::Transport;

const RX_CHUNK: usize = 8192;

pub enum StreamEvent<'a> {
    /// All bytes currently staged from one or more non-blocking reads.
    Data(&'a [u8]),
    Disconnected,
}

/// One framed byte stream: a transport plus its non-blocking read staging
/// buffer and its locked-from-outside write backlog.
pub struct FramedStream {
    transport: Transport,
    peer_label: String,
    rx_buf: Vec<u8>,
    send_backlog: VecDeque<Vec<u8>>,
    writable_armed: bool,
}

impl FramedStream {
    pub fn new(transport: Transport) -> io::Result<Self> {
        transport.set_nodelay()?;
        let peer_label = transport.peer_label();
        Ok(Self {
            transport,
            peer_label,
            rx_buf: Vec::new(),
            send_backlog: VecDeque::new(),
            writable_armed: true,
        })
    }

    pub fn peer_label(&self) -> &str {
        &self.peer_label
    }

    pub fn register(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        self.transport.register(registry, token, Interest::READABLE | Interest::WRITABLE)
    }

    pub fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        self.transport.deregister(registry)
    }

    /// Drains whatever is currently readable, appends it to whatever was
    /// left unconsumed by the previous call, and hands the result to
    /// `on_event` once. `on_event` returns how many leading bytes it
    /// actually consumed; the rest is retained for the next call instead of
    /// being dropped, so a frame whose bytes land across two separate
    /// non-blocking reads is not lost or corrupted.
    pub fn poll_readable(&mut self, mut on_event: impl FnMut(StreamEvent<'_>) -> usize) {
        let mut chunk = [0u8; RX_CHUNK];
        loop {
            match self.transport.read(&mut chunk) {
                Ok(0) => {
                    on_event(StreamEvent::Disconnected);
                    return;
                }
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(peer = %self.peer_label, error = %e, "transport read error");
                    on_event(StreamEvent::Disconnected);
                    return;
                }
            }
        }
        if !self.rx_buf.is_empty() {
            trace!(peer = %self.peer_label, bytes = self.rx_buf.len(), "staged read");
            let consumed = on_event(StreamEvent::Data(&self.rx_buf));
            if consumed > 0 {
                self.rx_buf.drain(0..consumed);
            }
        }
    }

    /// Enqueues `bytes` for writing, writing immediately if the backlog is
    /// empty and the socket is currently writable.
    pub fn write_or_enqueue(&mut self, registry: &Registry, token: Token, bytes: &[u8]) {
        if self.send_backlog.is_empty() {
            match sigpipe::guarded(|| self.transport.write_vectored(&[IoSlice::new(bytes)])) {
                Ok(written) if written == bytes.len() => return,
                Ok(written) => {
                    self.send_backlog.push_back(bytes[written..].to_vec());
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.send_backlog.push_back(bytes.to_vec());
                }
                Err(e) => {
                    warn!(peer = %self.peer_label, error = %e, "transport write error");
                    self.send_backlog.push_back(bytes.to_vec());
                }
            }
        } else {
            self.send_backlog.push_back(bytes.to_vec());
        }
        self.arm_writable(registry, token);
    }

    pub fn drain_backlog(&mut self, registry: &Registry, token: Token) {
        while let Some(front) = self.send_backlog.front() {
            match sigpipe::guarded(|| self.transport.write(front)) {
                Ok(written) if written == front.len() => {
                    self.send_backlog.pop_front();
                }
                Ok(written) => {
                    let remaining = front[written..].to_vec();
                    self.send_backlog.pop_front();
                    self.send_backlog.push_front(remaining);
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(peer = %self.peer_label, error = %e, "transport write error");
                    break;
                }
            }
        }
        if self.send_backlog.is_empty() {
            self.disarm_writable(registry, token);
        }
    }

    fn arm_writable(&mut self, registry: &Registry, token: Token) {
        if self.writable_armed {
            return;
        }
        if self.transport.reregister(registry, token, Interest::READABLE | Interest::WRITABLE).is_ok() {
            self.writable_armed = true;
        }
    }

    fn disarm_writable(&mut self, registry: &Registry, token: Token) {
        if !self.writable_armed {
            return;
        }
        if self.transport.reregister(registry, token, Interest::READABLE).is_ok() {
            self.writable_armed = false;
        }
    }

    pub fn close(&mut self, registry: &Registry) {
        let _ = self.deregister(registry);
        self.transport.shutdown();
    }
}
