use std::io::{self, Read, Write};

use mio::event::Source;
use mio::net::{TcpStream, UnixStream};
use mio::{Interest, Registry, Token};

/// Either side of a TCP or local-domain stream socket.
pub enum Transport {
    Tcp(TcpStream),
    Uds(UnixStream),
}

impl Transport {
    pub fn set_nodelay(&self) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.set_nodelay(true),
            Transport::Uds(_) => Ok(()),
        }
    }

    pub fn peer_label(&self) -> String {
        match self {
            Transport::Tcp(s) => s
                .peer_addr()
                .map_or_else(|_| "tcp:unknown".to_string(), |a| format!("tcp:{a}")),
            Transport::Uds(s) => s.peer_addr().map_or_else(
                |_| "uds:unknown".to_string(),
                |a| format!("uds:{:?}", a.as_pathname()),
            ),
        }
    }

    pub fn shutdown(&self) {
        match self {
            Transport::Tcp(s) => {
                let _ = s.shutdown(std::net::Shutdown::Both);
            }
            Transport::Uds(s) => {
                let _ = s.shutdown(std::net::Shutdown::Both);
            }
        }
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.read(buf),
            Transport::Uds(s) => s.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.write(buf),
            Transport::Uds(s) => s.write(buf),
        }
    }

    fn write_vectored(&mut self, bufs: &[io::IoSlice<'_>]) -> io::Result<usize> {
        match self {
            Transport::Tcp(s) => s.write_vectored(bufs),
            Transport::Uds(s) => s.write_vectored(bufs),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.flush(),
            Transport::Uds(s) => s.flush(),
        }
    }
}

impl Source for Transport {
    fn register(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.register(registry, token, interests),
            Transport::Uds(s) => s.register(registry, token, interests),
        }
    }

    fn reregister(&mut self, registry: &Registry, token: Token, interests: Interest) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.reregister(registry, token, interests),
            Transport::Uds(s) => s.reregister(registry, token, interests),
        }
    }

    fn deregister(&mut self, registry: &Registry) -> io::Result<()> {
        match self {
            Transport::Tcp(s) => s.deregister(registry),
            Transport::Uds(s) => s.deregister(registry),
        }
    }
}
