use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Surfaced synchronously from the init/send/shutdown entry points.
/// Everything else in the taxonomy reaches the application through the
/// callback instead.
#[derive(Debug, Error)]
pub enum MeshlineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to bind tcp listener on {0}: {1}")]
    Bind(SocketAddr, #[source] std::io::Error),
    #[error("failed to bind uds listener at {0}: {1}")]
    UdsBind(PathBuf, #[source] std::io::Error),
    #[error("handle already shut down")]
    AlreadyShutdown,
    #[error("connection closed")]
    Closed,
}
