use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use meshline::{ClientConfig, ClientHandle, ClientTarget};
use tracing::info;

const RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Runs a meshline peer client, connecting to a hub over TCP or a Unix
/// domain socket and reconnecting with a fixed backoff on disconnect.
#[derive(Parser, Debug)]
struct Args {
    /// Hub hostname to connect to over TCP. Mutually exclusive with
    /// `--uds-path`.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Hub TCP port.
    #[arg(long, default_value_t = 7777)]
    port: u16,

    /// Connect over a Unix domain socket at this path instead of TCP.
    #[arg(long)]
    uds_path: Option<PathBuf>,

    /// This peer's identity, carried as `sender` on every event it emits.
    #[arg(long)]
    local_id: i8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    meshline_cli::init_tracing();
    let args = Args::parse();

    let target = match args.uds_path {
        Some(path) => ClientTarget::Uds(path),
        None => ClientTarget::Tcp(args.host, args.port),
    };

    let config = ClientConfig { target, local_id: args.local_id, reconnect_delay: RECONNECT_DELAY };
    let client = ClientHandle::spawn(config, |event| {
        info!(id = event.id, sender = event.sender, "event delivered to client");
        None
    })?;

    if client.wait_connected(Duration::from_secs(5)) {
        info!(local_id = args.local_id, "handshake confirmed with hub");
    } else {
        info!(local_id = args.local_id, "still awaiting hub, will keep retrying in the background");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    info!("shutting down");
    client.shutdown()?;
    Ok(())
}
