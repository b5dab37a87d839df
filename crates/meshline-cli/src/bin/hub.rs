use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use meshline::{HubConfig, HubHandle};
use meshline_utils::directories::default_uds_path;
use tracing::info;

/// Runs a meshline hub, accepting peers over TCP and (optionally) a Unix
/// domain socket.
#[derive(Parser, Debug)]
struct Args {
    /// TCP port to listen on. 0 binds an ephemeral port.
    #[arg(long, default_value_t = 7777)]
    port: u16,

    /// Path for the Unix domain socket listener. Defaults to the
    /// platform's local data directory.
    #[arg(long)]
    uds_path: Option<PathBuf>,

    /// Disables the Unix domain socket listener entirely.
    #[arg(long)]
    no_uds: bool,

    /// This hub's own peer id (used as `sender` on hub-originated control
    /// events).
    #[arg(long, default_value_t = 0)]
    local_id: i8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    meshline_cli::init_tracing();
    let args = Args::parse();

    let uds_path = if args.no_uds {
        None
    } else {
        Some(args.uds_path.unwrap_or_else(|| default_uds_path("meshline")))
    };

    let config = HubConfig { port: args.port, uds_path, local_id: args.local_id };
    let hub = HubHandle::spawn(config, |event| {
        info!(id = event.id, sender = event.sender, "event delivered to hub");
        None
    })?;

    info!(port = hub.port(), "hub listening");

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;

    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    info!("shutting down");
    hub.shutdown()?;
    Ok(())
}
