//! spec.md §8 scenario 4 (liveness across many peers), scaled down for test
//! runtime: a handful of raw TCP and UDS peers complete the handshake, then
//! answer every `ALIVE` with `ALIVE_CONFIRM` and count how many pings they
//! receive over several probe intervals.

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use meshline::{HubConfig, HubHandle};

const RUN_FOR: Duration = Duration::from_millis(4_500);

trait RawPeer: Read + Write {}
impl RawPeer for TcpStream {}
impl RawPeer for UnixStream {}

fn handshake<S: RawPeer>(mut stream: S, peer_id: i8) -> S {
    let mut buf = [0u8; 256];
    let n = stream.read(&mut buf).expect("read CONFIRMED");
    let mut handshake_id = 0;
    meshline::framer::parse_all(&buf[..n], |event| {
        assert_eq!(event.id, meshline::control::CONFIRMED);
        handshake_id = event.payload[0];
    });
    let connected =
        meshline::Event::new(meshline::control::CONNECTED, peer_id, 0, false, vec![handshake_id]);
    stream.write_all(&meshline::framer::encode(&connected)).unwrap();
    stream
}

/// Runs until `RUN_FOR` elapses, replying to every `ALIVE` and counting how
/// many it saw. Uses a short read timeout so the loop can notice the
/// deadline without blocking forever on an idle socket.
fn run_and_count_alive<S: RawPeer>(mut stream: S) -> usize {
    let deadline = Instant::now() + RUN_FOR;
    let mut count = 0;
    let mut buf = [0u8; 256];
    while Instant::now() < deadline {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                let mut replies = Vec::new();
                meshline::framer::parse_all(&buf[..n], |event| {
                    if event.id == meshline::control::ALIVE {
                        count += 1;
                        let reply =
                            meshline::Event::new(meshline::control::ALIVE_CONFIRM, event.receiver, 0, false, vec![]);
                        replies.extend(meshline::framer::encode(&reply));
                    }
                });
                if !replies.is_empty() {
                    let _ = stream.write_all(&replies);
                }
            }
            Err(_) => {}
        }
    }
    count
}

#[test]
fn liveness_probes_reach_multiple_dual_transport_peers() {
    let dir = tempfile::tempdir().unwrap();
    let uds_path = dir.path().join("meshline-liveness.sock");

    let config = HubConfig { port: 0, uds_path: Some(uds_path.clone()), local_id: 1 };
    let hub = HubHandle::spawn(config, |_event| None).expect("hub spawn");
    let port = hub.port();

    let counts = Arc::new((0..4).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());
    let mut threads = Vec::new();

    for (i, peer_id) in [2i8, 3].into_iter().enumerate() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        let counts = counts.clone();
        threads.push(thread::spawn(move || {
            let stream = TcpStream::connect(addr).expect("tcp connect");
            stream.set_nodelay(true).unwrap();
            stream.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
            let stream = handshake(stream, peer_id);
            counts[i].store(run_and_count_alive(stream), Ordering::Relaxed);
        }));
    }

    for (i, peer_id) in [4i8, 5].into_iter().enumerate() {
        let path = uds_path.clone();
        let counts = counts.clone();
        threads.push(thread::spawn(move || {
            let stream = UnixStream::connect(&path).expect("uds connect");
            stream.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
            let stream = handshake(stream, peer_id);
            counts[i + 2].store(run_and_count_alive(stream), Ordering::Relaxed);
        }));
    }

    for t in threads {
        t.join().unwrap();
    }

    for (i, count) in counts.iter().enumerate() {
        let seen = count.load(Ordering::Relaxed);
        assert!(seen >= 3, "peer {i} only observed {seen} ALIVE events in {RUN_FOR:?}");
    }

    hub.shutdown().unwrap();
}
