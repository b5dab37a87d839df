//! spec.md §8: concurrent `send_event` calls from multiple application
//! threads against one `Connection`'s outgoing buffer must each land as a
//! single, intact, non-interleaved frame. `Connection::write_event` locks
//! the shared buffer for the duration of one encode-and-append, so no
//! thread ever observes a half-written neighbor's bytes.

use std::collections::HashSet;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use meshline::{ClientConfig, ClientHandle, ClientTarget, Event, HubConfig, HubHandle};

const WAIT: Duration = Duration::from_secs(2);
const THREADS: usize = 8;
const SENDS_PER_THREAD: usize = 25;

#[test]
fn concurrent_sends_from_one_client_produce_intact_non_interleaved_frames() {
    let hub = HubHandle::spawn(HubConfig { port: 0, uds_path: None, local_id: 1 }, |_event| None)
        .expect("hub spawn");
    let port = hub.port();

    let (tx, rx) = mpsc::channel();
    let receiver = ClientHandle::spawn(
        ClientConfig {
            target: ClientTarget::Tcp("127.0.0.1".into(), port),
            local_id: 3,
            reconnect_delay: Duration::from_secs(10),
        },
        move |event| {
            let _ = tx.send(event.clone());
            None
        },
    )
    .expect("receiver spawn");
    assert!(receiver.wait_connected(WAIT));

    let sender = Arc::new(
        ClientHandle::spawn(
            ClientConfig {
                target: ClientTarget::Tcp("127.0.0.1".into(), port),
                local_id: 2,
                reconnect_delay: Duration::from_secs(10),
            },
            |_event| None,
        )
        .expect("sender spawn"),
    );
    assert!(sender.wait_connected(WAIT));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let sender = sender.clone();
            thread::spawn(move || {
                for i in 0..SENDS_PER_THREAD {
                    let id = (t * SENDS_PER_THREAD + i) as i32;
                    sender.send_event(&Event::new(id, 2, 3, false, vec![t as i32, i as i32]));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut seen_ids = HashSet::new();
    for _ in 0..(THREADS * SENDS_PER_THREAD) {
        let event = rx.recv_timeout(WAIT).expect("every concurrent send should arrive as its own intact frame");
        assert_eq!(event.sender, 2);
        assert_eq!(
            event.payload.len(),
            2,
            "a torn or merged frame would produce the wrong payload length"
        );
        assert!(seen_ids.insert(event.id), "duplicate id {} implies a corrupted/re-split frame", event.id);
    }
    assert_eq!(seen_ids.len(), THREADS * SENDS_PER_THREAD);

    Arc::try_unwrap(sender).unwrap_or_else(|_| panic!("sender handle still shared")).shutdown().unwrap();
    receiver.shutdown().unwrap();
    hub.shutdown().unwrap();
}
