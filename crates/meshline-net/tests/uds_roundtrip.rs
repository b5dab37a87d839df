use std::thread;
use std::time::Duration;

use meshline_net::{PollEvent, Reactor};
use tempfile::tempdir;

#[test]
fn uds_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("meshline-test.sock");

    let mut server = Reactor::new().unwrap();
    server.listen_uds(&path).unwrap();

    let server_path = path.clone();
    let server_thread = thread::spawn(move || {
        let mut accepted = None;
        while accepted.is_none() {
            server
                .poll(Some(Duration::from_millis(50)), |event| {
                    if let PollEvent::Accept { token, .. } = event {
                        accepted = Some(token);
                    }
                    0
                })
                .unwrap();
        }

        let mut received = Vec::new();
        while received.is_empty() {
            server
                .poll(Some(Duration::from_millis(50)), |event| {
                    if let PollEvent::Data { bytes, .. } = event {
                        received.extend_from_slice(bytes);
                        bytes.len()
                    } else {
                        0
                    }
                })
                .unwrap();
        }
        assert_eq!(received, b"hello over uds");
        let _ = server_path;
    });

    let client_thread = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        let mut client = Reactor::new().unwrap();
        let token = client.connect_uds(&path).unwrap();
        client.write_or_enqueue(token, b"hello over uds");
        client.poll(Some(Duration::from_millis(50)), |_| 0).unwrap();
    });

    server_thread.join().unwrap();
    client_thread.join().unwrap();
}
