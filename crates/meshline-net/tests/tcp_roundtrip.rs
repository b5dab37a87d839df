use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use meshline_net::{PollEvent, Reactor};

#[test]
fn tcp_roundtrip() {
    let bind_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), 0));
    let mut server = Reactor::new().unwrap();
    let (_listen_token, port) = server.listen_tcp(bind_addr).unwrap();
    let connect_addr = SocketAddr::from((IpAddr::V4(Ipv4Addr::LOCALHOST), port));

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
        let peer_token = accepted.unwrap();

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
        assert_eq!(received, b"ping");

        server.write_or_enqueue(peer_token, b"pong");
        server.poll(Some(Duration::from_millis(50)), |_| 0).unwrap();
    });

    let client_thread = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        let mut client = Reactor::new().unwrap();
        let token = client.connect_tcp(connect_addr).unwrap();
        client.write_or_enqueue(token, b"ping");

        let mut received = Vec::new();
        while received.is_empty() {
            client
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
        assert_eq!(received, b"pong");
    });

    server_thread.join().unwrap();
    client_thread.join().unwrap();
}
