//! End-to-end tests running two real UDP endpoints through an in-process relay that
//! behaves like the router in front of the protocol: it forwards each packet to the
//! peer address/port embedded in it and rewrites those fields to the physical sender.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::BytesMut;
use srudp::{Connection, ConnectionConfig, Listener, Packet, PacketType};
use tokio::net::UdpSocket;

/// Spawn a relay; `drop_filter` gets every parsed packet and may eat it.
async fn spawn_relay(mut drop_filter: impl FnMut(&Packet) -> bool + Send + 'static) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let relay_addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = [0u8; Packet::MAX_PACKET_LEN];
        loop {
            let Ok((len, src)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let Ok(packet) = Packet::deser(&mut &buf[..len]) else {
                continue;
            };
            if drop_filter(&packet) {
                continue;
            }

            let SocketAddr::V4(src) = src else { continue };
            let dest = SocketAddr::from((packet.peer_addr, packet.peer_port));
            let forwarded = Packet {
                peer_addr: *src.ip(),
                peer_port: src.port(),
                ..packet
            };

            let mut out = BytesMut::with_capacity(Packet::MAX_PACKET_LEN);
            forwarded.ser(&mut out);
            let _ = socket.send_to(&out, dest).await;
        }
    });

    relay_addr
}

/// Production semantics with timeouts shrunk so that keep-alive driven window slides
///  do not dominate the test run, and with the unbounded waits bounded.
fn fast(mut config: ConnectionConfig) -> ConnectionConfig {
    config.handshake_timeout = Duration::from_millis(100);
    config.ack_timeout = Duration::from_millis(100);
    config.receive_timeout = Duration::from_millis(50);
    config.max_handshake_attempts = Some(100);
    config.max_idle_polls = Some(200);
    config
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn exchange(relay_addr: SocketAddr, request: Vec<u8>, response: Vec<u8>) {
    let listener = Listener::bind(
        "127.0.0.1:0",
        fast(ConnectionConfig::acceptor(relay_addr)),
    )
    .await
    .unwrap();
    let server_port = listener.local_port().unwrap();

    let expected_request = request.clone();
    let server_response = response.clone();
    let server = tokio::spawn(async move {
        let mut connection = listener.accept().await.unwrap();
        let received = connection.receive().await.unwrap();
        assert_eq!(received, expected_request);
        connection.send(&server_response).await.unwrap();
        connection.close();
    });

    let mut connection = Connection::open(
        "127.0.0.1:0",
        Ipv4Addr::LOCALHOST,
        server_port,
        fast(ConnectionConfig::initiator(relay_addr)),
    )
    .await
    .unwrap();
    connection.send(&request).await.unwrap();
    let received = connection.receive().await.unwrap();
    assert_eq!(received, response);
    connection.close();

    server.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_round_trip_through_lossless_relay() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let relay_addr = spawn_relay(|_| false).await;

    // 4500 bytes = 5 chunks of up to 1013 bytes
    exchange(relay_addr, payload(4500), payload(2048)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn payload_lengths_around_the_chunk_boundary() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    for len in [0usize, 1, 1013, 1014, 5000, 10000] {
        let relay_addr = spawn_relay(|_| false).await;
        exchange(relay_addr, payload(len), payload(len / 2)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transfer_survives_a_dropped_data_packet() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    // eat the first copy of DATA #2; the receiver reports the gap and the sender
    //  resends exactly that packet
    let mut dropped = false;
    let relay_addr = spawn_relay(move |packet| {
        if !dropped && packet.packet_type == PacketType::Data && packet.sequence_number == 2 {
            dropped = true;
            return true;
        }
        false
    })
    .await;

    exchange(relay_addr, payload(4500), payload(4500)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transfer_survives_a_dropped_fin_ack() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    // the sender retransmits its FIN when the FIN-ACK goes missing
    let mut dropped = false;
    let relay_addr = spawn_relay(move |packet| {
        if !dropped && packet.packet_type == PacketType::FinAck {
            dropped = true;
            return true;
        }
        false
    })
    .await;

    exchange(relay_addr, payload(100), payload(100)).await;
}
