/*!
 * Socket Manager Tests
 * Full lifecycle against real TCP peers, ordering and error classification
 */

use pretty_assertions::assert_eq;
use procnet::syscalls::classify;
use procnet::{ErrorKind, SocketConfig, SocketDescriptor, SocketManager, SocketState};
use proptest::prelude::*;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::thread;

fn listener(sm: &SocketManager) -> (SocketDescriptor, SocketAddr) {
    let mut desc = sm.create_socket().unwrap();
    sm.set_reuse_address(&mut desc).unwrap();
    sm.bind(&mut desc, "127.0.0.1", 0).unwrap();
    sm.listen(&mut desc).unwrap();
    let addr = sm.local_addr(&desc).unwrap();
    (desc, SocketAddr::V4(addr))
}

#[test]
fn test_full_lifecycle_accepts_tcp_client() {
    let sm = SocketManager::new();
    let (desc, addr) = listener(&sm);

    assert_eq!(desc.state(), SocketState::Listening);
    assert_ne!(addr.port(), 0);

    let client = TcpStream::connect(addr).unwrap();
    let conn = sm.accept(&desc).unwrap();
    assert_eq!(conn.state(), SocketState::Connected);

    drop(client);
    sm.close(conn).unwrap();
    sm.close(desc).unwrap();
}

#[test]
fn test_echo_round_trip() {
    let sm = SocketManager::new();
    let (desc, addr) = listener(&sm);

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"hello procnet").unwrap();
        stream.shutdown(Shutdown::Write).unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).unwrap();
        reply
    });

    let conn = sm.accept(&desc).unwrap();
    let mut received = Vec::new();
    loop {
        let chunk = sm.read(&conn).unwrap();
        if chunk.is_empty() {
            break;
        }
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, b"hello procnet");

    let mut sent = 0;
    while sent < received.len() {
        sent += sm.write(&conn, &received[sent..]).unwrap();
    }
    sm.close(conn).unwrap();

    assert_eq!(client.join().unwrap(), b"hello procnet");
    sm.close(desc).unwrap();
}

#[test]
fn test_read_is_capped_by_buffer_size() {
    let sm = SocketManager::with_config(SocketConfig::new().with_read_buffer_size(1024));
    let (desc, addr) = listener(&sm);
    let payload = vec![0xA5u8; 3000];
    let expected = payload.clone();

    let client = thread::spawn(move || {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(&payload).unwrap();
    });

    let conn = sm.accept(&desc).unwrap();
    let mut received = Vec::new();
    loop {
        let chunk = sm.read(&conn).unwrap();
        assert!(chunk.len() <= 1024);
        if chunk.is_empty() {
            break;
        }
        received.extend_from_slice(&chunk);
    }
    client.join().unwrap();
    assert_eq!(received, expected);
}

#[test]
fn test_second_bind_on_same_port_is_os_rejection() {
    let sm = SocketManager::new();
    let (_first, addr) = listener(&sm);

    let mut second = sm.create_socket().unwrap();
    let err = sm.bind(&mut second, "127.0.0.1", addr.port()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OsRejection);
    assert_eq!(err.errno(), Some(nix::errno::Errno::EADDRINUSE));
    assert_eq!(second.state(), SocketState::Created);
}

#[test]
fn test_non_blocking_accept_would_block() {
    let sm = SocketManager::new();
    let mut desc = sm.create_socket().unwrap();
    sm.set_non_blocking(&mut desc).unwrap();
    sm.bind(&mut desc, "127.0.0.1", 0).unwrap();
    sm.listen(&mut desc).unwrap();

    let err = sm.accept(&desc).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransientIo);
    assert!(err.is_retryable());
}

#[test]
fn test_out_of_order_calls_are_rejected() {
    let sm = SocketManager::new();
    let mut desc = sm.create_socket().unwrap();

    assert_eq!(sm.listen(&mut desc).unwrap_err().kind(), ErrorKind::Configuration);
    assert_eq!(sm.read(&desc).unwrap_err().kind(), ErrorKind::Configuration);

    sm.bind(&mut desc, "127.0.0.1", 0).unwrap();
    assert!(sm.bind(&mut desc, "127.0.0.1", 0).is_err());
    assert!(sm.set_reuse_address(&mut desc).is_err());
    assert_eq!(desc.state(), SocketState::Bound);
}

#[test]
fn test_peer_close_reads_empty_and_write_breaks() {
    let sm = SocketManager::new();
    let (local, peer) = sm.pair().unwrap();
    sm.close(peer).unwrap();

    assert!(sm.read(&local).unwrap().is_empty());

    // SIGPIPE is ignored by the Rust runtime, so the write reports EPIPE
    let err = sm.write(&local, b"late").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    assert!(err.kind().is_connection_scoped());
}

#[test]
fn test_classify_connection_errors() {
    use nix::errno::Errno;

    assert_eq!(classify(Errno::ECONNRESET), ErrorKind::PeerReset);
    assert_eq!(classify(Errno::EBADF), ErrorKind::ClosedLocally);
    assert_eq!(classify(Errno::EAGAIN), ErrorKind::TransientIo);
    assert!(!classify(Errno::EADDRINUSE).is_retryable());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_malformed_ipv4_never_reaches_bind(
        ip in prop_oneof![
            "[a-z]{1,12}",
            (256u32..100_000, 0u8..=255, 0u8..=255, 0u8..=255)
                .prop_map(|(a, b, c, d)| format!("{a}.{b}.{c}.{d}")),
            (0u8..=255, 0u8..=255, 0u8..=255).prop_map(|(a, b, c)| format!("{a}.{b}.{c}")),
        ]
    ) {
        let sm = SocketManager::new();
        let mut desc = sm.create_socket().unwrap();

        let err = sm.bind(&mut desc, &ip, 0).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Configuration);
        prop_assert_eq!(err.errno(), None);
        prop_assert_eq!(desc.state(), SocketState::Created);
    }
}
