//! TCP and UDP server tests over loopback sockets.

mod harness;

use std::io::{Read, Write};
use std::net::{TcpStream, UdpSocket};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use harness::{Event, Recorder, TIMEOUT, init_tracing, local_config, wait_until};
use netframe::{AddressKey, Connection, Handler, Message, Protocol, Server};

fn tcp_client(server: &Server) -> (TcpStream, AddressKey) {
    let stream = TcpStream::connect(server.local_addr()).unwrap();
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    let addr = AddressKey::new(stream.local_addr().unwrap());
    (stream, addr)
}

fn udp_client() -> (UdpSocket, AddressKey) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(TIMEOUT)).unwrap();
    let addr = AddressKey::new(socket.local_addr().unwrap());
    (socket, addr)
}

// =============================================================================
// TCP
// =============================================================================

#[test]
fn test_tcp_tokens_delivered_in_order() {
    init_tracing();
    let (recorder, events) = Recorder::new();
    let server = Server::tcp(local_config(), recorder).unwrap();
    server.start().unwrap();

    let (mut client, addr) = tcp_client(&server);
    client.write_all(b"hello world\r\nfoo\tbar\n").unwrap();

    assert_eq!(events.expect_open(), addr);
    for expected in ["hello", "world", "foo", "bar"] {
        assert_eq!(events.expect_text(expected), addr);
    }
    assert_eq!(server.addresses(), vec![addr]);
}

#[test]
fn test_tcp_non_utf8_token_is_binary() {
    init_tracing();
    let (recorder, events) = Recorder::new();
    let server = Server::tcp(local_config(), recorder).unwrap();
    server.start().unwrap();

    let (mut client, _) = tcp_client(&server);
    client.write_all(&[0xff, 0xfe, b'\n']).unwrap();

    events.expect_open();
    let (_, message) = events.expect_message();
    assert_eq!(message, Message::Binary(vec![0xff, 0xfe]));
}

#[test]
fn test_tcp_echo_writes_payload_verbatim() {
    init_tracing();
    let (recorder, events) = Recorder::new();
    let server = Server::tcp(local_config(), recorder.echo()).unwrap();
    server.start().unwrap();

    let (mut client, _) = tcp_client(&server);
    client.write_all(b"ping\n").unwrap();
    events.expect_open();
    events.expect_text("ping");

    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"ping");
}

#[test]
fn test_tcp_peer_disconnect_removes_connection() {
    init_tracing();
    let (recorder, events) = Recorder::new();
    let server = Server::tcp(local_config(), recorder).unwrap();
    server.start().unwrap();

    let (mut client, addr) = tcp_client(&server);
    client.write_all(b"bye\n").unwrap();
    events.expect_open();
    events.expect_text("bye");
    assert!(server.connection(&addr).is_some());

    drop(client);
    assert_eq!(events.expect_close(), addr);
    assert!(wait_until(|| server.connection_count() == 0));
}

#[test]
fn test_failed_connection_is_removed_and_not_dispatched() {
    init_tracing();
    let (recorder, events) = Recorder::new();
    let server = Server::tcp(local_config(), recorder.fail_on("boom")).unwrap();
    server.start().unwrap();

    let (mut client, addr) = tcp_client(&server);
    client.write_all(b"boom after\n").unwrap();

    events.expect_open();
    events.expect_text("boom");
    assert_eq!(events.expect_close(), addr);
    assert!(server.connection(&addr).is_none());
    events.assert_quiet(Duration::from_millis(100));
}

#[test]
fn test_server_kill_closes_connection() {
    init_tracing();
    let (recorder, events) = Recorder::new();
    let server = Server::tcp(local_config(), recorder).unwrap();
    server.start().unwrap();

    let (mut client, addr) = tcp_client(&server);
    client.write_all(b"x\n").unwrap();
    events.expect_open();
    events.expect_text("x");

    assert!(server.kill(&addr));
    assert!(!server.kill(&addr));
    assert_eq!(events.expect_close(), addr);

    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_stop_closes_every_connection() {
    init_tracing();
    let (recorder, events) = Recorder::new();
    let server = Server::tcp(local_config(), recorder).unwrap();
    server.start().unwrap();

    let (mut a, _) = tcp_client(&server);
    let (mut b, _) = tcp_client(&server);
    a.write_all(b"a\n").unwrap();
    b.write_all(b"b\n").unwrap();
    assert!(wait_until(|| server.connection_count() == 2));

    server.stop();
    assert!(server.is_dead());
    assert_eq!(server.connection_count(), 0);

    let mut closed = 0;
    while closed < 2 {
        if let Event::Close(_) = events.next() {
            closed += 1;
        }
    }
}

struct StopOnMessage {
    server: Arc<OnceLock<Weak<Server>>>,
    closed: crossbeam::channel::Sender<()>,
}

impl Handler for StopOnMessage {
    fn on_message(&mut self, _conn: &Connection, _message: Message) {
        if let Some(server) = self.server.get().and_then(Weak::upgrade) {
            server.stop();
        }
    }

    fn on_close(&mut self, _conn: &Connection) {
        let _ = self.closed.send(());
    }
}

#[test]
fn test_stop_from_inside_a_hook() {
    init_tracing();
    let slot: Arc<OnceLock<Weak<Server>>> = Arc::new(OnceLock::new());
    let (tx, rx) = crossbeam::channel::unbounded();

    let factory_slot = Arc::clone(&slot);
    let server = Arc::new(
        Server::tcp(local_config(), move |_: &AddressKey| StopOnMessage {
            server: Arc::clone(&factory_slot),
            closed: tx.clone(),
        })
        .unwrap(),
    );
    slot.set(Arc::downgrade(&server)).unwrap();
    server.start().unwrap();

    let (mut client, _) = tcp_client(&server);
    client.write_all(b"stop\n").unwrap();

    rx.recv_timeout(TIMEOUT).expect("connection never closed");
    assert!(server.is_dead());
    assert_eq!(server.connection_count(), 0);
}

// =============================================================================
// UDP
// =============================================================================

#[test]
fn test_udp_demultiplexes_by_sender() {
    init_tracing();
    let (recorder, events) = Recorder::new();
    let server = Server::udp(local_config(), recorder).unwrap();
    server.start().unwrap();
    let target = server.local_addr();

    let (a, addr_a) = udp_client();
    let (b, addr_b) = udp_client();
    a.send_to(b"one two", target).unwrap();
    b.send_to(b"three", target).unwrap();
    a.send_to(b"four\n", target).unwrap();

    let mut from_a = Vec::new();
    let mut from_b = Vec::new();
    let mut opens = Vec::new();
    while from_a.len() + from_b.len() < 4 {
        match events.next() {
            Event::Open(addr) => opens.push(addr),
            Event::Message(addr, message) if addr == addr_a => from_a.push(message),
            Event::Message(addr, message) if addr == addr_b => from_b.push(message),
            other => panic!("unexpected {other:?}"),
        }
    }

    assert_eq!(
        from_a,
        vec![Message::text("one"), Message::text("two"), Message::text("four")]
    );
    assert_eq!(from_b, vec![Message::text("three")]);
    opens.sort();
    let mut expected = vec![addr_a, addr_b];
    expected.sort();
    assert_eq!(opens, expected);
    assert_eq!(server.addresses(), expected);
}

#[test]
fn test_udp_echo_replies_to_sender() {
    init_tracing();
    let (recorder, events) = Recorder::new();
    let server = Server::udp(local_config(), recorder.echo()).unwrap();
    server.start().unwrap();

    let (client, _) = udp_client();
    client.send_to(b"hi", server.local_addr()).unwrap();
    events.expect_open();
    events.expect_text("hi");

    let mut buf = [0u8; 16];
    let (n, from) = client.recv_from(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hi");
    assert_eq!(from.port(), server.local_addr().port());
}

#[test]
fn test_udp_kill_then_new_datagram_reconnects() {
    init_tracing();
    let (recorder, events) = Recorder::new();
    let server = Server::udp(local_config(), recorder).unwrap();
    server.start().unwrap();

    let (client, addr) = udp_client();
    client.send_to(b"first", server.local_addr()).unwrap();
    events.expect_open();
    events.expect_text("first");

    assert!(server.kill(&addr));
    assert_eq!(events.expect_close(), addr);

    client.send_to(b"second", server.local_addr()).unwrap();
    assert_eq!(events.expect_open(), addr);
    events.expect_text("second");
    assert_eq!(server.connection_count(), 1);
}

#[test]
fn test_udp_stop_closes_connections() {
    init_tracing();
    let (recorder, events) = Recorder::new();
    let server = Server::bind(Protocol::Udp, local_config(), recorder).unwrap();
    server.start().unwrap();

    let (client, addr) = udp_client();
    client.send_to(b"x", server.local_addr()).unwrap();
    events.expect_open();
    events.expect_text("x");

    server.stop();
    assert_eq!(events.expect_close(), addr);
    assert!(server.is_dead());
    assert_eq!(server.connection_count(), 0);
}
