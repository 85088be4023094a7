//! End-to-end socket tests driving a real [`Server`] over loopback TCP.
//!
//! Uses a stub echo-style handler rather than [`packetbeam::reference_handler`]
//! since these tests exercise the reactor/framing/worker-pool plumbing, not
//! the MySQL-backed business logic (which needs a live database).

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fake::faker::lorem::en::Sentence;
use fake::Fake;
use rand::Rng;

use packetbeam::{BusinessHandler, Config, Request, Response, Server};

fn test_config(port: u16) -> Config {
    serde_json::from_str(&format!(
        r#"{{
            "ip": "127.0.0.1",
            "port": {port},
            "db_host": "unused",
            "db_user": "unused",
            "db_passwd": "unused",
            "thread_pool_size": 4
        }}"#
    ))
    .unwrap()
}

/// A handler that echoes the request body back, prefixed with the number of
/// messages it has seen so far, and exposes that counter for assertions.
fn counting_echo_handler() -> (BusinessHandler, Arc<AtomicI64>) {
    let counter = Arc::new(AtomicI64::new(0));
    let seen = counter.clone();
    let handler: BusinessHandler = Arc::new(move |request: &Request, response: Response| {
        seen.fetch_add(1, Ordering::SeqCst);
        response.send(request.body()).unwrap();
    });
    (handler, counter)
}

fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = (body.len() as u32).to_le_bytes().to_vec();
    out.extend_from_slice(body);
    out
}

fn read_one_frame(stream: &mut TcpStream) -> Vec<u8> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).unwrap();
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).unwrap();
    body
}

fn start_server(handler: BusinessHandler) -> (std::net::SocketAddr, packetbeam::ShutdownHandle) {
    let config = test_config(0);
    let server = Server::new(&config, handler).unwrap();
    let addr = server.local_addr().unwrap();
    let (_join, shutdown) = server.spawn();
    (addr, shutdown)
}

#[test]
fn single_round_trip() {
    let (handler, _counter) = counting_echo_handler();
    let (addr, shutdown) = start_server(handler);

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(&frame(b"hello")).unwrap();
    let reply = read_one_frame(&mut stream);
    assert_eq!(reply, b"hello");

    shutdown.request();
}

#[test]
fn split_length_prefix_across_writes() {
    let (handler, _counter) = counting_echo_handler();
    let (addr, shutdown) = start_server(handler);

    let mut stream = TcpStream::connect(addr).unwrap();
    let packet = frame(b"abcdef");
    stream.write_all(&packet[0..2]).unwrap();
    thread::sleep(Duration::from_millis(20));
    stream.write_all(&packet[2..]).unwrap();

    let reply = read_one_frame(&mut stream);
    assert_eq!(reply, b"abcdef");

    shutdown.request();
}

#[test]
fn two_messages_in_one_write_both_get_replies() {
    let (handler, _counter) = counting_echo_handler();
    let (addr, shutdown) = start_server(handler);

    let mut stream = TcpStream::connect(addr).unwrap();
    let mut packet = frame(b"first");
    packet.extend(frame(b"second"));
    stream.write_all(&packet).unwrap();

    assert_eq!(read_one_frame(&mut stream), b"first");
    assert_eq!(read_one_frame(&mut stream), b"second");

    shutdown.request();
}

#[test]
fn random_sized_bodies_round_trip_intact() {
    let (handler, _counter) = counting_echo_handler();
    let (addr, shutdown) = start_server(handler);

    let mut stream = TcpStream::connect(addr).unwrap();
    let mut rng = rand::thread_rng();
    for _ in 0..20 {
        let words = rng.gen_range(1..40);
        let sentence: String = Sentence(words..words + 1).fake();
        stream.write_all(&frame(sentence.as_bytes())).unwrap();
        assert_eq!(read_one_frame(&mut stream), sentence.as_bytes());
    }

    shutdown.request();
}

#[test]
fn many_concurrent_connections_each_get_ordered_replies() {
    let (handler, _counter) = counting_echo_handler();
    let (addr, shutdown) = start_server(handler);

    let clients: Vec<_> = (0..100)
        .map(|client_id| {
            thread::spawn(move || {
                let mut stream = TcpStream::connect(addr).unwrap();
                for i in 0..10 {
                    let body = format!("client-{client_id}-msg-{i}");
                    stream.write_all(&frame(body.as_bytes())).unwrap();
                    let reply = read_one_frame(&mut stream);
                    assert_eq!(reply, body.as_bytes());
                }
            })
        })
        .collect();

    for client in clients {
        client.join().unwrap();
    }

    shutdown.request();
}
