//! Integration tests for connection admission control.

use kiln_cache::ThreadSafeCache;
use kiln_server::{Config, Server};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

fn start_server(max_connections: usize) -> Server {
    let config_str = format!(
        r#"
        [listener]
        address = "127.0.0.1:0"

        [cache]
        max_bytes = 1024

        [limits]
        max_connections = {max_connections}
        read_timeout_secs = 1

        [pool]
        low_watermark = 1
        high_watermark = 8
        max_queue = 8

        [logging]
        level = "warn"
        "#
    );
    let config: Config = toml::from_str(&config_str).unwrap();
    let cache = ThreadSafeCache::new(config.cache.max_bytes);
    Server::start(&config, cache).unwrap()
}

fn connect(server: &Server) -> TcpStream {
    let stream = TcpStream::connect(server.local_addr()).unwrap();
    stream.set_nodelay(true).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    stream
}

fn round_trip(stream: &mut TcpStream) {
    stream.write_all(b"set k 1\r\nv\r\n").unwrap();
    let mut reply = [0u8; 8];
    stream.read_exact(&mut reply).unwrap();
    assert_eq!(&reply, b"STORED\r\n");
}

#[test]
fn exactly_max_connections_are_served() {
    let server = start_server(1);

    // The first connection occupies the only slot.
    let mut first = connect(&server);
    round_trip(&mut first);
    assert_eq!(server.live_connections(), 1);

    // The second is closed by admission control without a reply.
    let mut second = connect(&server);
    second.write_all(b"get k\r\n").unwrap();
    let mut byte = [0u8; 1];
    assert_eq!(
        second.read(&mut byte).unwrap(),
        0,
        "rejected socket must be closed"
    );

    // The first connection is unaffected.
    round_trip(&mut first);
}

#[test]
fn slot_frees_up_when_a_connection_ends() {
    let server = start_server(1);

    {
        let mut first = connect(&server);
        round_trip(&mut first);
    } // client close ends the worker

    // The acceptor drains the finished list on its next iterations;
    // retry until the slot is reusable.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let mut stream = connect(&server);
        stream.write_all(b"get k\r\n").unwrap();
        let mut buf = [0u8; 5];
        match stream.read_exact(&mut buf) {
            Ok(()) => {
                assert_eq!(&buf[..], b"VALUE");
                break;
            }
            Err(_) if Instant::now() < deadline => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(e) => panic!("slot never freed: {}", e),
        }
    }
}
