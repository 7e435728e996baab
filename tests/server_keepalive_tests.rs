//! Exercises the server connection state machine over a real loopback
//! TCP socket (spec §4.2–§4.6, P1/P2/P3). The server runs its
//! caller-driven `wait()` loop on a background thread while the test
//! acts as the HTTP client, mirroring the loopback-socket integration
//! style used across the corpus's other HTTP engines.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uhttp_engine::config::ServerConfig;
use uhttp_engine::response::Response;
use uhttp_engine::server::Server;

const POLL: Duration = Duration::from_millis(200);

fn spawn_server(requests: usize) -> (SocketAddr, JoinHandle<()>) {
    spawn_server_with(requests, ServerConfig::new("127.0.0.1", 0))
}

fn spawn_server_with(requests: usize, config: ServerConfig) -> (SocketAddr, JoinHandle<()>) {
    let mut server = Server::bind(config).expect("bind loopback listener");
    let addr = server.local_addr().expect("local_addr");

    let handle = thread::spawn(move || {
        let mut served = 0;
        // Bounded retry budget so a broken test fails fast instead of
        // hanging the test binary.
        for _ in 0..200 {
            if served >= requests {
                break;
            }
            if let Some(id) = server.wait(POLL) {
                let conn = server.connection_mut(id);
                let req = conn.take_request();
                let body = format!("served {}", req.path);
                conn.respond(Response::ok(body)).expect("respond");
                served += 1;
            }
        }
        assert_eq!(served, requests, "server did not see all expected requests");
        // Drain the final write and let the connection settle before the
        // thread exits and drops the listener.
        for _ in 0..10 {
            server.wait(Duration::from_millis(20));
        }
    });
    (addr, handle)
}

fn read_one_response(stream: &mut TcpStream) -> String {
    let mut buf = vec![0u8; 8192];
    loop {
        let n = stream.read(&mut buf).expect("read response");
        assert!(n > 0, "peer closed before a full response arrived");
        let text = String::from_utf8_lossy(&buf[..n]).to_string();
        if text.contains("\r\n\r\n") {
            return text;
        }
    }
}

#[test]
fn keeps_connection_alive_across_two_requests() {
    let (addr, handle) = spawn_server(2);
    let mut stream = TcpStream::connect(addr).expect("connect");

    stream
        .write_all(b"GET /one HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let first = read_one_response(&mut stream);
    assert!(first.starts_with("HTTP/1.1 200 OK"));
    assert!(first.contains("served /one"));
    assert!(first.contains("connection: keep-alive"));

    stream
        .write_all(b"GET /two HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let second = read_one_response(&mut stream);
    assert!(second.contains("served /two"));

    handle.join().expect("server thread panicked");
}

#[test]
fn connection_close_header_ends_the_session() {
    let (addr, handle) = spawn_server(1);
    let mut stream = TcpStream::connect(addr).expect("connect");

    stream
        .write_all(b"GET /bye HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();
    let resp = read_one_response(&mut stream);
    assert!(resp.contains("connection: close"));

    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "socket should be closed by the server after Connection: close");

    handle.join().expect("server thread panicked");
}

#[test]
fn http_1_0_defaults_to_close_without_an_explicit_header() {
    let (addr, handle) = spawn_server(1);
    let mut stream = TcpStream::connect(addr).expect("connect");

    stream.write_all(b"GET /legacy HTTP/1.0\r\nHost: x\r\n\r\n").unwrap();
    let resp = read_one_response(&mut stream);
    assert!(resp.starts_with("HTTP/1.0 200 OK") || resp.starts_with("HTTP/1.1 200 OK"));
    assert!(resp.contains("connection: close"));

    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "HTTP/1.0 with no Connection header must close, not keep-alive");

    handle.join().expect("server thread panicked");
}

#[test]
fn keep_alive_max_requests_forces_close_on_the_final_response() {
    let mut config = ServerConfig::new("127.0.0.1", 0);
    config.keep_alive_max_requests = 2;
    let (addr, handle) = spawn_server_with(2, config);
    let mut stream = TcpStream::connect(addr).expect("connect");

    stream
        .write_all(b"GET /one HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let first = read_one_response(&mut stream);
    assert!(first.contains("connection: keep-alive"));

    stream
        .write_all(b"GET /two HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let second = read_one_response(&mut stream);
    assert!(
        second.contains("connection: close"),
        "the request that hits keep_alive_max_requests must close despite the client asking to keep-alive"
    );

    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "server must close after the max-requests response");

    handle.join().expect("server thread panicked");
}
