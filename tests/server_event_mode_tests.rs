//! Event-mode request delivery and 100-continue (spec §4.2/§4.4): the
//! handler sees `HEADERS` before the body arrives, opts in via
//! `accept_body()` (which releases the deferred `100 Continue`), then
//! drains `DATA`/`COMPLETE` as the upload streams in.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;
use uhttp_engine::config::ServerConfig;
use uhttp_engine::response::Response;
use uhttp_engine::server::{ConnEvent, Server};

#[test]
fn hundred_continue_then_streamed_body_in_event_mode() {
    let config = ServerConfig::new("127.0.0.1", 0).event_mode(true);
    let mut server = Server::bind(config).expect("bind");
    let addr = server.local_addr().expect("local_addr");

    let handle = thread::spawn(move || {
        let mut body = Vec::new();
        let mut done = false;
        for _ in 0..300 {
            if done {
                break;
            }
            if let Some((id, event)) = server.wait_ev(Duration::from_millis(100)) {
                let conn = server.connection_mut(id);
                match event {
                    ConnEvent::Headers => {
                        assert_eq!(conn.request_head().unwrap().path, "/upload");
                        conn.accept_body().expect("accept body");
                    }
                    ConnEvent::Data => {
                        body.extend(conn.read_buffer());
                    }
                    ConnEvent::Complete => {
                        body.extend(conn.read_buffer());
                        conn.respond(Response::ok(format!("received {} bytes", body.len())))
                            .expect("respond");
                        done = true;
                    }
                    ConnEvent::Request => panic!("expected a deferred body, not a whole-burst Request"),
                }
            }
        }
        assert!(done, "never saw Complete");
        assert_eq!(body, b"hello world");
        for _ in 0..10 {
            server.wait(Duration::from_millis(20));
        }
    });

    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .write_all(b"POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 11\r\nExpect: 100-continue\r\n\r\n")
        .unwrap();

    let mut buf = vec![0u8; 4096];
    let n = stream.read(&mut buf).expect("read 100-continue");
    let interim = String::from_utf8_lossy(&buf[..n]);
    assert!(interim.starts_with("HTTP/1.1 100 Continue"));

    stream.write_all(b"hello world").unwrap();

    let mut collected = Vec::new();
    loop {
        let n = stream.read(&mut buf).expect("read final response");
        assert!(n > 0);
        collected.extend_from_slice(&buf[..n]);
        if collected.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&collected);
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.contains("received 11 bytes"));

    handle.join().expect("server thread panicked");
}
