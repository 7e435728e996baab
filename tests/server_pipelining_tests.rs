//! Pipelining order preservation (spec §4.2/§9 invariant, P2): two
//! requests written to the wire in a single burst, before either
//! response has been read, must still be answered in request order with
//! no interleaving on the wire.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;
use uhttp_engine::config::ServerConfig;
use uhttp_engine::response::Response;
use uhttp_engine::server::Server;

#[test]
fn pipelined_requests_are_answered_in_order() {
    let config = ServerConfig::new("127.0.0.1", 0);
    let mut server = Server::bind(config).expect("bind");
    let addr = server.local_addr().expect("local_addr");

    let handle = thread::spawn(move || {
        let mut served = 0;
        for _ in 0..200 {
            if served >= 2 {
                break;
            }
            if let Some(id) = server.wait(Duration::from_millis(200)) {
                let conn = server.connection_mut(id);
                let req = conn.take_request();
                conn.respond(Response::ok(format!("body:{}", req.path))).expect("respond");
                served += 1;
            }
        }
        assert_eq!(served, 2);
        for _ in 0..10 {
            server.wait(Duration::from_millis(20));
        }
    });

    let mut stream = TcpStream::connect(addr).expect("connect");
    let pipelined = [
        b"GET /first HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n".as_slice(),
        b"GET /second HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n".as_slice(),
    ]
    .concat();
    stream.write_all(&pipelined).unwrap();

    // Read until both full responses have arrived, then check ordering.
    let mut collected = Vec::new();
    let mut buf = [0u8; 4096];
    while collected.windows(b"body:second".len()).all(|w| w != b"body:second") {
        let n = stream.read(&mut buf).expect("read");
        assert!(n > 0, "peer closed before both responses arrived");
        collected.extend_from_slice(&buf[..n]);
    }
    let text = String::from_utf8_lossy(&collected);
    let first_idx = text.find("body:first").expect("first body present");
    let second_idx = text.find("body:second").expect("second body present");
    assert!(first_idx < second_idx, "responses arrived out of request order");

    handle.join().expect("server thread panicked");
}
