//! `respond_file` streaming (spec §4.3/P10): the file never sits fully in
//! memory — the send buffer is refilled `file_chunk_size` bytes at a
//! time as it drains, yet the client still receives the exact file
//! contents with a correct `Content-Length`.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;
use uhttp_engine::codec::Headers;
use uhttp_engine::config::ServerConfig;
use uhttp_engine::server::Server;

fn make_config(addr: &str, chunk: usize) -> ServerConfig {
    let mut config = ServerConfig::new(addr, 0);
    config.file_chunk_size = chunk;
    config
}

#[test]
fn respond_file_streams_full_contents_in_small_chunks() {
    let path = std::env::temp_dir().join(format!("uhttp-engine-streaming-test-{}.bin", std::process::id()));
    let body: Vec<u8> = (0u32..5000).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &body).expect("write fixture file");

    let config = make_config("127.0.0.1", 17); // deliberately not a divisor of the file length
    let mut server = Server::bind(config).expect("bind");
    let addr = server.local_addr().expect("local_addr");

    let path_for_server = path.clone();
    let handle = thread::spawn(move || {
        let mut conn_id = None;
        // `try_send` only pulls one chunk per call; budget enough polls
        // for ~5000/17 refills plus slack.
        for _ in 0..2000 {
            if conn_id.is_some() {
                break;
            }
            if let Some(id) = server.wait(Duration::from_millis(50)) {
                let conn = server.connection_mut(id);
                let _req = conn.take_request();
                conn.respond_file(path_for_server.to_str().unwrap(), Headers::new())
                    .expect("respond_file");
                conn_id = Some(id);
            }
        }
        conn_id.expect("never saw the file request");
        // The connection is removed from the slab the instant its send
        // buffer (and file) fully drains and `Connection: close` takes
        // effect, so there's no externally observable "closed but still
        // present" state to poll for — just keep servicing writes for a
        // deadline generous enough to finish a few hundred chunk refills.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            server.wait(Duration::from_millis(5));
        }
    });

    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .write_all(b"GET /payload.bin HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();

    let mut collected = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).expect("read response");
        if n == 0 {
            break;
        }
        collected.extend_from_slice(&buf[..n]);
    }

    let header_end = collected.windows(4).position(|w| w == b"\r\n\r\n").expect("header terminator") + 4;
    let headers = String::from_utf8_lossy(&collected[..header_end]);
    assert!(headers.contains(&format!("content-length: {}", body.len())));
    assert_eq!(&collected[header_end..], body.as_slice());

    handle.join().expect("server thread panicked");
    let _ = std::fs::remove_file(&path);
}
