//! End-to-end exercise of the client's transparent Digest retry (spec
//! §4.7/§4.8, P8) against the crate's own server half over loopback TCP:
//! first request gets `401` + `WWW-Authenticate: Digest`, the client
//! re-issues with a computed `Authorization` header on the same
//! connection, second request succeeds.

use std::thread;
use std::time::Duration;
use uhttp_engine::codec::Headers;
use uhttp_engine::config::{ClientConfig, ServerConfig};
use uhttp_engine::response::Response;
use uhttp_engine::server::Server;
use uhttp_engine::Client;

#[test]
fn client_retries_once_with_digest_auth_on_401() {
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
                let authorized = req
                    .header("authorization")
                    .map(|v| v.to_ascii_lowercase().starts_with("digest "))
                    .unwrap_or(false);
                if authorized {
                    conn.respond(Response::ok("authenticated")).expect("respond 200");
                } else {
                    let challenge = r#"Digest realm="testrealm", qop="auth", nonce="abc123nonce", algorithm=MD5"#;
                    conn.respond(
                        Response::new(401)
                            .header("www-authenticate", challenge)
                            .body("auth required"),
                    )
                    .expect("respond 401");
                }
                served += 1;
            }
        }
        assert_eq!(served, 2, "expected exactly one challenge and one authorized retry");
        for _ in 0..10 {
            server.wait(Duration::from_millis(20));
        }
    });

    let config = ClientConfig::new("127.0.0.1").port(addr.port()).auth("alice", "wonderland");
    let mut client = Client::new(config);
    client.get("/secret").expect("start request");
    let response = client.wait(Some(Duration::from_secs(5))).expect("complete exchange");

    assert_eq!(response.status(), 200);
    assert_eq!(response.body(), b"authenticated");
    assert!(client.cookies().is_empty());

    handle.join().expect("server thread panicked");
}

#[test]
fn client_sends_basic_auth_from_first_request_without_challenge() {
    let config = ServerConfig::new("127.0.0.1", 0);
    let mut server = Server::bind(config).expect("bind");
    let addr = server.local_addr().expect("local_addr");

    let handle = thread::spawn(move || {
        let mut seen_header = None;
        for _ in 0..200 {
            if let Some(id) = server.wait(Duration::from_millis(200)) {
                let conn = server.connection_mut(id);
                let req = conn.take_request();
                seen_header = req.header("authorization").map(|v| v.to_string());
                conn.respond(Response::ok("ok")).expect("respond");
                break;
            }
        }
        assert_eq!(seen_header.as_deref(), Some("Basic YWxpY2U6d29uZGVybGFuZA=="));
    });

    let config = ClientConfig::new("127.0.0.1").port(addr.port()).auth("alice", "wonderland");
    let mut client = Client::new(config);
    client
        .request(
            uhttp_engine::Method::Get,
            "/open",
            Headers::new(),
            uhttp_engine::Body::Empty,
            Vec::new(),
            None,
        )
        .expect("start request");
    let response = client.wait(Some(Duration::from_secs(5))).expect("complete exchange");
    assert!(response.is_success());

    handle.join().expect("server thread panicked");
}
