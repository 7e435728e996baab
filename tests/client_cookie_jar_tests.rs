//! Exercises the client's cookie jar across two independent requests on the
//! same `Client` (spec §4.9/P9): a `Set-Cookie` absorbed from the first
//! response is sent back as `Cookie:` on the second request without the
//! caller touching the jar directly.

use std::thread;
use std::time::Duration;
use uhttp_engine::codec::Headers;
use uhttp_engine::config::{ClientConfig, ServerConfig};
use uhttp_engine::response::Response;
use uhttp_engine::server::Server;
use uhttp_engine::{Body, Client, Method};

#[test]
fn cookie_set_on_first_response_is_sent_back_on_the_next_request() {
    let config = ServerConfig::new("127.0.0.1", 0);
    let mut server = Server::bind(config).expect("bind");
    let addr = server.local_addr().expect("local_addr");

    let handle = thread::spawn(move || {
        let mut seen_cookie_header = None;
        let mut served = 0;
        for _ in 0..400 {
            if served >= 2 {
                break;
            }
            if let Some(id) = server.wait(Duration::from_millis(200)) {
                let conn = server.connection_mut(id);
                let req = conn.take_request();
                if served == 0 {
                    conn.respond(
                        Response::ok("set it").cookie("session", "abc123"),
                    )
                    .expect("respond with set-cookie");
                } else {
                    seen_cookie_header = req.header("cookie").map(|v| v.to_string());
                    conn.respond(Response::ok("got it")).expect("respond");
                }
                served += 1;
            }
        }
        assert_eq!(served, 2, "expected two requests on the same connection");
        assert_eq!(
            seen_cookie_header.as_deref(),
            Some("session=abc123"),
            "client must echo the jar-absorbed cookie on the following request"
        );
        for _ in 0..10 {
            server.wait(Duration::from_millis(20));
        }
    });

    let config = ClientConfig::new("127.0.0.1").port(addr.port());
    let mut client = Client::new(config);

    client.get("/login").expect("start first request");
    let first = client.wait(Some(Duration::from_secs(5))).expect("complete first exchange");
    assert!(first.is_success());
    assert_eq!(client.cookies().get("session"), Some("abc123".to_string()).as_deref());

    client
        .request(Method::Get, "/whoami", Headers::new(), Body::Empty, Vec::new(), None)
        .expect("start second request");
    let second = client.wait(Some(Duration::from_secs(5))).expect("complete second exchange");
    assert!(second.is_success());

    handle.join().expect("server thread panicked");
}
