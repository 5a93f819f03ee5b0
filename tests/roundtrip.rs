mod support;

use std::thread;

use reactor_http::{Config, Server};

const PORT: u16 = 18881;

fn spawn_hello_server() {
    thread::spawn(|| {
        let mut server = Server::new(Config::new().port(PORT).workers(1));
        server
            .route(r"^/hello$", "GET", |_req, mut resp| {
                resp.add_header("Content-Length", "5");
                resp.write_body(b"hello");
            })
            .unwrap();
        server.start().unwrap();
    });
}

/// Scenario 1: a plain HTTP/1.1 request against a matching route gets a
/// byte-exact response and the connection is kept alive.
#[test]
fn plain_request_is_kept_alive() {
    support::init_logging();
    spawn_hello_server();
    let mut stream = support::connect_with_retry(PORT);

    let resp = support::write_and_read(
        &mut stream,
        b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n",
    );
    assert_eq!(resp, b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");

    // the socket must still be open: a second request on the same
    // connection gets served too.
    let resp2 = support::write_and_read(
        &mut stream,
        b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n",
    );
    assert_eq!(resp2, b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
}

/// Scenario 2: an explicit `Connection: close` gets the same response body
/// but the engine closes the socket after flushing it.
#[test]
fn connection_close_header_closes_socket_after_flush() {
    support::init_logging();
    spawn_hello_server();
    let mut stream = support::connect_with_retry(PORT);

    let resp = support::write_and_read(
        &mut stream,
        b"GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n",
    );
    assert_eq!(resp, b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");

    // the peer should have closed its end; a further read sees EOF.
    use std::io::Read;
    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(n, 0, "expected EOF after Connection: close");
}
