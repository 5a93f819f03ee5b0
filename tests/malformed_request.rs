mod support;

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use reactor_http::{Config, Server};

const PORT: u16 = 18886;

/// Scenario 4: a malformed request line closes the connection silently --
/// no handler runs, and `on_error` is never invoked.
#[test]
fn malformed_head_closes_without_error_callback() {
    support::init_logging();
    let error_seen = Arc::new(AtomicBool::new(false));
    let error_seen_cb = error_seen.clone();

    thread::spawn(move || {
        let mut server = Server::new(Config::new().port(PORT).workers(1));
        server
            .route(r"^/x$", "GET", |_req, mut resp| {
                resp.add_header("Content-Length", "2");
                resp.write_body(b"ok");
            })
            .unwrap();
        server.on_error(move |_req, _err| {
            error_seen_cb.store(true, Ordering::SeqCst);
        });
        server.start().unwrap();
    });

    let mut stream = support::connect_with_retry(PORT);
    let resp = support::write_and_read(&mut stream, b"GOT /x HTP/1.1\r\n\r\n");
    assert!(resp.is_empty(), "engine must not write a response to a malformed request");

    // the socket should be closed from the server side.
    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).unwrap();
    assert_eq!(n, 0);

    thread::sleep(std::time::Duration::from_millis(50));
    assert!(!error_seen.load(Ordering::SeqCst), "malformed head must not invoke on_error");
}
