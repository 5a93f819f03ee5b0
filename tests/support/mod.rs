//! Shared test harness: connect-with-retry against a `Server` started on
//! its own thread, and a small raw-socket request/response helper so the
//! integration suite never depends on the crate's own client code.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Once;
use std::thread;
use std::time::Duration;

static INIT_LOGGING: Once = Once::new();

#[allow(dead_code)]
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// `Server::start()` blocks the calling thread, so tests spawn it on its
/// own thread and poll for the listener to come up rather than guessing a
/// fixed delay.
#[allow(dead_code)]
pub fn connect_with_retry(port: u16) -> TcpStream {
    let addr = format!("127.0.0.1:{}", port);
    for _ in 0..200 {
        if let Ok(stream) = TcpStream::connect(&addr) {
            return stream;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("could not connect to {} after retrying", addr);
}

#[allow(dead_code)]
pub fn write_and_read(stream: &mut TcpStream, request: &[u8]) -> Vec<u8> {
    stream.write_all(request).unwrap();
    stream.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                break
            }
            Err(e) => panic!("read error: {}", e),
        }
    }
    buf
}
