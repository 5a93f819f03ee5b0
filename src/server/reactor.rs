//! The I/O reactor binding: a `mio`-based poll loop per worker thread, fed
//! by a dedicated accept thread. Grounded in `examples/threaded.rs` (each
//! worker thread owns its own event loop) and `examples/threaded_reuse_port.rs`
//! (separating the listening concern from the per-connection concern), but
//! using a single listener plus a `crossbeam-channel` handoff (see
//! `DESIGN.md`'s open-question note) instead of per-worker `SO_REUSEPORT`
//! listeners, since this crate's `Config` describes one `port`/`bind_address`.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use log::{trace, warn};
use mio::net::TcpStream as MioTcpStream;
use mio::{Events, Interest, Poll, Token, Waker};
use socket2::{Domain, Socket, Type};

use crate::error::Error;
use crate::server::conn::{Connection, DriveOutcome};
use crate::server::Shared;

const WAKE_TOKEN: Token = Token(usize::MAX);
const POLL_CAPACITY: usize = 1024;
const IDLE_POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Bind a listening socket with `SO_REUSEADDR` (and, on unix, `SO_REUSEPORT`)
/// applied the way `examples/threaded_reuse_port.rs` does it by hand with
/// raw `libc::setsockopt` -- `socket2` gives the same control without the
/// unsafe FFI.
pub(crate) fn bind_listener(addr: SocketAddr, reuse: bool) -> Result<StdTcpListener, Error> {
    let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
    let sock = Socket::new(domain, Type::STREAM, None).map_err(|e| Error::Bind(addr, e))?;
    if reuse {
        sock.set_reuse_address(true).map_err(|e| Error::Bind(addr, e))?;
        #[cfg(unix)]
        sock.set_reuse_port(true).map_err(|e| Error::Bind(addr, e))?;
    }
    sock.bind(&addr.into()).map_err(|e| Error::Bind(addr, e))?;
    sock.listen(1024).map_err(|e| Error::Bind(addr, e))?;
    sock.set_nonblocking(false).map_err(|e| Error::Bind(addr, e))?;
    Ok(sock.into())
}

struct Worker {
    // crossbeam-channel payload is a freshly accepted, still-blocking std
    // socket; the receiving worker flips it to non-blocking itself.
    sender: Sender<std::net::TcpStream>,
    waker: Arc<Waker>,
}

/// Spawn the accept thread plus `workers` reactor threads and block until
/// `stop` is observed. `workers == 0` means the caller's own thread should
/// run the single reactor instead; `Server::start` handles that case by
/// calling `run_single_threaded` rather than this function.
pub(crate) fn run_pool(
    listener: StdTcpListener,
    shared: Arc<Shared>,
    workers: usize,
    stop: Arc<AtomicBool>,
) -> io::Result<()> {
    let mut senders = Vec::with_capacity(workers);
    let mut handles = Vec::with_capacity(workers);

    for _ in 0..workers {
        let (tx, rx) = crossbeam_channel::unbounded();
        let poll = Poll::new()?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKE_TOKEN)?);
        senders.push(Worker { sender: tx, waker: waker.clone() });

        let shared = shared.clone();
        let stop = stop.clone();
        handles.push(thread::spawn(move || {
            if let Err(err) = run_worker(poll, rx, shared, stop) {
                warn!("reactor worker exited with error: {}", err);
            }
        }));
    }

    listener.set_nonblocking(false).ok();
    let mut next = 0usize;
    while !stop.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                trace!("accepted connection from {}", peer);
                let worker = &senders[next % senders.len().max(1)];
                if worker.sender.send(stream).is_ok() {
                    let _ = worker.waker.wake();
                }
                next = next.wrapping_add(1);
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("accept() failed: {}", e);
                break;
            }
        }
    }

    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}

fn run_worker(
    mut poll: Poll,
    conn_rx: Receiver<std::net::TcpStream>,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
) -> io::Result<()> {
    let mut events = Events::with_capacity(POLL_CAPACITY);
    let mut conns: HashMap<Token, Connection> = HashMap::new();
    let mut next_token = 0usize;

    while !stop.load(Ordering::Relaxed) {
        poll.poll(&mut events, Some(IDLE_POLL_TIMEOUT))?;

        for event in events.iter() {
            if event.token() == WAKE_TOKEN {
                while let Ok(stream) = conn_rx.try_recv() {
                    register_connection(stream, &mut poll, &mut conns, &mut next_token, &shared)?;
                }
                continue;
            }
            handle_conn_event(event.token(), event.is_readable(), event.is_writable(), &mut poll, &mut conns, &shared);
        }

        reap_timeouts(&mut poll, &mut conns, &shared);
    }
    Ok(())
}

fn register_connection(
    stream: std::net::TcpStream,
    poll: &mut Poll,
    conns: &mut HashMap<Token, Connection>,
    next_token: &mut usize,
    shared: &Arc<Shared>,
) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    let peer = stream.peer_addr()?;
    let mut mio_stream = MioTcpStream::from_std(stream);
    let token = Token(*next_token);
    *next_token += 1;
    poll.registry().register(&mut mio_stream, token, Interest::READABLE)?;
    let conn = Connection::new(mio_stream, peer, shared.clone(), Instant::now());
    conns.insert(token, conn);
    Ok(())
}

fn handle_conn_event(
    token: Token,
    readable: bool,
    _writable: bool,
    poll: &mut Poll,
    conns: &mut HashMap<Token, Connection>,
    shared: &Arc<Shared>,
) {
    let outcome = match conns.get_mut(&token) {
        Some(conn) => conn.drive(readable),
        None => return,
    };

    match outcome {
        DriveOutcome::Continue { want_write } => {
            if let Some(conn) = conns.get_mut(&token) {
                let interest = if want_write {
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                let _ = poll.registry().reregister(&mut conn.socket, token, interest);
            }
        }
        DriveOutcome::Closed => {
            if let Some(mut conn) = conns.remove(&token) {
                let _ = poll.registry().deregister(&mut conn.socket);
            }
        }
        DriveOutcome::Upgraded(request) => {
            if let Some(mut conn) = conns.remove(&token) {
                let _ = poll.registry().deregister(&mut conn.socket);
                if let Some(cb) = &shared.on_upgrade {
                    cb(conn.socket, request);
                }
            }
        }
    }
}

fn reap_timeouts(poll: &mut Poll, conns: &mut HashMap<Token, Connection>, _shared: &Arc<Shared>) {
    let now = Instant::now();
    let expired: Vec<Token> = conns.iter()
        .filter(|(_, c)| c.deadline <= now)
        .map(|(t, _)| *t)
        .collect();
    for token in expired {
        if let Some(mut conn) = conns.remove(&token) {
            conn.on_timeout();
            let _ = poll.registry().deregister(&mut conn.socket);
        }
    }
}

const LISTENER_TOKEN: Token = Token(usize::MAX - 1);

/// Run a single reactor on the calling thread, combining the accept loop
/// and the connection poll loop into one `mio::Poll` instance instead of
/// handing accepted sockets across a `crossbeam-channel` to a separate
/// worker. Used when `Config::workers == 0`: no background threads are
/// spawned at all, so "the caller drives the reactor" is satisfied in the
/// sense that the calling thread *is* the only thread doing any of this
/// crate's work.
pub(crate) fn run_single_threaded(
    listener: StdTcpListener,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
) -> io::Result<()> {
    listener.set_nonblocking(true)?;
    let mut mio_listener = mio::net::TcpListener::from_std(listener);
    let mut poll = Poll::new()?;
    poll.registry().register(&mut mio_listener, LISTENER_TOKEN, Interest::READABLE)?;

    let mut events = Events::with_capacity(POLL_CAPACITY);
    let mut conns: HashMap<Token, Connection> = HashMap::new();
    let mut next_token = 0usize;

    while !stop.load(Ordering::Relaxed) {
        poll.poll(&mut events, Some(IDLE_POLL_TIMEOUT))?;

        for event in events.iter() {
            if event.token() == LISTENER_TOKEN {
                loop {
                    match mio_listener.accept() {
                        Ok((stream, peer)) => {
                            trace!("accepted connection from {}", peer);
                            register_mio_connection(stream, &mut poll, &mut conns, &mut next_token, &shared)?;
                        }
                        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            warn!("accept() failed: {}", e);
                            break;
                        }
                    }
                }
                continue;
            }
            handle_conn_event(event.token(), event.is_readable(), event.is_writable(), &mut poll, &mut conns, &shared);
        }

        reap_timeouts(&mut poll, &mut conns, &shared);
    }
    Ok(())
}

fn register_mio_connection(
    mut stream: MioTcpStream,
    poll: &mut Poll,
    conns: &mut HashMap<Token, Connection>,
    next_token: &mut usize,
    shared: &Arc<Shared>,
) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    let token = Token(*next_token);
    *next_token += 1;
    poll.registry().register(&mut stream, token, Interest::READABLE)?;
    let conn = Connection::new(stream, peer, shared.clone(), Instant::now());
    conns.insert(token, conn);
    Ok(())
}
