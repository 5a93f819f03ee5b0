//! HTTP server facade.
//!
//! `Server` owns the `Config`, the route table, and the two user
//! callbacks (`on_error`, `on_upgrade`). `start()` binds the listener,
//! hands an immutable `Shared` snapshot to the worker pool, and blocks the
//! calling thread running the reactor; mutating the route table or either
//! callback afterward is undefined behavior, as documented.

mod body;
mod conn;
mod reactor;
mod request;
mod response;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use mio::net::TcpStream as MioTcpStream;

use crate::catalog::{MimeCatalog, StatusCatalog};
use crate::config::Config;
use crate::error::Error;
use crate::route::{Handler, Router};

pub use self::body::BodyKind;
pub use self::request::{Head, Request};
pub use self::response::{CookieOptions, Response};

type ErrorCallback = dyn Fn(Option<&Request>, &Error) + Send + Sync;
type UpgradeCallback = dyn Fn(MioTcpStream, Request) + Send + Sync;

/// Everything a connection needs that does not change once `start()` has
/// been called: the route table, the injected catalogs, the phase
/// timeouts, and the two user callbacks. Handed to every worker thread
/// behind one `Arc`.
pub(crate) struct Shared {
    pub(crate) router: Router,
    pub(crate) status_catalog: Arc<StatusCatalog>,
    pub(crate) mime_catalog: Arc<MimeCatalog>,
    pub(crate) request_timeout: Duration,
    pub(crate) content_timeout: Duration,
    pub(crate) on_error: Option<Box<ErrorCallback>>,
    pub(crate) on_upgrade: Option<Box<UpgradeCallback>>,
}

/// The embeddable HTTP server.
///
/// Build one with `Server::new(config)`, register routes and callbacks,
/// then call `start()`. `start()` blocks the calling thread for the
/// lifetime of the server; use a `ServerHandle` (from `Server::handle()`)
/// to call `stop()` from elsewhere (a signal handler, another thread).
pub struct Server {
    config: Config,
    router: Router,
    on_error: Option<Box<ErrorCallback>>,
    on_upgrade: Option<Box<UpgradeCallback>>,
    stop_flag: Arc<AtomicBool>,
}

impl Server {
    pub fn new(config: Config) -> Server {
        Server {
            config,
            router: Router::new(),
            on_error: None,
            on_upgrade: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register `handler` for `method` against `pattern`, an anchored
    /// regex matched against the request path (see `Router::add`).
    pub fn route<H>(&mut self, pattern: &str, method: &str, handler: H) -> Result<&mut Server, Error>
    where
        H: Handler + 'static,
    {
        self.router.add(pattern, method, handler)?;
        Ok(self)
    }

    /// Register a fallback handler for `method`, used when no route
    /// pattern matches the request path.
    pub fn default_route<H>(&mut self, method: &str, handler: H) -> &mut Server
    where
        H: Handler + 'static,
    {
        self.router.add_default(method, handler);
        self
    }

    /// Register the error callback. May be invoked concurrently from any
    /// worker thread once `start()` has run; implementations must tolerate
    /// that.
    pub fn on_error<F>(&mut self, cb: F) -> &mut Server
    where
        F: Fn(Option<&Request>, &Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(cb));
        self
    }

    /// Register the upgrade callback, consulted whenever an incoming
    /// request carries an `Upgrade` header. Once invoked, the engine
    /// relinquishes the socket and all of its timers -- the callback
    /// becomes sole owner.
    pub fn on_upgrade<F>(&mut self, cb: F) -> &mut Server
    where
        F: Fn(MioTcpStream, Request) + Send + Sync + 'static,
    {
        self.on_upgrade = Some(Box::new(cb));
        self
    }

    /// A cheap, `Clone`-able handle whose only purpose is calling `stop()`
    /// from outside the thread blocked inside `start()`.
    pub fn handle(&self) -> ServerHandle {
        ServerHandle { stop_flag: self.stop_flag.clone() }
    }

    /// Bind the configured address, hand the route table and callbacks off
    /// to the worker pool, and block the calling thread running the
    /// reactor. `workers == 0` runs everything on the calling thread with
    /// no background threads at all; `workers >= 1` spawns that many
    /// reactor threads and a dedicated accept thread, and the calling
    /// thread joins them.
    pub fn start(self) -> Result<(), Error> {
        let addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let listener = reactor::bind_listener(addr, self.config.reuse_address)?;
        info!("listening on {} ({} worker(s))", addr, self.config.workers);

        let shared = Arc::new(Shared {
            router: self.router,
            status_catalog: Arc::new(self.config.status_catalog.clone()),
            mime_catalog: Arc::new(self.config.mime_catalog.clone()),
            request_timeout: self.config.request_timeout,
            content_timeout: self.config.content_timeout,
            on_error: self.on_error,
            on_upgrade: self.on_upgrade,
        });

        let result = if self.config.workers == 0 {
            reactor::run_single_threaded(listener, shared, self.stop_flag)
        } else {
            reactor::run_pool(listener, shared, self.config.workers, self.stop_flag)
        };
        result.map_err(Error::Io)
    }

    /// Equivalent to `self.handle().stop()`.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}

/// A handle that signals `Server::stop` from a thread other than the one
/// running inside `start()`.
#[derive(Clone)]
pub struct ServerHandle {
    stop_flag: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
    }
}
