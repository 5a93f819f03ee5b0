use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use quick_error::quick_error;

use crate::catalog::{MimeCatalog, StatusCatalog};

quick_error! {
    #[derive(Debug)]
    pub enum ConfigError {
        BadPort(err: std::num::ParseIntError) {
            from()
            description("HTTP_PORT is not a valid port number")
        }
        BadBindAddress(value: String) {
            description("HTTP_BIND is not a valid IP address")
            display(me) -> ("{}: {:?}", me.description(), value)
        }
        BadWorkerCount(err: std::num::ParseIntError) {
            description("HTTP_WORKERS is not a valid integer")
        }
        BadTimeout(name: &'static str, err: std::num::ParseIntError) {
            description("timeout override is not a valid integer of milliseconds")
            display(me) -> ("{} ({}): {}", me.description(), name, err)
        }
    }
}

/// Engine configuration. Immutable once handed to `Server::start`.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_address: IpAddr,
    /// Number of worker threads that call `Server::start`'s internal run
    /// loop. `0` means the caller drives the reactor itself.
    pub workers: usize,
    pub request_timeout: Duration,
    pub content_timeout: Duration,
    pub reuse_address: bool,
    pub status_catalog: StatusCatalog,
    pub mime_catalog: MimeCatalog,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            port: 80,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            workers: 1,
            request_timeout: Duration::from_secs(5),
            content_timeout: Duration::from_secs(300),
            reuse_address: true,
            status_catalog: StatusCatalog::default_catalog(),
            mime_catalog: MimeCatalog::default_catalog(),
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// Overlay a handful of environment variables on top of `Config::default()`:
    /// `HTTP_PORT`, `HTTP_BIND`, `HTTP_WORKERS`, `HTTP_REQUEST_TIMEOUT_MS`,
    /// `HTTP_CONTENT_TIMEOUT_MS`. Unset variables leave the default in place;
    /// malformed ones are reported rather than silently ignored.
    pub fn from_env() -> Result<Config, ConfigError> {
        let mut cfg = Config::default();

        if let Ok(v) = env::var("HTTP_PORT") {
            cfg.port = v.parse().map_err(ConfigError::BadPort)?;
        }
        if let Ok(v) = env::var("HTTP_BIND") {
            cfg.bind_address = v.parse()
                .map_err(|_| ConfigError::BadBindAddress(v.clone()))?;
        }
        if let Ok(v) = env::var("HTTP_WORKERS") {
            cfg.workers = v.parse().map_err(ConfigError::BadWorkerCount)?;
        }
        if let Ok(v) = env::var("HTTP_REQUEST_TIMEOUT_MS") {
            let ms: u64 = v.parse().map_err(|e| ConfigError::BadTimeout("HTTP_REQUEST_TIMEOUT_MS", e))?;
            cfg.request_timeout = Duration::from_millis(ms);
        }
        if let Ok(v) = env::var("HTTP_CONTENT_TIMEOUT_MS") {
            let ms: u64 = v.parse().map_err(|e| ConfigError::BadTimeout("HTTP_CONTENT_TIMEOUT_MS", e))?;
            cfg.content_timeout = Duration::from_millis(ms);
        }

        Ok(cfg)
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn bind_address(mut self, addr: IpAddr) -> Self {
        self.bind_address = addr;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn request_timeout(mut self, d: Duration) -> Self {
        self.request_timeout = d;
        self
    }

    pub fn content_timeout(mut self, d: Duration) -> Self {
        self.content_timeout = d;
        self
    }
}
