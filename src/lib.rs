//! A small embeddable HTTP/1.x server library: single-process,
//! event-driven, regex-routed, with per-phase timeouts and explicit
//! keep-alive handling.
//!
//! Currently there is only an HTTP/1.x server implementation. HTTP/2,
//! chunked transfer encoding, and TLS are not provided -- see the crate's
//! design notes for the full list of non-goals.

mod catalog;
mod config;
mod error;
mod headers;
mod route;
pub mod server;
mod util;

pub use crate::catalog::{MimeCatalog, StatusCatalog};
pub use crate::config::{Config, ConfigError};
pub use crate::error::{Error, HttpError};
pub use crate::headers::HeaderMap;
pub use crate::route::{Handler, PathMatch, Router};
pub use crate::server::{CookieOptions, Head, Request, Response, Server, ServerHandle};
pub use crate::util::{parse_cookies, parse_query, url_decode, url_encode};
