use std::net::SocketAddr;
use std::num::ParseIntError;

use httparse;

use crate::headers::HeaderMap;
use crate::route::PathMatch;
use crate::server::body::BodyKind;
use crate::util::{parse_cookies, parse_query, split_path_query};

/// Note httparse requires we preallocate array of this size so be wise
/// about changing it.
pub const MAX_HEADERS_NUM: usize = 256;
/// Not preallocated, but an unbounded head buffer is of limited use anyway.
pub const MAX_HEADERS_SIZE: usize = 16384;

/// The request line and headers, parsed out of the head block of a
/// connection's input buffer.
///
/// `Head` carries no body: framing (`Content-Length`) is resolved
/// separately by `content_length()` so that a malformed length can be
/// reported through `on_error` rather than folded into a silent parse
/// failure.
#[derive(Debug)]
pub struct Head {
    pub method: String,
    pub path: String,
    pub http_version: String,
    pub headers: HeaderMap,
}

impl Head {
    /// Parse a complete head block (request line + headers, including the
    /// trailing blank line) out of `buf`.
    ///
    /// Returns `Err(())` on any malformed request line or header block.
    /// Per the documented policy this failure must stay silent: callers
    /// close the connection without invoking `on_error`.
    pub fn parse(buf: &[u8]) -> Result<Head, ()> {
        let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS_NUM];
        let mut req = httparse::Request::new(&mut raw_headers);
        match req.parse(buf) {
            Ok(httparse::Status::Complete(_)) => {}
            _ => return Err(()),
        }
        let method = req.method.ok_or(())?.to_string();
        let path = req.path.ok_or(())?.to_string();
        let http_version = match req.version.ok_or(())? {
            0 => "1.0".to_string(),
            1 => "1.1".to_string(),
            _ => return Err(()),
        };

        let mut headers = HeaderMap::new();
        for h in req.headers.iter() {
            let value = std::str::from_utf8(h.value).map_err(|_| ())?;
            headers.insert(h.name, value);
        }

        Ok(Head { method, path, http_version, headers })
    }

    /// Parse the `Content-Length` header, if present. A malformed value is
    /// surfaced to the caller as a `ParseIntError` -- the one place this
    /// crate converts a body-framing problem into a reported `Error`
    /// instead of a silent connection close.
    pub fn content_length(&self) -> Result<Option<u64>, ParseIntError> {
        match self.headers.get("content-length") {
            Some(v) => v.trim().parse().map(Some),
            None => Ok(None),
        }
    }
}

/// A fully received HTTP request handed to a handler.
///
/// Invariant: by the time a handler sees a `Request`, `content` already
/// holds the full body declared by `Content-Length` (or is empty, if there
/// was none).
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub http_version: String,
    pub headers: HeaderMap,
    pub content: Vec<u8>,
    pub path_match: PathMatch,
    pub peer_addr: SocketAddr,
}

impl Request {
    pub(crate) fn new(head: Head, content: Vec<u8>, peer_addr: SocketAddr) -> Request {
        Request {
            method: head.method,
            path: head.path,
            http_version: head.http_version,
            headers: head.headers,
            content,
            path_match: PathMatch::default(),
            peer_addr,
        }
    }

    /// The path without its query string.
    pub fn path_only(&self) -> &str {
        split_path_query(&self.path).0
    }

    /// Parsed `key=value` pairs from the query string, if any. Duplicate
    /// keys are preserved in order.
    pub fn query(&self) -> Vec<(String, String)> {
        match split_path_query(&self.path).1 {
            Some(q) => parse_query(q),
            None => Vec::new(),
        }
    }

    /// Parsed `Cookie` header, if present.
    pub fn cookies(&self) -> Vec<(String, String)> {
        match self.headers.get("cookie") {
            Some(h) => parse_cookies(h),
            None => Vec::new(),
        }
    }

    /// How the body that's already sitting in `content` was framed. Since
    /// this crate never does chunked decoding, a request without
    /// `Content-Length` always reports `BodyKind::None` rather than
    /// `Fixed(0)`, even though the two are indistinguishable once the
    /// bytes are in hand.
    pub fn body_kind(&self) -> BodyKind {
        if self.content.is_empty() {
            BodyKind::None
        } else {
            BodyKind::Fixed(self.content.len() as u64)
        }
    }

    /// True if the `Connection` header (or HTTP/1.1 default) indicates the
    /// client wants to keep the connection open for another request once
    /// the current response is flushed, and the server hasn't overridden
    /// that via `Response::close_after_send`.
    pub fn wants_keep_alive(&self) -> bool {
        if self.headers.connection_has("close") {
            return false;
        }
        if self.headers.connection_has("keep-alive") {
            return true;
        }
        self.http_version.as_str() >= "1.1"
    }
}
