use std::cell::{Cell, RefCell};
use std::fmt::Write as FmtWrite;
use std::rc::Rc;
use std::sync::Arc;
use std::time::SystemTime;

use httpdate::fmt_http_date;

use crate::catalog::{MimeCatalog, StatusCatalog};
use crate::headers::HeaderMap;

/// Written when a `Response` is dropped (or `finish()`ed) without ever
/// calling `send_headers()`. In any real scenario this page must never
/// appear -- if it does, a handler returned without writing anything.
pub const NOT_IMPLEMENTED: &str = concat!(
    "HTTP/1.0 501 Not Implemented\r\n",
    "Content-Type: text/plain\r\n",
    "Content-Length: 21\r\n",
    "\r\n",
    "501 Not Implemented\r\n",
);
pub const NOT_IMPLEMENTED_HEAD: &str = concat!(
    "HTTP/1.0 501 Not Implemented\r\n",
    "Content-Type: text/plain\r\n",
    "Content-Length: 21\r\n",
    "\r\n",
);

pub(crate) type OutBuf = Rc<RefCell<Vec<u8>>>;
/// Shared with the `Connection` so the keep-alive decision can see the
/// final `close_after_send` state even though the `Response` itself is
/// owned (and dropped) inside the handler call, not by the connection.
pub(crate) type CloseFlag = Rc<Cell<bool>>;

#[derive(Debug, Clone, Default)]
pub struct CookieOptions {
    pub expires: Option<SystemTime>,
    pub max_age: Option<i64>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

/// An accumulating response buffer, handed to a handler alongside its
/// `Request`.
///
/// This is a write buffer, not a strict protocol state machine: helper
/// methods are provided for the common cases (status line, headers, a
/// cookie, a canned error page) but nothing stops a caller from writing
/// raw protocol bytes directly with `write_raw`, including its own status
/// line. The only thing the engine enforces is the fallback in `finish()` /
/// `Drop`: a handler that never writes anything still produces a well
/// formed (if unhelpful) HTTP response instead of leaving the socket empty.
pub struct Response {
    out: OutBuf,
    status: u16,
    headers: HeaderMap,
    http_version: String,
    is_head: bool,
    close_after_send: bool,
    close_flag: CloseFlag,
    headers_sent: bool,
    finished: bool,
    status_catalog: Arc<StatusCatalog>,
    mime_catalog: Arc<MimeCatalog>,
}

impl Response {
    pub(crate) fn new(
        out: OutBuf,
        http_version: &str,
        is_head: bool,
        close_after_send: bool,
        close_flag: CloseFlag,
        status_catalog: Arc<StatusCatalog>,
        mime_catalog: Arc<MimeCatalog>,
    ) -> Response {
        close_flag.set(close_after_send);
        Response {
            out,
            status: 200,
            headers: HeaderMap::new(),
            http_version: http_version.to_string(),
            is_head,
            close_after_send,
            close_flag,
            headers_sent: false,
            finished: false,
            status_catalog,
            mime_catalog,
        }
    }

    /// Set the response status code. Unknown codes (not present in the
    /// configured `StatusCatalog`) are replaced with 500 and force
    /// `close_after_send`, per the documented policy for bad status codes.
    pub fn status(&mut self, code: u16) {
        if self.status_catalog.contains(code) {
            self.status = code;
        } else {
            self.status = 500;
            self.close_after_send = true;
            self.close_flag.set(true);
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// Force the connection closed after this response is flushed,
    /// regardless of what the request's `Connection` header asked for.
    pub fn close_after_send(&mut self) {
        self.close_after_send = true;
        self.close_flag.set(true);
    }

    pub fn will_close(&self) -> bool {
        self.close_after_send
    }

    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Look up `extension` in the configured MIME catalog and, if found,
    /// add a matching `Content-Type` header.
    pub fn set_mime(&mut self, extension: &str) {
        if let Some(mime) = self.mime_catalog.mime_type(extension) {
            self.add_header("Content-Type", mime);
        }
    }

    pub fn set_cookie(&mut self, name: &str, value: &str, opts: &CookieOptions) {
        let mut s = format!("{}={}", name, value);
        if let Some(expires) = opts.expires {
            let _ = write!(s, "; Expires={}", fmt_http_date(expires));
        }
        if let Some(max_age) = opts.max_age {
            let _ = write!(s, "; Max-Age={}", max_age);
        }
        if let Some(ref domain) = opts.domain {
            let _ = write!(s, "; Domain={}", domain);
        }
        if let Some(ref path) = opts.path {
            let _ = write!(s, "; Path={}", path);
        }
        if opts.secure {
            s.push_str("; Secure");
        }
        if opts.http_only {
            s.push_str("; HttpOnly");
        }
        self.headers.insert("Set-Cookie", s);
    }

    /// Emit the status line and all accumulated headers, followed by the
    /// terminating blank line. A no-op if headers were already sent (by
    /// this call, `error()`, or `write_raw`) -- this builder does not panic
    /// on repeated or out-of-order calls.
    pub fn send_headers(&mut self) {
        if self.headers_sent {
            return;
        }
        let reason = self.status_catalog.reason(self.status).unwrap_or("");
        let mut out = self.out.borrow_mut();
        out.extend_from_slice(
            format!("HTTP/{} {} {}\r\n", self.http_version, self.status, reason).as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        self.headers_sent = true;
    }

    /// Append raw bytes to the outbound buffer, bypassing every helper
    /// above. Intended for callers that assemble their own status line and
    /// headers (or stream a precomputed response verbatim).
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.out.borrow_mut().extend_from_slice(bytes);
        self.headers_sent = true;
    }

    /// Append a chunk of body bytes. Implicitly calls `send_headers()` if
    /// it hasn't run yet.
    pub fn write_body(&mut self, data: &[u8]) {
        if !self.is_head {
            self.send_headers();
            self.out.borrow_mut().extend_from_slice(data);
        } else {
            self.send_headers();
        }
    }

    /// One-shot canned error response: status line, `Content-Length`, the
    /// body (defaulting to the catalog's reason phrase, or suppressed
    /// entirely when `suppress_body` is set), and *then* any headers
    /// accumulated so far. This header ordering is unusual but intentional
    /// -- see the design notes on the `error()` helper.
    pub fn error(&mut self, code: u16, body: Option<&[u8]>, suppress_body: bool) {
        self.status(code);
        let reason = self.status_catalog.reason(self.status).unwrap_or("Internal Server Error");
        let body_bytes: Vec<u8> = if suppress_body {
            Vec::new()
        } else {
            match body {
                Some(b) => b.to_vec(),
                None => reason.as_bytes().to_vec(),
            }
        };
        let mut out = self.out.borrow_mut();
        out.extend_from_slice(
            format!("HTTP/{} {} {}\r\n", self.http_version, self.status, reason).as_bytes(),
        );
        out.extend_from_slice(format!("Content-Length: {}\r\n", body_bytes.len()).as_bytes());
        if !self.is_head && !body_bytes.is_empty() {
            out.extend_from_slice(&body_bytes);
        }
        for (name, value) in self.headers.iter() {
            out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        self.headers_sent = true;
    }

    /// Signal that the handler is done with this response. Returns `true`
    /// if the response was properly started (so the connection's
    /// keep-alive decision may proceed normally), `false` if the handler
    /// never wrote anything and the engine had to substitute the canned
    /// "not implemented" fallback -- in which case the connection must be
    /// closed regardless of what the request asked for.
    pub fn finish(mut self) -> bool {
        let ok = self.flush_fallback_if_needed();
        self.close_flag.set(self.close_after_send);
        self.finished = true;
        ok
    }

    fn flush_fallback_if_needed(&mut self) -> bool {
        if self.headers_sent {
            return true;
        }
        let mut out = self.out.borrow_mut();
        if self.is_head {
            out.extend_from_slice(NOT_IMPLEMENTED_HEAD.as_bytes());
        } else {
            out.extend_from_slice(NOT_IMPLEMENTED.as_bytes());
        }
        drop(out);
        self.headers_sent = true;
        self.close_after_send = true;
        self.close_flag.set(true);
        false
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        if !self.finished {
            self.flush_fallback_if_needed();
            self.close_flag.set(self.close_after_send);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::{MimeCatalog, StatusCatalog};

    fn new_response(is_head: bool, close: bool) -> (OutBuf, Response) {
        let out: OutBuf = Rc::new(RefCell::new(Vec::new()));
        let resp = Response::new(
            out.clone(),
            "1.1",
            is_head,
            close,
            Rc::new(Cell::new(close)),
            Arc::new(StatusCatalog::default_catalog()),
            Arc::new(MimeCatalog::default_catalog()),
        );
        (out, resp)
    }

    #[test]
    fn close_after_send_is_observable_through_the_shared_flag() {
        let out: OutBuf = Rc::new(RefCell::new(Vec::new()));
        let flag: CloseFlag = Rc::new(Cell::new(false));
        let mut resp = Response::new(
            out,
            "1.1",
            false,
            false,
            flag.clone(),
            Arc::new(StatusCatalog::default_catalog()),
            Arc::new(MimeCatalog::default_catalog()),
        );
        assert!(!flag.get());
        resp.close_after_send();
        assert!(flag.get());
        resp.add_header("Content-Length", "0");
        resp.send_headers();
        drop(resp);
        assert!(flag.get());
    }

    #[test]
    fn minimal_response() {
        let (out, mut resp) = new_response(false, false);
        resp.add_header("Content-Length", "5");
        resp.send_headers();
        resp.write_body(b"hello");
        assert!(resp.finish());
        assert_eq!(
            &out.borrow()[..],
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello"
        );
    }

    #[test]
    fn dropped_without_writing_anything_yields_not_implemented() {
        let (out, resp) = new_response(false, false);
        drop(resp);
        assert_eq!(&out.borrow()[..], NOT_IMPLEMENTED.as_bytes());
    }

    #[test]
    fn dropped_head_response_uses_head_fallback() {
        let (out, resp) = new_response(true, false);
        drop(resp);
        assert_eq!(&out.borrow()[..], NOT_IMPLEMENTED_HEAD.as_bytes());
    }

    #[test]
    fn unknown_status_code_is_replaced_with_500_and_forces_close() {
        let (_out, mut resp) = new_response(false, false);
        resp.status(999);
        assert_eq!(resp.status_code(), 500);
        assert!(resp.will_close());
    }

    #[test]
    fn error_helper_orders_length_body_then_headers() {
        let (out, mut resp) = new_response(false, false);
        resp.add_header("X-Extra", "1");
        resp.error(404, None, false);
        let expected = "HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nNot FoundX-Extra: 1\r\n\r\n";
        assert_eq!(&out.borrow()[..], expected.as_bytes());
    }

    #[test]
    fn set_cookie_formats_expires_and_only_appends_present_attributes() {
        let (_out, mut resp) = new_response(false, false);
        let opts = CookieOptions {
            expires: Some(std::time::UNIX_EPOCH + std::time::Duration::from_secs(0)),
            max_age: Some(3600),
            domain: Some("example.com".to_string()),
            path: Some("/".to_string()),
            secure: true,
            http_only: true,
        };
        resp.set_cookie("session", "abc123", &opts);
        assert_eq!(
            resp.headers.get("Set-Cookie"),
            Some(
                "session=abc123; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=3600; \
                 Domain=example.com; Path=/; Secure; HttpOnly"
            ),
        );
    }

    #[test]
    fn set_cookie_omits_absent_attributes_and_accumulates_repeated_headers() {
        let (_out, mut resp) = new_response(false, false);
        resp.set_cookie("a", "1", &CookieOptions::default());
        resp.set_cookie("b", "2", &CookieOptions::default());
        let values: Vec<_> = resp.headers.get_all("Set-Cookie").collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
    }
}
