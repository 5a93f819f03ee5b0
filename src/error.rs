use std::io;
use std::net::SocketAddr;
use std::num::ParseIntError;

use quick_error::quick_error;

quick_error! {
    /// Error type delivered to `Server::on_error` and returned by setup-time
    /// calls such as `Server::start`.
    ///
    /// Note, you should not match the enum values and/or make an exhaustive
    /// match over the enum. More variants will be added at will.
    ///
    /// Use the `HttpError` trait instead when you need a status code.
    #[derive(Debug)]
    pub enum Error {
        /// `Content-Length` header present but not a valid unsigned integer
        ProtocolError(err: ParseIntError) {
            from()
            description("error parsing Content-Length header")
            display(me) -> ("{}: {}", me.description(), err)
        }
        /// a handler panicked during its synchronous portion, or an
        /// operation was aborted by a phase timer shutting the socket down
        OperationCancelled {
            description("handler panicked or operation was cancelled by a timeout")
        }
        /// any other I/O failure reported by the reactor
        Io(err: io::Error) {
            from()
            description("I/O error")
            display(me) -> ("{}: {}", me.description(), err)
        }
        /// `Server::start` failed to bind the configured address
        Bind(addr: SocketAddr, err: io::Error) {
            description("failed to bind listening socket")
            display(me) -> ("{} on {}: {}", me.description(), addr, err)
        }
        /// a route was registered with a pattern that does not compile
        BadRoute(pattern: String, err: regex::Error) {
            description("route pattern does not compile as a regex")
            display(me) -> ("{} {:?}: {}", me.description(), pattern, err)
        }
    }
}

/// A trait which represents an error which can be formatted as an HTTP
/// error response.
pub trait HttpError {
    /// Return HTTP status code and status text
    fn http_status(&self) -> (u16, &'static str);
}

impl HttpError for Error {
    fn http_status(&self) -> (u16, &'static str) {
        use self::Error::*;
        match *self {
            ProtocolError(_) => (400, "Bad Request"),
            OperationCancelled => (504, "Gateway Timeout"),
            Io(_) => (500, "Internal Server Error"),
            Bind(..) => (500, "Internal Server Error"),
            BadRoute(..) => (500, "Internal Server Error"),
        }
    }
}
