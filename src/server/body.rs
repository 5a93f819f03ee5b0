/// How (or whether) a request carries a body.
///
/// Chunked transfer encoding and the upgrade body kind from the original
/// protocol are out of scope here: upgrades are handled at the connection
/// level (`Server::on_upgrade`), and bodies without `Content-Length` are
/// simply empty -- this crate never guesses body length from end-of-stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyKind {
    Fixed(u64),
    None,
}
