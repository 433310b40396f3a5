use std::fmt;

/// Errors surfaced by the peer-sync connection layer. Each variant is local
/// to one connection or one bootstrap target; none of them aborts the
/// subsystem.
#[derive(Debug)]
pub enum Error {
    /// No endpoint is reachable at the given address.
    UnknownAddress(String),
    /// The connection closed before a fact exchange could complete.
    ConnectionClosed,
    /// A peer's domain-of-responsibility payload failed to parse.
    MalformedRegion(serde_json::Error),
    /// A peer's domain-of-interest payload failed to parse.
    MalformedInterest(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownAddress(addr) => {
                write!(f, "no endpoint reachable at {}", addr)
            }
            Error::ConnectionClosed => write!(f, "connection closed"),
            Error::MalformedRegion(e) => {
                write!(f, "unusable domain-of-responsibility payload: {}", e)
            }
            Error::MalformedInterest(e) => {
                write!(f, "unusable domain-of-interest payload: {}", e)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MalformedRegion(e) | Error::MalformedInterest(e) => Some(e),
            _ => None,
        }
    }
}
