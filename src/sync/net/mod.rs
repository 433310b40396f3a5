use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

pub mod error;
pub mod mem;
pub mod wire;

use error::Error;
use wire::{FactQuery, FactReply};

/// Stable identifier of one end of a connection, used as the registry key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl ConnId {
    /// Allocates a process-unique id for a newly opened connection end.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Answers fact queries on behalf of a server instance. The transport
/// invokes it whenever the remote side of a connection asks for one of the
/// three facts.
pub type Responder = Arc<dyn Fn(FactQuery) -> FactReply + Send + Sync>;

/// Callback armed on a connection and invoked when it closes.
pub type ClosedCallback = Box<dyn FnOnce() + Send + 'static>;

/// One end of an established link to a peer instance. Implemented by the
/// transport collaborator; [`mem`] provides the in-process implementation.
///
/// Contract: `call` resolves on an arbitrary runtime thread, with no
/// ordering guarantee between in-flight calls on the same connection.
/// `on_closed` fires each registered callback at most once, and fires
/// immediately when the connection is already closed at registration time.
pub trait Connection: Send + Sync + std::fmt::Debug {
    fn id(&self) -> ConnId;
    fn call(&self, query: FactQuery) -> BoxFuture<'static, Result<FactReply, Error>>;
    fn on_closed(&self, callback: ClosedCallback);
    fn close(&self);
}

/// Opens connections to peer instances by address.
pub trait Transport: Send + Sync {
    fn connect(&self, addr: &str) -> BoxFuture<'static, Result<Arc<dyn Connection>, Error>>;
}
