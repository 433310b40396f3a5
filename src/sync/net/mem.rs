use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use hashbrown::HashMap;
use tokio::sync::mpsc;

use super::error::Error;
use super::wire::{FactQuery, FactReply};
use super::{ClosedCallback, ConnId, Connection, Responder, Transport};

/// In-process network: a table of endpoints addressable by name. Stands in
/// for the production transport in tests and single-process setups; the
/// connection semantics (arbitrary completion threads, symmetric serving,
/// shared close fate) match what a real substrate provides.
#[derive(Clone, Default)]
pub struct MemNetwork {
    endpoints: Arc<Mutex<HashMap<String, EndpointEntry>>>,
}

struct EndpointEntry {
    responder: Responder,
    inbound: mpsc::UnboundedSender<Arc<dyn Connection>>,
}

impl MemNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint under an address. Returns the transport handle
    /// for outbound connects and the stream of accepted inbound connections.
    pub fn endpoint(
        &self,
        addr: &str,
        responder: Responder,
    ) -> (MemEndpoint, mpsc::UnboundedReceiver<Arc<dyn Connection>>) {
        let (inbound, accepted) = mpsc::unbounded_channel();
        self.endpoints
            .lock()
            .expect("endpoint table lock poisoned")
            .insert(addr.to_owned(), EndpointEntry { responder, inbound });
        let endpoint = MemEndpoint {
            addr: addr.to_owned(),
            network: self.clone(),
        };
        (endpoint, accepted)
    }

    /// Opens a connection pair between two registered endpoints. The callee
    /// receives its end on the inbound channel; the caller's end is
    /// returned.
    fn open(&self, from: &str, to: &str) -> Result<Arc<dyn Connection>, Error> {
        let endpoints = self
            .endpoints
            .lock()
            .expect("endpoint table lock poisoned");
        let callee = endpoints
            .get(to)
            .ok_or_else(|| Error::UnknownAddress(to.to_owned()))?;
        let caller = endpoints
            .get(from)
            .ok_or_else(|| Error::UnknownAddress(from.to_owned()))?;

        let pipe = Arc::new(Pipe::default());
        let caller_end: Arc<dyn Connection> = Arc::new(MemConnection {
            id: ConnId::next(),
            peer: callee.responder.clone(),
            pipe: pipe.clone(),
            side: 0,
        });
        let callee_end: Arc<dyn Connection> = Arc::new(MemConnection {
            id: ConnId::next(),
            peer: caller.responder.clone(),
            pipe,
            side: 1,
        });
        callee
            .inbound
            .send(callee_end)
            .map_err(|_| Error::UnknownAddress(to.to_owned()))?;
        Ok(caller_end)
    }
}

/// Outbound half of a registered endpoint.
pub struct MemEndpoint {
    addr: String,
    network: MemNetwork,
}

impl Transport for MemEndpoint {
    fn connect(&self, addr: &str) -> BoxFuture<'static, Result<Arc<dyn Connection>, Error>> {
        let result = self.network.open(&self.addr, addr);
        async move { result }.boxed()
    }
}

/// Shared fate of a connection pair. Closing either end runs both ends'
/// callbacks, each exactly once.
#[derive(Default)]
struct Pipe {
    closed: AtomicBool,
    callbacks: [Mutex<Vec<ClosedCallback>>; 2],
}

/// One end of an in-process connection. Fact queries are answered by the
/// responder the other side registered.
pub struct MemConnection {
    id: ConnId,
    peer: Responder,
    pipe: Arc<Pipe>,
    side: usize,
}

impl std::fmt::Debug for MemConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemConnection")
            .field("id", &self.id)
            .field("side", &self.side)
            .finish_non_exhaustive()
    }
}

impl Connection for MemConnection {
    fn id(&self) -> ConnId {
        self.id
    }

    fn call(&self, query: FactQuery) -> BoxFuture<'static, Result<FactReply, Error>> {
        if self.pipe.closed.load(Ordering::Acquire) {
            return async { Err(Error::ConnectionClosed) }.boxed();
        }
        let peer = self.peer.clone();
        async move {
            // land the reply on whichever worker picks the task back up
            tokio::task::yield_now().await;
            Ok(peer(query))
        }
        .boxed()
    }

    fn on_closed(&self, callback: ClosedCallback) {
        // the registration lock is held across the closed check so a
        // concurrent close cannot miss this callback
        let mut slot = self.pipe.callbacks[self.side]
            .lock()
            .expect("close callback lock poisoned");
        if self.pipe.closed.load(Ordering::Acquire) {
            drop(slot);
            callback();
        } else {
            slot.push(callback);
        }
    }

    fn close(&self) {
        if self.pipe.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for side in &self.pipe.callbacks {
            let callbacks = std::mem::take(
                &mut *side.lock().expect("close callback lock poisoned"),
            );
            for callback in callbacks {
                callback();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn echo_responder(tag: &'static str) -> Responder {
        Arc::new(move |query| match query {
            FactQuery::Dor => FactReply::Dor(format!("{{\"dor\":\"{}\"}}", tag)),
            FactQuery::Doi => FactReply::Doi(format!("{{\"doi\":\"{}\"}}", tag)),
            FactQuery::SyncId => FactReply::SyncId(crate::sync::identity::SyncId::generate()),
        })
    }

    #[tokio::test]
    async fn each_end_queries_the_other_side() {
        let network = MemNetwork::new();
        let (a, _inbound_a) = network.endpoint("a", echo_responder("a"));
        let (_b, mut inbound_b) = network.endpoint("b", echo_responder("b"));

        let a_end = a.connect("b").await.unwrap();
        let b_end = inbound_b.recv().await.unwrap();

        let from_b = a_end.call(FactQuery::Dor).await.unwrap();
        let from_a = b_end.call(FactQuery::Dor).await.unwrap();
        assert_eq!(from_b, FactReply::Dor("{\"dor\":\"b\"}".into()));
        assert_eq!(from_a, FactReply::Dor("{\"dor\":\"a\"}".into()));
        assert_ne!(a_end.id(), b_end.id());
    }

    #[tokio::test]
    async fn connecting_to_an_unknown_address_fails() {
        let network = MemNetwork::new();
        let (a, _inbound) = network.endpoint("a", echo_responder("a"));
        let err = a.connect("nowhere").await.unwrap_err();
        assert!(matches!(err, Error::UnknownAddress(addr) if addr == "nowhere"));
    }

    #[tokio::test]
    async fn close_fires_both_ends_once() {
        let network = MemNetwork::new();
        let (a, _inbound_a) = network.endpoint("a", echo_responder("a"));
        let (_b, mut inbound_b) = network.endpoint("b", echo_responder("b"));

        let a_end = a.connect("b").await.unwrap();
        let b_end = inbound_b.recv().await.unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        for end in [&a_end, &b_end] {
            let fired = fired.clone();
            end.on_closed(Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }));
        }

        a_end.close();
        a_end.close();
        b_end.close();
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        // registering after the fact fires immediately
        let late = fired.clone();
        b_end.on_closed(Box::new(move || {
            late.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert!(matches!(
            b_end.call(FactQuery::Doi).await,
            Err(Error::ConnectionClosed)
        ));
    }
}
