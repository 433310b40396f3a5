use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, trace, warn};

use super::dor::Region;
use super::identity::SyncId;
use super::interest::Doi;
use super::net::wire::{FactQuery, FactReply};
use super::net::Connection;
use super::registry::{PeerRegistry, RemoteServer};

/// The three facts a peer must deliver before it is admitted. Fields fill
/// in as replies land, in whatever order they arrive.
#[derive(Default)]
struct Facts {
    dor: Option<String>,
    doi: Option<String>,
    sync_id: Option<SyncId>,
}

impl Facts {
    fn record(&mut self, reply: FactReply) {
        match reply {
            FactReply::Dor(raw) => self.dor = Some(raw),
            FactReply::Doi(raw) => self.doi = Some(raw),
            FactReply::SyncId(id) => self.sync_id = Some(id),
        }
    }

    fn complete(&self) -> Option<(String, String, SyncId)> {
        match (&self.dor, &self.doi, self.sync_id) {
            (Some(dor), Some(doi), Some(sync_id)) => {
                Some((dor.clone(), doi.clone(), sync_id))
            }
            _ => None,
        }
    }
}

/// Per-connection handshake state: the fact accumulator plus the
/// single-fire finalization guard. Two replies can land concurrently and
/// both observe a complete fact set; the compare-and-swap hands the
/// finalize action to exactly one of them.
struct PendingHandshake {
    facts: Mutex<Facts>,
    finalized: AtomicBool,
}

impl PendingHandshake {
    fn new() -> Self {
        Self {
            facts: Mutex::new(Facts::default()),
            finalized: AtomicBool::new(false),
        }
    }

    fn record(&self, reply: FactReply) {
        self.facts
            .lock()
            .expect("handshake fact lock poisoned")
            .record(reply);
    }

    /// Returns the complete fact set to exactly one caller, ever.
    fn take_complete(&self) -> Option<(String, String, SyncId)> {
        let complete = self
            .facts
            .lock()
            .expect("handshake fact lock poisoned")
            .complete()?;
        if self
            .finalized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        Some(complete)
    }
}

/// Starts the handshake on a new connection. Both connect paths, outbound
/// and inbound, come through here: issue the three fact queries and admit
/// the peer once every reply has landed. A connection that never delivers
/// all three facts simply never produces a peer; connection liveness is
/// the transport's problem.
pub fn begin(registry: Arc<PeerRegistry>, local_id: SyncId, conn: Arc<dyn Connection>) {
    let pending = Arc::new(PendingHandshake::new());
    for query in [FactQuery::Dor, FactQuery::Doi, FactQuery::SyncId] {
        let registry = registry.clone();
        let conn = conn.clone();
        let pending = pending.clone();
        tokio::spawn(async move {
            let reply = match conn.call(query).await {
                Ok(reply) if reply.matches(query) => reply,
                Ok(_) => {
                    warn!(
                        "peer on {} answered {} with the wrong reply shape",
                        conn.id(),
                        query
                    );
                    return;
                }
                Err(e) => {
                    debug!("{} on {} failed: {}", query, conn.id(), e);
                    return;
                }
            };
            pending.record(reply);
            if let Some((dor, doi, sync_id)) = pending.take_complete() {
                finalize(&registry, local_id, &conn, &dor, &doi, sync_id);
            }
        });
    }
}

/// Runs at most once per connection: parse the wire forms, drop
/// self-connections, admit the peer and arm the removal hook.
fn finalize(
    registry: &Arc<PeerRegistry>,
    local_id: SyncId,
    conn: &Arc<dyn Connection>,
    dor: &str,
    doi: &str,
    sync_id: SyncId,
) {
    let region = match Region::from_wire(dor) {
        Ok(region) => region,
        Err(e) => {
            warn!("dropping peer on {}: {}", conn.id(), e);
            return;
        }
    };
    let doi = match Doi::from_wire(doi) {
        Ok(doi) => doi,
        Err(e) => {
            warn!("dropping peer on {}: {}", conn.id(), e);
            return;
        }
    };

    // a pair of instances dialing each other sees its own identity come
    // back on the looped connection; expected, not an error
    if sync_id == local_id {
        trace!("connection {} reached ourselves, ignoring", conn.id());
        return;
    }

    let record = RemoteServer::new(conn.clone(), sync_id, region, doi);
    let Some(record) = registry.admit(record) else {
        debug!(
            "peer {} already admitted on another connection, dropping {}",
            sync_id,
            conn.id()
        );
        return;
    };
    debug!("admitted remote server {} on {}", sync_id, conn.id());

    // removal hook armed only for admitted peers, so a connection that
    // never finished its handshake cannot fire a removal
    let registry = registry.clone();
    let conn_id = conn.id();
    conn.on_closed(Box::new(move || {
        if let Some(record) = registry.remove(conn_id) {
            debug!("remote server {} on {} disconnected", record.sync_id(), conn_id);
        }
    }));
}
