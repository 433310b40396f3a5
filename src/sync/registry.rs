use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use hashbrown::HashMap;

use super::dor::Region;
use super::identity::SyncId;
use super::interest::Doi;
use super::net::{ConnId, Connection};

/// An admitted remote server. Immutable once constructed; the registry
/// adds and removes whole records, never mutates one in place.
pub struct RemoteServer {
    conn: Arc<dyn Connection>,
    sync_id: SyncId,
    dor: Region,
    doi: Doi,
    admitted_at: DateTime<Utc>,
}

impl RemoteServer {
    pub fn new(conn: Arc<dyn Connection>, sync_id: SyncId, dor: Region, doi: Doi) -> Self {
        Self {
            conn,
            sync_id,
            dor,
            doi,
            admitted_at: Utc::now(),
        }
    }

    pub fn conn(&self) -> &Arc<dyn Connection> {
        &self.conn
    }

    pub fn conn_id(&self) -> ConnId {
        self.conn.id()
    }

    pub fn sync_id(&self) -> SyncId {
        self.sync_id
    }

    pub fn dor(&self) -> &Region {
        &self.dor
    }

    pub fn doi(&self) -> &Doi {
        &self.doi
    }

    pub fn admitted_at(&self) -> DateTime<Utc> {
        self.admitted_at
    }

    /// One line of diagnostics: identity, then the DoI and DoR wire forms.
    pub fn describe(&self) -> String {
        format!(
            "{}: doi = [{}], dor = [{}]",
            self.sync_id,
            self.doi.to_wire(),
            self.dor.to_wire()
        )
    }
}

impl fmt::Debug for RemoteServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteServer")
            .field("conn", &self.conn.id())
            .field("sync_id", &self.sync_id)
            .field("dor", &self.dor)
            .finish()
    }
}

/// Registry membership change, fired synchronously on the thread that
/// performed the mutation.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    Added(Arc<RemoteServer>),
    Removed(Arc<RemoteServer>),
}

type PeerObserver = Box<dyn Fn(&PeerEvent) + Send + Sync>;

/// The live peer set: connection id to admitted record. One lock guards
/// the map and is held only for the mutation or copy, never across fact
/// exchanges or observer execution. A poisoned lock means a mutation
/// panicked midway; no partial state may survive that, so it panics here
/// too.
pub struct PeerRegistry {
    peers: Mutex<HashMap<ConnId, Arc<RemoteServer>>>,
    observers: Mutex<Vec<PeerObserver>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a membership observer. Observers run synchronously on the
    /// mutating thread and must not subscribe further observers from
    /// within a callback.
    pub fn subscribe(&self, observer: impl Fn(&PeerEvent) + Send + Sync + 'static) {
        self.observers
            .lock()
            .expect("peer observer lock poisoned")
            .push(Box::new(observer));
    }

    /// Admits a peer, returning its shared record. Returns `None` without
    /// firing anything when a record with the same identity is already
    /// present: bidirectional dials collapse onto whichever connection
    /// finished its handshake first.
    pub fn admit(&self, record: RemoteServer) -> Option<Arc<RemoteServer>> {
        let record = Arc::new(record);
        {
            let mut peers = self.peers.lock().expect("peer registry lock poisoned");
            if peers.values().any(|peer| peer.sync_id == record.sync_id) {
                return None;
            }
            peers.insert(record.conn_id(), record.clone());
        }
        self.notify(&PeerEvent::Added(record.clone()));
        Some(record)
    }

    /// Removes the record for a closed connection, if one was admitted.
    pub fn remove(&self, conn_id: ConnId) -> Option<Arc<RemoteServer>> {
        let removed = {
            let mut peers = self.peers.lock().expect("peer registry lock poisoned");
            peers.remove(&conn_id)
        };
        if let Some(record) = &removed {
            self.notify(&PeerEvent::Removed(record.clone()));
        }
        removed
    }

    pub fn lookup(&self, conn_id: ConnId) -> Option<Arc<RemoteServer>> {
        self.peers
            .lock()
            .expect("peer registry lock poisoned")
            .get(&conn_id)
            .cloned()
    }

    /// A copy of the peer set at the instant of the call; later mutations
    /// do not affect it.
    pub fn snapshot(&self) -> Vec<Arc<RemoteServer>> {
        self.peers
            .lock()
            .expect("peer registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().expect("peer registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, event: &PeerEvent) {
        for observer in self
            .observers
            .lock()
            .expect("peer observer lock poisoned")
            .iter()
        {
            observer(event);
        }
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
