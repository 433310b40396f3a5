use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dor::{Dor, Region};
use super::interest::Doi;
use super::net::wire::{FactQuery, FactReply};

/// Globally unique identity of a server instance, stable for the lifetime
/// of its process. Used to detect self-connections and to collapse
/// bidirectional dials onto one peer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncId(Uuid);

impl SyncId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// This instance's own fact set: identity, live domain of responsibility
/// and domain of interest. Constructed once at startup and shared; peers
/// query the three facts during their handshake with us.
pub struct LocalServer {
    sync_id: SyncId,
    dor: Arc<Dor>,
    doi: Doi,
}

impl LocalServer {
    pub fn new(region: Region, doi: Doi) -> Self {
        Self {
            sync_id: SyncId::generate(),
            dor: Arc::new(Dor::new(region)),
            doi,
        }
    }

    pub fn sync_id(&self) -> SyncId {
        self.sync_id
    }

    pub fn dor(&self) -> &Arc<Dor> {
        &self.dor
    }

    pub fn doi(&self) -> &Doi {
        &self.doi
    }

    /// Answers one of the three symmetric fact queries.
    pub fn answer(&self, query: FactQuery) -> FactReply {
        match query {
            FactQuery::Dor => FactReply::Dor(self.dor.to_wire()),
            FactQuery::Doi => FactReply::Doi(self.doi.to_wire()),
            FactQuery::SyncId => FactReply::SyncId(self.sync_id),
        }
    }
}
