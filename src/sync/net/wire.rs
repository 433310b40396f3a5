use std::fmt;

use crate::sync::identity::SyncId;

/// The three fact procedures every instance both serves and calls. A
/// handshake issues all three against the remote side; the replies may
/// land in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactQuery {
    /// The peer's domain of responsibility, in wire string form.
    Dor,
    /// The peer's domain of interest, in wire string form.
    Doi,
    /// The peer's process identity.
    SyncId,
}

impl fmt::Display for FactQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FactQuery::Dor => "getDoR",
            FactQuery::Doi => "getDoI",
            FactQuery::SyncId => "getSyncID",
        })
    }
}

/// Reply to a [`FactQuery`]. DoR and DoI travel as their serialized string
/// forms and are only parsed at finalization; the identity travels as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum FactReply {
    Dor(String),
    Doi(String),
    SyncId(SyncId),
}

impl FactReply {
    /// True if this reply has the shape the given query asks for.
    pub fn matches(&self, query: FactQuery) -> bool {
        matches!(
            (self, query),
            (FactReply::Dor(_), FactQuery::Dor)
                | (FactReply::Doi(_), FactQuery::Doi)
                | (FactReply::SyncId(_), FactQuery::SyncId)
        )
    }
}
