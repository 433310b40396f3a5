use std::fmt;

use serde_json::Value;

use super::net::error::Error;

/// A domain of interest: the criteria describing which updates a peer
/// wants to receive. The interest-management subsystem owns its meaning;
/// this layer only checks that the payload is well formed and carries it
/// verbatim, so the round trip is byte-identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Doi {
    raw: String,
}

impl Doi {
    pub fn from_wire(raw: &str) -> Result<Self, Error> {
        serde_json::from_str::<Value>(raw).map_err(Error::MalformedInterest)?;
        Ok(Self {
            raw: raw.to_owned(),
        })
    }

    pub fn to_wire(&self) -> String {
        self.raw.clone()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Default for Doi {
    fn default() -> Self {
        Self {
            raw: String::from("{}"),
        }
    }
}

impl fmt::Display for Doi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
