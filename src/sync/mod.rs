// Peer synchronization for a spatially partitioned world: every instance
// is authoritative for a sub-region and keeps a registry of the other
// instances hosting the same world. A new connection, dialed or accepted,
// is interrogated for three facts (domain of responsibility, domain of
// interest, identity) through independent async queries; the replies can
// land in any order on any worker thread, so each connection carries a
// fact accumulator whose finalization is guarded by a single-fire atomic.
// Only a finalized, non-self connection becomes a registry entry.

// The transport that carries the fact queries lives behind the traits in
// net; net::mem is the in-process implementation used by the tests and
// the demo binary.

pub mod dor;
pub mod endpoint;
pub mod handshake;
pub mod identity;
pub mod interest;
pub mod net;
pub mod registry;
