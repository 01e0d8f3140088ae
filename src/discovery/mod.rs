//! Peer discovery over UDP broadcast.
//!
//! Every node periodically broadcasts a short role token. Nodes accepting that role record the
//! sender in their [`PeerDirectory`] and forget it once it has been silent for too long.

pub(crate) mod beacon;
pub(crate) mod directory;
