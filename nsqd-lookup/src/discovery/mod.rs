//! lookupd peers and the addresses this node announces itself under

pub mod address;
pub mod peer;

pub use address::{network_addrs, network_addrs_for};
pub use peer::{LookupPeer, PeerTransport, SyncTrigger};
