pub mod discovery;
pub mod error;
pub mod protocol;
pub mod sync;

pub use discovery::{network_addrs, LookupPeer, PeerTransport, SyncTrigger};
pub use error::{Error, Result};
pub use protocol::{AnnounceTarget, Command, NO_CHANNEL};
pub use sync::{run_lookup_router, LookupRouter, RouterStats};
