// Module: sync

pub mod router;
pub mod snapshot;

pub use router::{run_lookup_router, LookupRouter, RouterStats};
pub use snapshot::sync_commands;
