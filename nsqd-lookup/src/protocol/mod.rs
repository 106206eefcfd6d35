//! lookupd wire protocol

pub mod command;
pub mod response;

pub use command::{AnnounceTarget, Command, MAGIC_V1, NO_CHANNEL};
pub use response::{read_response, MAX_RESPONSE_SIZE};
