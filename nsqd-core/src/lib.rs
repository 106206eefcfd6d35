pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod registry;

pub use config::Config;
pub use error::{Error, Result};
pub use notify::{ChannelCreated, Feed, Notifier, Subscription, SubscriptionId, TopicCreated};
pub use registry::{Channel, Topic, TopologyRegistry};
