//! In-memory topic/channel registry
//!
//! The registry map and every topic's channel map sit behind their own
//! `parking_lot` read/write lock. Creation events are published after the
//! write lock has been released.

use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{Error, Result};
use crate::notify::{ChannelCreated, Notifier, TopicCreated};

/// A consumer group within a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub topic_name: String,
    pub name: String,
}

/// A named stream of messages and its channels
pub struct Topic {
    name: String,
    channels: RwLock<HashMap<String, Channel>>,
    notifier: Arc<Notifier>,
}

impl Topic {
    fn new(name: String, notifier: Arc<Notifier>) -> Self {
        Self {
            name,
            channels: RwLock::new(HashMap::new()),
            notifier,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a channel, creating it (and notifying `new_channel`) if missing
    pub fn get_or_create_channel(&self, name: &str) -> Result<Channel> {
        validate_name(name)?;

        let created = {
            let mut channels = self.channels.write();
            if let Some(channel) = channels.get(name) {
                return Ok(channel.clone());
            }
            let channel = Channel {
                topic_name: self.name.clone(),
                name: name.to_string(),
            };
            channels.insert(name.to_string(), channel.clone());
            channel
        };

        info!(topic = %self.name, channel = %name, "Channel created");
        self.notifier.new_channel.publish(ChannelCreated {
            topic_name: created.topic_name.clone(),
            channel_name: created.name.clone(),
        });

        Ok(created)
    }

    #[must_use]
    pub fn get_channel(&self, name: &str) -> Option<Channel> {
        self.channels.read().get(name).cloned()
    }

    /// Remove a channel, returning whether it existed
    pub fn delete_channel(&self, name: &str) -> bool {
        let removed = self.channels.write().remove(name).is_some();
        if removed {
            info!(topic = %self.name, channel = %name, "Channel deleted");
        }
        removed
    }

    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Read access to the channel map; hold the guard only for in-memory work
    pub fn read_channels(&self) -> RwLockReadGuard<'_, HashMap<String, Channel>> {
        self.channels.read()
    }
}

/// All topics known to this node
pub struct TopologyRegistry {
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    notifier: Arc<Notifier>,
}

impl TopologyRegistry {
    #[must_use]
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            notifier,
        }
    }

    #[must_use]
    pub const fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Get a topic, creating it (and notifying `new_topic`) if missing
    pub fn get_or_create_topic(&self, name: &str) -> Result<Arc<Topic>> {
        validate_name(name)?;

        let created = {
            let mut topics = self.topics.write();
            if let Some(topic) = topics.get(name) {
                return Ok(topic.clone());
            }
            let topic = Arc::new(Topic::new(name.to_string(), self.notifier.clone()));
            topics.insert(name.to_string(), topic.clone());
            topic
        };

        info!(topic = %name, "Topic created");
        self.notifier.new_topic.publish(TopicCreated {
            topic_name: name.to_string(),
        });

        Ok(created)
    }

    #[must_use]
    pub fn get_topic(&self, name: &str) -> Option<Arc<Topic>> {
        self.topics.read().get(name).cloned()
    }

    /// Remove a topic and all of its channels, returning whether it existed
    pub fn delete_topic(&self, name: &str) -> bool {
        let removed = self.topics.write().remove(name).is_some();
        if removed {
            info!(topic = %name, "Topic deleted");
        }
        removed
    }

    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }

    /// Read access to the topic map; hold the guard only for in-memory work
    pub fn read_topics(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Topic>>> {
        self.topics.read()
    }
}

impl Default for TopologyRegistry {
    fn default() -> Self {
        Self::new(Arc::new(Notifier::new()))
    }
}

/// Topic and channel names travel as space-separated protocol parameters
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(Error::InvalidInput(format!(
            "name must be 1-64 characters, got {}",
            name.len()
        )));
    }
    if name == "." || name.chars().any(|c| c.is_whitespace()) {
        return Err(Error::InvalidInput(format!("invalid name {name:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_topic_notifies_once() {
        let registry = TopologyRegistry::default();
        let mut sub = registry.notifier().new_topic.subscribe();

        let first = registry.get_or_create_topic("orders").unwrap();
        let second = registry.get_or_create_topic("orders").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.topic_count(), 1);
        assert_eq!(sub.try_recv().unwrap().topic_name, "orders");
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_create_channel_notifies_once() {
        let registry = TopologyRegistry::default();
        let mut sub = registry.notifier().new_channel.subscribe();
        let topic = registry.get_or_create_topic("orders").unwrap();

        let channel = topic.get_or_create_channel("billing").unwrap();
        topic.get_or_create_channel("billing").unwrap();

        assert_eq!(channel.topic_name, "orders");
        assert_eq!(topic.channel_count(), 1);
        assert_eq!(
            sub.try_recv().unwrap(),
            ChannelCreated {
                topic_name: "orders".to_string(),
                channel_name: "billing".to_string(),
            }
        );
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_delete() {
        let registry = TopologyRegistry::default();
        let topic = registry.get_or_create_topic("orders").unwrap();
        topic.get_or_create_channel("billing").unwrap();

        assert!(topic.delete_channel("billing"));
        assert!(!topic.delete_channel("billing"));
        assert!(topic.get_channel("billing").is_none());

        assert!(registry.delete_topic("orders"));
        assert!(registry.get_topic("orders").is_none());
        assert!(!registry.delete_topic("orders"));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let registry = TopologyRegistry::default();
        assert!(registry.get_or_create_topic("").is_err());
        assert!(registry.get_or_create_topic("has space").is_err());
        assert!(registry.get_or_create_topic(".").is_err());
        assert!(registry.get_or_create_topic(&"x".repeat(65)).is_err());

        let topic = registry.get_or_create_topic("orders").unwrap();
        assert!(topic.get_or_create_channel(".").is_err());
        assert_eq!(topic.channel_count(), 0);
    }
}
