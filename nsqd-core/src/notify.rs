//! Topology change notifications
//!
//! Each kind of change gets its own typed [`Feed`], so consumers never have to
//! inspect a payload to learn what it is. Publishing only pushes into
//! unbounded queues and returns; it never waits on a consumer.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Handle used to unsubscribe from a feed
pub type SubscriptionId = u64;

/// A channel was created inside a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCreated {
    pub topic_name: String,
    pub channel_name: String,
}

/// A topic was created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCreated {
    pub topic_name: String,
}

/// Receiving side of a feed subscription
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T> Subscription<T> {
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the feed dropped this subscriber.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take the next event if one is already queued
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

/// Fan-out feed for a single event type
pub struct Feed<T> {
    name: &'static str,
    subscribers: DashMap<SubscriptionId, mpsc::UnboundedSender<T>>,
    next_id: AtomicU64,
}

impl<T: Clone> Feed<T> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, tx);

        debug!(feed = self.name, subscription_id = id, "Subscribed to feed");

        Subscription { id, receiver }
    }

    /// Remove a subscriber. Events already queued stay readable on its receiver.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if self.subscribers.remove(&id).is_some() {
            debug!(feed = self.name, subscription_id = id, "Unsubscribed from feed");
        } else {
            warn!(
                feed = self.name,
                subscription_id = id,
                "Attempted to unsubscribe unknown subscription"
            );
        }
    }

    /// Deliver an event to every subscriber, returning how many received it
    pub fn publish(&self, event: T) -> usize {
        let mut sent_count = 0;
        let mut closed = Vec::new();

        for entry in self.subscribers.iter() {
            if entry.value().send(event.clone()).is_ok() {
                sent_count += 1;
            } else {
                closed.push(*entry.key());
            }
        }

        // Receivers that were dropped without unsubscribing
        for id in closed {
            self.subscribers.remove(&id);
            debug!(feed = self.name, subscription_id = id, "Pruned closed subscription");
        }

        sent_count
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// The two topology feeds of a node
pub struct Notifier {
    pub new_channel: Feed<ChannelCreated>,
    pub new_topic: Feed<TopicCreated>,
}

impl Notifier {
    #[must_use]
    pub fn new() -> Self {
        Self {
            new_channel: Feed::new("new_channel"),
            new_topic: Feed::new("new_topic"),
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(name: &str) -> TopicCreated {
        TopicCreated {
            topic_name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_publish() {
        let feed = Feed::new("new_topic");
        let mut sub = feed.subscribe();

        assert_eq!(feed.subscriber_count(), 1);
        assert_eq!(feed.publish(topic("orders")), 1);

        let received = sub.recv().await.unwrap();
        assert_eq!(received.topic_name, "orders");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let feed = Feed::new("new_topic");
        let mut sub1 = feed.subscribe();
        let mut sub2 = feed.subscribe();
        assert_ne!(sub1.id(), sub2.id());

        assert_eq!(feed.publish(topic("orders")), 2);
        assert_eq!(sub1.recv().await.unwrap().topic_name, "orders");
        assert_eq!(sub2.recv().await.unwrap().topic_name, "orders");
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let feed = Feed::new("new_topic");
        let mut sub = feed.subscribe();

        feed.unsubscribe(sub.id());
        assert_eq!(feed.subscriber_count(), 0);
        assert_eq!(feed.publish(topic("orders")), 0);
        assert!(sub.try_recv().is_none());

        // Unknown ids are tolerated
        feed.unsubscribe(sub.id());
    }

    #[test]
    fn test_publish_prunes_dropped_receivers() {
        let feed = Feed::new("new_channel");
        let sub = feed.subscribe();
        drop(sub);

        let event = ChannelCreated {
            topic_name: "orders".to_string(),
            channel_name: "billing".to_string(),
        };
        assert_eq!(feed.publish(event), 0);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = Notifier::new();
        assert_eq!(notifier.new_topic.publish(topic("orders")), 0);
        assert_eq!(notifier.new_channel.name(), "new_channel");
    }
}
