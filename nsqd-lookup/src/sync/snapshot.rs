//! Full-topology snapshot for resyncing a lookupd peer
//!
//! lookupd only hears about creations live, so a peer that (re)connects has
//! to be told about everything that already exists.

use nsqd_core::TopologyRegistry;

use crate::protocol::{AnnounceTarget, Command};

/// Build the announce commands describing every topic and channel.
///
/// Runs entirely under the registry's read locks and returns after releasing
/// them; the caller sends the commands afterwards. Being synchronous keeps
/// the lock guards from ever living across an `.await`.
#[must_use]
pub fn sync_commands(registry: &TopologyRegistry, target: &AnnounceTarget) -> Vec<Command> {
    let mut commands = Vec::new();

    let topics = registry.read_topics();
    for topic in topics.values() {
        let channels = topic.read_channels();
        if channels.is_empty() {
            commands.push(target.topic(topic.name()));
        } else {
            commands.extend(
                channels
                    .values()
                    .map(|channel| target.channel(&channel.topic_name, &channel.name)),
            );
        }
    }

    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::NO_CHANNEL;

    fn target() -> AnnounceTarget {
        AnnounceTarget::new(4150, vec!["node-a".to_string()])
    }

    #[test]
    fn test_empty_registry() {
        let registry = TopologyRegistry::default();
        assert!(sync_commands(&registry, &target()).is_empty());
    }

    #[test]
    fn test_topic_with_channels() {
        let registry = TopologyRegistry::default();
        let orders = registry.get_or_create_topic("orders").unwrap();
        orders.get_or_create_channel("billing").unwrap();
        orders.get_or_create_channel("shipping").unwrap();

        let commands = sync_commands(&registry, &target());
        assert_eq!(commands.len(), 2);
        assert!(commands.iter().all(|c| c.topic() == Some("orders")));
        assert!(!commands.iter().any(Command::is_topic_only));

        let mut channels: Vec<_> = commands.iter().filter_map(Command::channel).collect();
        channels.sort_unstable();
        assert_eq!(channels, vec!["billing", "shipping"]);
    }

    #[test]
    fn test_empty_topic_yields_placeholder() {
        let registry = TopologyRegistry::default();
        registry.get_or_create_topic("events").unwrap();

        let commands = sync_commands(&registry, &target());
        assert_eq!(commands, vec![target().topic("events")]);
        assert_eq!(commands[0].channel(), Some(NO_CHANNEL));
    }

    #[test]
    fn test_command_count_per_topic() {
        let registry = TopologyRegistry::default();
        for (topic, channel_count) in [("a", 0), ("b", 1), ("c", 3), ("d", 0)] {
            let topic = registry.get_or_create_topic(topic).unwrap();
            for i in 0..channel_count {
                topic.get_or_create_channel(&format!("ch{i}")).unwrap();
            }
        }

        let commands = sync_commands(&registry, &target());
        let count = |name: &str| commands.iter().filter(|c| c.topic() == Some(name)).count();

        assert_eq!(commands.len(), 1 + 1 + 3 + 1);
        assert_eq!(count("a"), 1);
        assert_eq!(count("b"), 1);
        assert_eq!(count("c"), 3);
        assert_eq!(count("d"), 1);
    }

    #[test]
    fn test_locks_released_after_snapshot() {
        let registry = TopologyRegistry::default();
        let topic = registry.get_or_create_topic("orders").unwrap();

        let _ = sync_commands(&registry, &target());

        // Both write locks are immediately available again
        registry.get_or_create_topic("late").unwrap();
        topic.get_or_create_channel("billing").unwrap();
        assert_eq!(registry.topic_count(), 2);
    }
}
