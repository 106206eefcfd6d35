//! Lookup router
//!
//! Keeps every configured lookupd peer informed about this node's topology:
//! - PING heartbeats on a fixed interval
//! - ANNOUNCE for every topic/channel created while running
//! - a full topology replay to any peer that (re)connects
//!
//! All peer I/O happens on the router's own task, one command at a time.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use nsqd_core::config::LookupConfig;
use nsqd_core::{ChannelCreated, Notifier, Subscription, TopicCreated, TopologyRegistry};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::snapshot::sync_commands;
use crate::discovery::{LookupPeer, PeerTransport, SyncTrigger};
use crate::error::{Error, Result};
use crate::protocol::{AnnounceTarget, Command};

/// Minimum gap between a failed resync of a peer and the next one
pub const DEFAULT_RESYNC_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Counters describing what a router did over its lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Heartbeat ticks handled
    pub heartbeats: u64,
    /// Topic/channel creation events announced
    pub announcements: u64,
    /// Resync batches started
    pub resyncs: u64,
    /// Resync requests postponed because the peer just failed one
    pub resyncs_deferred: u64,
    /// Commands that got a response
    pub commands_ok: u64,
    /// Commands that failed or timed out
    pub commands_failed: u64,
}

struct Subscriptions {
    new_channel: Subscription<ChannelCreated>,
    new_topic: Subscription<TopicCreated>,
}

/// Announces this node's topology to lookupd peers
///
/// Owns the peers, the notification subscriptions and the resync queue.
/// Created with [`LookupRouter::new`], driven by [`LookupRouter::run`] which
/// also tears everything down when the shutdown token fires.
pub struct LookupRouter {
    peers: Vec<Box<dyn PeerTransport>>,
    target: AnnounceTarget,
    registry: Arc<TopologyRegistry>,
    notifier: Arc<Notifier>,
    subscriptions: Option<Subscriptions>,
    sync_tx: mpsc::UnboundedSender<usize>,
    sync_rx: mpsc::UnboundedReceiver<usize>,
    heartbeat_interval: Duration,
    command_timeout: Duration,
    resync_retry_delay: Duration,
    /// Per peer: no resync before this instant
    retry_after: Vec<Option<Instant>>,
    /// Per peer: a delayed resync request is already queued
    deferred: Vec<bool>,
    stats: RouterStats,
}

impl LookupRouter {
    /// Build a router with one peer per host, created by `connect`.
    ///
    /// `connect` receives each host and the trigger the peer must fire
    /// whenever its connection is (re)established. Feed subscriptions are only
    /// taken when at least one peer is configured.
    pub fn new<F>(
        config: &LookupConfig,
        target: AnnounceTarget,
        registry: Arc<TopologyRegistry>,
        lookup_hosts: &[String],
        mut connect: F,
    ) -> Self
    where
        F: FnMut(&str, SyncTrigger) -> Box<dyn PeerTransport>,
    {
        let (sync_tx, sync_rx) = mpsc::unbounded_channel();

        let peers: Vec<_> = lookup_hosts
            .iter()
            .enumerate()
            .map(|(index, host)| {
                info!(peer = %host, "Adding lookupd peer");
                connect(host, SyncTrigger::new(index, sync_tx.clone()))
            })
            .collect();

        let notifier = registry.notifier().clone();
        let subscriptions = if peers.is_empty() {
            debug!("No lookupd peers configured, not subscribing to topology feeds");
            None
        } else {
            Some(Subscriptions {
                new_channel: notifier.new_channel.subscribe(),
                new_topic: notifier.new_topic.subscribe(),
            })
        };

        let peer_count = peers.len();

        Self {
            peers,
            target,
            registry,
            notifier,
            subscriptions,
            sync_tx,
            sync_rx,
            heartbeat_interval: config.heartbeat_interval(),
            command_timeout: config.command_timeout(),
            resync_retry_delay: DEFAULT_RESYNC_RETRY_DELAY,
            retry_after: vec![None; peer_count],
            deferred: vec![false; peer_count],
            stats: RouterStats::default(),
        }
    }

    #[must_use]
    pub const fn with_resync_retry_delay(mut self, delay: Duration) -> Self {
        self.resync_retry_delay = delay;
        self
    }

    /// Build a router backed by TCP [`LookupPeer`]s
    pub fn with_lookup_peers(
        config: &LookupConfig,
        target: AnnounceTarget,
        registry: Arc<TopologyRegistry>,
        lookup_hosts: &[String],
    ) -> Self {
        let connect_timeout = config.connect_timeout();
        Self::new(config, target, registry, lookup_hosts, |host, trigger| {
            Box::new(LookupPeer::new(host, trigger).with_connect_timeout(connect_timeout))
        })
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub const fn is_subscribed(&self) -> bool {
        self.subscriptions.is_some()
    }

    /// Queue a full resync for the peer at `index`, as if it had just reconnected
    pub fn request_resync(&self, index: usize) {
        SyncTrigger::new(index, self.sync_tx.clone()).fire();
    }

    /// Process events until `shutdown` fires, then unsubscribe and close peers
    pub async fn run(mut self, shutdown: CancellationToken) -> RouterStats {
        let start = Instant::now() + self.heartbeat_interval;
        let mut heartbeat = interval_at(start, self.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (mut new_channel, mut new_topic) = match self.subscriptions.take() {
            Some(subs) => (Some(subs.new_channel), Some(subs.new_topic)),
            None => (None, None),
        };

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = heartbeat.tick() => self.heartbeat().await,
                event = next_event(&mut new_channel) => match event {
                    Some(event) => {
                        let cmd = self.target.channel(&event.topic_name, &event.channel_name);
                        self.announce(&cmd, "new channel").await;
                    }
                    None => {
                        warn!("new_channel feed closed");
                        new_channel = None;
                    }
                },
                event = next_event(&mut new_topic) => match event {
                    Some(event) => {
                        let cmd = self.target.topic(&event.topic_name);
                        self.announce(&cmd, "new topic").await;
                    }
                    None => {
                        warn!("new_topic feed closed");
                        new_topic = None;
                    }
                },
                Some(index) = self.sync_rx.recv() => self.on_resync_request(index).await,
            }
        }

        info!("Lookup router closing");

        if let Some(subscription) = &new_channel {
            self.notifier.new_channel.unsubscribe(subscription.id());
        }
        if let Some(subscription) = &new_topic {
            self.notifier.new_topic.unsubscribe(subscription.id());
        }
        for peer in &mut self.peers {
            peer.close().await;
        }

        self.stats
    }

    /// PING every peer; failures are left to the reconnect path
    async fn heartbeat(&mut self) {
        self.stats.heartbeats += 1;
        let cmd = Command::ping();

        for peer in &mut self.peers {
            debug!(peer = %peer.addr(), "Sending heartbeat");
            match send(peer.as_mut(), &cmd, self.command_timeout).await {
                Ok(_) => self.stats.commands_ok += 1,
                Err(e) => {
                    self.stats.commands_failed += 1;
                    error!(peer = %peer.addr(), error = %e, "Ping failed");
                }
            }
        }
    }

    /// Send one announcement to every peer
    async fn announce(&mut self, cmd: &Command, reason: &'static str) {
        self.stats.announcements += 1;

        for peer in &mut self.peers {
            info!(peer = %peer.addr(), command = %cmd, reason, "Announcing");
            match send(peer.as_mut(), cmd, self.command_timeout).await {
                Ok(_) => self.stats.commands_ok += 1,
                Err(e) => {
                    self.stats.commands_failed += 1;
                    error!(peer = %peer.addr(), command = %cmd, error = %e, "Announce failed");
                }
            }
        }
    }

    /// Resync now, unless the peer failed one within the retry delay.
    ///
    /// A peer that accepts and then drops connections fires a new request on
    /// every dial; postponing keeps that from spinning the loop.
    async fn on_resync_request(&mut self, index: usize) {
        let now = Instant::now();
        match self.retry_after.get(index).copied().flatten() {
            Some(at) if now < at => {
                if self.deferred[index] {
                    return;
                }
                self.deferred[index] = true;
                self.stats.resyncs_deferred += 1;
                warn!(
                    peer_index = index,
                    delay = ?(at - now),
                    "Peer failed its last resync, deferring"
                );

                let trigger = SyncTrigger::new(index, self.sync_tx.clone());
                tokio::spawn(async move {
                    tokio::time::sleep_until(at).await;
                    trigger.fire();
                });
            }
            _ => {
                if let Some(deferred) = self.deferred.get_mut(index) {
                    *deferred = false;
                }
                self.resync(index).await;
            }
        }
    }

    /// Replay the whole topology to one peer, stopping at the first failure
    async fn resync(&mut self, index: usize) {
        let Some(peer) = self.peers.get_mut(index) else {
            warn!(peer_index = index, "Resync requested for unknown peer");
            return;
        };

        // Fully built, and every lock released, before the first send
        let commands = sync_commands(&self.registry, &self.target);
        self.stats.resyncs += 1;
        info!(peer = %peer.addr(), commands = commands.len(), "Resyncing topology");

        let mut failed = false;
        for cmd in &commands {
            debug!(peer = %peer.addr(), command = %cmd, "Resync announce");
            if let Err(e) = send(peer.as_mut(), cmd, self.command_timeout).await {
                self.stats.commands_failed += 1;
                error!(
                    peer = %peer.addr(),
                    command = %cmd,
                    error = %e,
                    "Resync announce failed, abandoning batch"
                );
                failed = true;
                break;
            }
            self.stats.commands_ok += 1;
        }

        self.retry_after[index] = failed.then(|| Instant::now() + self.resync_retry_delay);
    }
}

/// Wait for the next event of a feed, or forever if there is no subscription
async fn next_event<T>(subscription: &mut Option<Subscription<T>>) -> Option<T> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

/// Send a command, treating an expired deadline like any other failure
async fn send(peer: &mut dyn PeerTransport, cmd: &Command, deadline: Duration) -> Result<()> {
    match tokio::time::timeout(deadline, peer.command(cmd)).await {
        Ok(response) => response.map(|_| ()),
        Err(_) => {
            peer.close().await;
            Err(Error::Timeout(format!("{cmd} got no response within {deadline:?}")))
        }
    }
}

/// Resolve this node's announce target and run a TCP-backed router until shutdown.
///
/// Failing to resolve the node's addresses is the only error; everything the
/// router hits afterwards is logged and survived.
pub async fn run_lookup_router(
    listen: SocketAddr,
    lookup_hosts: &[String],
    config: &LookupConfig,
    registry: Arc<TopologyRegistry>,
    shutdown: CancellationToken,
) -> Result<RouterStats> {
    let target = AnnounceTarget::resolve(&listen)?;
    info!(
        port = target.port(),
        addrs = ?target.addrs(),
        peers = lookup_hosts.len(),
        "Starting lookup router"
    );

    let router = LookupRouter::with_lookup_peers(config, target, registry, lookup_hosts);
    Ok(router.run(shutdown).await)
}
