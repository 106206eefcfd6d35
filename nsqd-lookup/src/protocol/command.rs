//! Commands sent to lookupd
//!
//! Wire format:
//! - `PING\n`
//! - `ANNOUNCE <topic> <channel> <port>\n` followed by a 4-byte big-endian
//!   body length and the announced addresses joined by `\n`

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::discovery::address::network_addrs;
use crate::error::Result;

/// Channel name announced for a topic that has no channels yet
pub const NO_CHANNEL: &str = ".";

/// Sent once at the start of every lookupd connection
pub const MAGIC_V1: &[u8] = b"  V1";

/// A single lookupd protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe
    Ping,
    /// Existence of a topic/channel on this node
    Announce {
        topic: String,
        channel: String,
        port: u16,
        addrs: Arc<[String]>,
    },
}

impl Command {
    #[must_use]
    pub const fn ping() -> Self {
        Self::Ping
    }

    #[must_use]
    pub fn announce_channel(
        topic: impl Into<String>,
        channel: impl Into<String>,
        port: u16,
        addrs: Arc<[String]>,
    ) -> Self {
        Self::Announce {
            topic: topic.into(),
            channel: channel.into(),
            port,
            addrs,
        }
    }

    /// Announce a topic that exists but has no channels yet
    #[must_use]
    pub fn announce_topic(topic: impl Into<String>, port: u16, addrs: Arc<[String]>) -> Self {
        Self::announce_channel(topic, NO_CHANNEL, port, addrs)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::Announce { .. } => "ANNOUNCE",
        }
    }

    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::Ping => None,
            Self::Announce { topic, .. } => Some(topic),
        }
    }

    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        match self {
            Self::Ping => None,
            Self::Announce { channel, .. } => Some(channel),
        }
    }

    /// Whether this announces a topic without naming a channel
    #[must_use]
    pub fn is_topic_only(&self) -> bool {
        self.channel() == Some(NO_CHANNEL)
    }

    /// Append the wire encoding of this command to `buf`
    pub fn encode(&self, buf: &mut BytesMut) {
        // Display renders exactly the command line
        buf.put_slice(self.to_string().as_bytes());
        buf.put_u8(b'\n');

        if let Self::Announce { addrs, .. } = self {
            let body = addrs.join("\n");
            buf.put_u32(body.len() as u32);
            buf.put_slice(body.as_bytes());
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        self.encode(&mut buf);
        buf.freeze()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => f.write_str("PING"),
            Self::Announce {
                topic,
                channel,
                port,
                ..
            } => write!(f, "ANNOUNCE {topic} {channel} {port}"),
        }
    }
}

/// Port and addresses this node announces itself under
///
/// Resolved once at startup; every announce built from it shares the same
/// address list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceTarget {
    port: u16,
    addrs: Arc<[String]>,
}

impl AnnounceTarget {
    #[must_use]
    pub fn new(port: u16, addrs: Vec<String>) -> Self {
        Self {
            port,
            addrs: addrs.into(),
        }
    }

    /// Derive the target from the node's listen address
    pub fn resolve(listen: &SocketAddr) -> Result<Self> {
        Ok(Self::new(listen.port(), network_addrs(listen)?))
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn addrs(&self) -> &[String] {
        &self.addrs
    }

    #[must_use]
    pub fn channel(&self, topic: &str, channel: &str) -> Command {
        Command::announce_channel(topic, channel, self.port, self.addrs.clone())
    }

    #[must_use]
    pub fn topic(&self, topic: &str) -> Command {
        Command::announce_topic(topic, self.port, self.addrs.clone())
    }
}
