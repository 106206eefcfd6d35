//! Connections to lookupd peers
//!
//! A peer is driven by exactly one owner (the lookup router), so every
//! method takes `&mut self` and commands can never interleave on the wire.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{read_response, Command, MAGIC_V1};

/// Default time allowed to dial a lookupd peer
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Command channel to one lookupd instance
#[async_trait]
pub trait PeerTransport: Send {
    /// Address used to identify the peer in logs
    fn addr(&self) -> &str;

    /// Send one command and wait for its response
    async fn command(&mut self, cmd: &Command) -> Result<Bytes>;

    /// Drop any open connection
    async fn close(&mut self);
}

/// Tells the router that a peer (re)connected and is owed a full resync
///
/// Firing only queues the peer's index; the resync itself runs later on the
/// router's own turn.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    peer: usize,
    tx: mpsc::UnboundedSender<usize>,
}

impl SyncTrigger {
    #[must_use]
    pub const fn new(peer: usize, tx: mpsc::UnboundedSender<usize>) -> Self {
        Self { peer, tx }
    }

    #[must_use]
    pub const fn peer(&self) -> usize {
        self.peer
    }

    pub fn fire(&self) {
        if self.tx.send(self.peer).is_err() {
            debug!(peer = self.peer, "Lookup router gone, dropping resync request");
        }
    }
}

/// TCP connection to a lookupd peer that reconnects on demand
///
/// The connection is dialed lazily by the first command and again by the
/// first command after any failure. Each successful dial fires the peer's
/// [`SyncTrigger`].
pub struct LookupPeer {
    addr: String,
    conn: Option<TcpStream>,
    connect_timeout: Duration,
    on_connect: SyncTrigger,
}

impl LookupPeer {
    #[must_use]
    pub fn new(addr: impl Into<String>, on_connect: SyncTrigger) -> Self {
        Self {
            addr: addr.into(),
            conn: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            on_connect,
        }
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    async fn dial(&self) -> Result<TcpStream> {
        let mut stream = timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "connecting to {} took longer than {:?}",
                    self.addr, self.connect_timeout
                ))
            })??;

        stream.set_nodelay(true)?;
        stream.write_all(MAGIC_V1).await?;

        Ok(stream)
    }

    async fn round_trip(stream: &mut TcpStream, cmd: &Command) -> Result<Bytes> {
        stream.write_all(&cmd.to_bytes()).await?;
        read_response(stream).await
    }
}

#[async_trait]
impl PeerTransport for LookupPeer {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn command(&mut self, cmd: &Command) -> Result<Bytes> {
        // Taken out for the round trip so that a failed or cancelled command
        // leaves the peer disconnected.
        let mut stream = match self.conn.take() {
            Some(stream) => stream,
            None => {
                let stream = self.dial().await?;
                info!(peer = %self.addr, "Connected to lookupd");
                self.on_connect.fire();
                stream
            }
        };

        match Self::round_trip(&mut stream, cmd).await {
            Ok(response) => {
                self.conn = Some(stream);
                Ok(response)
            }
            Err(e) => {
                warn!(peer = %self.addr, error = %e, "Dropping lookupd connection");
                Err(e)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.conn.take() {
            let _ = stream.shutdown().await;
            debug!(peer = %self.addr, "Closed lookupd connection");
        }
    }
}

impl fmt::Display for LookupPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr)
    }
}
