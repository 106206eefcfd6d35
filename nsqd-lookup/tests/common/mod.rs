//! Shared fakes for router tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use nsqd_lookup::{Command, Error, PeerTransport, Result, SyncTrigger};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, Semaphore};

/// What a fake peer does when asked to send
#[derive(Clone, Default)]
pub struct Behavior {
    /// Zero-based attempt numbers that fail
    pub fail_at: Vec<usize>,
    /// Fail every command
    pub fail_all: bool,
    /// When set, every command waits for a permit before answering
    pub gate: Option<Arc<Semaphore>>,
}

/// Test-side view of a fake peer
#[derive(Clone)]
pub struct PeerHandle {
    pub sent: Arc<Mutex<Vec<Command>>>,
    pub closed: Arc<Mutex<bool>>,
    pub started: Arc<Notify>,
    pub trigger: SyncTrigger,
}

impl PeerHandle {
    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Simulate the transport re-establishing its connection
    pub fn reconnect(&self) {
        self.trigger.fire();
    }
}

pub struct FakePeer {
    addr: String,
    behavior: Behavior,
    handle: PeerHandle,
}

impl FakePeer {
    pub fn new(addr: &str, trigger: SyncTrigger, behavior: Behavior) -> (Self, PeerHandle) {
        let handle = PeerHandle {
            sent: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
            started: Arc::new(Notify::new()),
            trigger,
        };
        let peer = Self {
            addr: addr.to_string(),
            behavior,
            handle: handle.clone(),
        };
        (peer, handle)
    }
}

#[async_trait]
impl PeerTransport for FakePeer {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn command(&mut self, cmd: &Command) -> Result<Bytes> {
        let attempt = {
            let mut sent = self.handle.sent.lock();
            sent.push(cmd.clone());
            sent.len() - 1
        };
        self.handle.started.notify_one();

        if let Some(gate) = &self.behavior.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if self.behavior.fail_all || self.behavior.fail_at.contains(&attempt) {
            return Err(Error::Io(std::io::ErrorKind::ConnectionReset.into()));
        }
        Ok(Bytes::from_static(b"OK"))
    }

    async fn close(&mut self) {
        *self.handle.closed.lock() = true;
    }
}

/// Poll `cond` until it holds, failing the test after five seconds
pub async fn eventually<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
