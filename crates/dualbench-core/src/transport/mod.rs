//! Pub/sub channel transport
//!
//! The harness only needs a narrow contract from its transport: open a
//! publisher or subscriber by topic name, send raw bytes, wait on several
//! subscribers with a bounded timeout, and take bytes without blocking.
//!
//! Implementations:
//! - In-process bus over crossbeam channels ([`memory`])
//! - UDP datagrams with per-topic routes ([`udp`])
//!
//! Every subscriber is backed by a crossbeam receiver, so [`wait_for_any`]
//! works the same way regardless of where the bytes come from.

pub mod memory;
pub mod udp;

pub use memory::MemoryBus;
pub use udp::UdpTransport;

use crossbeam_channel::{Receiver, Select, TryRecvError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default queue depth between a transport and one subscriber
pub const DEFAULT_QUEUE_DEPTH: usize = 4096;

/// Errors raised by transports
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open {role} on {topic}: {reason}")]
    Setup {
        role: &'static str,
        topic: String,
        reason: String,
    },

    #[error("Send on {topic} failed: {reason}")]
    Send { topic: String, reason: String },

    #[error("Unknown topic route: {0}")]
    UnknownRoute(String),
}

impl TransportError {
    /// Setup failure for a publisher
    pub fn publisher_setup(topic: &str, reason: impl ToString) -> Self {
        Self::Setup {
            role: "publisher",
            topic: topic.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Setup failure for a subscriber
    pub fn subscriber_setup(topic: &str, reason: impl ToString) -> Self {
        Self::Setup {
            role: "subscriber",
            topic: topic.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A pub/sub transport able to open both ends of a topic
pub trait Transport: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Open the sending end of a topic
    fn open_publisher(&self, topic: &str) -> Result<Box<dyn PublishHandle>, TransportError>;

    /// Open the receiving end of a topic
    fn open_subscriber(&self, topic: &str) -> Result<SubscribeHandle, TransportError>;
}

/// Sending end of one topic
pub trait PublishHandle: Send {
    /// Topic this handle publishes to
    fn topic(&self) -> &str;

    /// Send one payload; failures are reported, never retried
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Receiving end of one topic
///
/// Dropping the handle closes it. Transports that need background work (the
/// UDP reader thread) hang it off the `guard`, which tears it down on drop.
pub struct SubscribeHandle {
    topic: String,
    rx: Receiver<Vec<u8>>,
    _guard: Option<Box<dyn Send>>,
}

impl SubscribeHandle {
    /// Wrap a receiver fed by a transport
    pub fn new(topic: impl Into<String>, rx: Receiver<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            rx,
            _guard: None,
        }
    }

    /// Attach a resource that must live as long as the handle
    pub fn with_guard(mut self, guard: impl Send + 'static) -> Self {
        self._guard = Some(Box::new(guard));
        self
    }

    /// Topic this handle receives from
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Take one payload if one is queued
    pub fn receive(&self) -> Option<Vec<u8>> {
        match self.rx.try_recv() {
            Ok(bytes) => Some(bytes),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Number of queued payloads
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Close the handle
    pub fn close(self) {
        tracing::debug!(topic = %self.topic, "subscriber closed");
    }

    fn receiver(&self) -> &Receiver<Vec<u8>> {
        &self.rx
    }
}

impl std::fmt::Debug for SubscribeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeHandle")
            .field("topic", &self.topic)
            .field("pending", &self.rx.len())
            .finish()
    }
}

/// Block until at least one handle has data or the timeout passes
///
/// Returns the indices of every handle with queued data; empty on timeout.
pub fn wait_for_any(handles: &[&SubscribeHandle], timeout: Duration) -> Vec<usize> {
    let ready = ready_indices(handles);
    if !ready.is_empty() {
        return ready;
    }
    if handles.is_empty() {
        std::thread::sleep(timeout);
        return ready;
    }

    let deadline = Instant::now() + timeout;
    let mut select = Select::new();
    for handle in handles {
        select.recv(handle.receiver());
    }
    if select.ready_timeout(timeout).is_ok() {
        let ready = ready_indices(handles);
        if !ready.is_empty() {
            return ready;
        }
        // Woken only by a disconnected receiver; still honour the timeout
        std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
    }
    Vec::new()
}

fn ready_indices(handles: &[&SubscribeHandle]) -> Vec<usize> {
    handles
        .iter()
        .enumerate()
        .filter(|(_, h)| !h.receiver().is_empty())
        .map(|(i, _)| i)
        .collect()
}
