//! In-process pub/sub bus
//!
//! Each subscriber gets its own bounded crossbeam queue. Publishing fans a
//! copy out to every current subscriber of the topic with `try_send`; a full
//! queue drops that copy, which the subscriber later sees as a sequence gap.
//! Publishing to a topic with no subscribers succeeds, as it does on any
//! real pub/sub system.

use super::{PublishHandle, SubscribeHandle, Transport, TransportError, DEFAULT_QUEUE_DEPTH};
use crossbeam_channel::{Sender, TrySendError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type TopicTable = HashMap<String, Vec<Sender<Vec<u8>>>>;

/// In-process transport shared by publishers and subscribers
#[derive(Clone)]
pub struct MemoryBus {
    topics: Arc<Mutex<TopicTable>>,
    queue_depth: usize,
}

impl MemoryBus {
    /// Create a bus with the default per-subscriber queue depth
    pub fn new() -> Self {
        Self::with_queue_depth(DEFAULT_QUEUE_DEPTH)
    }

    /// Create a bus with a custom per-subscriber queue depth
    pub fn with_queue_depth(queue_depth: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Number of subscribers currently attached to a topic
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .map(|t| t.get(topic).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryBus {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open_publisher(&self, topic: &str) -> Result<Box<dyn PublishHandle>, TransportError> {
        if topic.is_empty() {
            return Err(TransportError::publisher_setup(topic, "empty topic name"));
        }
        tracing::debug!(topic, "memory publisher opened");
        Ok(Box::new(MemoryPublisher {
            topic: topic.to_string(),
            topics: Arc::clone(&self.topics),
        }))
    }

    fn open_subscriber(&self, topic: &str) -> Result<SubscribeHandle, TransportError> {
        if topic.is_empty() {
            return Err(TransportError::subscriber_setup(topic, "empty topic name"));
        }
        let (tx, rx) = crossbeam_channel::bounded(self.queue_depth);
        let mut topics = self
            .topics
            .lock()
            .map_err(|_| TransportError::subscriber_setup(topic, "topic table poisoned"))?;
        topics.entry(topic.to_string()).or_default().push(tx);
        tracing::debug!(topic, depth = self.queue_depth, "memory subscriber opened");
        Ok(SubscribeHandle::new(topic, rx))
    }
}

struct MemoryPublisher {
    topic: String,
    topics: Arc<Mutex<TopicTable>>,
}

impl PublishHandle for MemoryPublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut topics = self.topics.lock().map_err(|_| TransportError::Send {
            topic: self.topic.clone(),
            reason: "topic table poisoned".to_string(),
        })?;

        if let Some(subscribers) = topics.get_mut(&self.topic) {
            // Forget subscribers whose handle was dropped
            subscribers.retain(|tx| match tx.try_send(bytes.to_vec()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
        }
        Ok(())
    }
}
