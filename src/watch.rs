//! Watch and pulse subjects
//!
//! In-process fan-out of cluster notifications over `tokio::sync::broadcast`.
//! Subscribers that lag simply miss old events; delivery to remote watchers
//! is built on top of a subscription.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Unknown,
    Add,
    Alter,
    Del,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Unknown => write!(f, "unknown"),
            ChangeType::Add => write!(f, "add"),
            ChangeType::Alter => write!(f, "alter"),
            ChangeType::Del => write!(f, "del"),
        }
    }
}

/// A partition was created, changed or deleted
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionEvent {
    pub graph: String,
    pub partition_id: u32,
    pub change_type: ChangeType,
}

impl PartitionEvent {
    pub fn new(graph: impl Into<String>, partition_id: u32, change_type: ChangeType) -> Self {
        Self {
            graph: graph.into(),
            partition_id,
            change_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Partition(PartitionEvent),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PulseNotice {
    Error(String),
}

/// Something that can tell its subscribers the serving node went bad.
pub trait ErrorNotifier: Send + Sync {
    /// Returns the number of subscribers reached.
    fn notify_error(&self, message: &str) -> usize;
}

/// Watch subject: partition changes and error notices
pub struct WatchSubject {
    tx: broadcast::Sender<WatchEvent>,
}

impl Default for WatchSubject {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl WatchSubject {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.tx.subscribe()
    }

    pub fn notify_partition_change(&self, event: PartitionEvent) -> usize {
        tracing::debug!(
            "Partition {}/{} changed: {}",
            event.graph,
            event.partition_id,
            event.change_type
        );
        self.tx.send(WatchEvent::Partition(event)).unwrap_or(0)
    }
}

impl ErrorNotifier for WatchSubject {
    fn notify_error(&self, message: &str) -> usize {
        self.tx
            .send(WatchEvent::Error(message.to_string()))
            .unwrap_or(0)
    }
}

/// Pulse subject: heartbeat-stream notices
pub struct PulseSubject {
    tx: broadcast::Sender<PulseNotice>,
}

impl Default for PulseSubject {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PulseSubject {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PulseNotice> {
        self.tx.subscribe()
    }
}

impl ErrorNotifier for PulseSubject {
    fn notify_error(&self, message: &str) -> usize {
        self.tx
            .send(PulseNotice::Error(message.to_string()))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_events_reach_subscribers() {
        let subject = WatchSubject::default();
        let mut rx = subject.subscribe();

        let event = PartitionEvent::new("g", 2, ChangeType::Add);
        assert_eq!(subject.notify_partition_change(event.clone()), 1);
        assert_eq!(rx.try_recv().unwrap(), WatchEvent::Partition(event));
    }

    #[test]
    fn test_notify_without_subscribers() {
        let subject = PulseSubject::default();
        assert_eq!(subject.notify_error("lose leader"), 0);

        let mut rx = subject.subscribe();
        assert_eq!(subject.notify_error("lose leader"), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            PulseNotice::Error("lose leader".into())
        );
    }
}
