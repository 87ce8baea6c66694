use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, ResourceSelector};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for committed events, one channel per resource bucket.
/// Reminder mailers and dashboards subscribe here instead of hooking writes.
pub struct NotifyHub {
    channels: DashMap<ResourceSelector, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to events for a bucket. Creates the channel if needed.
    pub fn subscribe(&self, bucket: ResourceSelector) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(bucket)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send to one bucket. No-op if nobody is listening.
    pub fn send(&self, bucket: ResourceSelector, event: &Event) {
        if let Some(sender) = self.channels.get(&bucket) {
            let _ = sender.send(event.clone());
        }
    }

    /// Send to every bucket, for events that affect all of them.
    pub fn send_all(&self, event: &Event) {
        for sender in self.channels.iter() {
            let _ = sender.value().send(event.clone());
        }
    }
}
