//! Notification fan-out: per-user broadcast channels.
//!
//! Each user id owns one bounded broadcast channel; every open subscription
//! for that user receives every event. Publishing never blocks: with no open
//! subscriptions the event is dropped (the client's status poll is the
//! fallback-of-record), and a lagging subscriber skips the oldest buffered
//! events rather than stalling the matcher.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::debug;

use crate::events::NotificationEvent;

const DEFAULT_BUFFER: usize = 32;

pub struct NotificationHub {
    buffer: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<NotificationEvent>>>,
}

impl NotificationHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer: buffer.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Open a subscription for `user_id`. Multiple subscriptions per user are
    /// allowed (multi-device); each receives the same events. Dropping the
    /// receiver closes the subscription.
    pub fn subscribe(&self, user_id: &str) -> broadcast::Receiver<NotificationEvent> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe()
    }

    /// Deliver `event` to every open subscription for `user_id`. Returns the
    /// number of subscriptions the event was handed to; zero means it was
    /// dropped.
    pub fn publish(&self, user_id: &str, event: NotificationEvent) -> usize {
        let delivered = {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            match channels.get(user_id) {
                Some(sender) => sender.send(event).unwrap_or(0),
                None => 0,
            }
        };
        if delivered == 0 {
            debug!(user_id, "no open subscriptions, event dropped");
            self.reap(user_id);
        }
        delivered
    }

    /// Number of open subscriptions for `user_id`.
    pub fn subscriber_count(&self, user_id: &str) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels
            .get(user_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drop the channel for a user with no remaining subscriptions.
    fn reap(&self, user_id: &str) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = channels.get(user_id) {
            if sender.receiver_count() == 0 {
                channels.remove(user_id);
            }
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}
