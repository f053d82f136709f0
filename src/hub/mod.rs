//! Broadcast hub for completion notifications
//!
//! Every live listener registers a [`Subscription`] holding a small bounded
//! queue. [`NotificationHub::publish`] offers the message to each queue
//! without waiting. A listener whose queue is full is disconnected and
//! removed, so one stalled socket never delays the worker that published or
//! the other listeners.
//!
//! The hub has no per-client routing: each published message goes to every
//! subscription registered at that moment.

mod message;
mod subscription;

pub use message::{Action, Message};
pub use subscription::{MessageSink, Subscription};

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type SubscriptionId = Uuid;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("listener cancelled")]
    Cancelled,

    #[error("listener disconnected: too slow to keep up with messages")]
    SlowConsumer,

    #[error("subscription closed")]
    Closed,

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("write failed: {0}")]
    Sink(String),
}

/// Per-subscription state kept in the registry
struct Entry {
    tx: mpsc::Sender<Message>,
    disconnect: CancellationToken,
}

/// Result of a single publish
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscriptions the message was queued for
    pub delivered: usize,
    /// Subscriptions disconnected because their queue was full or closed
    pub dropped: usize,
}

/// Process-wide publish/subscribe registry
///
/// Construct one per server and share it through an `Arc`.
pub struct NotificationHub {
    subscribers: RwLock<HashMap<SubscriptionId, Entry>>,
    queue_depth: usize,
}

impl NotificationHub {
    /// Create a hub whose subscriptions buffer at most `queue_depth` messages
    pub fn new(queue_depth: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            queue_depth: queue_depth.max(1),
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Register a new listener
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let disconnect = CancellationToken::new();

        self.write().insert(
            id,
            Entry {
                tx,
                disconnect: disconnect.clone(),
            },
        );
        debug!(subscription_id = %id, "Subscription added");

        Subscription::new(id, rx, disconnect, Arc::clone(self))
    }

    /// Remove a listener; returns `false` if it was already gone
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let removed = self.write().remove(id).is_some();
        if removed {
            debug!(subscription_id = %id, "Subscription removed");
        }
        removed
    }

    /// Offer `message` to every registered subscription without blocking
    ///
    /// Subscriptions whose queue is full are disconnected and unregistered.
    /// A subscription registered while this call runs may or may not see
    /// the message.
    pub fn publish(&self, message: &Message) -> PublishReport {
        let mut report = PublishReport::default();
        let mut evicted = Vec::new();

        {
            let subscribers = self.read();
            for (id, entry) in subscribers.iter() {
                match entry.tx.try_send(message.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(subscription_id = %id, "Subscription queue full, disconnecting");
                        entry.disconnect.cancel();
                        evicted.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => {
                        // Receiver already dropped; the listener is gone
                        evicted.push(*id);
                    }
                }
            }
        }

        if !evicted.is_empty() {
            let mut subscribers = self.write();
            for id in &evicted {
                subscribers.remove(id);
            }
        }
        report.dropped = evicted.len();

        info!(
            action = ?message.action,
            delivered = report.delivered,
            dropped = report.dropped,
            "Broadcast message to subscriptions"
        );

        report
    }

    /// Number of currently registered subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SubscriptionId, Entry>> {
        // The map stays consistent even if a holder panicked
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SubscriptionId, Entry>> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("subscribers", &self.subscriber_count())
            .field("queue_depth", &self.queue_depth)
            .finish()
    }
}
