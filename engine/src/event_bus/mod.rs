//! Event bus: append/publish primitive for domain events
//!
//! The EventBus keeps every published event in an in-memory log for the
//! lifetime of the process and fans each one out to subscribers. It holds
//! no business logic. Subscribers receive events over bounded channels and
//! can subscribe to one event type or to `EventType::All`.
//!
//! Publishing never waits on a slow subscriber: a full or closed channel
//! is skipped with a warning, so a stalled UI cannot stall a running
//! stream.

use sdk::event::{Event, EventType};
use sdk::types::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, RwLock};

/// Default channel buffer size for subscribers
pub const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Event bus with an in-process log and typed subscriptions
pub struct EventBus {
    /// Every event ever published, in publish order
    log: Arc<RwLock<Vec<Event>>>,

    /// Map of event types to lists of subscribers
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,

    buffer_size: usize,
}

impl EventBus {
    /// Create a new EventBus
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_CHANNEL_BUFFER_SIZE)
    }

    /// Create an EventBus whose subscriber channels hold `buffer_size` events
    pub fn with_buffer(buffer_size: usize) -> Self {
        Self {
            log: Arc::new(RwLock::new(Vec::new())),
            channels: Arc::new(Mutex::new(HashMap::new())),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All`
    ///
    /// Only events published after the call are delivered; use `events`
    /// to catch up on history.
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Append an event to the log and notify subscribers
    ///
    /// The event is sent to all subscribers of its type as well as all
    /// subscribers of `EventType::All`. Closed subscribers are pruned.
    pub async fn publish(&self, event: Event) {
        let event_type = event.event_type();
        self.log.write().await.push(event.clone());

        let mut channels = self.channels.lock().await;
        for key in [event_type, EventType::All] {
            if let Some(subscribers) = channels.get_mut(&key) {
                subscribers.retain(|tx| match tx.try_send(event.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(
                            event_type = ?event_type,
                            session_id = %event.session_id,
                            "Subscriber channel full, dropping event"
                        );
                        true
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
            }
        }
    }

    /// Snapshot of the full event log
    pub async fn events(&self) -> Vec<Event> {
        self.log.read().await.clone()
    }

    /// Events of one session, in publish order
    pub async fn events_for(&self, session_id: &SessionId) -> Vec<Event> {
        self.log
            .read()
            .await
            .iter()
            .filter(|e| &e.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Number of events published so far
    pub async fn len(&self) -> usize {
        self.log.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.read().await.is_empty()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
