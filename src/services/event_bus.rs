//! EventBus service for cross-domain publish/subscribe.
//!
//! Provides typed subscriptions (plus a `*` wildcard), a ring-buffer history
//! of recent events, a broadcast stream for async consumers, and a correlated
//! request/response helper.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use uuid::Uuid;

use super::ring_buffer::RingBuffer;
use crate::domain::errors::BusError;
use crate::domain::models::config::EventBusConfig;
use crate::domain::models::event::{event_types, BusEvent, LifecycleEvent};
use crate::domain::ports::EventPublisher;

/// Synchronous subscriber callback.
pub type EventHandler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

type PendingReply = oneshot::Sender<Result<BusEvent, BusError>>;

struct BusState {
    subscribers: HashMap<String, Vec<(u64, EventHandler)>>,
    history: RingBuffer<BusEvent>,
    pending: HashMap<Uuid, PendingReply>,
    disposed: bool,
}

struct BusInner {
    state: Mutex<BusState>,
    sender: broadcast::Sender<BusEvent>,
    sequence: AtomicU64,
    next_subscription: AtomicU64,
}

impl BusInner {
    fn unsubscribe(&self, event_type: &str, id: u64) {
        let mut state = self.state.lock();
        if let Some(handlers) = state.subscribers.get_mut(event_type) {
            handlers.retain(|(sub_id, _)| *sub_id != id);
            if handlers.is_empty() {
                state.subscribers.remove(event_type);
            }
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::dispose`].
pub struct Subscription {
    id: u64,
    event_type: String,
    bus: Weak<BusInner>,
    disposed: AtomicBool,
}

impl Subscription {
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Stop receiving events. Safe to call more than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(&self.event_type, self.id);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Central event bus shared by the coordinator, executor, rebalancer and domains.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new(config: &EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState {
                    subscribers: HashMap::new(),
                    history: RingBuffer::new(config.history_capacity),
                    pending: HashMap::new(),
                    disposed: false,
                }),
                sender,
                sequence: AtomicU64::new(0),
                next_subscription: AtomicU64::new(0),
            }),
        }
    }

    /// Publish an event to every subscriber of its type and to wildcard subscribers.
    ///
    /// Subscribers run synchronously after the bus lock is released, so a
    /// subscriber may itself publish. A panicking subscriber is logged and
    /// does not affect the publisher or other subscribers.
    pub fn publish(&self, mut event: BusEvent) {
        let handlers: Vec<EventHandler> = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                tracing::debug!(event_type = %event.event_type, "Dropping event published after dispose");
                return;
            }
            // Sequence, history and stream order agree because all three
            // happen under the state lock.
            event.sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
            state.history.push(event.clone());
            // No receivers is fine.
            let _ = self.inner.sender.send(event.clone());

            if let Some(reply_to) = event.reply_to {
                if let Some(waiter) = state.pending.remove(&reply_to) {
                    // The requester may have timed out between removal and send.
                    let _ = waiter.send(Ok(event.clone()));
                }
            }

            let typed = state.subscribers.get(&event.event_type).into_iter().flatten();
            let wildcard = if event.event_type == event_types::WILDCARD {
                None
            } else {
                state.subscribers.get(event_types::WILDCARD)
            };
            let handlers = typed
                .chain(wildcard.into_iter().flatten())
                .map(|(_, handler)| Arc::clone(handler))
                .collect();
            handlers
        };

        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                tracing::warn!(event_type = %event.event_type, "Event subscriber panicked");
            }
        }
    }

    /// Publish a typed lifecycle event.
    pub fn publish_lifecycle(&self, event: LifecycleEvent) {
        self.publish(event.into());
    }

    /// Register `handler` for events of `event_type` (`"*"` for all events).
    pub fn subscribe<F>(&self, event_type: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        let id = self.inner.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.inner
            .state
            .lock()
            .subscribers
            .entry(event_type.clone())
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            id,
            event_type,
            bus: Arc::downgrade(&self.inner),
            disposed: AtomicBool::new(false),
        }
    }

    /// Broadcast stream of every published event, for async consumers.
    pub fn stream(&self) -> broadcast::Receiver<BusEvent> {
        self.inner.sender.subscribe()
    }

    /// The latest `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<BusEvent> {
        self.inner.state.lock().history.recent(n)
    }

    /// Every event still held in the history buffer, oldest first.
    pub fn history(&self) -> Vec<BusEvent> {
        self.inner.state.lock().history.to_vec()
    }

    /// Publish `event` as a request and wait for a response whose `reply_to`
    /// matches its correlation id.
    ///
    /// A correlation id is generated when the event has none.
    ///
    /// # Errors
    /// - [`BusError::Timeout`] if no response arrives in time; the pending
    ///   entry is removed.
    /// - [`BusError::Cancelled`] if the bus is disposed while waiting.
    /// - [`BusError::Disposed`] if the bus was already disposed.
    pub async fn request(&self, mut event: BusEvent, timeout: Duration) -> Result<BusEvent, BusError> {
        let correlation_id = *event.correlation_id.get_or_insert_with(Uuid::new_v4);
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Err(BusError::Disposed);
            }
            state.pending.insert(correlation_id, tx);
        }

        self.publish(event);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BusError::Cancelled(correlation_id)),
            Err(_) => {
                self.inner.state.lock().pending.remove(&correlation_id);
                Err(BusError::Timeout {
                    correlation_id,
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Shut the bus down: drop subscribers and resolve every pending request
    /// as cancelled. Later publishes are ignored.
    pub fn dispose(&self) {
        let pending: Vec<(Uuid, PendingReply)> = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.subscribers.clear();
            state.pending.drain().collect()
        };

        tracing::debug!(pending = pending.len(), "Event bus disposed");
        for (correlation_id, waiter) in pending {
            let _ = waiter.send(Err(BusError::Cancelled(correlation_id)));
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    /// Number of requests still awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Number of callbacks registered for exactly `event_type`.
    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.inner
            .state
            .lock()
            .subscribers
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Next sequence number to be assigned.
    pub fn current_sequence(&self) -> u64 {
        self.inner.sequence.load(Ordering::SeqCst)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(&EventBusConfig::default())
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: BusEvent) {
        Self::publish(self, event);
    }
}
