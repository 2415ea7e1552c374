//! Change Propagator - fire-and-forget event fan-out
//!
//! Built on a `tokio::sync::broadcast` channel. Every subscriber owns its own
//! receiver and delivery task, so:
//!
//! - `publish` never blocks and never fails; with nobody listening the event is
//!   simply dropped
//! - each subscriber gets an independent copy of every event published while
//!   it is attached, and nothing published before
//! - a slow subscriber falls behind on its own receiver; once it is more than
//!   the channel capacity behind it skips the oldest events (logged as lag)
//!   instead of back-pressuring the publisher or other subscribers
//! - every handler invocation runs inside its own failure boundary: errors
//!   and panics are logged and counted, and the task moves on to the next event

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::domain::{ChangeEvent, ChangeHook, EventSubscriber};
use crate::metrics;

/// Default per-subscriber backlog before the oldest events are skipped
pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

struct Registry {
    sender: broadcast::Sender<ChangeEvent>,
    subscribers: DashMap<u64, String>,
    next_id: AtomicU64,
}

/// Publish/subscribe hub for change events. Cheap to clone.
#[derive(Clone)]
pub struct ChangePropagator {
    registry: Arc<Registry>,
}

impl ChangePropagator {
    /// Create a propagator with the default queue depth.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_DEPTH)
    }

    /// Create a propagator whose subscribers may fall `capacity` events behind.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            registry: Arc::new(Registry {
                sender,
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Publish an event to everyone currently subscribed.
    ///
    /// Returns the number of receivers the event was queued for.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let event_type = event.event_type();
        metrics::record_event_published(event_type);
        match self.registry.sender.send(event) {
            Ok(receivers) => {
                debug!(event_type, receivers, "Change event published");
                receivers
            }
            Err(_) => {
                debug!(event_type, "No subscribers for change event");
                0
            }
        }
    }

    /// Attach a subscriber. Its handler runs on a dedicated task.
    ///
    /// Must be called from within a tokio runtime. Dropping the returned
    /// [`Subscription`] leaves the subscriber attached; call
    /// [`Subscription::cancel`] to detach it.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> Subscription {
        let receiver = self.registry.sender.subscribe();
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let name = subscriber.name().to_string();

        self.registry.subscribers.insert(id, name.clone());
        metrics::subscriber_attached();

        let guard = Attachment {
            id,
            registry: Arc::downgrade(&self.registry),
        };
        let handle = tokio::spawn(deliver(subscriber, receiver, guard));

        debug!(subscriber = %name, id, "Subscriber attached");
        Subscription { id, name, handle }
    }

    /// Raw receiver for callers that want to drive delivery themselves.
    pub fn subscribe_channel(&self) -> broadcast::Receiver<ChangeEvent> {
        self.registry.sender.subscribe()
    }

    /// Number of attached receivers (handler subscriptions and raw channels).
    pub fn subscriber_count(&self) -> usize {
        self.registry.sender.receiver_count()
    }

    /// Names of attached handler subscriptions.
    pub fn subscriber_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .subscribers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for ChangePropagator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangePropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePropagator")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl ChangeHook for ChangePropagator {
    fn on_change(&self, event: ChangeEvent) {
        self.publish(event);
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Handle to an attached subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    name: String,
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Registry id, unique per propagator.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Subscriber name as reported by `EventSubscriber::name`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the delivery task has stopped.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Detach the subscriber. Events already queued for it are discarded.
    pub async fn cancel(self) {
        self.handle.abort();
        // Wait for the task to unwind so the registry is updated on return.
        let _ = self.handle.await;
    }
}

/// Removes the registry entry when the delivery task ends, including on abort.
struct Attachment {
    id: u64,
    registry: Weak<Registry>,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.subscribers.remove(&self.id);
        }
        metrics::subscriber_detached();
    }
}

async fn deliver(
    subscriber: Arc<dyn EventSubscriber>,
    mut receiver: broadcast::Receiver<ChangeEvent>,
    _attachment: Attachment,
) {
    let name = subscriber.name().to_string();

    loop {
        match receiver.recv().await {
            Ok(event) => {
                let outcome = AssertUnwindSafe(subscriber.handle(&event))
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(Ok(())) => {
                        metrics::record_event_delivery(&name, "ok");
                    }
                    Ok(Err(e)) => {
                        metrics::record_event_delivery(&name, "error");
                        warn!(
                            subscriber = %name,
                            event_type = event.event_type(),
                            entity_id = event.entity_id(),
                            error = %e,
                            "Subscriber failed to handle change event"
                        );
                    }
                    Err(_) => {
                        metrics::record_event_delivery(&name, "panic");
                        error!(
                            subscriber = %name,
                            event_type = event.event_type(),
                            entity_id = event.entity_id(),
                            "Subscriber panicked while handling change event"
                        );
                    }
                }
            }
            Err(RecvError::Lagged(missed)) => {
                metrics::record_event_delivery(&name, "lagged");
                warn!(subscriber = %name, missed, "Subscriber lagged; change events dropped");
            }
            Err(RecvError::Closed) => {
                debug!(subscriber = %name, "Propagator closed; subscriber detaching");
                break;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
