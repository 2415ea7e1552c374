//! Event Subscriber Adapters
//!
//! Implements the `EventSubscriber` port with various backends.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::dispatch::Endpoint;
use crate::domain::{ChangeEvent, EventSubscriber};
use crate::error::{Error, Result};

/// Logging-based subscriber.
///
/// Writes every change event to the tracing system at info level. Used as an
/// audit trail on the authoritative tier when `propagation.log_events` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSubscriber;

impl LoggingSubscriber {
    /// Create the subscriber.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventSubscriber for LoggingSubscriber {
    fn name(&self) -> &str {
        "event-log"
    }

    async fn handle(&self, event: &ChangeEvent) -> Result<()> {
        let json = serde_json::to_string(event).unwrap_or_else(|_| format!("{:?}", event));
        info!(event_type = event.event_type(), event = %json, "Change event");
        Ok(())
    }
}

/// In-memory event collector for testing.
///
/// Collects events for later inspection; [`wait_for`](Self::wait_for) lets
/// async tests block until delivery has caught up.
#[derive(Debug)]
pub struct InMemoryEventCollector {
    name: String,
    events: parking_lot::RwLock<Vec<ChangeEvent>>,
    arrived: Notify,
}

impl Default for InMemoryEventCollector {
    fn default() -> Self {
        Self::named("collector")
    }
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collector reporting under `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: parking_lot::RwLock::new(Vec::new()),
            arrived: Notify::new(),
        }
    }

    /// Get all collected events.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.read().clone()
    }

    /// Number of events collected.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether nothing has been collected.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Forget collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Get events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<ChangeEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    /// Wait until at least `count` events have arrived.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.arrived.notified();
            tokio::pin!(notified);
            // register before checking so an arrival in between is not missed
            notified.as_mut().enable();

            if self.len() >= count {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.len() >= count;
            }
        }
    }
}

#[async_trait]
impl EventSubscriber for InMemoryEventCollector {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &ChangeEvent) -> Result<()> {
        self.events.write().push(event.clone());
        self.arrived.notify_waiters();
        Ok(())
    }
}

/// Forwards change events to another process's `/events` endpoint.
///
/// One POST per event, no retry. A peer that is down simply misses the event;
/// the failure surfaces as a logged delivery error.
pub struct HttpEventForwarder {
    name: String,
    url: String,
    client: Client,
}

impl HttpEventForwarder {
    pub fn new(peer: &Endpoint, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            name: format!("forward:{}", peer),
            url: format!("{}/events", peer),
            client,
        })
    }

    /// Target URL of the forwarded events.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for HttpEventForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEventForwarder")
            .field("url", &self.url)
            .finish()
    }
}

#[async_trait]
impl EventSubscriber for HttpEventForwarder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: &ChangeEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| Error::upstream(self.url.as_str(), e))?;

        if !response.status().is_success() {
            return Err(Error::upstream(
                self.url.as_str(),
                format!("peer answered {}", response.status()),
            ));
        }

        debug!(url = %self.url, event_type = event.event_type(), "Change event forwarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CatalogId, Item, ItemId};
    use assert_matches::assert_matches;

    fn item() -> Item {
        Item {
            id: ItemId(1),
            name: "RPCs for Noobs".into(),
            count: 3,
            price: 10.0,
            catalog_id: CatalogId(1),
        }
    }

    #[tokio::test]
    async fn test_logging_subscriber() {
        let subscriber = LoggingSubscriber::new();
        subscriber
            .handle(&ChangeEvent::item_changed(&item()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_in_memory_collector() {
        let collector = InMemoryEventCollector::new();
        assert!(collector.is_empty());

        collector
            .handle(&ChangeEvent::item_changed(&item()))
            .await
            .unwrap();
        collector
            .handle(&ChangeEvent::item_touched(ItemId(2)))
            .await
            .unwrap();

        assert_eq!(collector.len(), 2);
        assert_eq!(collector.events_of_type("item-changed").len(), 2);
        assert!(collector.events_of_type("order-confirmed").is_empty());
        assert!(collector.wait_for(2, Duration::from_millis(10)).await);
        assert!(!collector.wait_for(3, Duration::from_millis(10)).await);

        collector.clear();
        assert!(collector.is_empty());
    }

    #[tokio::test]
    async fn test_forwarder_reports_unreachable_peer() {
        // port 9 (discard) on localhost is not expected to accept connections
        let peer = Endpoint::new("http://127.0.0.1:9").unwrap();
        let forwarder = HttpEventForwarder::new(&peer, Duration::from_millis(200)).unwrap();
        assert_eq!(forwarder.url(), "http://127.0.0.1:9/events");
        assert_eq!(forwarder.name(), "forward:http://127.0.0.1:9");

        let result = forwarder.handle(&ChangeEvent::item_touched(ItemId(1))).await;
        assert_matches!(result, Err(Error::UpstreamUnavailable { .. }));
    }
}
