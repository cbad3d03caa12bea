//! In-process event bus.
//!
//! Delivers each published envelope to the handlers subscribed to its
//! event type, in registration order, on the publisher's task. The server
//! uses it to hand `booking.created` envelopes to the WebSocket bridge;
//! tests use its capture helpers to assert on what was published.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope};
use crate::ports::{EventHandler, EventPublisher, EventSubscriber};

/// Number of envelopes kept for inspection by default.
const DEFAULT_HISTORY: usize = 1024;

/// In-process event bus.
///
/// Features:
/// - Synchronous delivery (deterministic for tests)
/// - Bounded capture of published envelopes for assertions
/// - Handler errors are collected and reported together
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryEventBus::new());
/// BookingEventBridge::new_shared(room_manager).register(bus.as_ref());
///
/// bus.publish(booking.to_envelope()?).await?;
/// assert!(bus.has_event("booking.created"));
/// ```
pub struct InMemoryEventBus {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
    published: RwLock<VecDeque<EventEnvelope>>,
    history_limit: usize,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryEventBus {
    /// Creates a bus keeping the last 1024 envelopes.
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY)
    }

    /// Creates a bus keeping at most `limit` envelopes (0 disables capture).
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            published: RwLock::new(VecDeque::new()),
            history_limit: limit,
        }
    }

    // === Inspection Helpers ===

    /// Returns captured envelopes, oldest first.
    pub fn published_events(&self) -> Vec<EventEnvelope> {
        read(&self.published).iter().cloned().collect()
    }

    /// Returns captured envelopes of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        read(&self.published)
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Clears captured envelopes (for test isolation).
    pub fn clear(&self) {
        write(&self.published).clear();
    }

    pub fn event_count(&self) -> usize {
        read(&self.published).len()
    }

    pub fn has_event(&self, event_type: &str) -> bool {
        read(&self.published)
            .iter()
            .any(|e| e.event_type == event_type)
    }

    /// Number of handlers registered for an event type.
    pub fn handler_count(&self, event_type: &str) -> usize {
        read(&self.handlers)
            .get(event_type)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn capture(&self, event: &EventEnvelope) {
        if self.history_limit == 0 {
            return;
        }
        let mut published = write(&self.published);
        while published.len() >= self.history_limit {
            published.pop_front();
        }
        published.push_back(event.clone());
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        self.capture(&event);

        // Clone handlers to release lock before await points
        let type_handlers: Vec<Arc<dyn EventHandler>> = read(&self.handlers)
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();

        if type_handlers.is_empty() {
            tracing::trace!(event_type = %event.event_type, "No handlers for event");
        }

        let mut errors = Vec::new();
        for handler in type_handlers {
            if let Err(e) = handler.handle(event.clone()).await {
                tracing::warn!(
                    handler = handler.name(),
                    event_type = %event.event_type,
                    event_id = %event.event_id,
                    error = %e,
                    "Event handler failed"
                );
                errors.push(format!("{}: {}", handler.name(), e));
            }
        }

        if !errors.is_empty() {
            return Err(DomainError::new(
                ErrorCode::EventHandlerFailed,
                format!("Handler errors: {}", errors.join(", ")),
            ));
        }

        Ok(())
    }

    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}

impl EventSubscriber for InMemoryEventBus {
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>) {
        tracing::debug!(event_type, handler = handler.name(), "Handler subscribed");
        write(&self.handlers)
            .entry(event_type.to_string())
            .or_default()
            .push(handler);
    }

    fn subscribe_all(&self, event_types: &[&str], handler: Arc<dyn EventHandler>) {
        for event_type in event_types {
            self.subscribe(event_type, Arc::clone(&handler));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::{BookingEvent, BOOKING_CREATED};
    use crate::domain::foundation::{BookingId, RestaurantId};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn booking_envelope(booking_id: &str) -> EventEnvelope {
        BookingEvent::new(
            BookingId::new(booking_id).unwrap(),
            RestaurantId::new("rest-1").unwrap(),
        )
        .to_envelope()
        .unwrap()
    }

    struct CountingHandler(Arc<AtomicUsize>);

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(&self, _: EventEnvelope) -> Result<(), DomainError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn name(&self) -> &'static str {
            "CountingHandler"
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl EventHandler for FailingHandler {
        async fn handle(&self, _: EventEnvelope) -> Result<(), DomainError> {
            Err(DomainError::new(ErrorCode::InternalError, "Handler failed"))
        }
        fn name(&self) -> &'static str {
            "FailingHandler"
        }
    }

    #[tokio::test]
    async fn publish_captures_event() {
        let bus = InMemoryEventBus::new();

        bus.publish(booking_envelope("b1")).await.unwrap();

        assert_eq!(bus.event_count(), 1);
        assert!(bus.has_event(BOOKING_CREATED));
        assert_eq!(bus.events_of_type(BOOKING_CREATED).len(), 1);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let bus = InMemoryEventBus::with_history_limit(2);

        for id in ["b1", "b2", "b3"] {
            bus.publish(booking_envelope(id)).await.unwrap();
        }

        let ids: Vec<String> = bus
            .published_events()
            .into_iter()
            .map(|e| e.aggregate_id)
            .collect();
        assert_eq!(ids, vec!["b2", "b3"]);
    }

    #[tokio::test]
    async fn zero_history_disables_capture_but_still_delivers() {
        let bus = InMemoryEventBus::with_history_limit(0);
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe(BOOKING_CREATED, Arc::new(CountingHandler(counter.clone())));

        bus.publish(booking_envelope("b1")).await.unwrap();

        assert_eq!(bus.event_count(), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handlers_only_see_subscribed_types() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe_all(
            &[BOOKING_CREATED, "booking.cancelled"],
            Arc::new(CountingHandler(counter.clone())),
        );

        bus.publish(booking_envelope("b1")).await.unwrap();
        bus.publish(EventEnvelope::new("review.posted", "r1", "Review", json!({})))
            .await
            .unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count(BOOKING_CREATED), 1);
        assert_eq!(bus.handler_count("booking.cancelled"), 1);
    }

    #[tokio::test]
    async fn publish_all_publishes_in_order() {
        let bus = InMemoryEventBus::new();

        bus.publish_all(vec![booking_envelope("b1"), booking_envelope("b2")])
            .await
            .unwrap();

        assert_eq!(bus.event_count(), 2);
        assert_eq!(bus.published_events()[0].aggregate_id, "b1");
    }

    #[tokio::test]
    async fn handler_error_is_reported_after_all_handlers_run() {
        let bus = InMemoryEventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe(BOOKING_CREATED, Arc::new(FailingHandler));
        bus.subscribe(BOOKING_CREATED, Arc::new(CountingHandler(counter.clone())));

        let result = bus.publish(booking_envelope("b1")).await;

        let err = result.unwrap_err();
        assert_eq!(err.code, ErrorCode::EventHandlerFailed);
        assert!(err.message.contains("FailingHandler"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn clear_removes_captured_events() {
        let bus = InMemoryEventBus::new();
        bus.publish(booking_envelope("b1")).await.unwrap();

        bus.clear();

        assert_eq!(bus.event_count(), 0);
    }
}
