//! Notification bridge - per-consumer view of booking events.
//!
//! A dashboard creates one bridge and points it at a restaurant (its
//! "subject"). The bridge attaches to the shared link, joins the
//! restaurant's channel, and exposes a [`BridgeState`] holding link
//! liveness and the latest booking for the current subject.
//!
//! Guarantees:
//! - With no subject the bridge never touches the registry or the link.
//! - On a subject change the old channel is left before the new one is
//!   joined, and `new_booking` is cleared at once.
//! - Bookings for any restaurant other than the current subject are dropped.
//! - Teardown leaves the channel, removes the listener, and releases the
//!   consumer; the link closes only when no other consumer holds it.
//!
//! Failures are logged, never surfaced; the state simply reports
//! `is_connected = false` until the transport reconnects.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::connection_registry::{ConnectionHandle, ConnectionRegistry};
use crate::domain::booking::BookingEvent;
use crate::domain::foundation::{ConsumerId, RestaurantId, StateMachine};
use crate::domain::notification::{BridgeState, BridgeStatus, Delivery};
use crate::ports::{ChannelListener, TransportEndpoint, TransportEvent};

#[derive(Default)]
struct BridgeInner {
    status: BridgeStatus,
    subject: Option<RestaurantId>,
    handle: Option<Arc<ConnectionHandle>>,
    state: BridgeState,
}

impl BridgeInner {
    fn move_to(&mut self, target: BridgeStatus, consumer: ConsumerId) {
        if self.status == target {
            return;
        }
        match self.status.transition_to(target) {
            Ok(next) => self.status = next,
            Err(e) => tracing::warn!(
                consumer_id = %consumer,
                from = ?self.status,
                to = ?target,
                error = %e,
                "Ignoring invalid bridge transition"
            ),
        }
    }
}

/// State shared between the bridge and its channel listener registration.
struct BridgeCore {
    consumer_id: ConsumerId,
    inner: Mutex<BridgeInner>,
    state_tx: watch::Sender<BridgeState>,
}

impl BridgeCore {
    fn new(consumer_id: ConsumerId) -> Self {
        let (state_tx, _) = watch::channel(BridgeState::default());
        Self {
            consumer_id,
            inner: Mutex::new(BridgeInner::default()),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BridgeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &BridgeInner) {
        self.state_tx.send_replace(inner.state.clone());
    }

    fn deliver(&self, booking: &BookingEvent) -> Delivery {
        let mut inner = self.lock();
        if inner.status == BridgeStatus::TornDown {
            return Delivery::Ignored;
        }

        match inner.subject.as_ref() {
            None => Delivery::Ignored,
            Some(subject) if booking.is_for(subject) => {
                inner.state.new_booking = Some(booking.clone());
                self.publish(&inner);
                tracing::debug!(
                    consumer_id = %self.consumer_id,
                    booking_id = %booking.booking_id,
                    restaurant_id = %booking.restaurant_id,
                    "Booking delivered"
                );
                Delivery::Applied
            }
            Some(subject) => {
                tracing::debug!(
                    consumer_id = %self.consumer_id,
                    subject = %subject,
                    restaurant_id = %booking.restaurant_id,
                    "Stale booking discarded"
                );
                Delivery::StaleDiscarded
            }
        }
    }

    /// Marks the link live. The bridge counts as subscribed only once its
    /// subject's room has been joined on this link.
    fn link_up(&self) {
        let mut inner = self.lock();
        if !inner.status.has_intent() {
            return;
        }
        inner.state.is_connected = true;
        let joined = match (inner.subject.as_ref(), inner.handle.as_ref()) {
            (Some(subject), Some(handle)) => handle.channel().is_joined(subject),
            _ => false,
        };
        let target = if joined {
            BridgeStatus::Subscribed
        } else {
            BridgeStatus::Connecting
        };
        inner.move_to(target, self.consumer_id);
        self.publish(&inner);
    }

    fn link_down(&self, reason: &str) {
        let mut inner = self.lock();
        if !inner.status.has_intent() {
            return;
        }
        inner.state.is_connected = false;
        inner.move_to(BridgeStatus::Connecting, self.consumer_id);
        self.publish(&inner);
        tracing::debug!(consumer_id = %self.consumer_id, reason, "Bridge lost its link");
    }
}

impl ChannelListener for BridgeCore {
    fn on_event(&self, event: &TransportEvent) {
        match event {
            TransportEvent::Connected => self.link_up(),
            TransportEvent::Disconnected { reason } => self.link_down(reason),
            TransportEvent::Reconnecting { attempt, delay } => {
                tracing::trace!(
                    consumer_id = %self.consumer_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Link reconnecting"
                );
            }
            TransportEvent::Booking(booking) => {
                self.deliver(booking);
            }
        }
    }

    fn name(&self) -> &'static str {
        "NotificationBridge"
    }
}

/// Booking notifications for one consumer.
///
/// # Example
///
/// ```ignore
/// let bridge = NotificationBridge::subscribe(registry, endpoint, Some(restaurant_id)).await;
/// let mut state = bridge.watch();
/// while state.changed().await.is_ok() {
///     if let Some(booking) = &state.borrow().new_booking {
///         show_toast(booking);
///     }
/// }
/// bridge.teardown().await;
/// ```
pub struct NotificationBridge {
    consumer_id: ConsumerId,
    registry: Arc<ConnectionRegistry>,
    endpoint: TransportEndpoint,
    core: Arc<BridgeCore>,
    transitions: tokio::sync::Mutex<()>,
}

impl NotificationBridge {
    /// Creates an idle bridge. Touches nothing until a subject is set.
    pub fn new(registry: Arc<ConnectionRegistry>, endpoint: TransportEndpoint) -> Self {
        let consumer_id = ConsumerId::new();
        Self {
            consumer_id,
            registry,
            endpoint,
            core: Arc::new(BridgeCore::new(consumer_id)),
            transitions: tokio::sync::Mutex::new(()),
        }
    }

    /// Creates a bridge and points it at `subject`.
    pub async fn subscribe(
        registry: Arc<ConnectionRegistry>,
        endpoint: TransportEndpoint,
        subject: Option<RestaurantId>,
    ) -> Self {
        let bridge = Self::new(registry, endpoint);
        bridge.set_subject(subject).await;
        bridge
    }

    pub fn consumer_id(&self) -> ConsumerId {
        self.consumer_id
    }

    /// Snapshot of the observable state.
    pub fn state(&self) -> BridgeState {
        self.core.state_tx.borrow().clone()
    }

    /// Receiver that wakes on every state change.
    pub fn watch(&self) -> watch::Receiver<BridgeState> {
        self.core.state_tx.subscribe()
    }

    pub fn status(&self) -> BridgeStatus {
        self.core.lock().status
    }

    pub fn subject(&self) -> Option<RestaurantId> {
        self.core.lock().subject.clone()
    }

    /// Points the bridge at a new restaurant, or at none.
    ///
    /// Setting the current subject again is a no-op. Ignored after teardown.
    pub async fn set_subject(&self, subject: Option<RestaurantId>) {
        let _transition = self.transitions.lock().await;

        let (status, current) = {
            let inner = self.core.lock();
            (inner.status, inner.subject.clone())
        };
        if status == BridgeStatus::TornDown {
            tracing::warn!(consumer_id = %self.consumer_id, "Subject change after teardown ignored");
            return;
        }
        if current == subject {
            return;
        }

        if let Some(previous) = current {
            self.leave(&previous).await;
        }

        match subject {
            Some(next) => self.enter(next).await,
            None => self.go_idle(),
        }
    }

    /// Leaves the channel, releases the consumer, and stops all updates.
    ///
    /// Idempotent. The link closes only if no other consumer holds it.
    pub async fn teardown(&self) {
        let _transition = self.transitions.lock().await;

        let (subject, handle) = {
            let mut inner = self.core.lock();
            if inner.status == BridgeStatus::TornDown {
                return;
            }
            let subject = inner.subject.take();
            let handle = inner.handle.take();
            inner.state = BridgeState::disconnected();
            inner.move_to(BridgeStatus::TornDown, self.consumer_id);
            self.core.publish(&inner);
            (subject, handle)
        };

        let Some(handle) = handle else {
            tracing::debug!(consumer_id = %self.consumer_id, "Bridge torn down without connecting");
            return;
        };

        if let Some(subject) = subject {
            if let Err(e) = handle.channel().leave(self.consumer_id, &subject).await {
                tracing::warn!(consumer_id = %self.consumer_id, error = %e, "Failed to leave channel on teardown");
            }
        }
        handle.channel().remove_listener(&self.consumer_id);

        match self.registry.release(self.consumer_id).await {
            Ok(closed) => tracing::info!(consumer_id = %self.consumer_id, link_closed = closed, "Bridge torn down"),
            Err(e) => tracing::warn!(consumer_id = %self.consumer_id, error = %e, "Failed to release consumer"),
        }
    }

    async fn enter(&self, next: RestaurantId) {
        let handle = self.ensure_handle();
        {
            let mut inner = self.core.lock();
            inner.subject = Some(next.clone());
            inner.state.new_booking = None;
            inner.state.is_connected = handle.is_connected();
            inner.move_to(BridgeStatus::Connecting, self.consumer_id);
            self.core.publish(&inner);
        }

        if let Err(e) = self.registry.attach(self.consumer_id).await {
            tracing::warn!(
                consumer_id = %self.consumer_id,
                error = %e,
                "Connect failed; waiting for the link to come back"
            );
        }

        if let Err(e) = handle.channel().join(self.consumer_id, next.clone()).await {
            tracing::warn!(
                consumer_id = %self.consumer_id,
                restaurant_id = %next,
                error = %e,
                "Join deferred until the link is live"
            );
        }

        let live = handle.is_connected();
        let joined = live && handle.channel().is_joined(&next);
        {
            let mut inner = self.core.lock();
            inner.state.is_connected = live;
            if joined {
                inner.move_to(BridgeStatus::Subscribed, self.consumer_id);
            }
            self.core.publish(&inner);
        }

        tracing::info!(
            consumer_id = %self.consumer_id,
            restaurant_id = %next,
            connected = live,
            joined,
            "Subscribed to booking notifications"
        );
    }

    async fn leave(&self, previous: &RestaurantId) {
        let handle = self.core.lock().handle.clone();
        let Some(handle) = handle else {
            return;
        };

        if let Err(e) = handle.channel().leave(self.consumer_id, previous).await {
            tracing::warn!(
                consumer_id = %self.consumer_id,
                restaurant_id = %previous,
                error = %e,
                "Failed to leave channel"
            );
        }
    }

    fn go_idle(&self) {
        let mut inner = self.core.lock();
        inner.subject = None;
        inner.state = BridgeState::disconnected();
        inner.move_to(BridgeStatus::Idle, self.consumer_id);
        self.core.publish(&inner);
        tracing::debug!(consumer_id = %self.consumer_id, "Subject cleared");
    }

    fn ensure_handle(&self) -> Arc<ConnectionHandle> {
        let mut inner = self.core.lock();
        if let Some(handle) = inner.handle.as_ref() {
            return Arc::clone(handle);
        }

        let handle = self.registry.acquire(self.endpoint.clone());
        let listener: Arc<dyn ChannelListener> = self.core.clone();
        handle.channel().on_event(self.consumer_id, listener);
        inner.handle = Some(Arc::clone(&handle));
        handle
    }
}

impl Drop for NotificationBridge {
    fn drop(&mut self) {
        let (subject, handle) = {
            let mut inner = self.core.lock();
            if inner.status == BridgeStatus::TornDown {
                return;
            }
            let subject = inner.subject.take();
            let handle = inner.handle.take();
            inner.state = BridgeState::disconnected();
            inner.move_to(BridgeStatus::TornDown, self.consumer_id);
            self.core.publish(&inner);
            (subject, handle)
        };

        let Some(handle) = handle else {
            return;
        };
        handle.channel().remove_listener(&self.consumer_id);

        let registry = Arc::clone(&self.registry);
        let consumer = self.consumer_id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Some(subject) = subject {
                        let _ = handle.channel().leave(consumer, &subject).await;
                    }
                    if let Err(e) = registry.release(consumer).await {
                        tracing::warn!(consumer_id = %consumer, error = %e, "Failed to release dropped bridge");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(consumer_id = %consumer, "Bridge dropped outside a runtime; consumer not released");
            }
        }
    }
}
