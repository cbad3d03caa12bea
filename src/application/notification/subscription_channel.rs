//! Restaurant-scoped channel membership over the shared link.
//!
//! Each consumer is a member of at most one restaurant channel. Wire
//! signals are reference counted per restaurant: a room shared by several
//! consumers is joined once and left when its last member leaves.
//!
//! ```text
//!   consumer-a ──┐                         ┌── join(rest-1)  (sent once)
//!   consumer-b ──┴── member of rest-1 ─────┤
//!   consumer-c ───── member of rest-2 ─────┴── join(rest-2)
//! ```
//!
//! Memberships recorded while the link is down are announced when the
//! transport reports `Connected`, which also covers rooms the server forgot
//! after a reconnect.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::foundation::{ConsumerId, RestaurantId};
use crate::ports::{ChannelListener, ChannelSignal, Transport, TransportError, TransportEvent};

#[derive(Default)]
struct ChannelState {
    /// consumer → restaurant it follows.
    memberships: HashMap<ConsumerId, RestaurantId>,

    /// Restaurants whose join has been sent on the current link.
    announced: HashSet<RestaurantId>,

    /// One listener per consumer.
    listeners: HashMap<ConsumerId, Arc<dyn ChannelListener>>,
}

impl ChannelState {
    fn has_other_member(&self, restaurant: &RestaurantId, except: &ConsumerId) -> bool {
        self.memberships
            .iter()
            .any(|(consumer, joined)| consumer != except && joined == restaurant)
    }
}

/// Channel membership and event routing for one connection handle.
pub struct SubscriptionChannel {
    transport: Arc<dyn Transport>,
    state: Mutex<ChannelState>,
}

impl SubscriptionChannel {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: Mutex::new(ChannelState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `consumer` a member of `restaurant`'s channel.
    ///
    /// Supersedes the consumer's previous membership: the previous room is
    /// left (if no one else follows it) before the new one is joined. The
    /// join signal is sent only while the link is open; otherwise it goes
    /// out on the next `Connected`.
    pub async fn join(
        &self,
        consumer: ConsumerId,
        restaurant: RestaurantId,
    ) -> Result<(), TransportError> {
        let (leave, join) = {
            let mut state = self.lock();
            let previous = state.memberships.insert(consumer, restaurant.clone());

            let leave = match previous {
                Some(prev) if prev != restaurant && !state.has_other_member(&prev, &consumer) => {
                    if state.announced.remove(&prev) {
                        Some(prev)
                    } else {
                        None
                    }
                }
                _ => None,
            };

            let join = if self.transport.is_open() && state.announced.insert(restaurant.clone()) {
                Some(restaurant.clone())
            } else {
                None
            };

            (leave, join)
        };

        if let Some(prev) = leave {
            if let Err(e) = self.send(ChannelSignal::Leave(prev.clone())).await {
                tracing::warn!(
                    consumer_id = %consumer,
                    restaurant_id = %prev,
                    error = %e,
                    "Failed to leave superseded channel"
                );
            }
        }

        if let Some(next) = join {
            if let Err(e) = self.send(ChannelSignal::Join(next.clone())).await {
                self.lock().announced.remove(&next);
                return Err(e);
            }
        }

        tracing::debug!(consumer_id = %consumer, restaurant_id = %restaurant, "Joined channel");
        Ok(())
    }

    /// Removes `consumer` from `restaurant`'s channel.
    ///
    /// No-op if the consumer is not a member of that restaurant.
    pub async fn leave(
        &self,
        consumer: ConsumerId,
        restaurant: &RestaurantId,
    ) -> Result<(), TransportError> {
        let signal = {
            let mut state = self.lock();
            if state.memberships.get(&consumer) != Some(restaurant) {
                return Ok(());
            }
            state.memberships.remove(&consumer);

            if state.has_other_member(restaurant, &consumer) {
                None
            } else if state.announced.remove(restaurant) && self.transport.is_open() {
                Some(ChannelSignal::Leave(restaurant.clone()))
            } else {
                None
            }
        };

        if let Some(signal) = signal {
            self.send(signal).await?;
        }

        tracing::debug!(consumer_id = %consumer, restaurant_id = %restaurant, "Left channel");
        Ok(())
    }

    /// Registers the consumer's listener, replacing any earlier one.
    ///
    /// Returns `true` if a previous listener was replaced.
    pub fn on_event(&self, consumer: ConsumerId, listener: Arc<dyn ChannelListener>) -> bool {
        self.lock().listeners.insert(consumer, listener).is_some()
    }

    /// Removes the consumer's listener. Returns `true` if one was registered.
    pub fn remove_listener(&self, consumer: &ConsumerId) -> bool {
        self.lock().listeners.remove(consumer).is_some()
    }

    /// Routes one transport event.
    ///
    /// Status events reach every listener; bookings only reach members of
    /// the booking's restaurant.
    pub async fn dispatch(&self, event: TransportEvent) {
        match &event {
            TransportEvent::Connected => {
                self.announce_pending().await;
                self.notify(self.all_listeners(), &event);
            }
            TransportEvent::Disconnected { reason } => {
                self.lock().announced.clear();
                tracing::debug!(reason = %reason, "Link down; channel joins will be re-sent");
                self.notify(self.all_listeners(), &event);
            }
            TransportEvent::Reconnecting { .. } => {
                self.notify(self.all_listeners(), &event);
            }
            TransportEvent::Booking(booking) => {
                let targets = self.members_of(&booking.restaurant_id);
                if targets.is_empty() {
                    tracing::debug!(
                        restaurant_id = %booking.restaurant_id,
                        booking_id = %booking.booking_id,
                        "Booking for a channel with no members dropped"
                    );
                    return;
                }
                self.notify(targets, &event);
            }
        }
    }

    /// Restaurant the consumer currently follows.
    pub fn membership(&self, consumer: &ConsumerId) -> Option<RestaurantId> {
        self.lock().memberships.get(consumer).cloned()
    }

    /// Restaurants joined on the current link.
    pub fn joined_rooms(&self) -> Vec<RestaurantId> {
        self.lock().announced.iter().cloned().collect()
    }

    /// True if `restaurant`'s room has been joined on the current link.
    pub fn is_joined(&self, restaurant: &RestaurantId) -> bool {
        self.lock().announced.contains(restaurant)
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    async fn announce_pending(&self) {
        let pending: Vec<RestaurantId> = {
            let mut state = self.lock();
            let ChannelState {
                memberships,
                announced,
                ..
            } = &mut *state;
            let rooms: HashSet<&RestaurantId> = memberships.values().collect();
            rooms
                .into_iter()
                .filter(|room| announced.insert((*room).clone()))
                .cloned()
                .collect()
        };

        for room in pending {
            if let Err(e) = self.send(ChannelSignal::Join(room.clone())).await {
                tracing::warn!(restaurant_id = %room, error = %e, "Failed to re-join channel");
                self.lock().announced.remove(&room);
            }
        }
    }

    fn all_listeners(&self) -> Vec<Arc<dyn ChannelListener>> {
        self.lock().listeners.values().cloned().collect()
    }

    fn members_of(&self, restaurant: &RestaurantId) -> Vec<Arc<dyn ChannelListener>> {
        let state = self.lock();
        state
            .memberships
            .iter()
            .filter(|(_, joined)| *joined == restaurant)
            .filter_map(|(consumer, _)| state.listeners.get(consumer).cloned())
            .collect()
    }

    fn notify(&self, listeners: Vec<Arc<dyn ChannelListener>>, event: &TransportEvent) {
        for listener in listeners {
            tracing::trace!(listener = listener.name(), "Dispatching channel event");
            listener.on_event(event);
        }
    }

    async fn send(&self, signal: ChannelSignal) -> Result<(), TransportError> {
        tracing::trace!(?signal, "Sending channel signal");
        self.transport.send(signal).await
    }
}
