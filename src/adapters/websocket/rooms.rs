//! WebSocket room management for restaurant-based message routing.
//!
//! Rooms are organized by restaurant ID, allowing targeted broadcast of
//! booking events to all dashboards watching a specific restaurant.
//!
//! # Architecture
//!
//! ```text
//! Room: rest-1         Room: rest-2
//! ├── client-a         ├── client-a
//! ├── client-b         └── client-e
//! └── client-c
//! ```
//!
//! When a booking is created for rest-1, only clients a, b, c receive it.
//! One connection may sit in several rooms: a browser shares a single
//! socket between all of its dashboards.
//!
//! Each registered client owns one bounded mailbox. Broadcasts never
//! block: a client whose mailbox is full misses that booking.

use std::collections::{HashMap, HashSet};

use tokio::sync::{
    mpsc::{self, error::TrySendError},
    RwLock,
};
use uuid::Uuid;

use crate::domain::booking::BookingEvent;
use crate::domain::foundation::RestaurantId;

/// Unique identifier for a WebSocket client connection.
///
/// Generated server-side when a client connects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    /// Create a new random client ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct ClientEntry {
    mailbox: mpsc::Sender<BookingEvent>,
    rooms: HashSet<RestaurantId>,
}

#[derive(Default)]
struct Rooms {
    /// restaurant_id → clients joined to it.
    members: HashMap<RestaurantId, HashSet<ClientId>>,
    /// client_id → mailbox and joined rooms, for O(1) cleanup on disconnect.
    clients: HashMap<ClientId, ClientEntry>,
}

/// Manages WebSocket connection rooms organized by restaurant.
///
/// # Thread Safety
///
/// Uses `RwLock` for the room registry since broadcasts (reads) vastly
/// outnumber joins/leaves (writes).
pub struct RoomManager {
    rooms: RwLock<Rooms>,

    /// Mailbox capacity for each client.
    channel_capacity: usize,
}

impl RoomManager {
    /// Create a new room manager with specified per-client capacity.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(Rooms::default()),
            channel_capacity: channel_capacity.max(1),
        }
    }

    /// Create with default capacity (128 messages).
    pub fn with_default_capacity() -> Self {
        Self::new(128)
    }

    /// Register a connection and return its mailbox.
    ///
    /// Registering an existing client replaces its mailbox and keeps its rooms.
    pub async fn register(&self, client_id: ClientId) -> mpsc::Receiver<BookingEvent> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let mut rooms = self.rooms.write().await;
        match rooms.clients.get_mut(&client_id) {
            Some(entry) => entry.mailbox = tx,
            None => {
                rooms.clients.insert(
                    client_id,
                    ClientEntry {
                        mailbox: tx,
                        rooms: HashSet::new(),
                    },
                );
            }
        }
        rx
    }

    /// Remove a connection from every room it joined.
    ///
    /// Returns the rooms it was in. Emptied rooms are cleaned up.
    pub async fn unregister(&self, client_id: &ClientId) -> Vec<RestaurantId> {
        let mut rooms = self.rooms.write().await;
        let Some(entry) = rooms.clients.remove(client_id) else {
            return Vec::new();
        };

        for restaurant_id in &entry.rooms {
            rooms.remove_member(restaurant_id, client_id);
        }
        entry.rooms.into_iter().collect()
    }

    /// Join a registered client to a restaurant room.
    ///
    /// Returns `true` if the client was not already in the room. Unknown
    /// clients are ignored.
    pub async fn join(&self, restaurant_id: &RestaurantId, client_id: &ClientId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(entry) = rooms.clients.get_mut(client_id) else {
            return false;
        };
        if !entry.rooms.insert(restaurant_id.clone()) {
            return false;
        }

        rooms
            .members
            .entry(restaurant_id.clone())
            .or_default()
            .insert(client_id.clone());
        true
    }

    /// Remove a client from one room. Returns `true` if it was a member.
    pub async fn leave(&self, restaurant_id: &RestaurantId, client_id: &ClientId) -> bool {
        let mut rooms = self.rooms.write().await;
        let was_member = rooms
            .clients
            .get_mut(client_id)
            .is_some_and(|entry| entry.rooms.remove(restaurant_id));

        if was_member {
            rooms.remove_member(restaurant_id, client_id);
        }
        was_member
    }

    /// Rooms the client is currently in.
    pub async fn rooms_of(&self, client_id: &ClientId) -> Vec<RestaurantId> {
        self.rooms
            .read()
            .await
            .clients
            .get(client_id)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Broadcast a booking to all clients in a restaurant room.
    ///
    /// Returns the number of clients reached; 0 if the room is empty.
    pub async fn broadcast_to_restaurant(
        &self,
        restaurant_id: &RestaurantId,
        event: BookingEvent,
    ) -> usize {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.members.get(restaurant_id) else {
            return 0;
        };

        let mut reached = 0;
        for client_id in members {
            let Some(entry) = rooms.clients.get(client_id) else {
                continue;
            };
            match entry.mailbox.try_send(event.clone()) {
                Ok(()) => reached += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        client_id = %client_id,
                        restaurant_id = %restaurant_id,
                        "Client lagging; booking dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        reached
    }

    /// Number of clients joined to a room.
    pub async fn client_count(&self, restaurant_id: &RestaurantId) -> usize {
        self.rooms
            .read()
            .await
            .members
            .get(restaurant_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// All active room IDs (for monitoring/debugging).
    pub async fn active_rooms(&self) -> Vec<RestaurantId> {
        self.rooms.read().await.members.keys().cloned().collect()
    }

    /// Connections joined to at least one room.
    pub async fn total_client_count(&self) -> usize {
        self.rooms
            .read()
            .await
            .clients
            .values()
            .filter(|entry| !entry.rooms.is_empty())
            .count()
    }
}

impl Rooms {
    fn remove_member(&mut self, restaurant_id: &RestaurantId, client_id: &ClientId) {
        if let Some(members) = self.members.get_mut(restaurant_id) {
            members.remove(client_id);
            if members.is_empty() {
                self.members.remove(restaurant_id);
            }
        }
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::BookingId;
    use tokio::sync::mpsc::error::TryRecvError;

    fn rest(id: &str) -> RestaurantId {
        RestaurantId::new(id).unwrap()
    }

    fn test_booking(restaurant: &str) -> BookingEvent {
        BookingEvent::new(BookingId::new("b1").unwrap(), rest(restaurant))
            .with_field("partySize", 2)
    }

    async fn joined(manager: &RoomManager, restaurant: &str) -> (ClientId, mpsc::Receiver<BookingEvent>) {
        let client = ClientId::new();
        let rx = manager.register(client.clone()).await;
        manager.join(&rest(restaurant), &client).await;
        (client, rx)
    }

    #[tokio::test]
    async fn join_creates_room_if_not_exists() {
        let manager = RoomManager::with_default_capacity();

        let _client = joined(&manager, "rest-1").await;

        assert_eq!(manager.active_rooms().await, vec![rest("rest-1")]);
    }

    #[tokio::test]
    async fn joined_client_receives_broadcasts() {
        let manager = RoomManager::with_default_capacity();
        let (_client, mut rx) = joined(&manager, "rest-1").await;

        let reached = manager
            .broadcast_to_restaurant(&rest("rest-1"), test_booking("rest-1"))
            .await;

        assert_eq!(reached, 1);
        let received = rx.recv().await.unwrap();
        assert_eq!(received.party_size(), Some(2));
    }

    #[tokio::test]
    async fn multiple_clients_in_same_room_all_receive_broadcast() {
        let manager = RoomManager::with_default_capacity();

        let (_a, mut rx1) = joined(&manager, "rest-1").await;
        let (_b, mut rx2) = joined(&manager, "rest-1").await;

        manager
            .broadcast_to_restaurant(&rest("rest-1"), test_booking("rest-1"))
            .await;

        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn clients_in_other_rooms_receive_nothing() {
        let manager = RoomManager::with_default_capacity();

        let (_a, _rx1) = joined(&manager, "rest-1").await;
        let (_b, mut rx2) = joined(&manager, "rest-2").await;

        manager
            .broadcast_to_restaurant(&rest("rest-1"), test_booking("rest-1"))
            .await;

        assert!(matches!(rx2.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn one_client_can_sit_in_several_rooms() {
        let manager = RoomManager::with_default_capacity();
        let (client, mut rx) = joined(&manager, "A").await;
        assert!(manager.join(&rest("B"), &client).await);

        manager.broadcast_to_restaurant(&rest("A"), test_booking("A")).await;
        manager.broadcast_to_restaurant(&rest("B"), test_booking("B")).await;

        assert_eq!(rx.recv().await.unwrap().restaurant_id, rest("A"));
        assert_eq!(rx.recv().await.unwrap().restaurant_id, rest("B"));
        assert_eq!(manager.total_client_count().await, 1);

        let mut rooms = manager.rooms_of(&client).await;
        rooms.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(rooms, vec![rest("A"), rest("B")]);
    }

    #[tokio::test]
    async fn joining_twice_is_reported_once() {
        let manager = RoomManager::with_default_capacity();
        let (client, _rx) = joined(&manager, "A").await;

        assert!(!manager.join(&rest("A"), &client).await);
        assert_eq!(manager.client_count(&rest("A")).await, 1);
    }

    #[tokio::test]
    async fn join_ignores_unregistered_client() {
        let manager = RoomManager::with_default_capacity();

        assert!(!manager.join(&rest("A"), &ClientId::new()).await);
        assert!(manager.active_rooms().await.is_empty());
    }

    #[tokio::test]
    async fn leave_removes_only_that_room_and_cleans_up() {
        let manager = RoomManager::with_default_capacity();
        let (client, _rx) = joined(&manager, "A").await;
        manager.join(&rest("B"), &client).await;

        assert!(manager.leave(&rest("A"), &client).await);
        assert!(!manager.leave(&rest("A"), &client).await);

        assert_eq!(manager.active_rooms().await, vec![rest("B")]);
        assert_eq!(manager.rooms_of(&client).await, vec![rest("B")]);
    }

    #[tokio::test]
    async fn unregister_leaves_every_room() {
        let manager = RoomManager::with_default_capacity();
        let (client, _rx) = joined(&manager, "A").await;
        manager.join(&rest("B"), &client).await;

        let mut left = manager.unregister(&client).await;
        left.sort_by(|a, b| a.as_str().cmp(b.as_str()));

        assert_eq!(left, vec![rest("A"), rest("B")]);
        assert_eq!(manager.total_client_count().await, 0);
        assert!(manager.active_rooms().await.is_empty());
        assert!(manager.unregister(&client).await.is_empty());
    }

    #[tokio::test]
    async fn full_mailbox_drops_booking_without_blocking() {
        let manager = RoomManager::new(1);
        let (_client, mut rx) = joined(&manager, "A").await;

        assert_eq!(manager.broadcast_to_restaurant(&rest("A"), test_booking("A")).await, 1);
        assert_eq!(manager.broadcast_to_restaurant(&rest("A"), test_booking("A")).await, 0);

        assert!(rx.recv().await.is_some());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn broadcast_to_nonexistent_room_reaches_nobody() {
        let manager = RoomManager::with_default_capacity();

        let reached = manager
            .broadcast_to_restaurant(&rest("nobody"), test_booking("nobody"))
            .await;

        assert_eq!(reached, 0);
    }

    #[test]
    fn client_id_display_is_uuid() {
        assert_eq!(ClientId::new().to_string().len(), 36);
    }
}
