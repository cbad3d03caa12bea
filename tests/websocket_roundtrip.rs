//! End-to-end tests over a real socket.
//!
//! Starts the axum notification server on an ephemeral port and points a
//! `NotificationBridge` backed by `WebSocketTransport` at it. Bookings are
//! published as envelopes on the in-process bus, the way the booking
//! workflow (or the Redis relay) feeds them.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::net::TcpListener;

use booking_live::adapters::{
    websocket_router, BookingEventBridge, InMemoryEventBus, ReconnectPolicy, RoomManager,
    WebSocketState, WebSocketTransport,
};
use booking_live::application::{ConnectionRegistry, NotificationBridge};
use booking_live::domain::booking::BookingEvent;
use booking_live::domain::foundation::{BookingId, RestaurantId};
use booking_live::domain::notification::BridgeStatus;
use booking_live::ports::{EventPublisher, TransportEndpoint};

const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    addr: SocketAddr,
    rooms: Arc<RoomManager>,
    bus: Arc<InMemoryEventBus>,
}

impl TestServer {
    async fn start() -> Self {
        let rooms = Arc::new(RoomManager::new(16));
        let bus = Arc::new(InMemoryEventBus::new());
        BookingEventBridge::new_shared(rooms.clone()).register(bus.as_ref());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = websocket_router().with_state(WebSocketState::new(rooms.clone()));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, rooms, bus }
    }

    fn endpoint(&self) -> TransportEndpoint {
        TransportEndpoint::from_backend_url(&format!("http://{}", self.addr), "/ws").unwrap()
    }

    async fn wait_for_members(&self, restaurant: &RestaurantId, expected: usize) {
        tokio::time::timeout(WAIT, async {
            while self.rooms.client_count(restaurant).await != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timed out waiting for room membership");
    }

    async fn publish(&self, event: &BookingEvent) {
        self.bus.publish(event.to_envelope().unwrap()).await.unwrap();
    }
}

fn client_registry() -> Arc<ConnectionRegistry> {
    let policy = ReconnectPolicy::default()
        .with_initial_delay(Duration::from_millis(20))
        .with_max_delay(Duration::from_millis(100));
    let transport = WebSocketTransport::new(policy).with_connect_timeout(Duration::from_secs(2));
    Arc::new(ConnectionRegistry::new(Arc::new(transport)))
}

fn rest(id: &str) -> RestaurantId {
    RestaurantId::new(id).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn published_booking_reaches_subscribed_bridge() {
    let server = TestServer::start().await;
    let registry = client_registry();

    let bridge =
        NotificationBridge::subscribe(registry.clone(), server.endpoint(), Some(rest("rest-1")))
            .await;
    assert!(bridge.state().is_connected);
    assert_eq!(bridge.status(), BridgeStatus::Subscribed);
    server.wait_for_members(&rest("rest-1"), 1).await;

    let event: BookingEvent = serde_json::from_value(json!({
        "bookingId": "b1",
        "restaurantId": "rest-1",
        "customerName": "Ada",
        "partySize": 4,
        "timeSlot": "19:30"
    }))
    .unwrap();
    server.publish(&event).await;

    let mut state = bridge.watch();
    let state = tokio::time::timeout(WAIT, state.wait_for(|s| s.new_booking.is_some()))
        .await
        .expect("timed out waiting for booking")
        .unwrap()
        .clone();

    let received = state.new_booking.unwrap();
    assert_eq!(received.booking_id.as_str(), "b1");
    assert_eq!(received.party_size(), Some(4));
    assert_eq!(received.customer_name(), Some("Ada"));

    bridge.teardown().await;
    server.wait_for_members(&rest("rest-1"), 0).await;
    assert!(!registry.require().unwrap().is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn switching_restaurant_moves_server_membership() {
    let server = TestServer::start().await;
    let registry = client_registry();

    let bridge =
        NotificationBridge::subscribe(registry, server.endpoint(), Some(rest("rest-1"))).await;
    server.wait_for_members(&rest("rest-1"), 1).await;

    bridge.set_subject(Some(rest("rest-2"))).await;
    server.wait_for_members(&rest("rest-2"), 1).await;
    server.wait_for_members(&rest("rest-1"), 0).await;

    server
        .publish(&BookingEvent::new(BookingId::new("old").unwrap(), rest("rest-1")))
        .await;
    server
        .publish(&BookingEvent::new(BookingId::new("new").unwrap(), rest("rest-2")))
        .await;

    let mut state = bridge.watch();
    let state = tokio::time::timeout(WAIT, state.wait_for(|s| s.new_booking.is_some()))
        .await
        .expect("timed out waiting for booking")
        .unwrap()
        .clone();

    assert_eq!(state.new_booking.unwrap().booking_id.as_str(), "new");
    bridge.teardown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn two_dashboards_share_one_socket() {
    let server = TestServer::start().await;
    let registry = client_registry();

    let first =
        NotificationBridge::subscribe(registry.clone(), server.endpoint(), Some(rest("rest-1")))
            .await;
    let second =
        NotificationBridge::subscribe(registry.clone(), server.endpoint(), Some(rest("rest-2")))
            .await;

    server.wait_for_members(&rest("rest-1"), 1).await;
    server.wait_for_members(&rest("rest-2"), 1).await;
    assert_eq!(server.rooms.total_client_count().await, 1);
    assert_eq!(registry.require().unwrap().links_opened(), 1);

    first.teardown().await;
    assert!(registry.require().unwrap().is_connected());

    second.teardown().await;
    assert!(!registry.require().unwrap().is_connected());
}
