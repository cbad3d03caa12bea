//! WebSocket upgrade handler for real-time booking notifications.
//!
//! Handles the HTTP → WebSocket upgrade and manages the connection lifecycle:
//! 1. Upgrade to WebSocket and greet the client
//! 2. Join/leave restaurant rooms on request
//! 3. Forward room broadcasts as `booking.created` messages
//! 4. Clean up room membership on disconnect

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};

use super::{
    messages::{ClientMessage, ServerMessage},
    rooms::{ClientId, RoomManager},
};

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    /// Room manager for restaurant-based routing.
    pub room_manager: Arc<RoomManager>,
}

impl WebSocketState {
    pub fn new(room_manager: Arc<RoomManager>) -> Self {
        Self { room_manager }
    }
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws`
///
/// The session cookie travels with the upgrade request; verifying it is
/// left to the surrounding deployment.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WebSocketState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection.
///
/// Runs for the lifetime of the connection. The connection may join any
/// number of rooms; bookings from all of them arrive on one mailbox.
async fn handle_socket(socket: WebSocket, state: WebSocketState) {
    let (mut sender, mut receiver) = socket.split();
    let client_id = ClientId::new();

    if let Err(e) = send_message(&mut sender, &ServerMessage::connected(client_id.to_string())).await
    {
        tracing::debug!(client_id = %client_id, error = %e, "Client disconnected before greeting");
        return;
    }
    tracing::debug!(client_id = %client_id, "Client connected");

    let mut mailbox = state.room_manager.register(client_id.clone()).await;

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let reply = match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, &client_id, &text).await
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::warn!(client_id = %client_id, "Received unsupported binary message");
                        continue;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(client_id = %client_id, "Client closed connection");
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(client_id = %client_id, error = %e, "Receive error");
                        break;
                    }
                };

                if let Err(e) = send_message(&mut sender, &reply).await {
                    tracing::debug!(client_id = %client_id, error = %e, "Send error, closing connection");
                    break;
                }
            }
            Some(booking) = mailbox.recv() => {
                let msg = ServerMessage::BookingCreated(booking);
                if let Err(e) = send_message(&mut sender, &msg).await {
                    tracing::debug!(client_id = %client_id, error = %e, "Send error, closing connection");
                    break;
                }
            }
        }
    }

    let rooms = state.room_manager.unregister(&client_id).await;
    tracing::debug!(client_id = %client_id, rooms = rooms.len(), "Client disconnected");
}

/// Apply one client text frame and build the reply.
async fn handle_client_message(
    state: &WebSocketState,
    client_id: &ClientId,
    text: &str,
) -> ServerMessage {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Join(room)) => {
            if state.room_manager.join(&room.restaurant_id, client_id).await {
                tracing::debug!(
                    client_id = %client_id,
                    restaurant_id = %room.restaurant_id,
                    "Client joined room"
                );
            }
            ServerMessage::Joined(room)
        }
        Ok(ClientMessage::Leave(room)) => {
            if state.room_manager.leave(&room.restaurant_id, client_id).await {
                tracing::debug!(
                    client_id = %client_id,
                    restaurant_id = %room.restaurant_id,
                    "Client left room"
                );
            }
            ServerMessage::Left(room)
        }
        Ok(ClientMessage::Ping) => ServerMessage::pong(),
        Err(e) => {
            tracing::debug!(client_id = %client_id, error = %e, "Invalid client message");
            ServerMessage::error("INVALID_MESSAGE", e.to_string())
        }
    }
}

/// Send a JSON message over the WebSocket.
async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    sender.send(Message::Text(json)).await
}

/// Create axum router for the WebSocket endpoint.
///
/// # Example
///
/// ```ignore
/// let app = websocket_router().with_state(WebSocketState::new(room_manager));
/// ```
pub fn websocket_router() -> axum::Router<WebSocketState> {
    use axum::routing::get;

    axum::Router::new().route("/ws", get(ws_handler))
}
