//! WebSocket transport - the client side of the notification link.
//!
//! A background supervisor task owns the socket. It connects, pumps frames
//! in both directions, and on any drop waits out the reconnect policy before
//! trying again, until `close` asks it to stop.
//!
//! ```text
//!   open() ──► spawn supervisor ──► connect ──► pump ──┐
//!                    ▲                                 │ drop
//!                    └──── backoff (Reconnecting) ◄────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use secrecy::ExposeSecret;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::backoff::ReconnectPolicy;
use crate::adapters::websocket::{ClientMessage, ServerMessage};
use crate::ports::{ChannelSignal, Transport, TransportEndpoint, TransportError, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CAPACITY: usize = 256;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome reported by the supervisor to callers waiting in `open`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkStatus {
    Connecting,
    Open,
    Failed(String),
    Closed,
}

/// Live socket state shared with the supervisor.
#[derive(Default)]
struct Link {
    open: AtomicBool,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
}

impl Link {
    fn outbound(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<ClientMessage>>> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn attach(&self, sender: mpsc::UnboundedSender<ClientMessage>) {
        *self.outbound() = Some(sender);
        self.open.store(true, Ordering::SeqCst);
    }

    fn detach(&self) {
        self.open.store(false, Ordering::SeqCst);
        *self.outbound() = None;
    }
}

struct Supervisor {
    shutdown: watch::Sender<bool>,
    status: watch::Receiver<LinkStatus>,
    task: JoinHandle<()>,
}

/// Reconnecting WebSocket client speaking the room protocol.
pub struct WebSocketTransport {
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    events: broadcast::Sender<TransportEvent>,
    link: Arc<Link>,
    supervisor: tokio::sync::Mutex<Option<Supervisor>>,
}

impl WebSocketTransport {
    /// Creates an idle transport. Nothing connects until `open`.
    pub fn new(policy: ReconnectPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            policy,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            events,
            link: Arc::new(Link::default()),
            supervisor: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn spawn_supervisor(&self, endpoint: TransportEndpoint) -> Supervisor {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(LinkStatus::Connecting);

        let task = tokio::spawn(supervise(
            endpoint,
            self.policy.clone(),
            self.connect_timeout,
            Arc::clone(&self.link),
            self.events.clone(),
            status_tx,
            shutdown_rx,
        ));

        Supervisor {
            shutdown: shutdown_tx,
            status: status_rx,
            task,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, endpoint: &TransportEndpoint) -> Result<(), TransportError> {
        let mut status = {
            let mut slot = self.supervisor.lock().await;
            let running = slot
                .as_ref()
                .map(|s| !s.task.is_finished())
                .unwrap_or(false);
            if !running {
                tracing::debug!(url = %endpoint.url(), "Starting link supervisor");
                *slot = Some(self.spawn_supervisor(endpoint.clone()));
            }
            match slot.as_ref() {
                Some(supervisor) => supervisor.status.clone(),
                None => return Err(TransportError::Closed),
            }
        };

        let outcome = status
            .wait_for(|s| *s != LinkStatus::Connecting)
            .await
            .map_err(|_| TransportError::Closed)?
            .clone();

        match outcome {
            LinkStatus::Open => Ok(()),
            LinkStatus::Failed(reason) => Err(TransportError::ConnectFailed(reason)),
            LinkStatus::Connecting | LinkStatus::Closed => Err(TransportError::Closed),
        }
    }

    async fn close(&self) {
        let supervisor = self.supervisor.lock().await.take();
        let Some(supervisor) = supervisor else {
            return;
        };

        let _ = supervisor.shutdown.send(true);
        if let Err(e) = supervisor.task.await {
            if !e.is_cancelled() {
                tracing::warn!(error = %e, "Link supervisor ended abnormally");
            }
        }
    }

    async fn send(&self, signal: ChannelSignal) -> Result<(), TransportError> {
        let outbound = self.link.outbound();
        let sender = outbound.as_ref().ok_or(TransportError::NotOpen)?;
        sender
            .send(ClientMessage::from(signal))
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.link.open.load(Ordering::SeqCst)
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.get_mut().take() {
            supervisor.task.abort();
        }
    }
}

async fn supervise(
    endpoint: TransportEndpoint,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    link: Arc<Link>,
    events: broadcast::Sender<TransportEvent>,
    status: watch::Sender<LinkStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let connected = tokio::select! {
            result = connect(&endpoint, connect_timeout) => result,
            _ = shutdown.changed() => break,
        };

        match connected {
            Ok(stream) => {
                attempt = 0;
                let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
                link.attach(outbound_tx);
                status.send_replace(LinkStatus::Open);
                let _ = events.send(TransportEvent::Connected);
                tracing::info!(url = %endpoint.url(), "Notification link open");

                let reason = pump(stream, outbound_rx, &events, &mut shutdown).await;

                link.detach();
                status.send_replace(LinkStatus::Connecting);
                let _ = events.send(TransportEvent::Disconnected {
                    reason: reason.clone(),
                });
                tracing::info!(url = %endpoint.url(), reason = %reason, "Notification link closed");
            }
            Err(e) => {
                tracing::warn!(url = %endpoint.url(), attempt, error = %e, "Notification link attempt failed");
                status.send_replace(LinkStatus::Failed(e.to_string()));
            }
        }

        if *shutdown.borrow() {
            break;
        }

        attempt = attempt.saturating_add(1);
        if policy.exhausted(attempt) {
            tracing::warn!(url = %endpoint.url(), attempt, "Reconnect attempts exhausted; giving up");
            break;
        }

        let delay = policy.delay_for(attempt);
        let _ = events.send(TransportEvent::Reconnecting { attempt, delay });
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting after delay");

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {}
        }
    }

    link.detach();
    // Keep the last failure visible to a caller still waiting in `open`.
    status.send_if_modified(|current| {
        if matches!(current, LinkStatus::Failed(_)) {
            false
        } else {
            *current = LinkStatus::Closed;
            true
        }
    });
}

async fn connect(endpoint: &TransportEndpoint, timeout: Duration) -> Result<WsStream, TransportError> {
    let mut request = endpoint
        .url()
        .into_client_request()
        .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

    if let Some(cookie) = endpoint.session_cookie() {
        let value = HeaderValue::from_str(cookie.expose_secret())
            .map_err(|e| TransportError::InvalidEndpoint(format!("invalid session cookie: {}", e)))?;
        request.headers_mut().insert(COOKIE, value);
    }

    let (stream, _response) = tokio::time::timeout(timeout, connect_async(request))
        .await
        .map_err(|_| TransportError::ConnectFailed(format!("timed out after {:?}", timeout)))?
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

    Ok(stream)
}

/// Moves frames until the link drops or shutdown is requested.
///
/// Returns the reason the link ended.
async fn pump(
    stream: WsStream,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    events: &broadcast::Sender<TransportEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> String {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_text(&text, events),
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = sink.send(Message::Pong(payload)).await {
                        return e.to_string();
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return frame
                        .map(|f| f.reason.to_string())
                        .filter(|reason| !reason.is_empty())
                        .unwrap_or_else(|| "server closed the link".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return e.to_string(),
                None => return "stream ended".to_string(),
            },
            Some(message) = outbound.recv() => {
                match serde_json::to_string(&message) {
                    Ok(json) => {
                        if let Err(e) = sink.send(Message::Text(json)).await {
                            return e.to_string();
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to serialize client message"),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = sink.send(Message::Close(None)).await;
                    return "client disconnect".to_string();
                }
            }
        }
    }
}

fn handle_text(text: &str, events: &broadcast::Sender<TransportEvent>) {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::BookingCreated(booking)) => {
            tracing::debug!(
                booking_id = %booking.booking_id,
                restaurant_id = %booking.restaurant_id,
                "Booking event received"
            );
            let _ = events.send(TransportEvent::Booking(booking));
        }
        Ok(ServerMessage::Connected(connected)) => {
            tracing::debug!(client_id = %connected.client_id, "Server acknowledged connection");
        }
        Ok(ServerMessage::Joined(room)) => {
            tracing::debug!(restaurant_id = %room.restaurant_id, "Joined restaurant channel");
        }
        Ok(ServerMessage::Left(room)) => {
            tracing::debug!(restaurant_id = %room.restaurant_id, "Left restaurant channel");
        }
        Ok(ServerMessage::Error(error)) => {
            tracing::warn!(code = %error.code, message = %error.message, "Server reported an error");
        }
        Ok(ServerMessage::Pong(_)) => {}
        Err(e) => tracing::warn!(error = %e, "Bad server message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::RestaurantId;

    fn unreachable_endpoint() -> TransportEndpoint {
        TransportEndpoint::new("ws://127.0.0.1:1/ws")
    }

    fn single_attempt() -> ReconnectPolicy {
        ReconnectPolicy::default().with_max_attempts(Some(0))
    }

    #[tokio::test]
    async fn new_transport_is_idle() {
        let transport = WebSocketTransport::new(ReconnectPolicy::default());

        assert!(!transport.is_open());
        assert_eq!(
            transport
                .send(ChannelSignal::Join(RestaurantId::new("rest-1").unwrap()))
                .await,
            Err(TransportError::NotOpen)
        );
    }

    #[tokio::test]
    async fn open_against_unreachable_server_fails() {
        let transport = WebSocketTransport::new(single_attempt())
            .with_connect_timeout(Duration::from_secs(2));

        let result = transport.open(&unreachable_endpoint()).await;

        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
        assert!(!transport.is_open());
        transport.close().await;
    }

    #[tokio::test]
    async fn open_after_server_drop_waits_for_reconnect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _ = ws.close(None).await;
        });

        let policy = ReconnectPolicy::default().with_initial_delay(Duration::from_secs(3));
        let transport = WebSocketTransport::new(policy).with_connect_timeout(Duration::from_secs(2));
        let endpoint = TransportEndpoint::new(format!("ws://{}/ws", addr));
        let mut events = transport.events();

        transport.open(&endpoint).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(TransportEvent::Disconnected { .. }) = events.recv().await {
                    break;
                }
            }
        })
        .await
        .expect("server close was not reported");

        let reopened =
            tokio::time::timeout(Duration::from_millis(300), transport.open(&endpoint)).await;
        assert!(reopened.is_err());
        assert!(!transport.is_open());
        transport.close().await;
    }

    #[tokio::test]
    async fn open_rejects_malformed_url() {
        let transport = WebSocketTransport::new(single_attempt());

        let result = transport.open(&TransportEndpoint::new("not a url")).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn close_without_open_is_noop() {
        let transport = WebSocketTransport::new(ReconnectPolicy::default());
        transport.close().await;
        assert!(!transport.is_open());
    }

    #[test]
    fn booking_frames_become_transport_events() {
        let (events, mut rx) = broadcast::channel(4);
        let frame = r#"{"type":"booking.created","bookingId":"b1","restaurantId":"rest-1","partySize":4}"#;

        handle_text(frame, &events);

        match rx.try_recv().unwrap() {
            TransportEvent::Booking(booking) => {
                assert_eq!(booking.booking_id.as_str(), "b1");
                assert_eq!(booking.party_size(), Some(4));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn non_booking_frames_emit_nothing() {
        let (events, mut rx) = broadcast::channel(4);

        handle_text(r#"{"type":"pong","timestamp":"2024-01-01T00:00:00Z"}"#, &events);
        handle_text("garbage", &events);

        assert!(rx.try_recv().is_err());
    }
}
