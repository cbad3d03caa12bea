//! In-memory transport for testing.
//!
//! Records every call made against the link and lets tests drive link
//! status and inbound events by hand.
//!
//! # Security Note
//!
//! This adapter is for **testing only**. It uses `.expect()` on lock
//! operations which will panic if locks are poisoned.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::RwLock;
use tokio::sync::broadcast;

use crate::ports::{ChannelSignal, Transport, TransportEndpoint, TransportError, TransportEvent};

/// A call recorded by [`InMemoryTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    /// `open` was called with this URL.
    Open(String),
    /// `close` was called.
    Close,
    /// A signal was sent over the open link.
    Send(ChannelSignal),
}

/// Recording transport double.
///
/// - `open` marks the link live and emits `Connected`
/// - `close` marks it down and emits `Disconnected`
/// - `send` fails with `NotOpen` while the link is down
///
/// # Example
///
/// ```ignore
/// let transport = Arc::new(InMemoryTransport::new());
/// let registry = Arc::new(ConnectionRegistry::new(transport.clone()));
/// // ... drive a bridge ...
/// assert_eq!(transport.open_count(), 1);
/// ```
pub struct InMemoryTransport {
    open: AtomicBool,
    /// Between `open` (even a failed one) and `close`, a real transport
    /// keeps retrying.
    requested: AtomicBool,
    failing_opens: AtomicU32,
    calls: RwLock<Vec<TransportCall>>,
    events: broadcast::Sender<TransportEvent>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            open: AtomicBool::new(false),
            requested: AtomicBool::new(false),
            failing_opens: AtomicU32::new(0),
            calls: RwLock::new(Vec::new()),
            events,
        }
    }

    // === Test Helpers ===

    /// Makes the next `n` calls to `open` fail.
    pub fn fail_next_opens(&self, n: u32) {
        self.failing_opens.store(n, Ordering::SeqCst);
    }

    /// Returns all recorded calls in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls
            .read()
            .expect("InMemoryTransport: calls lock poisoned")
            .clone()
    }

    /// Number of `open` calls, failed ones included.
    pub fn open_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, TransportCall::Open(_)))
            .count()
    }

    pub fn close_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, TransportCall::Close))
            .count()
    }

    /// Signals sent over the link, in order.
    pub fn sent_signals(&self) -> Vec<ChannelSignal> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Send(signal) => Some(signal),
                _ => None,
            })
            .collect()
    }

    /// Pushes an inbound event to subscribers. Returns the receiver count.
    pub fn emit(&self, event: TransportEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Simulates a network drop.
    pub fn drop_link(&self, reason: &str) {
        self.open.store(false, Ordering::SeqCst);
        self.emit(TransportEvent::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Simulates the transport's own successful reconnect.
    ///
    /// No-op unless a link has been requested: after `close` nothing retries.
    pub fn restore_link(&self) {
        if !self.requested.load(Ordering::SeqCst) {
            return;
        }
        self.open.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Connected);
    }

    fn record(&self, call: TransportCall) {
        self.calls
            .write()
            .expect("InMemoryTransport: calls write lock poisoned")
            .push(call);
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn open(&self, endpoint: &TransportEndpoint) -> Result<(), TransportError> {
        self.record(TransportCall::Open(endpoint.url().to_string()));
        self.requested.store(true, Ordering::SeqCst);

        let failing = self.failing_opens.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_opens.store(failing - 1, Ordering::SeqCst);
            return Err(TransportError::ConnectFailed(
                "simulated connection failure".to_string(),
            ));
        }

        self.open.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Connected);
        Ok(())
    }

    async fn close(&self) {
        self.record(TransportCall::Close);
        self.requested.store(false, Ordering::SeqCst);
        if self.open.swap(false, Ordering::SeqCst) {
            self.emit(TransportEvent::Disconnected {
                reason: "client disconnect".to_string(),
            });
        }
    }

    async fn send(&self, signal: ChannelSignal) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        self.record(TransportCall::Send(signal));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::RestaurantId;

    fn endpoint() -> TransportEndpoint {
        TransportEndpoint::new("ws://test.local/ws")
    }

    #[tokio::test]
    async fn open_records_call_and_emits_connected() {
        let transport = InMemoryTransport::new();
        let mut events = transport.events();

        transport.open(&endpoint()).await.unwrap();

        assert!(transport.is_open());
        assert_eq!(
            transport.calls(),
            vec![TransportCall::Open("ws://test.local/ws".to_string())]
        );
        assert_eq!(events.recv().await.unwrap(), TransportEvent::Connected);
    }

    #[tokio::test]
    async fn failing_open_leaves_link_down() {
        let transport = InMemoryTransport::new();
        transport.fail_next_opens(1);

        let result = transport.open(&endpoint()).await;

        assert!(matches!(result, Err(TransportError::ConnectFailed(_))));
        assert!(!transport.is_open());

        transport.open(&endpoint()).await.unwrap();
        assert!(transport.is_open());
    }

    #[tokio::test]
    async fn send_requires_open_link() {
        let transport = InMemoryTransport::new();
        let signal = ChannelSignal::Join(RestaurantId::new("rest-1").unwrap());

        assert_eq!(
            transport.send(signal.clone()).await,
            Err(TransportError::NotOpen)
        );

        transport.open(&endpoint()).await.unwrap();
        transport.send(signal.clone()).await.unwrap();
        assert_eq!(transport.sent_signals(), vec![signal]);
    }

    #[tokio::test]
    async fn close_emits_disconnected_only_when_open() {
        let transport = InMemoryTransport::new();
        let mut events = transport.events();

        transport.close().await;
        assert!(events.try_recv().is_err());

        transport.open(&endpoint()).await.unwrap();
        transport.close().await;

        assert_eq!(events.recv().await.unwrap(), TransportEvent::Connected);
        assert!(matches!(
            events.recv().await.unwrap(),
            TransportEvent::Disconnected { .. }
        ));
        assert_eq!(transport.close_count(), 2);
    }

    #[tokio::test]
    async fn drop_and_restore_toggle_link() {
        let transport = InMemoryTransport::new();
        transport.open(&endpoint()).await.unwrap();
        transport.drop_link("network lost");
        assert!(!transport.is_open());
        transport.restore_link();
        assert!(transport.is_open());
    }

    #[tokio::test]
    async fn failed_open_keeps_retrying_until_closed() {
        let transport = InMemoryTransport::new();
        transport.restore_link();
        assert!(!transport.is_open());

        transport.fail_next_opens(1);
        assert!(transport.open(&endpoint()).await.is_err());
        assert_eq!(transport.open_count(), 1);
        transport.restore_link();
        assert!(transport.is_open());

        transport.close().await;
        transport.restore_link();
        assert!(!transport.is_open());
    }
}
