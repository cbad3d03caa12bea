//! Process-wide registry for the shared notification link.
//!
//! The first `acquire` creates the one [`ConnectionHandle`]; every later
//! call returns the same handle. Creating the handle never opens the link.
//! Consumers `attach` to keep it open and `release` when done; the link is
//! closed when the last consumer is released.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::errors::NotificationError;
use super::subscription_channel::SubscriptionChannel;
use crate::domain::foundation::ConsumerId;
use crate::ports::{CredentialsMode, Transport, TransportEndpoint, TransportError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The shared link plus its subscription channel.
pub struct ConnectionHandle {
    endpoint: TransportEndpoint,
    transport: Arc<dyn Transport>,
    channel: Arc<SubscriptionChannel>,
    link_lock: tokio::sync::Mutex<()>,
    /// Set by `connect`, even if the open failed and the transport is
    /// still retrying; cleared by `disconnect`.
    link_requested: AtomicBool,
    links_opened: AtomicU64,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionHandle {
    fn new(endpoint: TransportEndpoint, transport: Arc<dyn Transport>) -> Self {
        let channel = Arc::new(SubscriptionChannel::new(Arc::clone(&transport)));
        Self {
            endpoint,
            transport,
            channel,
            link_lock: tokio::sync::Mutex::new(()),
            link_requested: AtomicBool::new(false),
            links_opened: AtomicU64::new(0),
            dispatcher: Mutex::new(None),
        }
    }

    /// Opens the link. Idempotent: an open link is left alone.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let _link = self.link_lock.lock().await;
        self.link_requested.store(true, Ordering::SeqCst);
        if self.transport.is_open() {
            tracing::trace!("Link already open");
            return Ok(());
        }

        self.ensure_dispatcher();
        self.transport.open(&self.endpoint).await?;
        let opened = self.links_opened.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(url = %self.endpoint.url(), links_opened = opened, "Notification link connected");
        Ok(())
    }

    /// Closes the link and stops any pending reconnect.
    ///
    /// Idempotent: a link that is neither open nor requested is left alone.
    pub async fn disconnect(&self) {
        let _link = self.link_lock.lock().await;
        let requested = self.link_requested.swap(false, Ordering::SeqCst);
        if !requested && !self.transport.is_open() {
            tracing::trace!("Link already closed");
            return;
        }

        self.transport.close().await;
        tracing::info!(url = %self.endpoint.url(), "Notification link disconnected");
    }

    /// Live link status.
    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    pub fn endpoint(&self) -> &TransportEndpoint {
        &self.endpoint
    }

    pub fn channel(&self) -> &Arc<SubscriptionChannel> {
        &self.channel
    }

    /// Number of successful `connect` calls that opened a link.
    pub fn links_opened(&self) -> u64 {
        self.links_opened.load(Ordering::SeqCst)
    }

    /// Forwards transport events to the channel, once per handle.
    fn ensure_dispatcher(&self) {
        let mut dispatcher = lock(&self.dispatcher);
        if dispatcher.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        let mut events = self.transport.events();
        let channel = Arc::clone(&self.channel);
        *dispatcher = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => channel.dispatch(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event dispatcher lagged; events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.dispatcher).take() {
            task.abort();
        }
    }
}

/// Lazily creates and reference counts the shared [`ConnectionHandle`].
pub struct ConnectionRegistry {
    transport: Arc<dyn Transport>,
    handle: Mutex<Option<Arc<ConnectionHandle>>>,
    consumers: Mutex<HashSet<ConsumerId>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl ConnectionRegistry {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            handle: Mutex::new(None),
            consumers: Mutex::new(HashSet::new()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the shared handle, creating it on first use.
    ///
    /// The handle always includes credentials and never auto-connects.
    /// Later calls ignore `endpoint` and return the existing handle.
    pub fn acquire(&self, endpoint: TransportEndpoint) -> Arc<ConnectionHandle> {
        let mut slot = lock(&self.handle);
        if let Some(handle) = slot.as_ref() {
            if handle.endpoint().url() != endpoint.url() {
                tracing::debug!(
                    existing = %handle.endpoint().url(),
                    requested = %endpoint.url(),
                    "Connection handle already exists; requested endpoint ignored"
                );
            }
            return Arc::clone(handle);
        }

        let endpoint = endpoint
            .with_credentials(CredentialsMode::Include)
            .without_auto_connect();
        tracing::debug!(url = %endpoint.url(), "Connection handle created");
        let handle = Arc::new(ConnectionHandle::new(endpoint, Arc::clone(&self.transport)));
        *slot = Some(Arc::clone(&handle));
        handle
    }

    /// Returns the handle, or `NotInitialized` if none was acquired.
    pub fn require(&self) -> Result<Arc<ConnectionHandle>, NotificationError> {
        lock(&self.handle)
            .as_ref()
            .cloned()
            .ok_or(NotificationError::NotInitialized)
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.handle).is_some()
    }

    /// Opens the shared link.
    pub async fn connect(&self) -> Result<(), NotificationError> {
        self.require()?.connect().await?;
        Ok(())
    }

    /// Closes the shared link regardless of attached consumers.
    pub async fn disconnect(&self) -> Result<(), NotificationError> {
        self.require()?.disconnect().await;
        Ok(())
    }

    /// Registers a consumer and makes sure the link is open.
    ///
    /// The consumer stays registered even if the link fails to open; the
    /// transport keeps retrying in the background.
    pub async fn attach(&self, consumer: ConsumerId) -> Result<(), NotificationError> {
        let handle = self.require()?;
        let _lifecycle = self.lifecycle.lock().await;

        let active = {
            let mut consumers = lock(&self.consumers);
            consumers.insert(consumer);
            consumers.len()
        };
        tracing::debug!(consumer_id = %consumer, active, "Consumer attached");

        handle.connect().await?;
        Ok(())
    }

    /// Unregisters a consumer; closes the link if it was the last one.
    ///
    /// Returns `true` if this release closed the link.
    pub async fn release(&self, consumer: ConsumerId) -> Result<bool, NotificationError> {
        let handle = self.require()?;
        let _lifecycle = self.lifecycle.lock().await;

        let remaining = {
            let mut consumers = lock(&self.consumers);
            if !consumers.remove(&consumer) {
                return Ok(false);
            }
            consumers.len()
        };

        if remaining > 0 {
            tracing::debug!(consumer_id = %consumer, remaining, "Consumer released; link kept open");
            return Ok(false);
        }

        handle.disconnect().await;
        tracing::debug!(consumer_id = %consumer, "Last consumer released");
        Ok(true)
    }

    pub fn active_consumers(&self) -> usize {
        lock(&self.consumers).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::transport::InMemoryTransport;

    fn endpoint() -> TransportEndpoint {
        TransportEndpoint::new("ws://localhost:8080/ws")
    }

    fn registry() -> (Arc<InMemoryTransport>, ConnectionRegistry) {
        let transport = Arc::new(InMemoryTransport::new());
        (transport.clone(), ConnectionRegistry::new(transport))
    }

    #[tokio::test]
    async fn acquire_is_lazy_and_shared() {
        let (transport, registry) = registry();

        let first = registry.acquire(endpoint());
        let second = registry.acquire(TransportEndpoint::new("ws://elsewhere/ws"));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.endpoint().url(), "ws://localhost:8080/ws");
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn acquire_forces_credentials_and_manual_connect() {
        let (_transport, registry) = registry();

        let handle = registry.acquire(endpoint().with_credentials(CredentialsMode::Omit));

        assert_eq!(handle.endpoint().credentials(), CredentialsMode::Include);
        assert!(!handle.endpoint().auto_connect());
    }

    #[tokio::test]
    async fn operations_before_acquire_fail_not_initialized() {
        let (transport, registry) = registry();

        assert_eq!(registry.connect().await, Err(NotificationError::NotInitialized));
        assert_eq!(registry.disconnect().await, Err(NotificationError::NotInitialized));
        assert_eq!(
            registry.attach(ConsumerId::new()).await,
            Err(NotificationError::NotInitialized)
        );
        assert!(registry.require().is_err());
        assert!(!registry.is_initialized());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn connect_twice_opens_one_link() {
        let (transport, registry) = registry();
        let handle = registry.acquire(endpoint());

        registry.connect().await.unwrap();
        registry.connect().await.unwrap();

        assert_eq!(transport.open_count(), 1);
        assert_eq!(handle.links_opened(), 1);
        assert!(handle.is_connected());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (transport, registry) = registry();
        registry.acquire(endpoint());

        registry.disconnect().await.unwrap();
        assert_eq!(transport.close_count(), 0);

        registry.connect().await.unwrap();
        registry.disconnect().await.unwrap();
        registry.disconnect().await.unwrap();
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn link_closes_only_when_last_consumer_releases() {
        let (transport, registry) = registry();
        registry.acquire(endpoint());
        let first = ConsumerId::new();
        let second = ConsumerId::new();

        registry.attach(first).await.unwrap();
        registry.attach(second).await.unwrap();
        assert_eq!(transport.open_count(), 1);

        assert!(!registry.release(first).await.unwrap());
        assert_eq!(transport.close_count(), 0);

        assert!(registry.release(second).await.unwrap());
        assert_eq!(transport.close_count(), 1);
        assert_eq!(registry.active_consumers(), 0);
    }

    #[tokio::test]
    async fn last_release_after_failed_connect_stops_retrying() {
        let (transport, registry) = registry();
        let handle = registry.acquire(endpoint());
        transport.fail_next_opens(1);
        let consumer = ConsumerId::new();

        assert!(registry.attach(consumer).await.is_err());
        assert!(registry.release(consumer).await.unwrap());
        assert_eq!(transport.close_count(), 1);

        transport.restore_link();
        assert!(!handle.is_connected());
    }

    #[tokio::test]
    async fn releasing_unknown_consumer_is_noop() {
        let (transport, registry) = registry();
        registry.acquire(endpoint());

        assert!(!registry.release(ConsumerId::new()).await.unwrap());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_attach_keeps_consumer_registered() {
        let (transport, registry) = registry();
        registry.acquire(endpoint());
        transport.fail_next_opens(1);
        let consumer = ConsumerId::new();

        let result = registry.attach(consumer).await;

        assert!(matches!(result, Err(NotificationError::Transport(_))));
        assert_eq!(registry.active_consumers(), 1);
    }
}
