//! Redis pub/sub relay for booking events produced by other processes.
//!
//! The booking workflow publishes one JSON `BookingEvent` per message on a
//! Redis channel. The relay turns each into a `booking.created` envelope on
//! the local event bus, where the WebSocket bridge picks it up.
//!
//! ```text
//! booking workflow ──PUBLISH bookings.created──► Redis
//!                                                  │
//!                                   RedisBookingRelay (SUBSCRIBE)
//!                                                  │
//!                                    EventPublisher::publish(envelope)
//! ```

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;

use crate::adapters::transport::ReconnectPolicy;
use crate::config::RedisConfig;
use crate::domain::booking::BookingEvent;
use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope};
use crate::ports::EventPublisher;

/// Why a subscription session ended.
enum SessionEnd {
    Shutdown,
    StreamClosed,
}

/// Forwards Redis pub/sub booking messages onto the event bus.
pub struct RedisBookingRelay {
    client: redis::Client,
    channel: String,
    publisher: Arc<dyn EventPublisher>,
    policy: ReconnectPolicy,
}

impl RedisBookingRelay {
    /// Creates a relay. Does not connect until [`run`](Self::run).
    pub fn new(
        config: &RedisConfig,
        publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self, DomainError> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            DomainError::new(ErrorCode::CacheError, format!("Invalid Redis URL: {}", e))
        })?;

        Ok(Self {
            client,
            channel: config.channel.clone(),
            publisher,
            policy: ReconnectPolicy::default(),
        })
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Relays messages until `shutdown` turns true, resubscribing after
    /// connection loss.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.relay_session(&mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::StreamClosed) => {
                    attempt = 0;
                    tracing::warn!(channel = %self.channel, "Redis subscription closed");
                }
                Err(e) => {
                    tracing::warn!(channel = %self.channel, attempt, error = %e, "Redis relay failed");
                }
            }

            attempt = attempt.saturating_add(1);
            if self.policy.exhausted(attempt) {
                tracing::error!(channel = %self.channel, attempt, "Redis relay giving up");
                break;
            }

            let delay = self.policy.delay_for(attempt);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::info!(channel = %self.channel, "Redis relay stopped");
    }

    async fn relay_session(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> redis::RedisResult<SessionEnd> {
        let mut pubsub = self.client.get_async_connection().await?.into_pubsub();
        pubsub.subscribe(&self.channel).await?;
        tracing::info!(channel = %self.channel, "Redis relay subscribed");

        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                message = messages.next() => {
                    let Some(message) = message else {
                        return Ok(SessionEnd::StreamClosed);
                    };
                    match message.get_payload::<String>() {
                        Ok(payload) => self.forward(&payload).await,
                        Err(e) => tracing::warn!(error = %e, "Non-text Redis payload skipped"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(SessionEnd::Shutdown);
                    }
                }
            }
        }
    }

    async fn forward(&self, payload: &str) {
        let envelope = match Self::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(channel = %self.channel, error = %e, "Invalid booking payload skipped");
                return;
            }
        };

        let event_id = envelope.event_id.clone();
        if let Err(e) = self.publisher.publish(envelope).await {
            tracing::warn!(event_id = %event_id, error = %e, "Failed to publish relayed booking");
        }
    }

    /// Decodes one pub/sub payload into a `booking.created` envelope.
    pub fn decode(payload: &str) -> Result<EventEnvelope, DomainError> {
        let booking: BookingEvent = serde_json::from_str(payload).map_err(|e| {
            DomainError::new(ErrorCode::InvalidEventPayload, e.to_string())
        })?;

        booking
            .to_envelope()
            .map_err(|e| DomainError::new(ErrorCode::InvalidEventPayload, e.to_string()))
    }
}
