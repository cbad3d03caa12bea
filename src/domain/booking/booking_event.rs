//! Booking-created event delivered to subscribed dashboards.
//!
//! The exact summary shape is owned by the booking workflow. Only the
//! routing fields (`bookingId`, `restaurantId`) and the `timestamp` are
//! typed here; everything else is carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::domain::foundation::{BookingId, EventEnvelope, RestaurantId, Timestamp};

/// Event type used on the event bus and on the wire.
pub const BOOKING_CREATED: &str = "booking.created";

/// Aggregate type carried by booking envelopes.
pub const BOOKING_AGGREGATE: &str = "Booking";

/// Payload pushed to clients joined to a restaurant channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingEvent {
    pub booking_id: BookingId,
    pub restaurant_id: RestaurantId,

    /// When the booking was created. Defaults to receive time if the
    /// producer omits it.
    #[serde(default)]
    pub timestamp: Timestamp,

    /// Opaque summary fields (customerName, partySize, timeSlot, ...).
    #[serde(flatten)]
    pub summary: Map<String, JsonValue>,
}

impl BookingEvent {
    /// Creates an event with no summary fields.
    pub fn new(booking_id: BookingId, restaurant_id: RestaurantId) -> Self {
        Self {
            booking_id,
            restaurant_id,
            timestamp: Timestamp::now(),
            summary: Map::new(),
        }
    }

    /// Adds a summary field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.summary.insert(key.into(), value.into());
        self
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.summary.get("customerName").and_then(JsonValue::as_str)
    }

    pub fn party_size(&self) -> Option<u64> {
        self.summary.get("partySize").and_then(JsonValue::as_u64)
    }

    pub fn time_slot(&self) -> Option<&str> {
        self.summary.get("timeSlot").and_then(JsonValue::as_str)
    }

    /// True if this event is addressed to the given restaurant.
    pub fn is_for(&self, restaurant_id: &RestaurantId) -> bool {
        &self.restaurant_id == restaurant_id
    }

    /// Wraps the event in the envelope the booking workflow publishes.
    pub fn to_envelope(&self) -> Result<EventEnvelope, serde_json::Error> {
        let payload = serde_json::to_value(self)?;
        Ok(EventEnvelope::new(
            BOOKING_CREATED,
            self.booking_id.as_str(),
            BOOKING_AGGREGATE,
            payload,
        )
        .occurred_at(self.timestamp))
    }

    /// Extracts a booking event from a `booking.created` envelope.
    ///
    /// Returns `None` for other event types.
    pub fn from_envelope(envelope: &EventEnvelope) -> Option<Result<Self, serde_json::Error>> {
        if envelope.event_type != BOOKING_CREATED {
            return None;
        }
        Some(envelope.payload_as())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rest(id: &str) -> RestaurantId {
        RestaurantId::new(id).unwrap()
    }

    #[test]
    fn deserializes_minimal_payload_and_keeps_summary_fields() {
        let event: BookingEvent = serde_json::from_value(json!({
            "restaurantId": "rest-1",
            "bookingId": "b1",
            "partySize": 4
        }))
        .unwrap();

        assert_eq!(event.booking_id.as_str(), "b1");
        assert_eq!(event.restaurant_id, rest("rest-1"));
        assert_eq!(event.party_size(), Some(4));
        assert!(!event.summary.contains_key("restaurantId"));
    }

    #[test]
    fn serializes_summary_fields_at_top_level() {
        let event = BookingEvent::new(BookingId::new("b7").unwrap(), rest("rest-2"))
            .with_field("customerName", "Ada")
            .with_field("timeSlot", "19:30");

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["bookingId"], "b7");
        assert_eq!(value["restaurantId"], "rest-2");
        assert_eq!(value["customerName"], "Ada");
        assert_eq!(value["timeSlot"], "19:30");
        assert!(value.get("summary").is_none());
    }

    #[test]
    fn typed_accessors_read_summary() {
        let event = BookingEvent::new(BookingId::new("b1").unwrap(), rest("rest-1"))
            .with_field("customerName", "Grace")
            .with_field("partySize", 2)
            .with_field("timeSlot", "20:00");

        assert_eq!(event.customer_name(), Some("Grace"));
        assert_eq!(event.party_size(), Some(2));
        assert_eq!(event.time_slot(), Some("20:00"));
    }

    #[test]
    fn is_for_matches_restaurant() {
        let event = BookingEvent::new(BookingId::new("b1").unwrap(), rest("rest-1"));
        assert!(event.is_for(&rest("rest-1")));
        assert!(!event.is_for(&rest("rest-2")));
    }

    #[test]
    fn envelope_carries_booking_payload() {
        let event = BookingEvent::new(BookingId::new("b1").unwrap(), rest("rest-1"))
            .with_field("partySize", 4);

        let envelope = event.to_envelope().unwrap();
        assert_eq!(envelope.event_type, BOOKING_CREATED);
        assert_eq!(envelope.aggregate_type, BOOKING_AGGREGATE);
        assert_eq!(envelope.aggregate_id, "b1");
        assert_eq!(envelope.occurred_at, event.timestamp);

        let back = BookingEvent::from_envelope(&envelope).unwrap().unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn from_envelope_ignores_other_event_types() {
        let envelope = EventEnvelope::new("review.posted", "r1", "Review", json!({}));
        assert!(BookingEvent::from_envelope(&envelope).is_none());
    }

    #[test]
    fn from_envelope_reports_malformed_payload() {
        let envelope = EventEnvelope::new(BOOKING_CREATED, "b1", "Booking", json!({"bookingId": "b1"}));
        assert!(BookingEvent::from_envelope(&envelope).unwrap().is_err());
    }
}
