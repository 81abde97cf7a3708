//! Event type definitions for the message bus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HeraldError, Result};
use crate::schemas::*;

/// Event type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    // Delivery events
    #[serde(rename = "notification.requested")]
    NotificationRequested,
    #[serde(rename = "notification.sent")]
    NotificationSent,
    #[serde(rename = "notification.failed")]
    NotificationFailed,

    // Topic subscription events
    #[serde(rename = "subscription.requested")]
    SubscriptionRequested,
    #[serde(rename = "subscription.updated")]
    SubscriptionUpdated,
}

impl EventType {
    /// Dotted name used on the wire and for subscriptions
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NotificationRequested => "notification.requested",
            EventType::NotificationSent => "notification.sent",
            EventType::NotificationFailed => "notification.failed",
            EventType::SubscriptionRequested => "subscription.requested",
            EventType::SubscriptionUpdated => "subscription.updated",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "notification.requested" => Ok(EventType::NotificationRequested),
            "notification.sent" => Ok(EventType::NotificationSent),
            "notification.failed" => Ok(EventType::NotificationFailed),
            "subscription.requested" => Ok(EventType::SubscriptionRequested),
            "subscription.updated" => Ok(EventType::SubscriptionUpdated),
            other => Err(HeraldError::InvalidEventType(other.to_string())),
        }
    }
}

/// Base event structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type identifier
    pub event_type: EventType,

    /// Unique event identifier
    pub event_id: Uuid,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Source service that published the event
    pub source: String,

    /// Event payload (type depends on event_type)
    pub payload: serde_json::Value,
}

impl Event {
    /// Create a new event
    pub fn new(
        event_type: EventType,
        source: impl Into<String>,
        payload: impl Serialize,
    ) -> Result<Self> {
        let payload_value = serde_json::to_value(payload)?;

        Ok(Self {
            event_type,
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload: payload_value,
        })
    }

    /// Deserialize the payload into a specific type
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| HeraldError::InvalidPayload(e.to_string()))
    }

    /// Validate the event structure
    pub fn validate(&self) -> Result<()> {
        match self.event_type {
            EventType::NotificationRequested => {
                let _: NotificationRequestedPayload = self.payload_as()?;
            }
            EventType::NotificationSent => {
                let _: NotificationSentPayload = self.payload_as()?;
            }
            EventType::NotificationFailed => {
                let _: NotificationFailedPayload = self.payload_as()?;
            }
            EventType::SubscriptionRequested => {
                let _: SubscriptionRequestedPayload = self.payload_as()?;
            }
            EventType::SubscriptionUpdated => {
                let _: SubscriptionUpdatedPayload = self.payload_as()?;
            }
        }
        Ok(())
    }
}
