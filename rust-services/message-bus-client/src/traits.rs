//! Traits for message bus operations

use async_trait::async_trait;
use futures::Stream;
use herald_types::{Event, EventType};
use std::pin::Pin;

/// Stream of events returned by [`MessageBusClient::subscribe`]
pub type EventStream<'a> =
    Pin<Box<dyn Stream<Item = std::result::Result<Event, crate::error::MessageBusError>> + Send + 'a>>;

/// Trait for message bus clients
#[async_trait]
pub trait MessageBusClient: Send + Sync {
    /// Publish an event to the message bus
    async fn publish(&self, event: &Event) -> Result<(), crate::error::MessageBusError>;

    /// Subscribe to events of a specific type
    /// Returns a stream of events
    fn subscribe(&self, event_type: EventType) -> EventStream<'_>;

    /// Check if the client is connected
    async fn is_connected(&self) -> bool;

    /// Get the client type name
    fn client_type(&self) -> &str;
}

/// Subject an event type is published on, e.g. `herald.notification_requested`
pub fn subject_for(prefix: &str, event_type: EventType) -> String {
    format!("{}.{}", prefix, event_type.as_str().replace('.', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_for_event_type() {
        assert_eq!(
            subject_for("herald", EventType::NotificationRequested),
            "herald.notification_requested"
        );
        assert_eq!(
            subject_for("herald", EventType::SubscriptionUpdated),
            "herald.subscription_updated"
        );
    }
}
