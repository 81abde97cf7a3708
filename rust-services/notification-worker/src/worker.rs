//! Notification Worker - Event Processing
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::sender::NotificationSender;
use chrono::Utc;
use herald_types::{
    schemas::{
        NotificationFailedPayload, NotificationRequestedPayload, NotificationSentPayload,
        SubscriptionRequestedPayload, SubscriptionUpdatedPayload,
    },
    Event, EventType,
};
use message_bus_client::traits::MessageBusClient;
use serde::Serialize;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{error, info, warn};

const SOURCE: &str = "notification-worker";

/// Consumes request events and publishes their results.
///
/// Each event is handled in its own task; the worker itself only reads the
/// streams.
#[derive(Clone)]
pub struct NotificationWorker {
    message_bus: Arc<dyn MessageBusClient>,
    sender: Arc<NotificationSender>,
}

impl NotificationWorker {
    pub fn new(message_bus: Arc<dyn MessageBusClient>, sender: Arc<NotificationSender>) -> Self {
        Self {
            message_bus,
            sender,
        }
    }

    /// Run the worker - consume events until both streams end
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("Subscribing to notification.requested and subscription.requested events");

        let mut notifications = self.message_bus.subscribe(EventType::NotificationRequested);
        let mut subscriptions = self.message_bus.subscribe(EventType::SubscriptionRequested);
        let mut notifications_open = true;
        let mut subscriptions_open = true;

        info!("Waiting for notification requests...");

        while notifications_open || subscriptions_open {
            tokio::select! {
                next = notifications.next(), if notifications_open => match next {
                    Some(Ok(event)) => {
                        let worker = self.clone();
                        tokio::spawn(async move {
                            if let Err(e) = worker.handle_notification(&event).await {
                                error!(event_id = %event.event_id, error = %e, "Failed to process notification request");
                            }
                        });
                    }
                    Some(Err(e)) => error!(error = %e, "Error receiving event from message bus"),
                    None => notifications_open = false,
                },
                next = subscriptions.next(), if subscriptions_open => match next {
                    Some(Ok(event)) => {
                        let worker = self.clone();
                        tokio::spawn(async move {
                            if let Err(e) = worker.handle_subscription(&event).await {
                                error!(event_id = %event.event_id, error = %e, "Failed to process subscription request");
                            }
                        });
                    }
                    Some(Err(e)) => error!(error = %e, "Error receiving event from message bus"),
                    None => subscriptions_open = false,
                },
            }
        }

        warn!("Event streams ended");
        Ok(())
    }

    /// Deliver one `notification.requested` event and publish the result
    pub async fn handle_notification(&self, event: &Event) -> anyhow::Result<()> {
        let payload: NotificationRequestedPayload = event
            .payload_as()
            .map_err(|e| anyhow::anyhow!("Invalid payload: {}", e))?;

        info!(
            event_id = %event.event_id,
            request_id = %payload.request_id,
            notification_type = ?payload.notification_type,
            "Processing notification request"
        );

        let message = payload.to_message();
        match self
            .sender
            .send_notification(payload.notification_type, &message)
            .await
        {
            Ok(outcome) => {
                info!(
                    request_id = %payload.request_id,
                    record_id = %outcome.record_id,
                    channel = %outcome.channel_used,
                    "Notification sent successfully"
                );
                self.publish(
                    EventType::NotificationSent,
                    NotificationSentPayload {
                        request_id: payload.request_id,
                        record_id: outcome.record_id.clone(),
                        notification_type: payload.notification_type,
                        outcome,
                        sent_at: Utc::now(),
                    },
                )
                .await
            }
            Err(e) => {
                error!(
                    request_id = %payload.request_id,
                    kind = e.kind(),
                    error = %e,
                    "Failed to send notification"
                );
                self.publish(
                    EventType::NotificationFailed,
                    NotificationFailedPayload {
                        request_id: payload.request_id,
                        record_id: e.record_id().map(str::to_string),
                        notification_type: payload.notification_type,
                        error: e.to_string(),
                        outcome: e.outcome().cloned(),
                        failed_at: Utc::now(),
                    },
                )
                .await
            }
        }
    }

    /// Apply one `subscription.requested` event and publish `subscription.updated`
    pub async fn handle_subscription(&self, event: &Event) -> anyhow::Result<()> {
        let payload: SubscriptionRequestedPayload = event
            .payload_as()
            .map_err(|e| anyhow::anyhow!("Invalid payload: {}", e))?;

        info!(
            request_id = %payload.request_id,
            action = ?payload.action,
            topic = %payload.topic,
            identifiers = payload.identifiers.len(),
            "Processing subscription request"
        );

        let result = self
            .sender
            .update_subscription(payload.action, &payload.identifiers, &payload.topic)
            .await;

        let (outcome, error) = match result {
            Ok(outcome) => (Some(outcome), None),
            Err(e) => {
                warn!(request_id = %payload.request_id, error = %e, "Subscription request rejected");
                (None, Some(e.to_string()))
            }
        };

        self.publish(
            EventType::SubscriptionUpdated,
            SubscriptionUpdatedPayload {
                request_id: payload.request_id,
                action: payload.action,
                topic: payload.topic,
                outcome,
                error,
                updated_at: Utc::now(),
            },
        )
        .await
    }

    async fn publish(&self, event_type: EventType, payload: impl Serialize) -> anyhow::Result<()> {
        let event = Event::new(event_type, SOURCE, payload)
            .map_err(|e| anyhow::anyhow!("Failed to create event: {}", e))?;

        self.message_bus
            .publish(&event)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to publish event: {}", e))?;

        Ok(())
    }
}
