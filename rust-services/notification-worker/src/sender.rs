//! Notification Sender
//!
//! Routes email requests through the `email` channel group and push requests
//! through the fan-out resolver. Every attempt lands in the delivery ledger.
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


use crate::channels::ProviderConnector;
use delivery_core::{
    Channel, ChannelConnector, ChannelGroup, DeliveryDispatcher, DeliveryError, DeliveryLedger,
    FanOutResolver, TransportResolver,
};
use futures::future::join_all;
use herald_config::{AppConfig, ChannelsConfig, DeliveryConfig};
use herald_types::{
    ChannelKind, DeliveryOutcome, Message, NotificationType, SubscriptionAction,
    SubscriptionOutcome,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Reachability of one configured channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub group: String,
    pub name: String,
    pub kind: ChannelKind,
    pub priority: i32,
    pub reachable: bool,
    pub error: Option<String>,
}

pub struct NotificationSender {
    resolver: Arc<TransportResolver>,
    dispatcher: Arc<DeliveryDispatcher>,
    email: ChannelGroup,
    push: FanOutResolver,
}

impl NotificationSender {
    /// Build a sender over an arbitrary connector
    pub fn new(
        connector: Arc<dyn ChannelConnector>,
        channels: &ChannelsConfig,
        delivery: &DeliveryConfig,
    ) -> Self {
        let mut resolver = TransportResolver::new(connector, delivery.probe_timeout());
        if !delivery.sink_enabled {
            resolver = resolver.without_sink();
        }
        let resolver = Arc::new(resolver);

        let ledger = Arc::new(DeliveryLedger::new());
        let dispatcher = Arc::new(DeliveryDispatcher::new(ledger, delivery.send_timeout()));

        let ttl = delivery.resolution_ttl();
        let push = FanOutResolver::from_descriptors(
            resolver.clone(),
            dispatcher.clone(),
            &channels.push,
            ttl,
        );

        info!(
            email_channels = channels.email.len(),
            push_channels = channels.push.len(),
            sink_enabled = delivery.sink_enabled,
            "Notification sender configured"
        );

        Self {
            resolver,
            dispatcher,
            email: ChannelGroup::new("email", channels.email.clone()).with_ttl(ttl),
            push,
        }
    }

    /// Build a sender with the provider channels described by `config`
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let connector = ProviderConnector::new(config.delivery.send_timeout())
            .map_err(|e| anyhow::anyhow!("Failed to create channel connector: {}", e))?;
        Ok(Self::new(
            Arc::new(connector),
            &config.channels,
            &config.delivery,
        ))
    }

    pub fn ledger(&self) -> &Arc<DeliveryLedger> {
        self.dispatcher.ledger()
    }

    pub async fn send_email(&self, message: &Message) -> Result<DeliveryOutcome, DeliveryError> {
        self.dispatcher
            .deliver(&self.resolver, &self.email, message)
            .await
    }

    pub async fn send_push(&self, message: &Message) -> Result<DeliveryOutcome, DeliveryError> {
        self.push.send_push(message).await
    }

    /// Send a notification
    pub async fn send_notification(
        &self,
        notification_type: NotificationType,
        message: &Message,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        info!(
            notification_type = ?notification_type,
            target = message.target.shape(),
            title = %message.title,
            "Sending notification"
        );

        match notification_type {
            NotificationType::Email => self.send_email(message).await,
            NotificationType::Push => self.send_push(message).await,
        }
    }

    pub async fn update_subscription(
        &self,
        action: SubscriptionAction,
        identifiers: &[String],
        topic: &str,
    ) -> Result<SubscriptionOutcome, DeliveryError> {
        self.push
            .update_subscription(action, identifiers, topic)
            .await
    }

    /// Probe every configured descriptor, bounded by the probe timeout
    pub async fn verify_channels(&self) -> Vec<ChannelStatus> {
        let groups = std::iter::once(&self.email).chain(self.push.groups());
        let checks = groups.flat_map(move |group| {
            group.descriptors().iter().map(move |descriptor| async move {
                let result = self
                    .resolver
                    .probe_descriptor(descriptor, self.resolver.probe_timeout())
                    .await;
                if let Err(e) = &result {
                    warn!(channel = %descriptor.name, error = %e, "Channel verification failed");
                }
                ChannelStatus {
                    group: group.name().to_string(),
                    name: descriptor.name.clone(),
                    kind: descriptor.kind,
                    priority: descriptor.priority,
                    reachable: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                }
            })
        });

        let mut statuses = join_all(checks).await;
        if let Some(sink) = self.resolver.sink() {
            let descriptor = sink.descriptor();
            statuses.push(ChannelStatus {
                group: "fallback".to_string(),
                name: descriptor.name.clone(),
                kind: descriptor.kind,
                priority: descriptor.priority,
                reachable: true,
                error: None,
            });
        }
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use delivery_core::StaticConnector;
    use herald_types::TargetSpec;

    fn sink_only() -> NotificationSender {
        NotificationSender::new(
            Arc::new(StaticConnector::new()),
            &ChannelsConfig::default(),
            &DeliveryConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_sink_only_sender_records_everything() {
        let sender = sink_only();
        let email = Message::new(TargetSpec::Single("a@x.com".to_string()), "Welcome", "Hello");
        let push = Message::new(TargetSpec::Topic("news".to_string()), "Update", "News");

        let email_outcome = sender
            .send_notification(NotificationType::Email, &email)
            .await
            .unwrap();
        let push_outcome = sender
            .send_notification(NotificationType::Push, &push)
            .await
            .unwrap();

        assert!(email_outcome.used_sink());
        assert!(push_outcome.used_sink());
        assert_eq!(push_outcome.recipients_succeeded, None);
        assert_eq!(sender.ledger().len().await, 2);
    }

    #[tokio::test]
    async fn test_verify_reports_unregistered_descriptor() {
        let channels = ChannelsConfig {
            email: vec![herald_types::ChannelDescriptor::new(
                "SMTP port 587",
                ChannelKind::Smtp,
                0,
            )],
            push: Vec::new(),
        };
        let sender = NotificationSender::new(
            Arc::new(StaticConnector::new()),
            &channels,
            &DeliveryConfig::default(),
        );

        let statuses = sender.verify_channels().await;
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].group, "email");
        assert!(!statuses[0].reachable);
        assert!(statuses[0].error.is_some());
        assert_eq!(statuses[1].group, "fallback");
        assert!(statuses[1].reachable);
    }

    #[tokio::test]
    async fn test_push_descriptors_grouped_by_kind() {
        let descriptor = |name: &str, kind| herald_types::ChannelDescriptor::new(name, kind, 0);
        let channels = ChannelsConfig {
            email: Vec::new(),
            push: vec![
                descriptor("FCM topic", ChannelKind::PushTopic),
                descriptor("FCM single device", ChannelKind::PushSingle),
                descriptor("FCM multicast", ChannelKind::PushMulticast),
            ],
        };
        let sender = NotificationSender::new(
            Arc::new(StaticConnector::new()),
            &channels,
            &DeliveryConfig::default(),
        );

        let groups: Vec<(String, String)> = sender
            .verify_channels()
            .await
            .into_iter()
            .map(|s| (s.group, s.name))
            .collect();
        let expected = [
            ("push-single", "FCM single device"),
            ("push-multicast", "FCM multicast"),
            ("push-topic", "FCM topic"),
            ("fallback", "Sink"),
        ];
        assert_eq!(groups.len(), expected.len());
        for ((group, name), (want_group, want_name)) in groups.iter().zip(expected) {
            assert_eq!(group, want_group);
            assert_eq!(name, want_name);
        }
    }
}
