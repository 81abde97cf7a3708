//! Shared channels for notification worker integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use delivery_core::{Channel, ChannelError, ProviderResponse, StaticConnector};
use herald_config::{ChannelsConfig, DeliveryConfig};
use herald_types::{ChannelDescriptor, ChannelKind, Message};
use notification_worker::sender::NotificationSender;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Channel that accepts everything and counts sends
pub struct CountingChannel {
    descriptor: ChannelDescriptor,
    sends: AtomicUsize,
}

impl CountingChannel {
    pub fn new(name: &str, kind: ChannelKind, priority: i32) -> Arc<Self> {
        Arc::new(Self {
            descriptor: ChannelDescriptor::new(name, kind, priority),
            sends: AtomicUsize::new(0),
        })
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for CountingChannel {
    fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    async fn probe(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send(&self, message: &Message) -> Result<ProviderResponse, ChannelError> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ProviderResponse::Accepted {
            message_id: Some(format!("{}-{}", self.descriptor.name, n)),
            recipients: message.target.recipient_count().unwrap_or(1),
        })
    }
}

/// Sender whose email group is `email` in order, with an unregistered
/// descriptor listed first so it always fails its probe.
pub fn sender_with_fallback(email: &Arc<CountingChannel>) -> NotificationSender {
    let connector = StaticConnector::new().with(email.clone());
    let channels = ChannelsConfig {
        email: vec![
            ChannelDescriptor::new("SMTP port 587", ChannelKind::Smtp, 0),
            email.descriptor().clone(),
        ],
        push: Vec::new(),
    };
    NotificationSender::new(Arc::new(connector), &channels, &DeliveryConfig::default())
}

/// Sender with no configured channels; everything lands in the sink
pub fn sink_only(sink_enabled: bool) -> NotificationSender {
    let delivery = DeliveryConfig {
        sink_enabled,
        ..DeliveryConfig::default()
    };
    NotificationSender::new(
        Arc::new(StaticConnector::new()),
        &ChannelsConfig::default(),
        &delivery,
    )
}
