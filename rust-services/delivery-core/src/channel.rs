//! Channel abstraction
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


use crate::error::ChannelError;
use async_trait::async_trait;
use herald_types::{ChannelDescriptor, ChannelKind, Message, TargetSpec};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-recipient result of a batch send or subscription change
#[derive(Debug, Clone, PartialEq)]
pub struct RecipientResult {
    pub identifier: String,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl RecipientResult {
    pub fn delivered(identifier: impl Into<String>, message_id: Option<String>) -> Self {
        Self {
            identifier: identifier.into(),
            message_id,
            error: None,
        }
    }

    pub fn failed(identifier: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            message_id: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Provider-native send result, before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderResponse {
    /// A single request covering `recipients` identifiers was accepted
    Accepted {
        message_id: Option<String>,
        recipients: u32,
    },
    /// One result per identifier
    Batch(Vec<RecipientResult>),
    /// Handed to a topic; the reached audience is unknown
    Broadcast { message_id: Option<String> },
}

/// Provider-native subscription result
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscriptionResponse {
    pub results: Vec<RecipientResult>,
    /// Identifiers whose membership actually changed, when the channel knows
    pub changed: Option<u32>,
}

/// A delivery transport bound to one descriptor.
///
/// Implementations hold whatever client state the provider needs. `probe`
/// must be cheap and side-effect free; the resolver bounds it with a timeout.
#[async_trait]
pub trait Channel: Send + Sync {
    fn descriptor(&self) -> &ChannelDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    fn kind(&self) -> ChannelKind {
        self.descriptor().kind
    }

    fn accepts(&self, target: &TargetSpec) -> bool {
        self.kind().accepts(target)
    }

    /// Verify the transport is reachable and authenticated
    async fn probe(&self) -> Result<(), ChannelError>;

    async fn send(&self, message: &Message) -> Result<ProviderResponse, ChannelError>;

    async fn subscribe(
        &self,
        _identifiers: &[String],
        _topic: &str,
    ) -> Result<SubscriptionResponse, ChannelError> {
        Err(ChannelError::Unsupported(format!(
            "{} does not manage topic subscriptions",
            self.name()
        )))
    }

    async fn unsubscribe(
        &self,
        _identifiers: &[String],
        _topic: &str,
    ) -> Result<SubscriptionResponse, ChannelError> {
        Err(ChannelError::Unsupported(format!(
            "{} does not manage topic subscriptions",
            self.name()
        )))
    }
}

/// Builds channel handles from descriptors
pub trait ChannelConnector: Send + Sync {
    fn connect(&self, descriptor: &ChannelDescriptor) -> Result<Arc<dyn Channel>, ChannelError>;
}

/// Connector over pre-built channels, keyed by descriptor name
#[derive(Default, Clone)]
pub struct StaticConnector {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl StaticConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, channel: Arc<dyn Channel>) -> Self {
        self.insert(channel);
        self
    }

    pub fn insert(&mut self, channel: Arc<dyn Channel>) {
        self.channels.insert(channel.name().to_string(), channel);
    }
}

impl ChannelConnector for StaticConnector {
    fn connect(&self, descriptor: &ChannelDescriptor) -> Result<Arc<dyn Channel>, ChannelError> {
        self.channels.get(&descriptor.name).cloned().ok_or_else(|| {
            ChannelError::InvalidParams(format!("no channel registered as '{}'", descriptor.name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkChannel;

    #[test]
    fn test_recipient_result() {
        assert!(RecipientResult::delivered("t1", Some("m1".to_string())).is_success());
        assert!(!RecipientResult::failed("t2", "not registered").is_success());
    }

    #[test]
    fn test_static_connector_lookup() {
        let sink = Arc::new(SinkChannel::new());
        let connector = StaticConnector::new().with(sink.clone());

        let found = connector.connect(sink.descriptor()).unwrap();
        assert_eq!(found.name(), sink.name());

        let missing = ChannelDescriptor::new("SMTP port 2525", ChannelKind::Smtp, 0);
        assert!(matches!(
            connector.connect(&missing),
            Err(ChannelError::InvalidParams(_))
        ));
    }

    #[tokio::test]
    async fn test_default_subscription_is_unsupported() {
        struct Mail(ChannelDescriptor);

        #[async_trait]
        impl Channel for Mail {
            fn descriptor(&self) -> &ChannelDescriptor {
                &self.0
            }
            async fn probe(&self) -> Result<(), ChannelError> {
                Ok(())
            }
            async fn send(&self, _message: &Message) -> Result<ProviderResponse, ChannelError> {
                Ok(ProviderResponse::Accepted {
                    message_id: None,
                    recipients: 1,
                })
            }
        }

        let mail = Mail(ChannelDescriptor::new("HTTP API", ChannelKind::HttpApi, 100));
        let result = mail.subscribe(&["t1".to_string()], "news").await;
        assert!(matches!(result, Err(ChannelError::Unsupported(_))));
    }
}
