//! Sink channel: the fallback of last resort
//!
//! Accepts every message and reports success without delivering anything.
//! Outcomes carry the sink's kind, so callers can tell nothing was sent.
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


use crate::channel::{Channel, ProviderResponse, RecipientResult, SubscriptionResponse};
use crate::error::ChannelError;
use async_trait::async_trait;
use herald_types::{ChannelDescriptor, ChannelKind, Message, TargetSpec};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_SINK_NAME: &str = "Sink";

pub struct SinkChannel {
    descriptor: ChannelDescriptor,
    topics: Mutex<HashMap<String, HashSet<String>>>,
    accepted: AtomicU64,
}

impl SinkChannel {
    pub fn new() -> Self {
        Self::with_descriptor(ChannelDescriptor::new(
            DEFAULT_SINK_NAME,
            ChannelKind::Sink,
            i32::MAX,
        ))
    }

    pub fn with_descriptor(descriptor: ChannelDescriptor) -> Self {
        Self {
            descriptor,
            topics: Mutex::new(HashMap::new()),
            accepted: AtomicU64::new(0),
        }
    }

    /// Messages swallowed so far
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Identifiers currently recorded against a topic, sorted
    pub async fn subscribers(&self, topic: &str) -> Vec<String> {
        let topics = self.topics.lock().await;
        let mut members: Vec<String> = topics
            .get(topic)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }
}

impl Default for SinkChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for SinkChannel {
    fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    async fn probe(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn send(&self, message: &Message) -> Result<ProviderResponse, ChannelError> {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        let message_id = Some(format!("sink-{}", Uuid::new_v4()));

        warn!(
            channel = %self.descriptor.name,
            target = message.target.shape(),
            title = %message.title,
            "No real channel available, message accepted by sink and not delivered"
        );

        Ok(match &message.target {
            TargetSpec::Topic(_) => ProviderResponse::Broadcast { message_id },
            target => ProviderResponse::Accepted {
                message_id,
                recipients: target.recipient_count().unwrap_or(0),
            },
        })
    }

    async fn subscribe(
        &self,
        identifiers: &[String],
        topic: &str,
    ) -> Result<SubscriptionResponse, ChannelError> {
        let mut topics = self.topics.lock().await;
        let members = topics.entry(topic.to_string()).or_default();
        let changed = identifiers
            .iter()
            .filter(|id| members.insert((*id).clone()))
            .count() as u32;

        debug!(topic, changed, "Sink recorded subscription");
        Ok(SubscriptionResponse {
            results: identifiers
                .iter()
                .map(|id| RecipientResult::delivered(id.clone(), None))
                .collect(),
            changed: Some(changed),
        })
    }

    async fn unsubscribe(
        &self,
        identifiers: &[String],
        topic: &str,
    ) -> Result<SubscriptionResponse, ChannelError> {
        let mut topics = self.topics.lock().await;
        let changed = match topics.get_mut(topic) {
            Some(members) => identifiers.iter().filter(|id| members.remove(*id)).count() as u32,
            None => 0,
        };

        debug!(topic, changed, "Sink recorded unsubscription");
        Ok(SubscriptionResponse {
            results: identifiers
                .iter()
                .map(|id| RecipientResult::delivered(id.clone(), None))
                .collect(),
            changed: Some(changed),
        })
    }
}
