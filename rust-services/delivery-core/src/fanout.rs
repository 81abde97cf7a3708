//! Push fan-out
//!
//! Routes push messages to the single, multicast or topic channel group
//! according to the target shape, and manages topic subscriptions.
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


use crate::channel::RecipientResult;
use crate::dispatcher::DeliveryDispatcher;
use crate::error::{ChannelError, DeliveryError};
use crate::resolver::{ChannelGroup, TransportResolver};
use herald_types::{
    ChannelDescriptor, ChannelKind, DeliveryOutcome, Message, SubscriptionAction,
    SubscriptionOutcome, TargetSpec,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_LISTED_FAILURES: usize = 5;

/// Shorten an identifier for logs and error details (device tokens are long)
pub(crate) fn redact(identifier: &str) -> String {
    if identifier.chars().count() <= 20 {
        identifier.to_string()
    } else {
        let prefix: String = identifier.chars().take(20).collect();
        format!("{}...", prefix)
    }
}

/// Aggregate of a per-recipient result list
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct BatchSummary {
    pub succeeded: u32,
    pub failed: u32,
    pub first_message_id: Option<String>,
    failures: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn from_results(results: &[RecipientResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match &result.error {
                None => {
                    summary.succeeded += 1;
                    if summary.first_message_id.is_none() {
                        summary.first_message_id = result.message_id.clone();
                    }
                }
                Some(error) => {
                    summary.failed += 1;
                    summary
                        .failures
                        .push((redact(&result.identifier), error.clone()));
                }
            }
        }
        summary
    }

    /// Human-readable failure summary, `None` when everything succeeded
    pub fn detail(&self) -> Option<String> {
        if self.failed == 0 {
            return None;
        }

        let listed: Vec<String> = self
            .failures
            .iter()
            .take(MAX_LISTED_FAILURES)
            .map(|(id, error)| format!("{} ({})", id, error))
            .collect();
        let mut detail = format!(
            "{} of {} recipients failed: {}",
            self.failed,
            self.succeeded + self.failed,
            listed.join(", ")
        );
        if self.failures.len() > MAX_LISTED_FAILURES {
            detail.push_str(&format!(", and {} more", self.failures.len() - MAX_LISTED_FAILURES));
        }
        Some(detail)
    }
}

/// Target-shape aware push routing
pub struct FanOutResolver {
    resolver: Arc<TransportResolver>,
    dispatcher: Arc<DeliveryDispatcher>,
    single: ChannelGroup,
    multicast: ChannelGroup,
    topic: ChannelGroup,
}

impl FanOutResolver {
    pub fn new(
        resolver: Arc<TransportResolver>,
        dispatcher: Arc<DeliveryDispatcher>,
        single: ChannelGroup,
        multicast: ChannelGroup,
        topic: ChannelGroup,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            single,
            multicast,
            topic,
        }
    }

    /// Split push descriptors into the three groups by kind
    pub fn from_descriptors(
        resolver: Arc<TransportResolver>,
        dispatcher: Arc<DeliveryDispatcher>,
        descriptors: &[ChannelDescriptor],
        ttl: Duration,
    ) -> Self {
        let of_kind = |kind: ChannelKind| -> Vec<ChannelDescriptor> {
            descriptors.iter().filter(|d| d.kind == kind).cloned().collect()
        };

        Self::new(
            resolver,
            dispatcher,
            ChannelGroup::new("push-single", of_kind(ChannelKind::PushSingle)).with_ttl(ttl),
            ChannelGroup::new("push-multicast", of_kind(ChannelKind::PushMulticast)).with_ttl(ttl),
            ChannelGroup::new("push-topic", of_kind(ChannelKind::PushTopic)).with_ttl(ttl),
        )
    }

    pub fn group_for(&self, target: &TargetSpec) -> &ChannelGroup {
        match target {
            TargetSpec::Single(_) => &self.single,
            TargetSpec::Multi(_) => &self.multicast,
            TargetSpec::Topic(_) => &self.topic,
        }
    }

    pub fn groups(&self) -> [&ChannelGroup; 3] {
        [&self.single, &self.multicast, &self.topic]
    }

    pub async fn send_push(&self, message: &Message) -> Result<DeliveryOutcome, DeliveryError> {
        let group = self.group_for(&message.target);
        debug!(group = %group.name(), target = message.target.shape(), "Routing push message");

        let outcome = self.dispatcher.deliver(&self.resolver, group, message).await?;
        if outcome.is_partial() {
            warn!(
                record_id = %outcome.record_id,
                succeeded = ?outcome.recipients_succeeded,
                failed = outcome.recipients_failed,
                "Multicast partially delivered"
            );
        }
        Ok(outcome)
    }

    pub async fn subscribe(
        &self,
        identifiers: &[String],
        topic: &str,
    ) -> Result<SubscriptionOutcome, DeliveryError> {
        self.update_subscription(SubscriptionAction::Subscribe, identifiers, topic)
            .await
    }

    pub async fn unsubscribe(
        &self,
        identifiers: &[String],
        topic: &str,
    ) -> Result<SubscriptionOutcome, DeliveryError> {
        self.update_subscription(SubscriptionAction::Unsubscribe, identifiers, topic)
            .await
    }

    /// Apply a membership change through the topic group.
    ///
    /// Provider errors come back as an unsuccessful outcome; only bad input
    /// and an unavailable channel are errors.
    pub async fn update_subscription(
        &self,
        action: SubscriptionAction,
        identifiers: &[String],
        topic: &str,
    ) -> Result<SubscriptionOutcome, DeliveryError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(DeliveryError::invalid("topic must not be empty"));
        }
        if identifiers.iter().any(|id| id.trim().is_empty()) {
            return Err(DeliveryError::invalid("identifiers must not be blank"));
        }

        let mut seen = HashSet::new();
        let identifiers: Vec<String> = identifiers
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        if identifiers.is_empty() {
            return Err(DeliveryError::invalid("at least one identifier is required"));
        }

        let resolved = self.resolver.acquire(&self.topic).await?;
        let channel = resolved.channel();
        let timeout = self.dispatcher.send_timeout();

        let call = match action {
            SubscriptionAction::Subscribe => channel.subscribe(&identifiers, topic),
            SubscriptionAction::Unsubscribe => channel.unsubscribe(&identifiers, topic),
        };
        let result = match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Timeout(timeout)),
        };

        let mut outcome = SubscriptionOutcome {
            success: false,
            channel_used: channel.name().to_string(),
            topic: topic.to_string(),
            identifiers_succeeded: 0,
            identifiers_failed: identifiers.len() as u32,
            changed: None,
            error_detail: None,
        };

        match result {
            Ok(response) => {
                let summary = BatchSummary::from_results(&response.results);
                outcome.success = summary.succeeded > 0;
                outcome.identifiers_succeeded = summary.succeeded;
                outcome.identifiers_failed = summary.failed;
                outcome.changed = response.changed;
                outcome.error_detail = summary.detail();
                info!(
                    action = ?action,
                    topic,
                    channel = %outcome.channel_used,
                    succeeded = summary.succeeded,
                    failed = summary.failed,
                    "Subscription updated"
                );
            }
            Err(e) => {
                warn!(action = ?action, topic, channel = %outcome.channel_used, error = %e, "Subscription update failed");
                if e.is_transport() {
                    self.topic.invalidate().await;
                }
                outcome.error_detail = Some(e.to_string());
            }
        }

        Ok(outcome)
    }
}
