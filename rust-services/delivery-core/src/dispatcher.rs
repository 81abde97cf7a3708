//! Delivery dispatcher
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


use crate::channel::{Channel, ProviderResponse};
use crate::error::{ChannelError, DeliveryError};
use crate::fanout::BatchSummary;
use crate::ledger::{DeliveryLedger, DeliveryStatus, LedgerEntry};
use crate::resolver::{ChannelGroup, ResolvedChannel, TransportResolver};
use herald_types::{DeliveryOutcome, Message, TargetSpec};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Sends through a resolved channel and records every attempt.
///
/// Provider errors never escape: each dispatch ends in a [`DeliveryOutcome`]
/// or one of the [`DeliveryError`] kinds, and leaves exactly one ledger record.
pub struct DeliveryDispatcher {
    ledger: Arc<DeliveryLedger>,
    send_timeout: Duration,
}

impl DeliveryDispatcher {
    pub fn new(ledger: Arc<DeliveryLedger>, send_timeout: Duration) -> Self {
        Self {
            ledger,
            send_timeout,
        }
    }

    pub fn ledger(&self) -> &Arc<DeliveryLedger> {
        &self.ledger
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Resolve `group` and dispatch through whatever it yields.
    ///
    /// Messages that fail validation are recorded and rejected before any
    /// channel is probed.
    pub async fn deliver(
        &self,
        resolver: &TransportResolver,
        group: &ChannelGroup,
        message: &Message,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        if let Err(reason) = validate_for_group(message, group) {
            let record_id = self.record_failure(message, group.name(), reason.clone()).await;
            return Err(DeliveryError::InvalidMessage {
                reason,
                record_id: Some(record_id),
            });
        }

        let resolved = match resolver.acquire(group).await {
            Ok(resolved) => resolved,
            Err(DeliveryError::ChannelUnavailable { reason, .. }) => {
                error!(group = %group.name(), reason = %reason, "No channel available");
                let record_id = self.record_failure(message, group.name(), reason.clone()).await;
                return Err(DeliveryError::ChannelUnavailable {
                    reason,
                    record_id: Some(record_id),
                });
            }
            Err(e) => return Err(e),
        };

        let result = self.dispatch(&resolved, message).await;
        if let Err(DeliveryError::DeliveryFailed { transport: true, .. }) = &result {
            group.invalidate().await;
        }
        result
    }

    pub async fn dispatch(
        &self,
        resolved: &ResolvedChannel,
        message: &Message,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let channel = resolved.channel();
        let record_id = self
            .ledger
            .record(LedgerEntry::new(message, channel.name(), Some(channel.kind())))
            .await;

        if let Err(reason) = validate_for_channel(message, channel.as_ref()) {
            warn!(record_id = %record_id, reason = %reason, "Rejected invalid message");
            self.finish(&record_id, DeliveryStatus::Failed, None, Some(reason.clone()))
                .await;
            return Err(DeliveryError::InvalidMessage {
                reason,
                record_id: Some(record_id),
            });
        }

        let response = match tokio::time::timeout(self.send_timeout, channel.send(message)).await {
            Ok(response) => response,
            Err(_) => Err(ChannelError::Timeout(self.send_timeout)),
        };

        match response {
            Ok(response) => {
                let outcome = normalize(&record_id, channel.as_ref(), &message.target, response);
                if outcome.success {
                    info!(
                        record_id = %record_id,
                        channel = %outcome.channel_used,
                        sink = resolved.is_fallback(),
                        succeeded = ?outcome.recipients_succeeded,
                        failed = outcome.recipients_failed,
                        "Message dispatched"
                    );
                    self.finish(&record_id, DeliveryStatus::Sent, Some(outcome.clone()), None)
                        .await;
                    Ok(outcome)
                } else {
                    let reason = outcome
                        .error_detail
                        .clone()
                        .unwrap_or_else(|| "provider accepted no recipients".to_string());
                    warn!(record_id = %record_id, channel = %outcome.channel_used, reason = %reason, "Delivery failed");
                    self.finish(&record_id, DeliveryStatus::Failed, Some(outcome.clone()), None)
                        .await;
                    Err(DeliveryError::DeliveryFailed {
                        reason,
                        outcome: Box::new(outcome),
                        transport: false,
                    })
                }
            }
            Err(e) => {
                let outcome = failed_outcome(&record_id, channel.as_ref(), &message.target, &e);
                warn!(record_id = %record_id, channel = %channel.name(), error = %e, "Delivery failed");
                self.finish(&record_id, DeliveryStatus::Failed, Some(outcome.clone()), None)
                    .await;
                Err(DeliveryError::DeliveryFailed {
                    reason: e.to_string(),
                    outcome: Box::new(outcome),
                    transport: e.is_transport(),
                })
            }
        }
    }

    async fn record_failure(&self, message: &Message, group: &str, reason: String) -> String {
        let record_id = self
            .ledger
            .record(LedgerEntry::new(message, group, None))
            .await;
        self.finish(&record_id, DeliveryStatus::Failed, None, Some(reason))
            .await;
        record_id
    }

    async fn finish(
        &self,
        record_id: &str,
        status: DeliveryStatus,
        outcome: Option<DeliveryOutcome>,
        error_detail: Option<String>,
    ) {
        if let Err(e) = self
            .ledger
            .complete(record_id, status, outcome, error_detail)
            .await
        {
            error!(record_id, error = %e, "Failed to complete ledger record");
        }
    }
}

fn validate_for_group(message: &Message, group: &ChannelGroup) -> Result<(), String> {
    message.validate().map_err(|e| e.to_string())?;

    let descriptors = group.descriptors();
    if !descriptors.is_empty() && !descriptors.iter().any(|d| d.kind.accepts(&message.target)) {
        return Err(format!(
            "{} target cannot be delivered through the {} group",
            message.target.shape(),
            group.name()
        ));
    }
    Ok(())
}

fn validate_for_channel(message: &Message, channel: &dyn Channel) -> Result<(), String> {
    message.validate().map_err(|e| e.to_string())?;

    if !channel.accepts(&message.target) {
        return Err(format!(
            "{} target cannot be delivered through {} ({})",
            message.target.shape(),
            channel.name(),
            channel.kind()
        ));
    }
    Ok(())
}

fn base_outcome(record_id: &str, channel: &dyn Channel) -> DeliveryOutcome {
    DeliveryOutcome {
        success: false,
        record_id: record_id.to_string(),
        channel_used: channel.name().to_string(),
        channel_kind: channel.kind(),
        provider_message_id: None,
        recipients_succeeded: Some(0),
        recipients_failed: 0,
        error_detail: None,
    }
}

/// Map a provider response onto the canonical outcome
fn normalize(
    record_id: &str,
    channel: &dyn Channel,
    target: &TargetSpec,
    response: ProviderResponse,
) -> DeliveryOutcome {
    let mut outcome = base_outcome(record_id, channel);

    match (response, target) {
        (ProviderResponse::Broadcast { message_id }, _)
        | (ProviderResponse::Accepted { message_id, .. }, TargetSpec::Topic(_)) => {
            outcome.success = true;
            outcome.provider_message_id = message_id;
            outcome.recipients_succeeded = None;
        }
        (ProviderResponse::Accepted { message_id, recipients }, target) => {
            let expected = target.recipient_count().unwrap_or(recipients);
            outcome.success = recipients > 0;
            outcome.provider_message_id = message_id;
            outcome.recipients_succeeded = Some(recipients);
            outcome.recipients_failed = expected.saturating_sub(recipients);
            if !outcome.success {
                outcome.error_detail = Some("provider accepted no recipients".to_string());
            }
        }
        (ProviderResponse::Batch(results), _) => {
            let summary = BatchSummary::from_results(&results);
            outcome.success = summary.succeeded > 0;
            outcome.provider_message_id = summary.first_message_id.clone();
            outcome.recipients_succeeded = Some(summary.succeeded);
            outcome.recipients_failed = summary.failed;
            outcome.error_detail = summary.detail();
        }
    }

    outcome
}

fn failed_outcome(
    record_id: &str,
    channel: &dyn Channel,
    target: &TargetSpec,
    error: &ChannelError,
) -> DeliveryOutcome {
    let mut outcome = base_outcome(record_id, channel);
    outcome.recipients_succeeded = target.recipient_count().map(|_| 0);
    outcome.recipients_failed = target.recipient_count().unwrap_or(0);
    outcome.error_detail = Some(error.to_string());
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::RecipientResult;
    use crate::sink::SinkChannel;
    use herald_types::{ChannelDescriptor, ChannelKind};

    fn sink() -> SinkChannel {
        SinkChannel::new()
    }

    #[test]
    fn test_normalize_accepted_counts_missing_recipients() {
        let target = TargetSpec::multi(["a@x.com", "b@x.com", "c@x.com"]);
        let outcome = normalize(
            "r1",
            &sink(),
            &target,
            ProviderResponse::Accepted {
                message_id: Some("<id@host>".to_string()),
                recipients: 2,
            },
        );

        assert!(outcome.success);
        assert_eq!(outcome.recipients_succeeded, Some(2));
        assert_eq!(outcome.recipients_failed, 1);
        assert_eq!(outcome.provider_message_id.as_deref(), Some("<id@host>"));
    }

    #[test]
    fn test_normalize_topic_has_unknown_count() {
        let target = TargetSpec::Topic("news".to_string());
        let outcome = normalize(
            "r1",
            &sink(),
            &target,
            ProviderResponse::Accepted {
                message_id: None,
                recipients: 7,
            },
        );

        assert!(outcome.success);
        assert_eq!(outcome.recipients_succeeded, None);
        assert_eq!(outcome.recipients_failed, 0);
    }

    #[test]
    fn test_normalize_batch_without_successes_fails() {
        let target = TargetSpec::multi(["t1", "t2"]);
        let outcome = normalize(
            "r1",
            &sink(),
            &target,
            ProviderResponse::Batch(vec![
                RecipientResult::failed("t1", "not registered"),
                RecipientResult::failed("t2", "not registered"),
            ]),
        );

        assert!(!outcome.success);
        assert_eq!(outcome.recipients_succeeded, Some(0));
        assert_eq!(outcome.recipients_failed, 2);
        assert!(outcome.error_detail.is_some());
    }

    #[test]
    fn test_failed_outcome_counts_every_recipient() {
        let target = TargetSpec::multi(["t1", "t2", "t3"]);
        let error = ChannelError::Auth("invalid credentials".to_string());
        let outcome = failed_outcome("r1", &sink(), &target, &error);

        assert!(!outcome.success);
        assert_eq!(outcome.recipients_succeeded, Some(0));
        assert_eq!(outcome.recipients_failed, 3);
        assert_eq!(
            outcome.error_detail.as_deref(),
            Some("Authentication failed: invalid credentials")
        );
    }

    #[test]
    fn test_group_shape_check() {
        let group = ChannelGroup::new(
            "email",
            vec![ChannelDescriptor::new("SMTP port 587", ChannelKind::Smtp, 0)],
        );
        let topic = Message::new(TargetSpec::Topic("news".to_string()), "Hi", "Hello");
        assert!(validate_for_group(&topic, &group).is_err());

        let single = Message::new(TargetSpec::Single("a@x.com".to_string()), "Hi", "Hello");
        assert!(validate_for_group(&single, &group).is_ok());

        let empty = ChannelGroup::new("push-topic", Vec::new());
        assert!(validate_for_group(&topic, &empty).is_ok());
    }
}
