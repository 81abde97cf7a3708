//! Event payload schemas
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


use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::message::{Message, TargetSpec};
use crate::outcome::{DeliveryOutcome, SubscriptionOutcome};

// ============================================================================
// Notification Event Payloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Push,
    Email,
}

/// Payload for `notification.requested` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequestedPayload {
    pub request_id: Uuid,
    pub notification_type: NotificationType,
    pub target: TargetSpec,
    #[serde(alias = "subject")]
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl NotificationRequestedPayload {
    /// Normalized message for the delivery core
    pub fn to_message(&self) -> Message {
        Message {
            target: self.target.clone(),
            title: self.title.clone(),
            body: self.body.clone(),
            metadata: self.data.clone(),
        }
    }
}

/// Payload for `notification.sent` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSentPayload {
    pub request_id: Uuid,
    pub record_id: String,
    pub notification_type: NotificationType,
    pub outcome: DeliveryOutcome,
    pub sent_at: chrono::DateTime<chrono::Utc>,
}

/// Payload for `notification.failed` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFailedPayload {
    pub request_id: Uuid,
    /// Absent only when the request never reached the dispatcher
    pub record_id: Option<String>,
    pub notification_type: NotificationType,
    pub error: String,
    pub outcome: Option<DeliveryOutcome>,
    pub failed_at: chrono::DateTime<chrono::Utc>,
}

// ============================================================================
// Subscription Event Payloads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionAction {
    Subscribe,
    Unsubscribe,
}

/// Payload for `subscription.requested` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequestedPayload {
    pub request_id: Uuid,
    pub action: SubscriptionAction,
    pub identifiers: Vec<String>,
    pub topic: String,
}

/// Payload for `subscription.updated` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionUpdatedPayload {
    pub request_id: Uuid,
    pub action: SubscriptionAction,
    pub topic: String,
    pub outcome: Option<SubscriptionOutcome>,
    pub error: Option<String>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
