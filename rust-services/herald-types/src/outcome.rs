//! Canonical delivery outcomes
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

use crate::channel::ChannelKind;

/// Normalized result of one dispatch, identical in shape for every channel.
///
/// `recipients_succeeded` is `None` for topic broadcasts: the provider does
/// not report how many subscribers received the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub success: bool,
    /// Ledger record written for this dispatch
    pub record_id: String,
    pub channel_used: String,
    pub channel_kind: ChannelKind,
    pub provider_message_id: Option<String>,
    pub recipients_succeeded: Option<u32>,
    pub recipients_failed: u32,
    pub error_detail: Option<String>,
}

impl DeliveryOutcome {
    /// Delivered to some but not all recipients
    pub fn is_partial(&self) -> bool {
        self.success && self.recipients_failed > 0
    }

    /// Delivered through the fallback sink rather than a real provider
    pub fn used_sink(&self) -> bool {
        self.channel_kind == ChannelKind::Sink
    }
}

/// Result of a topic subscribe/unsubscribe request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionOutcome {
    pub success: bool,
    pub channel_used: String,
    pub topic: String,
    pub identifiers_succeeded: u32,
    pub identifiers_failed: u32,
    /// Identifiers whose subscription state actually changed, when the
    /// channel can tell. Repeating a request leaves this at zero.
    pub changed: Option<u32>,
    pub error_detail: Option<String>,
}
