//! Error types for the delivery core
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


use herald_types::DeliveryOutcome;
use std::time::Duration;
use thiserror::Error;

/// Native error reported by a channel implementation.
///
/// These never leave the delivery core: the dispatcher converts them into
/// a [`DeliveryError`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Recipient rejected: {0}")]
    Rejected(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid channel parameters: {0}")]
    InvalidParams(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl ChannelError {
    /// The transport itself is unusable, as opposed to the message being refused
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ChannelError::Timeout(_) | ChannelError::Auth(_) | ChannelError::Connection(_)
        )
    }
}

/// The only errors that cross the delivery boundary
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Structural validation failed; nothing was sent
    #[error("Invalid message: {reason}")]
    InvalidMessage {
        reason: String,
        record_id: Option<String>,
    },

    /// No configured channel connected and the sink is disabled
    #[error("No channel available: {reason}")]
    ChannelUnavailable {
        reason: String,
        record_id: Option<String>,
    },

    /// The channel took the attempt and the provider reported an error
    #[error("Delivery failed: {reason}")]
    DeliveryFailed {
        reason: String,
        outcome: Box<DeliveryOutcome>,
        /// Set when the failure points at the transport rather than the message
        transport: bool,
    },
}

impl DeliveryError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        DeliveryError::InvalidMessage {
            reason: reason.into(),
            record_id: None,
        }
    }

    /// Ledger record written for the failed request, if any
    pub fn record_id(&self) -> Option<&str> {
        match self {
            DeliveryError::InvalidMessage { record_id, .. }
            | DeliveryError::ChannelUnavailable { record_id, .. } => record_id.as_deref(),
            DeliveryError::DeliveryFailed { outcome, .. } => Some(outcome.record_id.as_str()),
        }
    }

    /// Recorded outcome, present only for provider failures
    pub fn outcome(&self) -> Option<&DeliveryOutcome> {
        match self {
            DeliveryError::DeliveryFailed { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::InvalidMessage { .. } => "invalid_message",
            DeliveryError::ChannelUnavailable { .. } => "channel_unavailable",
            DeliveryError::DeliveryFailed { .. } => "delivery_failed",
        }
    }
}

/// Ledger invariant violations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already completed: {0}")]
    AlreadyCompleted(String),
}
