//! Delivery ledger
//!
//! Append-only record of every dispatch for the lifetime of the process.
//! Records are created PENDING and completed exactly once by the dispatcher.
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


use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use herald_types::{ChannelKind, DeliveryOutcome, Message, TargetSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeliveryStatus::Pending)
    }
}

/// Message projection plus its outcome, as stored by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: DeliveryStatus,
    /// Channel name, or the group name when no channel could be resolved
    pub channel_used: String,
    pub channel_kind: Option<ChannelKind>,
    pub target: TargetSpec,
    pub title: String,
    pub body: String,
    pub metadata: BTreeMap<String, String>,
    pub outcome: Option<DeliveryOutcome>,
    pub error_detail: Option<String>,
}

/// Input to [`DeliveryLedger::record`]
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub message: Message,
    pub channel_used: String,
    pub channel_kind: Option<ChannelKind>,
}

impl LedgerEntry {
    pub fn new(message: &Message, channel_used: impl Into<String>, channel_kind: Option<ChannelKind>) -> Self {
        Self {
            message: message.clone(),
            channel_used: channel_used.into(),
            channel_kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total: usize,
    pub pending: usize,
    pub sent: usize,
    pub failed: usize,
    /// Percentage of all records that reached SENT
    pub success_rate: f64,
}

#[derive(Default)]
struct LedgerInner {
    records: Vec<DeliveryRecord>,
    index: HashMap<String, usize>,
}

#[derive(Default)]
pub struct DeliveryLedger {
    inner: RwLock<LedgerInner>,
}

impl DeliveryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a PENDING record and return its id
    pub async fn record(&self, entry: LedgerEntry) -> String {
        let id = Uuid::new_v4().to_string();
        let record = DeliveryRecord {
            id: id.clone(),
            created_at: Utc::now(),
            completed_at: None,
            status: DeliveryStatus::Pending,
            channel_used: entry.channel_used,
            channel_kind: entry.channel_kind,
            target: entry.message.target,
            title: entry.message.title,
            body: entry.message.body,
            metadata: entry.message.metadata,
            outcome: None,
            error_detail: None,
        };

        let mut inner = self.inner.write().await;
        let position = inner.records.len();
        inner.records.push(record);
        inner.index.insert(id.clone(), position);
        id
    }

    /// Move a PENDING record to its terminal status
    pub(crate) async fn complete(
        &self,
        id: &str,
        status: DeliveryStatus,
        outcome: Option<DeliveryOutcome>,
        error_detail: Option<String>,
    ) -> Result<(), LedgerError> {
        debug_assert!(status.is_terminal());

        let mut inner = self.inner.write().await;
        let position = *inner
            .index
            .get(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;
        let record = &mut inner.records[position];
        if record.status.is_terminal() {
            return Err(LedgerError::AlreadyCompleted(id.to_string()));
        }

        record.status = status;
        record.completed_at = Some(Utc::now());
        record.error_detail = error_detail.or_else(|| outcome.as_ref().and_then(|o| o.error_detail.clone()));
        record.outcome = outcome;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<DeliveryRecord> {
        let inner = self.inner.read().await;
        inner.index.get(id).map(|&i| inner.records[i].clone())
    }

    /// All records in insertion order, most recent last
    pub async fn list(&self) -> Vec<DeliveryRecord> {
        self.inner.read().await.records.clone()
    }

    pub async fn latest(&self) -> Option<DeliveryRecord> {
        self.inner.read().await.records.last().cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> LedgerStats {
        let inner = self.inner.read().await;
        let mut stats = LedgerStats {
            total: inner.records.len(),
            pending: 0,
            sent: 0,
            failed: 0,
            success_rate: 0.0,
        };
        for record in &inner.records {
            match record.status {
                DeliveryStatus::Pending => stats.pending += 1,
                DeliveryStatus::Sent => stats.sent += 1,
                DeliveryStatus::Failed => stats.failed += 1,
            }
        }
        if stats.total > 0 {
            stats.success_rate = stats.sent as f64 / stats.total as f64 * 100.0;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entry(title: &str) -> LedgerEntry {
        let message = Message::new(TargetSpec::Single("a@x.com".to_string()), title, "Hello");
        LedgerEntry::new(&message, "SMTP port 587", Some(ChannelKind::Smtp))
    }

    #[tokio::test]
    async fn test_record_starts_pending() {
        let ledger = DeliveryLedger::new();
        let id = ledger.record(entry("Hi")).await;

        let record = ledger.get(&id).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Pending);
        assert_eq!(record.channel_used, "SMTP port 587");
        assert!(record.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_is_none() {
        let ledger = DeliveryLedger::new();
        assert!(ledger.get("missing").await.is_none());
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_complete_exactly_once() {
        let ledger = DeliveryLedger::new();
        let id = ledger.record(entry("Hi")).await;

        ledger
            .complete(&id, DeliveryStatus::Sent, None, None)
            .await
            .unwrap();
        let second = ledger
            .complete(&id, DeliveryStatus::Failed, None, Some("late".to_string()))
            .await;

        assert_eq!(second, Err(LedgerError::AlreadyCompleted(id.clone())));
        assert_eq!(ledger.get(&id).await.unwrap().status, DeliveryStatus::Sent);

        let missing = ledger.complete("nope", DeliveryStatus::Sent, None, None).await;
        assert_eq!(missing, Err(LedgerError::NotFound("nope".to_string())));
    }

    #[tokio::test]
    async fn test_returned_records_are_copies() {
        let ledger = DeliveryLedger::new();
        let id = ledger.record(entry("Hi")).await;

        let mut copy = ledger.get(&id).await.unwrap();
        copy.title = "changed".to_string();
        assert_eq!(ledger.get(&id).await.unwrap().title, "Hi");
    }

    #[tokio::test]
    async fn test_stats() {
        let ledger = DeliveryLedger::new();
        assert_eq!(ledger.stats().await.success_rate, 0.0);

        let a = ledger.record(entry("a")).await;
        let b = ledger.record(entry("b")).await;
        let c = ledger.record(entry("c")).await;
        ledger.record(entry("d")).await;
        ledger.complete(&a, DeliveryStatus::Sent, None, None).await.unwrap();
        ledger.complete(&b, DeliveryStatus::Sent, None, None).await.unwrap();
        ledger.complete(&c, DeliveryStatus::Failed, None, None).await.unwrap();

        let stats = ledger.stats().await;
        assert_eq!(stats.total, 4);
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.success_rate, 50.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_all_kept() {
        let ledger = Arc::new(DeliveryLedger::new());

        let handles: Vec<_> = (0..100)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.record(entry(&format!("m{}", i))).await })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        let records = ledger.list().await;
        assert_eq!(records.len(), 100);
        for id in ids {
            assert_eq!(ledger.get(&id).await.unwrap().id, id);
        }
    }
}
