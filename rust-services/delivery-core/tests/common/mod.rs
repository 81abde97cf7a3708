//! Scripted channels shared by the delivery-core integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use delivery_core::{Channel, ChannelError, ProviderResponse, RecipientResult, SubscriptionResponse};
use herald_types::{ChannelDescriptor, ChannelKind, Message, TargetSpec};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug)]
pub enum Probe {
    Up,
    Down,
    /// Never answers within any sane timeout
    Hang,
}

#[derive(Clone, Debug)]
pub enum Reply {
    Accept,
    /// Per-identifier results: listed identifiers fail with the given error
    FailFor(Vec<String>, String),
    Error(ChannelError),
}

pub struct ScriptedChannel {
    descriptor: ChannelDescriptor,
    probe: Probe,
    send: Reply,
    pub probes: AtomicU32,
    pub sends: AtomicU32,
    subscriptions: Mutex<HashSet<(String, String)>>,
}

impl ScriptedChannel {
    pub fn new(name: &str, kind: ChannelKind, priority: i32, probe: Probe, send: Reply) -> Arc<Self> {
        Arc::new(Self {
            descriptor: ChannelDescriptor::new(name, kind, priority),
            probe,
            send,
            probes: AtomicU32::new(0),
            sends: AtomicU32::new(0),
            subscriptions: Mutex::new(HashSet::new()),
        })
    }

    pub fn up(name: &str, kind: ChannelKind, priority: i32) -> Arc<Self> {
        Self::new(name, kind, priority, Probe::Up, Reply::Accept)
    }

    pub fn descriptor_clone(&self) -> ChannelDescriptor {
        self.descriptor.clone()
    }

    pub fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn send_count(&self) -> u32 {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    async fn probe(&self) -> Result<(), ChannelError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        match self.probe {
            Probe::Up => Ok(()),
            Probe::Down => Err(ChannelError::Connection("connection refused".to_string())),
            Probe::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }

    async fn send(&self, message: &Message) -> Result<ProviderResponse, ChannelError> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        let message_id = format!("{}-{}", self.descriptor.name, n);

        match &self.send {
            Reply::Error(e) => Err(e.clone()),
            Reply::Accept => Ok(match &message.target {
                TargetSpec::Topic(_) => ProviderResponse::Broadcast {
                    message_id: Some(message_id),
                },
                TargetSpec::Multi(ids) if self.descriptor.kind == ChannelKind::PushMulticast => {
                    ProviderResponse::Batch(
                        ids.iter()
                            .map(|id| RecipientResult::delivered(id.clone(), Some(format!("{}-{}", message_id, id))))
                            .collect(),
                    )
                }
                target => ProviderResponse::Accepted {
                    message_id: Some(message_id),
                    recipients: target.recipient_count().unwrap_or(0),
                },
            }),
            Reply::FailFor(failing, error) => Ok(ProviderResponse::Batch(
                message
                    .target
                    .identifiers()
                    .into_iter()
                    .map(|id| {
                        if failing.iter().any(|f| f == id) {
                            RecipientResult::failed(id, error.clone())
                        } else {
                            RecipientResult::delivered(id, Some(format!("{}-{}", message_id, id)))
                        }
                    })
                    .collect(),
            )),
        }
    }

    async fn subscribe(
        &self,
        identifiers: &[String],
        topic: &str,
    ) -> Result<SubscriptionResponse, ChannelError> {
        let mut subscriptions = self.subscriptions.lock().await;
        let changed = identifiers
            .iter()
            .filter(|id| subscriptions.insert(((*id).clone(), topic.to_string())))
            .count() as u32;
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
        let mut subscriptions = self.subscriptions.lock().await;
        let changed = identifiers
            .iter()
            .filter(|id| subscriptions.remove(&((*id).clone(), topic.to_string())))
            .count() as u32;
        Ok(SubscriptionResponse {
            results: identifiers
                .iter()
                .map(|id| RecipientResult::delivered(id.clone(), None))
                .collect(),
            changed: Some(changed),
        })
    }
}

pub fn email(to: &str, subject: &str, body: &str) -> Message {
    Message::new(TargetSpec::Single(to.to_string()), subject, body)
}
