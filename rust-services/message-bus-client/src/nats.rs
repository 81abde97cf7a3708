//! NATS implementation of the message bus client
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


use async_nats::jetstream::{self, Context};
use async_trait::async_trait;
use herald_types::{Event, EventType};
use std::sync::Arc;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tracing::{error, info, warn};

use crate::error::{MessageBusError, Result};
use crate::traits::{subject_for, EventStream, MessageBusClient};

const DEFAULT_STREAM_NAME: &str = "herald-events";
const DEFAULT_SUBJECT_PREFIX: &str = "herald";

/// NATS message bus client
///
/// Events are published through JetStream so they survive a worker restart;
/// subscriptions use core NATS and receive events as they arrive.
pub struct NatsClient {
    client: Arc<async_nats::Client>,
    jetstream: Arc<Context>,
    subject_prefix: String,
}

impl NatsClient {
    /// Create a new NATS client publishing under the default `herald` prefix
    pub async fn new(url: &str, stream_name: Option<String>) -> Result<Self> {
        Self::with_subject_prefix(url, stream_name, DEFAULT_SUBJECT_PREFIX).await
    }

    /// Create a new NATS client whose subjects start with `subject_prefix`
    pub async fn with_subject_prefix(
        url: &str,
        stream_name: Option<String>,
        subject_prefix: &str,
    ) -> Result<Self> {
        info!(url = url, subject_prefix = subject_prefix, "Connecting to NATS server");

        let client = async_nats::connect(url)
            .await
            .map_err(|e| MessageBusError::Connection(e.to_string()))?;

        let client_arc = Arc::new(client.clone());
        let jetstream = jetstream::new(client);

        let stream_name = stream_name.unwrap_or_else(|| DEFAULT_STREAM_NAME.to_string());
        let subject_prefix = subject_prefix.to_string();

        if let Err(e) = Self::ensure_stream(&jetstream, &stream_name, &subject_prefix).await {
            warn!(stream = stream_name, error = %e, "Could not ensure JetStream stream");
        }

        info!(
            stream = stream_name,
            "NATS client initialized"
        );

        Ok(Self {
            client: client_arc,
            jetstream: Arc::new(jetstream),
            subject_prefix,
        })
    }

    /// Ensure the JetStream stream exists
    async fn ensure_stream(
        jetstream: &Context,
        stream_name: &str,
        subject_prefix: &str,
    ) -> Result<()> {
        jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: stream_name.to_string(),
                subjects: vec![format!("{}.>", subject_prefix)],
                max_age: std::time::Duration::from_secs(86400 * 7), // 7 days retention
                storage: jetstream::stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| MessageBusError::Connection(format!("Failed to create stream: {}", e)))?;

        info!(
            stream = stream_name,
            "Stream ensured"
        );

        Ok(())
    }
}

#[async_trait]
impl MessageBusClient for NatsClient {
    async fn publish(&self, event: &Event) -> Result<()> {
        let subject = subject_for(&self.subject_prefix, event.event_type);

        let payload = serde_json::to_vec(event)
            .map_err(MessageBusError::Serialization)?;

        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| MessageBusError::Publish(e.to_string()))?;

        info!(
            event_type = event.event_type.as_str(),
            event_id = %event.event_id,
            subject = subject,
            "Event published"
        );

        Ok(())
    }

    fn subscribe(&self, event_type: EventType) -> EventStream<'_> {
        let subject = subject_for(&self.subject_prefix, event_type);

        info!(
            subject = subject,
            event_type = event_type.as_str(),
            "Subscribing to events"
        );

        let (tx, rx) = tokio::sync::mpsc::channel::<std::result::Result<Event, MessageBusError>>(100);
        let client = Arc::clone(&self.client);

        tokio::spawn(async move {
            match client.subscribe(subject.clone()).await {
                Ok(mut subscriber) => {
                    info!(
                        subject = subject,
                        "Subscription created, waiting for messages"
                    );

                    while let Some(nats_msg) = subscriber.next().await {
                        match serde_json::from_slice::<Event>(&nats_msg.payload) {
                            Ok(event) => {
                                if tx.send(Ok(event)).await.is_err() {
                                    error!("Receiver dropped, stopping subscription");
                                    break;
                                }
                            }
                            Err(e) => {
                                error!(error = %e, "Failed to deserialize event");
                                let _ = tx.send(Err(MessageBusError::Serialization(e))).await;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Failed to create subscription");
                    let _ = tx.send(Err(MessageBusError::Subscribe(e.to_string()))).await;
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn is_connected(&self) -> bool {
        matches!(
            self.client.connection_state(),
            async_nats::connection::State::Connected
        )
    }

    fn client_type(&self) -> &str {
        "nats"
    }
}
