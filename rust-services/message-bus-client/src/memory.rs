//! In-process message bus
//!
//! Delivers events between tasks of one process. Used by tests and by
//! local runs configured with `MESSAGE_BUS_URL=memory://`.
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


use async_trait::async_trait;
use herald_types::{Event, EventType};
use tokio::sync::{broadcast, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::{MessageBusError, Result};
use crate::traits::{EventStream, MessageBusClient};

const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast-backed bus that also remembers everything published
pub struct InMemoryBus {
    sender: broadcast::Sender<Event>,
    published: Mutex<Vec<Event>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: Mutex::new(Vec::new()),
        }
    }

    /// Every event published so far, oldest first
    pub async fn published(&self) -> Vec<Event> {
        self.published.lock().await.clone()
    }

    /// Published events of one type, oldest first
    pub async fn published_of(&self, event_type: EventType) -> Vec<Event> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBusClient for InMemoryBus {
    async fn publish(&self, event: &Event) -> Result<()> {
        self.published.lock().await.push(event.clone());

        // No receivers is not an error: nobody is listening for this type yet
        let receivers = self.sender.send(event.clone()).unwrap_or(0);

        debug!(
            event_type = event.event_type.as_str(),
            event_id = %event.event_id,
            receivers = receivers,
            "Event published in memory"
        );

        Ok(())
    }

    fn subscribe(&self, event_type: EventType) -> EventStream<'_> {
        // Registered before returning so no event published afterwards is missed
        let mut receiver = self.sender.subscribe();
        let (tx, rx) = tokio::sync::mpsc::channel::<std::result::Result<Event, MessageBusError>>(100);

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) if event.event_type == event_type => {
                        if tx.send(Ok(event)).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "In-memory subscriber lagged");
                        if tx.send(Err(MessageBusError::Lagged(skipped))).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    async fn is_connected(&self) -> bool {
        true
    }

    fn client_type(&self) -> &str {
        "memory"
    }
}
