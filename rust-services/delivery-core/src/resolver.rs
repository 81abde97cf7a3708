//! Transport resolution
//!
//! Descriptors are probed one at a time in ascending priority. The first
//! probe to succeed wins; if none does, the sink is handed out instead.
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


use crate::channel::{Channel, ChannelConnector};
use crate::error::{ChannelError, DeliveryError};
use crate::sink::SinkChannel;
use herald_types::{ChannelDescriptor, ChannelKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A descriptor that was tried and passed over during resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeFailure {
    pub channel: String,
    pub reason: String,
}

/// Channel handle picked by the resolver
#[derive(Clone)]
pub struct ResolvedChannel {
    channel: Arc<dyn Channel>,
    fallback: bool,
    skipped: Vec<ProbeFailure>,
}

impl ResolvedChannel {
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self {
            channel,
            fallback: false,
            skipped: Vec::new(),
        }
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn name(&self) -> &str {
        self.channel.name()
    }

    pub fn kind(&self) -> ChannelKind {
        self.channel.kind()
    }

    /// True when no configured channel answered and the sink was handed out
    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn skipped(&self) -> &[ProbeFailure] {
        &self.skipped
    }
}

impl std::fmt::Debug for ResolvedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedChannel")
            .field("channel", &self.channel.name())
            .field("fallback", &self.fallback)
            .field("skipped", &self.skipped)
            .finish()
    }
}

struct CachedResolution {
    resolved: ResolvedChannel,
    resolved_at: Instant,
}

/// Named, priority-ordered descriptor list with a cached resolution
pub struct ChannelGroup {
    name: String,
    descriptors: Vec<ChannelDescriptor>,
    ttl: Duration,
    cached: RwLock<Option<CachedResolution>>,
}

impl ChannelGroup {
    pub fn new(name: impl Into<String>, descriptors: Vec<ChannelDescriptor>) -> Self {
        Self {
            name: name.into(),
            descriptors,
            ttl: Duration::from_secs(300),
            cached: RwLock::new(None),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptors(&self) -> &[ChannelDescriptor] {
        &self.descriptors
    }

    /// Drop the cached resolution so the next acquire re-probes
    pub async fn invalidate(&self) {
        let mut cached = self.cached.write().await;
        if cached.take().is_some() {
            debug!(group = %self.name, "Channel resolution invalidated");
        }
    }

    async fn cached(&self) -> Option<ResolvedChannel> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|c| c.resolved_at.elapsed() < self.ttl)
            .map(|c| c.resolved.clone())
    }

    async fn store(&self, resolved: &ResolvedChannel) {
        let mut cached = self.cached.write().await;
        *cached = Some(CachedResolution {
            resolved: resolved.clone(),
            resolved_at: Instant::now(),
        });
    }
}

/// Ordered-failover channel resolver
pub struct TransportResolver {
    connector: Arc<dyn ChannelConnector>,
    sink: Option<Arc<SinkChannel>>,
    probe_timeout: Duration,
}

impl TransportResolver {
    pub fn new(connector: Arc<dyn ChannelConnector>, probe_timeout: Duration) -> Self {
        Self {
            connector,
            sink: Some(Arc::new(SinkChannel::new())),
            probe_timeout,
        }
    }

    pub fn with_sink(mut self, sink: Arc<SinkChannel>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Fail resolution with `ChannelUnavailable` instead of falling back
    pub fn without_sink(mut self) -> Self {
        self.sink = None;
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    pub fn sink(&self) -> Option<&Arc<SinkChannel>> {
        self.sink.as_ref()
    }

    /// Connect and probe one descriptor, bounded by `timeout`
    pub async fn probe_descriptor(
        &self,
        descriptor: &ChannelDescriptor,
        timeout: Duration,
    ) -> Result<Arc<dyn Channel>, ChannelError> {
        let channel = self.connector.connect(descriptor)?;
        match tokio::time::timeout(timeout, channel.probe()).await {
            Ok(Ok(())) => Ok(channel),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ChannelError::Timeout(timeout)),
        }
    }

    /// Pick the first reachable descriptor in ascending priority.
    ///
    /// Sink descriptors in the list are not probed; the resolver's own sink
    /// is the fallback.
    pub async fn resolve(
        &self,
        descriptors: &[ChannelDescriptor],
        timeout: Duration,
    ) -> Result<ResolvedChannel, DeliveryError> {
        let mut ordered: Vec<&ChannelDescriptor> = descriptors
            .iter()
            .filter(|d| d.kind != ChannelKind::Sink)
            .collect();
        ordered.sort_by_key(|d| d.priority);

        let mut skipped = Vec::new();
        for descriptor in ordered {
            debug!(channel = %descriptor.name, priority = descriptor.priority, "Probing channel");
            match self.probe_descriptor(descriptor, timeout).await {
                Ok(channel) => {
                    if !skipped.is_empty() {
                        info!(
                            channel = %descriptor.name,
                            skipped = skipped.len(),
                            "Resolved channel after failover"
                        );
                    }
                    return Ok(ResolvedChannel {
                        channel,
                        fallback: false,
                        skipped,
                    });
                }
                Err(e) => {
                    warn!(channel = %descriptor.name, error = %e, "Channel probe failed");
                    skipped.push(ProbeFailure {
                        channel: descriptor.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        match &self.sink {
            Some(sink) => {
                warn!(
                    sink = %sink.name(),
                    tried = skipped.len(),
                    "No configured channel reachable, falling back to sink"
                );
                Ok(ResolvedChannel {
                    channel: sink.clone(),
                    fallback: true,
                    skipped,
                })
            }
            None => {
                let reason = if skipped.is_empty() {
                    "no channels configured".to_string()
                } else {
                    skipped
                        .iter()
                        .map(|s| format!("{}: {}", s.channel, s.reason))
                        .collect::<Vec<_>>()
                        .join("; ")
                };
                Err(DeliveryError::ChannelUnavailable {
                    reason,
                    record_id: None,
                })
            }
        }
    }

    /// Resolve a group, reusing its cached resolution while fresh.
    ///
    /// Sink fallbacks are never cached.
    pub async fn acquire(&self, group: &ChannelGroup) -> Result<ResolvedChannel, DeliveryError> {
        if let Some(resolved) = group.cached().await {
            return Ok(resolved);
        }

        let resolved = self.resolve(group.descriptors(), self.probe_timeout).await?;
        if !resolved.is_fallback() {
            group.store(&resolved).await;
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ProviderResponse, StaticConnector};
    use async_trait::async_trait;
    use herald_types::Message;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Probed {
        descriptor: ChannelDescriptor,
        reachable: bool,
        probes: AtomicU32,
    }

    impl Probed {
        fn new(name: &str, priority: i32, reachable: bool) -> Arc<Self> {
            Arc::new(Self {
                descriptor: ChannelDescriptor::new(name, ChannelKind::Smtp, priority),
                reachable,
                probes: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Channel for Probed {
        fn descriptor(&self) -> &ChannelDescriptor {
            &self.descriptor
        }

        async fn probe(&self) -> Result<(), ChannelError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.reachable {
                Ok(())
            } else {
                Err(ChannelError::Connection("refused".to_string()))
            }
        }

        async fn send(&self, _message: &Message) -> Result<ProviderResponse, ChannelError> {
            Ok(ProviderResponse::Accepted {
                message_id: None,
                recipients: 1,
            })
        }
    }

    #[tokio::test]
    async fn test_priority_order_not_list_order() {
        let late = Probed::new("late", 20, true);
        let early = Probed::new("early", 10, true);
        let connector = StaticConnector::new().with(late.clone()).with(early.clone());
        let resolver = TransportResolver::new(Arc::new(connector), Duration::from_secs(1));

        let descriptors = vec![late.descriptor.clone(), early.descriptor.clone()];
        let resolved = resolver.resolve(&descriptors, Duration::from_secs(1)).await.unwrap();

        assert_eq!(resolved.name(), "early");
        assert_eq!(late.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_equal_priority_keeps_list_order() {
        let a = Probed::new("a", 0, true);
        let b = Probed::new("b", 0, true);
        let connector = StaticConnector::new().with(a.clone()).with(b.clone());
        let resolver = TransportResolver::new(Arc::new(connector), Duration::from_secs(1));

        let descriptors = vec![b.descriptor.clone(), a.descriptor.clone()];
        let resolved = resolver.resolve(&descriptors, Duration::from_secs(1)).await.unwrap();
        assert_eq!(resolved.name(), "b");
    }

    #[tokio::test]
    async fn test_unknown_descriptor_counts_as_failed_probe() {
        let ok = Probed::new("ok", 5, true);
        let connector = StaticConnector::new().with(ok.clone());
        let resolver = TransportResolver::new(Arc::new(connector), Duration::from_secs(1));

        let descriptors = vec![
            ChannelDescriptor::new("unregistered", ChannelKind::HttpApi, 1),
            ok.descriptor.clone(),
        ];
        let resolved = resolver.resolve(&descriptors, Duration::from_secs(1)).await.unwrap();

        assert_eq!(resolved.name(), "ok");
        assert_eq!(resolved.skipped().len(), 1);
        assert_eq!(resolved.skipped()[0].channel, "unregistered");
    }

    #[tokio::test]
    async fn test_empty_list_without_sink_is_unavailable() {
        let resolver =
            TransportResolver::new(Arc::new(StaticConnector::new()), Duration::from_secs(1))
                .without_sink();

        let result = resolver.resolve(&[], Duration::from_secs(1)).await;
        assert!(matches!(result, Err(DeliveryError::ChannelUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_sink_descriptors_are_not_probed() {
        let resolver =
            TransportResolver::new(Arc::new(StaticConnector::new()), Duration::from_secs(1));
        let descriptors = vec![ChannelDescriptor::new("Mock", ChannelKind::Sink, 0)];

        let resolved = resolver.resolve(&descriptors, Duration::from_secs(1)).await.unwrap();
        assert!(resolved.is_fallback());
        assert!(resolved.skipped().is_empty());
        assert_eq!(resolved.kind(), ChannelKind::Sink);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_cache_expires() {
        let ok = Probed::new("ok", 0, true);
        let connector = StaticConnector::new().with(ok.clone());
        let resolver = TransportResolver::new(Arc::new(connector), Duration::from_secs(1));
        let group = ChannelGroup::new("email", vec![ok.descriptor.clone()])
            .with_ttl(Duration::from_secs(60));

        resolver.acquire(&group).await.unwrap();
        resolver.acquire(&group).await.unwrap();
        assert_eq!(ok.probes.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        resolver.acquire(&group).await.unwrap();
        assert_eq!(ok.probes.load(Ordering::SeqCst), 2);

        group.invalidate().await;
        resolver.acquire(&group).await.unwrap();
        assert_eq!(ok.probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_sink_fallback_is_not_cached() {
        let down = Probed::new("down", 0, false);
        let connector = StaticConnector::new().with(down.clone());
        let resolver = TransportResolver::new(Arc::new(connector), Duration::from_secs(1));
        let group = ChannelGroup::new("email", vec![down.descriptor.clone()]);

        assert!(resolver.acquire(&group).await.unwrap().is_fallback());
        assert!(resolver.acquire(&group).await.unwrap().is_fallback());
        assert_eq!(down.probes.load(Ordering::SeqCst), 2);
    }
}
