//! Channel descriptors
//!
//! A descriptor names one transport configuration. Descriptors are built at
//! startup from configuration and never change afterwards.
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

use crate::message::TargetSpec;

/// Transport family of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Smtp,
    HttpApi,
    PushSingle,
    PushMulticast,
    PushTopic,
    Sink,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Smtp => "smtp",
            ChannelKind::HttpApi => "http_api",
            ChannelKind::PushSingle => "push_single",
            ChannelKind::PushMulticast => "push_multicast",
            ChannelKind::PushTopic => "push_topic",
            ChannelKind::Sink => "sink",
        }
    }

    /// Whether a channel of this kind can deliver to the given target shape
    pub fn accepts(&self, target: &TargetSpec) -> bool {
        match (self, target) {
            (ChannelKind::Sink, _) => true,
            (ChannelKind::Smtp | ChannelKind::HttpApi, TargetSpec::Single(_) | TargetSpec::Multi(_)) => true,
            (ChannelKind::PushSingle, TargetSpec::Single(_)) => true,
            (ChannelKind::PushMulticast, TargetSpec::Multi(_)) => true,
            (ChannelKind::PushTopic, TargetSpec::Topic(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named, prioritised transport configuration.
///
/// `params` carries provider connection data (hosts, credentials, API keys).
/// The delivery core passes it through untouched; only the provider glue
/// that builds a channel from the descriptor interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    pub kind: ChannelKind,
    /// Lower values are tried first
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ChannelDescriptor {
    pub fn new(name: impl Into<String>, kind: ChannelKind, priority: i32) -> Self {
        Self {
            name: name.into(),
            kind,
            priority,
            params: serde_json::Value::Null,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}
