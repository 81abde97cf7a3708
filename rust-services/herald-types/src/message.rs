//! Delivery messages and target shapes
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

use crate::error::{HeraldError, Result};

/// Who a message is addressed to.
///
/// Email addresses and push device tokens are both plain identifiers; the
/// channel decides how to interpret them. `Multi` is a set: duplicate
/// identifiers are dropped on deserialization and by [`TargetSpec::multi`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "WireTarget")]
pub enum TargetSpec {
    Single(String),
    Multi(Vec<String>),
    Topic(String),
}

/// Target as it appears on the wire, before deduplication
#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum WireTarget {
    Single(String),
    Multi(Vec<String>),
    Topic(String),
}

impl From<WireTarget> for TargetSpec {
    fn from(target: WireTarget) -> Self {
        match target {
            WireTarget::Single(id) => TargetSpec::Single(id),
            WireTarget::Multi(ids) => TargetSpec::multi(ids),
            WireTarget::Topic(name) => TargetSpec::Topic(name),
        }
    }
}

impl TargetSpec {
    /// Build a multi-recipient target, dropping duplicate identifiers
    /// while keeping first-seen order.
    pub fn multi<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for id in identifiers {
            let id = id.into();
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        TargetSpec::Multi(unique)
    }

    /// Individually addressed identifiers. Empty for topics.
    pub fn identifiers(&self) -> Vec<&str> {
        match self {
            TargetSpec::Single(id) => vec![id.as_str()],
            TargetSpec::Multi(ids) => ids.iter().map(String::as_str).collect(),
            TargetSpec::Topic(_) => Vec::new(),
        }
    }

    /// Number of individually addressed recipients, `None` for a topic
    pub fn recipient_count(&self) -> Option<u32> {
        match self {
            TargetSpec::Single(_) => Some(1),
            TargetSpec::Multi(ids) => Some(ids.len() as u32),
            TargetSpec::Topic(_) => None,
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            TargetSpec::Single(_) => "single",
            TargetSpec::Multi(_) => "multi",
            TargetSpec::Topic(_) => "topic",
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            TargetSpec::Single(id) if id.trim().is_empty() => Err(HeraldError::Validation(
                "target identifier must not be empty".to_string(),
            )),
            TargetSpec::Multi(ids) if ids.is_empty() => Err(HeraldError::Validation(
                "multi target must contain at least one identifier".to_string(),
            )),
            TargetSpec::Multi(ids) if ids.iter().any(|id| id.trim().is_empty()) => {
                Err(HeraldError::Validation(
                    "multi target contains an empty identifier".to_string(),
                ))
            }
            TargetSpec::Topic(name) if name.trim().is_empty() => Err(HeraldError::Validation(
                "topic name must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// A normalized outbound message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub target: TargetSpec,
    /// Email subject or push title
    #[serde(alias = "subject")]
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Message {
    pub fn new(target: TargetSpec, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            target,
            title: title.into(),
            body: body.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Structural validation performed before any channel is contacted
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(HeraldError::Validation("title must not be empty".to_string()));
        }
        if self.body.trim().is_empty() {
            return Err(HeraldError::Validation("body must not be empty".to_string()));
        }
        self.target.validate()
    }
}
