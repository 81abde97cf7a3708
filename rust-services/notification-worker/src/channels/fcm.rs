//! Firebase Cloud Messaging channel
//!
//! Talks to the FCM HTTP v1 API with an OAuth2 access token obtained through
//! the service-account JWT grant. One channel type serves the single-device,
//! multicast and topic descriptors; topic membership goes through the
//! instance-id `batchAdd`/`batchRemove` endpoints.
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


use super::{map_http_error, map_http_status, parse_params};
use async_trait::async_trait;
use chrono::Utc;
use delivery_core::{Channel, ChannelError, ProviderResponse, RecipientResult, SubscriptionResponse};
use futures::stream::{self, StreamExt};
use herald_types::{ChannelDescriptor, ChannelKind, Message, TargetSpec};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const MULTICAST_CONCURRENCY: usize = 16;
const IID_BATCH_LIMIT: usize = 1000;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Metadata keys that shape the notification instead of travelling as data
const PRESENTATION_KEYS: [&str; 4] = ["sound", "badge", "image_url", "html"];

/// Service-account credentials plus optional endpoint overrides
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default = "default_fcm_url")]
    pub fcm_url: String,
    #[serde(default = "default_iid_url")]
    pub iid_url: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_fcm_url() -> String {
    "https://fcm.googleapis.com/v1".to_string()
}

fn default_iid_url() -> String {
    "https://iid.googleapis.com/iid/v1".to_string()
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    TOKEN_LIFETIME_SECS as u64
}

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Deserialize)]
struct IidResponse {
    #[serde(default)]
    results: Vec<IidResult>,
}

#[derive(Deserialize)]
struct IidResult {
    error: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Access tokens keyed by service-account email, shared across channels
#[derive(Default)]
pub struct AccessTokenCache {
    tokens: Mutex<HashMap<String, CachedToken>>,
}

impl AccessTokenCache {
    async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<String, ChannelError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(String, Duration), ChannelError>>,
    {
        // Held across the fetch so concurrent callers wait for one grant
        let mut tokens = self.tokens.lock().await;
        if let Some(token) = tokens.get(key) {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let (value, lifetime) = fetch().await?;
        tokens.insert(
            key.to_string(),
            CachedToken {
                value: value.clone(),
                expires_at: Instant::now() + lifetime,
            },
        );
        Ok(value)
    }
}

pub struct FcmChannel {
    descriptor: ChannelDescriptor,
    account: ServiceAccount,
    http: reqwest::Client,
    tokens: Arc<AccessTokenCache>,
}

impl FcmChannel {
    pub fn from_descriptor(
        descriptor: &ChannelDescriptor,
        http: reqwest::Client,
        tokens: Arc<AccessTokenCache>,
    ) -> Result<Self, ChannelError> {
        let account: ServiceAccount = parse_params(descriptor)?;
        Ok(Self {
            descriptor: descriptor.clone(),
            account,
            http,
            tokens,
        })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/projects/{}/messages:send",
            self.account.fcm_url.trim_end_matches('/'),
            self.account.project_id
        )
    }

    async fn access_token(&self) -> Result<String, ChannelError> {
        self.tokens
            .get_or_fetch(&self.account.client_email, || self.fetch_access_token())
            .await
    }

    async fn fetch_access_token(&self) -> Result<(String, Duration), ChannelError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.account.client_email,
            scope: FCM_SCOPE,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.account.private_key_id.clone();
        let key = EncodingKey::from_rsa_pem(self.account.private_key.as_bytes())
            .map_err(|e| ChannelError::Auth(format!("invalid service account key: {}", e)))?;
        let assertion = jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| ChannelError::Auth(format!("could not sign token request: {}", e)))?;

        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| map_http_error(e, REQUEST_TIMEOUT))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::Auth(format!(
                "token grant refused: {} {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Provider(format!("unreadable token response: {}", e)))?;

        debug!(client_email = %self.account.client_email, "Obtained FCM access token");
        Ok((token.access_token, Duration::from_secs(token.expires_in)))
    }

    /// One `messages:send` call addressed by `field` (`token` or `topic`)
    async fn send_one(
        &self,
        access_token: &str,
        message: &Message,
        field: &str,
        address: &str,
    ) -> Result<String, ChannelError> {
        let payload = build_payload(message, field, address);

        let response = self
            .http
            .post(self.send_url())
            .bearer_auth(access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_http_error(e, REQUEST_TIMEOUT))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_status(status, &error_summary(&body)));
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Provider(format!("unreadable send response: {}", e)))?;
        Ok(sent.name)
    }

    async fn send_multicast(
        &self,
        access_token: &str,
        message: &Message,
        tokens: &[String],
    ) -> Result<ProviderResponse, ChannelError> {
        let attempts: Vec<(String, Result<String, ChannelError>)> = stream::iter(tokens.iter().cloned())
            .map(|token: String| async move {
                let result = self.send_one(access_token, message, "token", &token).await;
                (token, result)
            })
            .buffer_unordered(MULTICAST_CONCURRENCY)
            .collect()
            .await;

        // A transport problem on every token is a channel failure, not a batch result
        if attempts.iter().all(|(_, r)| matches!(r, Err(e) if e.is_transport())) {
            if let Some((_, Err(e))) = attempts.into_iter().next() {
                return Err(e);
            }
            return Err(ChannelError::Provider("empty multicast".to_string()));
        }

        let results = attempts
            .into_iter()
            .map(|(token, result)| match result {
                Ok(name) => RecipientResult::delivered(token, Some(name)),
                Err(e) => RecipientResult::failed(token, e.to_string()),
            })
            .collect();
        Ok(ProviderResponse::Batch(results))
    }

    async fn manage_topic(
        &self,
        operation: &str,
        identifiers: &[String],
        topic: &str,
    ) -> Result<SubscriptionResponse, ChannelError> {
        let access_token = self.access_token().await?;
        let topic = topic.trim_start_matches("/topics/");
        let url = format!("{}:{}", self.account.iid_url.trim_end_matches('/'), operation);

        let mut results = Vec::with_capacity(identifiers.len());
        for chunk in identifiers.chunks(IID_BATCH_LIMIT) {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&access_token)
                .header("access_token_auth", "true")
                .json(&json!({
                    "to": format!("/topics/{}", topic),
                    "registration_tokens": chunk,
                }))
                .send()
                .await
                .map_err(|e| map_http_error(e, REQUEST_TIMEOUT))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(map_http_status(status, &error_summary(&body)));
            }

            let parsed: IidResponse = response
                .json()
                .await
                .map_err(|e| ChannelError::Provider(format!("unreadable {} response: {}", operation, e)))?;

            for (index, identifier) in chunk.iter().enumerate() {
                let result = match parsed.results.get(index).and_then(|r| r.error.clone()) {
                    Some(error) => RecipientResult::failed(identifier.clone(), error),
                    None => RecipientResult::delivered(identifier.clone(), None),
                };
                results.push(result);
            }
        }

        Ok(SubscriptionResponse {
            results,
            changed: None,
        })
    }
}

#[async_trait]
impl Channel for FcmChannel {
    fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    async fn probe(&self) -> Result<(), ChannelError> {
        self.access_token().await.map(|_| ())
    }

    async fn send(&self, message: &Message) -> Result<ProviderResponse, ChannelError> {
        let access_token = self.access_token().await?;

        let response = match (self.descriptor.kind, &message.target) {
            (ChannelKind::PushSingle, TargetSpec::Single(token)) => {
                let name = self.send_one(&access_token, message, "token", token).await?;
                ProviderResponse::Accepted {
                    message_id: Some(name),
                    recipients: 1,
                }
            }
            (ChannelKind::PushMulticast, TargetSpec::Multi(tokens)) => {
                self.send_multicast(&access_token, message, tokens).await?
            }
            (ChannelKind::PushTopic, TargetSpec::Topic(topic)) => {
                let topic = topic.trim_start_matches("/topics/");
                let name = self.send_one(&access_token, message, "topic", topic).await?;
                ProviderResponse::Broadcast {
                    message_id: Some(name),
                }
            }
            (kind, target) => {
                return Err(ChannelError::Unsupported(format!(
                    "{} cannot deliver a {} target",
                    kind,
                    target.shape()
                )))
            }
        };

        match &response {
            ProviderResponse::Batch(results) => {
                let failed = results.iter().filter(|r| !r.is_success()).count();
                if failed > 0 {
                    warn!(channel = %self.descriptor.name, total = results.len(), failed, "Multicast push had failures");
                }
            }
            _ => info!(channel = %self.descriptor.name, target = message.target.shape(), "Push notification sent"),
        }
        Ok(response)
    }

    async fn subscribe(
        &self,
        identifiers: &[String],
        topic: &str,
    ) -> Result<SubscriptionResponse, ChannelError> {
        self.manage_topic("batchAdd", identifiers, topic).await
    }

    async fn unsubscribe(
        &self,
        identifiers: &[String],
        topic: &str,
    ) -> Result<SubscriptionResponse, ChannelError> {
        self.manage_topic("batchRemove", identifiers, topic).await
    }
}

/// FCM v1 message body addressed by `field`
pub fn build_payload(message: &Message, field: &str, address: &str) -> Value {
    let metadata = &message.metadata;
    let sound = metadata.get("sound").map(String::as_str).unwrap_or("default");
    let badge: u32 = metadata
        .get("badge")
        .and_then(|b| b.parse().ok())
        .unwrap_or(1);

    let mut data: BTreeMap<String, String> = metadata
        .iter()
        .filter(|(key, _)| !PRESENTATION_KEYS.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    data.insert("timestamp".to_string(), Utc::now().to_rfc3339());
    data.entry("type".to_string())
        .or_insert_with(|| "general".to_string());

    let mut notification = json!({
        "title": message.title,
        "body": message.body,
    });
    if let Some(image) = metadata.get("image_url") {
        notification["image"] = json!(image);
    }

    let mut body = json!({
        "notification": notification,
        "data": data,
        "android": {
            "priority": "high",
            "notification": { "sound": sound },
        },
        "apns": {
            "payload": {
                "aps": {
                    "alert": { "title": message.title, "body": message.body },
                    "sound": sound,
                    "badge": badge,
                    "content-available": 1,
                }
            }
        },
    });
    body[field] = json!(address);

    json!({ "message": body })
}

/// `{"error": {"status": "UNREGISTERED", "message": "..."}}` to `UNREGISTERED: ...`
fn error_summary(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            let error = v.get("error")?;
            let status = error.get("status").and_then(Value::as_str).unwrap_or("ERROR");
            let message = error.get("message").and_then(Value::as_str).unwrap_or("");
            Some(format!("{}: {}", status, message))
        })
        .unwrap_or_else(|| body.to_string())
}
