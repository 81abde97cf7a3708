//! Brevo transactional email channel
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
use delivery_core::{Channel, ChannelError, ProviderResponse};
use herald_types::{ChannelDescriptor, Message, TargetSpec};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

const SEND_PATH: &str = "/smtp/email";

#[derive(Debug, Clone, Deserialize)]
pub struct BrevoParams {
    pub api_url: String,
    pub api_key: String,
    pub sender_email: Option<String>,
    pub sender_name: Option<String>,
    /// Authenticated endpoint used to probe; derived from `api_url` if absent
    pub probe_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    message_id: Option<String>,
}

pub struct BrevoChannel {
    descriptor: ChannelDescriptor,
    params: BrevoParams,
    sender_email: String,
    http: reqwest::Client,
}

impl BrevoChannel {
    pub fn from_descriptor(
        descriptor: &ChannelDescriptor,
        http: reqwest::Client,
    ) -> Result<Self, ChannelError> {
        let params: BrevoParams = parse_params(descriptor)?;
        let sender_email = params.sender_email.clone().ok_or_else(|| {
            ChannelError::InvalidParams(format!("{}: sender_email is required", descriptor.name))
        })?;

        Ok(Self {
            descriptor: descriptor.clone(),
            params,
            sender_email,
            http,
        })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.params.timeout_secs)
    }

    /// `https://api.brevo.com/v3/smtp/email` probes `https://api.brevo.com/v3/account`
    fn probe_url(&self) -> String {
        if let Some(url) = &self.params.probe_url {
            return url.clone();
        }
        let base = self
            .params
            .api_url
            .trim_end_matches('/')
            .trim_end_matches(SEND_PATH);
        format!("{}/account", base)
    }

    fn request_body(&self, message: &Message) -> Result<serde_json::Value, ChannelError> {
        let to: Vec<serde_json::Value> = match &message.target {
            TargetSpec::Topic(topic) => {
                return Err(ChannelError::Unsupported(format!(
                    "Brevo cannot broadcast to topic '{}'",
                    topic
                )))
            }
            target => target
                .identifiers()
                .into_iter()
                .map(|email| json!({ "email": email }))
                .collect(),
        };

        let mut sender = json!({ "email": self.sender_email });
        if let Some(name) = &self.params.sender_name {
            sender["name"] = json!(name);
        }

        let html = message
            .metadata
            .get("html")
            .cloned()
            .unwrap_or_else(|| message.body.clone());

        Ok(json!({
            "sender": sender,
            "to": to,
            "subject": message.title,
            "htmlContent": html,
            "textContent": message.body,
        }))
    }
}

#[async_trait]
impl Channel for BrevoChannel {
    fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    async fn probe(&self) -> Result<(), ChannelError> {
        let response = self
            .http
            .get(self.probe_url())
            .header("api-key", &self.params.api_key)
            .header("accept", "application/json")
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| map_http_error(e, self.timeout()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(map_http_status(status, &body))
        }
    }

    async fn send(&self, message: &Message) -> Result<ProviderResponse, ChannelError> {
        let body = self.request_body(message)?;
        let recipients = message.target.recipient_count().unwrap_or(0);

        let response = self
            .http
            .post(&self.params.api_url)
            .header("api-key", &self.params.api_key)
            .header("accept", "application/json")
            .timeout(self.timeout())
            .json(&body)
            .send()
            .await
            .map_err(|e| map_http_error(e, self.timeout()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(map_http_status(status, &text));
        }

        // Brevo answers 201 with {"messageId": "<...>"}; tolerate an empty body
        let parsed: Option<SendResponse> = response.json().await.ok();
        let message_id = parsed
            .and_then(|r| r.message_id)
            .unwrap_or_else(|| format!("brevo-{}", Utc::now().timestamp_millis()));

        info!(
            channel = %self.descriptor.name,
            message_id = %message_id,
            recipients,
            "Email sent through HTTP API"
        );
        Ok(ProviderResponse::Accepted {
            message_id: Some(message_id),
            recipients,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use herald_types::ChannelKind;
    use std::sync::{Arc, Mutex};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/v3", addr)
    }

    fn channel(base: &str, api_key: &str) -> BrevoChannel {
        let descriptor = ChannelDescriptor::new("HTTP API", ChannelKind::HttpApi, 100).with_params(json!({
            "api_url": format!("{}/smtp/email", base),
            "api_key": api_key,
            "sender_email": "noreply@example.com",
            "sender_name": "Herald",
        }));
        BrevoChannel::from_descriptor(&descriptor, reqwest::Client::new()).unwrap()
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("api-key").and_then(|v| v.to_str().ok()) == Some("good-key")
    }

    fn mock_router(captured: Arc<Mutex<Option<serde_json::Value>>>) -> Router {
        Router::new()
            .route(
                "/v3/account",
                get(|headers: HeaderMap| async move {
                    if authorized(&headers) {
                        (StatusCode::OK, Json(json!({"email": "owner@example.com"})))
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({"code": "unauthorized"})))
                    }
                }),
            )
            .route(
                "/v3/smtp/email",
                post(move |headers: HeaderMap, Json(body): Json<serde_json::Value>| {
                    let captured = captured.clone();
                    async move {
                        if !authorized(&headers) {
                            return (StatusCode::UNAUTHORIZED, Json(json!({"code": "unauthorized"})));
                        }
                        *captured.lock().unwrap() = Some(body);
                        (
                            StatusCode::CREATED,
                            Json(json!({"messageId": "<202501011200.1@smtp-relay.mailin.fr>"})),
                        )
                    }
                }),
            )
    }

    #[test]
    fn test_probe_url_derivation() {
        let brevo = channel("https://api.brevo.com/v3", "k");
        assert_eq!(brevo.probe_url(), "https://api.brevo.com/v3/account");
    }

    #[test]
    fn test_request_body() {
        let brevo = channel("https://api.brevo.com/v3", "k");
        let message = Message::new(TargetSpec::multi(["a@x.com", "b@x.com"]), "Invitation", "Welcome")
            .with_metadata("html", "<p>Welcome</p>");

        let body = brevo.request_body(&message).unwrap();
        assert_eq!(body["sender"]["email"], "noreply@example.com");
        assert_eq!(body["sender"]["name"], "Herald");
        assert_eq!(body["to"][1]["email"], "b@x.com");
        assert_eq!(body["subject"], "Invitation");
        assert_eq!(body["htmlContent"], "<p>Welcome</p>");
        assert_eq!(body["textContent"], "Welcome");
    }

    #[tokio::test]
    async fn test_send_against_mock_api() {
        let captured = Arc::new(Mutex::new(None));
        let base = serve(mock_router(captured.clone())).await;
        let brevo = channel(&base, "good-key");

        brevo.probe().await.unwrap();

        let message = Message::new(TargetSpec::Single("a@x.com".to_string()), "Hi", "Hello");
        let response = brevo.send(&message).await.unwrap();

        assert_eq!(
            response,
            ProviderResponse::Accepted {
                message_id: Some("<202501011200.1@smtp-relay.mailin.fr>".to_string()),
                recipients: 1,
            }
        );
        let body = captured.lock().unwrap().clone().unwrap();
        assert_eq!(body["to"][0]["email"], "a@x.com");
    }

    #[tokio::test]
    async fn test_bad_key_is_auth_error() {
        let base = serve(mock_router(Arc::new(Mutex::new(None)))).await;
        let brevo = channel(&base, "wrong-key");

        assert!(matches!(brevo.probe().await, Err(ChannelError::Auth(_))));

        let message = Message::new(TargetSpec::Single("a@x.com".to_string()), "Hi", "Hello");
        assert!(matches!(brevo.send(&message).await, Err(ChannelError::Auth(_))));
    }
}
