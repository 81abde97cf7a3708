//! SMTP channel
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


use super::parse_params;
use async_trait::async_trait;
use delivery_core::{Channel, ChannelError, ProviderResponse};
use herald_types::{ChannelDescriptor, Message, TargetSpec};
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS
    #[default]
    Starttls,
    /// Implicit TLS (port 465)
    Tls,
    Plain,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpParams {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub security: SmtpSecurity,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    15
}

pub struct SmtpChannel {
    descriptor: ChannelDescriptor,
    from: Mailbox,
    timeout: Duration,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpChannel {
    pub fn from_descriptor(descriptor: &ChannelDescriptor) -> Result<Self, ChannelError> {
        let params: SmtpParams = parse_params(descriptor)?;

        let sender = params
            .from
            .as_deref()
            .or(params.username.as_deref())
            .ok_or_else(|| {
                ChannelError::InvalidParams(format!("{}: no sender address", descriptor.name))
            })?;
        let from: Mailbox = sender.parse().map_err(|e| {
            ChannelError::InvalidParams(format!("{}: invalid sender address: {}", descriptor.name, e))
        })?;

        let timeout = Duration::from_secs(params.timeout_secs);
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(params.host.as_str())
            .port(params.port)
            .timeout(Some(timeout));

        builder = match params.security {
            SmtpSecurity::Plain => builder.tls(Tls::None),
            security => {
                let tls = TlsParameters::new(params.host.clone()).map_err(|e| {
                    ChannelError::InvalidParams(format!("{}: TLS setup failed: {}", descriptor.name, e))
                })?;
                if security == SmtpSecurity::Tls {
                    builder.tls(Tls::Wrapper(tls))
                } else {
                    builder.tls(Tls::Required(tls))
                }
            }
        };

        if let (Some(username), Some(password)) = (params.username, params.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            descriptor: descriptor.clone(),
            from,
            timeout,
            transport: builder.build(),
        })
    }

    fn build_email(&self, message: &Message) -> Result<(lettre::Message, String), ChannelError> {
        let recipients: Vec<&str> = match &message.target {
            TargetSpec::Single(_) | TargetSpec::Multi(_) => message.target.identifiers(),
            TargetSpec::Topic(topic) => {
                return Err(ChannelError::Unsupported(format!(
                    "SMTP cannot broadcast to topic '{}'",
                    topic
                )))
            }
        };

        let domain = self
            .from
            .email
            .domain()
            .to_string();
        let message_id = format!("<{}@{}>", Uuid::new_v4(), domain);

        let mut builder = lettre::Message::builder()
            .from(self.from.clone())
            .subject(message.title.as_str())
            .message_id(Some(message_id.clone()));
        for recipient in recipients {
            let mailbox: Mailbox = recipient.parse().map_err(|e| {
                ChannelError::Rejected(format!("invalid recipient address '{}': {}", recipient, e))
            })?;
            builder = builder.to(mailbox);
        }

        let email = match message.metadata.get("html") {
            Some(html) => builder.multipart(MultiPart::alternative_plain_html(
                message.body.clone(),
                html.clone(),
            )),
            None => builder
                .header(ContentType::TEXT_PLAIN)
                .body(message.body.clone()),
        }
        .map_err(|e| ChannelError::Rejected(format!("could not build email: {}", e)))?;

        Ok((email, message_id))
    }

    fn map_error(&self, error: lettre::transport::smtp::Error) -> ChannelError {
        if error.is_timeout() {
            return ChannelError::Timeout(self.timeout);
        }
        match error.status() {
            Some(code) if code.to_string().starts_with("53") => ChannelError::Auth(error.to_string()),
            Some(_) if error.is_permanent() => ChannelError::Rejected(error.to_string()),
            Some(_) => ChannelError::Provider(error.to_string()),
            None => ChannelError::Connection(error.to_string()),
        }
    }
}

#[async_trait]
impl Channel for SmtpChannel {
    fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    async fn probe(&self) -> Result<(), ChannelError> {
        debug!(channel = %self.descriptor.name, "Testing SMTP connection");
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ChannelError::Connection(
                "server refused the connection test".to_string(),
            )),
            Err(e) => Err(self.map_error(e)),
        }
    }

    async fn send(&self, message: &Message) -> Result<ProviderResponse, ChannelError> {
        let (email, message_id) = self.build_email(message)?;
        let recipients = email.envelope().to().len() as u32;

        self.transport
            .send(email)
            .await
            .map_err(|e| self.map_error(e))?;

        info!(
            channel = %self.descriptor.name,
            message_id = %message_id,
            recipients,
            "Email sent over SMTP"
        );
        Ok(ProviderResponse::Accepted {
            message_id: Some(message_id),
            recipients,
        })
    }
}
