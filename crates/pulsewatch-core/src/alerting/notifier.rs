//! Notification delivery over SMTP, Slack and webhooks

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::DispatchConfig;
use crate::error::{Error, Result};
use crate::models::{MailNotification, Notification, SlackNotification, WebhookNotification};

const SMTPS_PORT: u16 = 465;

/// Executes notifications against their channels
pub struct NotificationSender {
    client: Client,
    slack_api_url: String,
    accept_invalid_certs: bool,
}

impl NotificationSender {
    /// Create a new notification sender
    pub fn new(config: &DispatchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            slack_api_url: config.slack_api_url.clone(),
            accept_invalid_certs: config.smtp_accept_invalid_certs,
        })
    }

    /// Deliver a single notification
    pub async fn execute(&self, notification: &Notification) -> std::result::Result<(), DeliveryError> {
        match notification {
            Notification::Mail(mail) => self.send_mail(mail).await,
            Notification::Slack(slack) => self.send_slack(slack).await,
            Notification::Webhook(webhook) => self.send_webhook(webhook).await,
        }
    }

    /// Send mail through the configured relay
    async fn send_mail(&self, mail: &MailNotification) -> std::result::Result<(), DeliveryError> {
        let mut builder = Message::builder()
            .from(parse_mailbox(&mail.from)?)
            .subject(mail.subject.as_str())
            .header(ContentType::TEXT_HTML);

        let mut recipients = 0;
        for to in mail.to.split(',').map(str::trim).filter(|to| !to.is_empty()) {
            builder = builder.to(parse_mailbox(to)?);
            recipients += 1;
        }
        if recipients == 0 {
            return Err(DeliveryError::Smtp("mail has no recipients".to_string()));
        }

        let message = builder
            .body(mail.body.clone())
            .map_err(|e| DeliveryError::Smtp(format!("build message: {e}")))?;

        let tls_parameters = TlsParameters::builder(mail.host.clone())
            .dangerous_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| DeliveryError::Smtp(format!("tls parameters: {e}")))?;
        let tls = tls_mode(mail.port, tls_parameters);

        let mut transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(mail.host.as_str())
            .port(mail.port)
            .tls(tls);
        if !mail.username.is_empty() {
            transport = transport.credentials(Credentials::new(
                mail.username.clone(),
                mail.password.clone(),
            ));
        }

        transport
            .build()
            .send(message)
            .await
            .map_err(|e| DeliveryError::Smtp(e.to_string()))?;

        info!(host = %mail.host, to = %mail.to, "Mail notification sent");
        Ok(())
    }

    /// Post a message through the Slack chat API
    async fn send_slack(&self, slack: &SlackNotification) -> std::result::Result<(), DeliveryError> {
        let payload = SlackPayload {
            channel: &slack.channel,
            text: &slack.text,
        };

        let response = self
            .client
            .post(&self.slack_api_url)
            .header(AUTHORIZATION, bearer(&slack.authorization))
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Http(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(DeliveryError::Http(format!("Slack returned {status}: {body}")));
        }

        // Slack reports most failures as 200 with `ok: false`
        if let Ok(reply) = serde_json::from_str::<SlackReply>(&body) {
            if !reply.ok {
                return Err(DeliveryError::Rejected(format!(
                    "Slack rejected message: {}",
                    reply.error.unwrap_or_else(|| "unknown error".to_string())
                )));
            }
        }

        info!(channel = %slack.channel, "Slack notification sent");
        Ok(())
    }

    /// Post a message to an arbitrary URL
    async fn send_webhook(&self, webhook: &WebhookNotification) -> std::result::Result<(), DeliveryError> {
        let content_type = if serde_json::from_str::<serde_json::Value>(&webhook.message).is_ok() {
            "application/json"
        } else {
            "text/plain"
        };

        let response = self
            .client
            .post(&webhook.url)
            .header(CONTENT_TYPE, content_type)
            .body(webhook.message.clone())
            .send()
            .await
            .map_err(|e| DeliveryError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!(url = %webhook.url, "Webhook notification sent");
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %webhook.url, status = %status, body = %body, "Webhook returned non-success status");
        }
        Ok(())
    }
}

/// Implicit TLS on the SMTPS port, STARTTLS when offered everywhere else
fn tls_mode(port: u16, parameters: TlsParameters) -> Tls {
    if port == SMTPS_PORT {
        Tls::Wrapper(parameters)
    } else {
        Tls::Opportunistic(parameters)
    }
}

fn parse_mailbox(address: &str) -> std::result::Result<Mailbox, DeliveryError> {
    address
        .parse()
        .map_err(|e| DeliveryError::Smtp(format!("invalid address {address}: {e}")))
}

fn bearer(token: &str) -> String {
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {token}")
    }
}

/// Delivery errors
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The HTTP request failed or returned an error status
    #[error("HTTP error: {0}")]
    Http(String),

    /// Building or sending the mail failed
    #[error("SMTP error: {0}")]
    Smtp(String),

    /// The channel accepted the request but refused the message
    #[error("Rejected: {0}")]
    Rejected(String),
}

impl From<DeliveryError> for Error {
    fn from(err: DeliveryError) -> Self {
        Self::Delivery(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct SlackPayload<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SlackReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}
