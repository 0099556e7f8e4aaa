//! Notification descriptors

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Discriminant of a [`Notification`], stored next to its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// SMTP mail
    Mail,
    /// Generic HTTP webhook
    Webhook,
    /// Slack chat message
    Slack,
}

impl NotificationKind {
    /// Tag used in stored envelopes
    pub fn tag(self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Webhook => "webhook",
            Self::Slack => "slack",
        }
    }

    /// Resolve an envelope tag
    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "mail" => Ok(Self::Mail),
            "webhook" => Ok(Self::Webhook),
            "slack" => Ok(Self::Slack),
            other => Err(Error::unsupported_type(other)),
        }
    }

    /// Name used in the registration API (`?type=`)
    pub fn api_name(self) -> &'static str {
        match self {
            Self::Mail => "email",
            Self::Webhook => "webhook",
            Self::Slack => "slack",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = Error;

    /// Parse a registration type name. Accepts `email` and `mail` for SMTP.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "email" | "mail" => Ok(Self::Mail),
            "webhook" => Ok(Self::Webhook),
            "slack" => Ok(Self::Slack),
            other => Err(Error::unsupported_type(other)),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Mail sent through an SMTP relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailNotification {
    /// SMTP host
    pub host: String,
    /// SMTP port
    pub port: u16,
    /// SMTP account name
    #[serde(default)]
    pub username: String,
    /// SMTP account password
    #[serde(default)]
    pub password: String,
    /// Sender address
    pub from: String,
    /// Recipient address(es), comma-separated
    pub to: String,
    /// Subject line
    #[serde(default)]
    pub subject: String,
    /// HTML body
    #[serde(default)]
    pub body: String,
}

/// POST to an arbitrary URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookNotification {
    /// Target URL
    pub url: String,
    /// Request body
    #[serde(default)]
    pub message: String,
}

/// Message posted through the Slack chat API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackNotification {
    /// Bot token, with or without the `Bearer ` prefix
    pub authorization: String,
    /// Channel name or ID
    pub channel: String,
    /// Message text
    #[serde(default)]
    pub text: String,
}

/// A typed delivery descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// SMTP mail
    Mail(MailNotification),
    /// HTTP webhook
    Webhook(WebhookNotification),
    /// Slack message
    Slack(SlackNotification),
}

impl Notification {
    /// The discriminant of this notification
    pub fn kind(&self) -> NotificationKind {
        match self {
            Self::Mail(_) => NotificationKind::Mail,
            Self::Webhook(_) => NotificationKind::Webhook,
            Self::Slack(_) => NotificationKind::Slack,
        }
    }

    /// Serialize the variant payload (without discriminant)
    pub fn payload_json(&self) -> Result<Vec<u8>> {
        let bytes = match self {
            Self::Mail(n) => serde_json::to_vec(n)?,
            Self::Webhook(n) => serde_json::to_vec(n)?,
            Self::Slack(n) => serde_json::to_vec(n)?,
        };
        Ok(bytes)
    }

    /// Deserialize a variant payload for a known discriminant
    pub fn from_payload(kind: NotificationKind, payload: &[u8]) -> Result<Self> {
        let decoded = match kind {
            NotificationKind::Mail => serde_json::from_slice(payload).map(Self::Mail),
            NotificationKind::Webhook => serde_json::from_slice(payload).map(Self::Webhook),
            NotificationKind::Slack => serde_json::from_slice(payload).map(Self::Slack),
        };
        decoded.map_err(|e| Error::encoding(format!("invalid {kind} payload: {e}")))
    }

    /// Replace the human-readable text of the notification
    pub fn with_text(mut self, text: &str) -> Self {
        match &mut self {
            Self::Mail(n) => n.body = text.to_string(),
            Self::Webhook(n) => n.message = text.to_string(),
            Self::Slack(n) => n.text = text.to_string(),
        }
        self
    }

    /// Short description for logs, without credentials
    pub fn target(&self) -> String {
        match self {
            Self::Mail(n) => format!("mail to {} via {}:{}", n.to, n.host, n.port),
            Self::Webhook(n) => format!("webhook {}", n.url),
            Self::Slack(n) => format!("slack {}", n.channel),
        }
    }
}
