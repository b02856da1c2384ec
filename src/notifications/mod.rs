//! Outbound customer email: the mail transport seam, templates and the
//! dispatcher that runs delivery inline or on a background queue.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;

pub mod dispatcher;
pub mod templates;

pub use dispatcher::{
    NotificationDispatcher, NotificationJob, NotificationOutcome, NotificationStatus,
};
pub use templates::EmailTemplate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachment: Option<Attachment>,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Mail transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Mail relay rejected the message ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invoice rendering failed: {0}")]
    Invoice(#[from] crate::invoices::InvoiceError),

    #[error("Notification queue is full")]
    QueueFull,

    #[error("Notification queue is closed")]
    QueueClosed,
}

/// Sends a single email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError>;
}

#[derive(Serialize)]
struct RelayAttachment<'a> {
    filename: &'a str,
    content_type: &'a str,
    /// base64 encoded bytes
    content: String,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
    attachments: Vec<RelayAttachment<'a>>,
}

/// Posts messages as JSON to an HTTP mail relay
#[derive(Clone, Debug)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        from: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
            from: from.into(),
        })
    }

    /// `None` when no relay URL is configured.
    pub fn from_app_config(cfg: &AppConfig) -> Result<Option<Self>, NotificationError> {
        match cfg.mail_relay_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Self::new(
                url,
                cfg.mail_relay_token.clone(),
                cfg.mail_from.clone(),
                Duration::from_secs(cfg.payment_timeout_secs),
            )
            .map(Some),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    #[instrument(skip(self, message), fields(subject = %message.subject))]
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        let payload = RelayMessage {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            html: &message.html_body,
            attachments: message
                .attachment
                .iter()
                .map(|attachment| RelayAttachment {
                    filename: &attachment.filename,
                    content_type: &attachment.content_type,
                    content: STANDARD.encode(&attachment.bytes),
                })
                .collect(),
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Mail relay rejected message");
            return Err(NotificationError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}

/// Writes messages to the log instead of delivering them
#[derive(Clone, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            attachment = message.attachment.as_ref().map(|a| a.filename.as_str()),
            "Email delivery skipped: no mail relay configured"
        );
        Ok(())
    }
}
