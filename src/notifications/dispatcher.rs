use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use super::{Attachment, EmailMessage, EmailTemplate, Mailer, NotificationError};
use crate::config::NotificationMode;
use crate::entities::order;
use crate::invoices::InvoiceRenderer;

/// One email to deliver, optionally with the order's invoice attached.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub recipient: String,
    pub template: EmailTemplate,
    pub invoice_for: Option<order::Model>,
}

impl NotificationJob {
    pub fn new(recipient: impl Into<String>, template: EmailTemplate) -> Self {
        Self {
            recipient: recipient.into(),
            template,
            invoice_for: None,
        }
    }

    pub fn with_invoice(mut self, order: order::Model) -> Self {
        self.invoice_for = Some(order);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Sent,
    Queued,
    Failed,
    Skipped,
}

/// What happened to the email attached to a state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationOutcome {
    pub status: NotificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl NotificationOutcome {
    pub fn sent() -> Self {
        Self {
            status: NotificationStatus::Sent,
            detail: None,
        }
    }

    pub fn queued() -> Self {
        Self {
            status: NotificationStatus::Queued,
            detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: NotificationStatus::Failed,
            detail: Some(detail.into()),
        }
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        Self {
            status: NotificationStatus::Skipped,
            detail: Some(detail.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status == NotificationStatus::Failed
    }
}

struct Delivery {
    mailer: Arc<dyn Mailer>,
    renderer: Arc<dyn InvoiceRenderer>,
}

impl Delivery {
    async fn deliver(&self, job: NotificationJob) -> Result<(), NotificationError> {
        let attachment = match &job.invoice_for {
            Some(order) => {
                let invoice = self.renderer.render(order).await?;
                Some(Attachment {
                    filename: invoice.filename,
                    content_type: invoice.content_type,
                    bytes: invoice.bytes,
                })
            }
            None => None,
        };

        self.mailer
            .send(EmailMessage {
                to: job.recipient,
                subject: job.template.subject,
                html_body: job.template.html_body,
                attachment,
            })
            .await
    }
}

/// Renders invoices and sends customer email, either awaiting delivery or
/// handing it to a bounded background queue.
#[derive(Clone)]
pub struct NotificationDispatcher {
    delivery: Arc<Delivery>,
    queue: Option<mpsc::Sender<NotificationJob>>,
}

impl NotificationDispatcher {
    pub fn inline(mailer: Arc<dyn Mailer>, renderer: Arc<dyn InvoiceRenderer>) -> Self {
        Self {
            delivery: Arc::new(Delivery { mailer, renderer }),
            queue: None,
        }
    }

    /// Spawns the queue worker; it stops once every dispatcher clone is dropped.
    pub fn queued(
        mailer: Arc<dyn Mailer>,
        renderer: Arc<dyn InvoiceRenderer>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let delivery = Arc::new(Delivery { mailer, renderer });
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(process_notifications(rx, delivery.clone()));
        (
            Self {
                delivery,
                queue: Some(tx),
            },
            worker,
        )
    }

    pub fn for_mode(
        mode: NotificationMode,
        capacity: usize,
        mailer: Arc<dyn Mailer>,
        renderer: Arc<dyn InvoiceRenderer>,
    ) -> (Self, Option<JoinHandle<()>>) {
        match mode {
            NotificationMode::Inline => (Self::inline(mailer, renderer), None),
            NotificationMode::Queued => {
                let (dispatcher, worker) = Self::queued(mailer, renderer, capacity);
                (dispatcher, Some(worker))
            }
        }
    }

    /// Never fails: delivery problems are logged and reported in the outcome.
    #[instrument(skip(self, job), fields(subject = %job.template.subject))]
    pub async fn dispatch(&self, job: NotificationJob) -> NotificationOutcome {
        if job.recipient.trim().is_empty() {
            warn!("No recipient address, email not sent");
            return NotificationOutcome::skipped("no recipient address");
        }

        match &self.queue {
            Some(queue) => match queue.try_send(job) {
                Ok(()) => NotificationOutcome::queued(),
                Err(TrySendError::Full(_)) => {
                    counter!("notifications.failed", 1);
                    error!("Notification queue is full, email dropped");
                    NotificationOutcome::failed(NotificationError::QueueFull.to_string())
                }
                Err(TrySendError::Closed(_)) => {
                    counter!("notifications.failed", 1);
                    error!("Notification queue is closed, email dropped");
                    NotificationOutcome::failed(NotificationError::QueueClosed.to_string())
                }
            },
            None => match self.delivery.deliver(job).await {
                Ok(()) => {
                    counter!("notifications.sent", 1);
                    NotificationOutcome::sent()
                }
                Err(e) => {
                    counter!("notifications.failed", 1);
                    error!(error = %e, "Email delivery failed");
                    NotificationOutcome::failed(e.to_string())
                }
            },
        }
    }
}

async fn process_notifications(mut rx: mpsc::Receiver<NotificationJob>, delivery: Arc<Delivery>) {
    info!("Starting notification worker");

    while let Some(job) = rx.recv().await {
        let subject = job.template.subject.clone();
        match delivery.deliver(job).await {
            Ok(()) => {
                counter!("notifications.sent", 1);
                info!(subject = %subject, "Queued email delivered");
            }
            Err(e) => {
                counter!("notifications.failed", 1);
                error!(error = %e, subject = %subject, "Queued email delivery failed");
            }
        }
    }

    info!("Notification worker stopped");
}
