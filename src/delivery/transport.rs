use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::MailConfig;

use super::smtp::SmtpTransport;

/// Which send path produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Body rendered through the notification layout
    Primary,
    /// Bare HTML body
    Raw,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Primary => "primary",
            DeliveryMode::Raw => "raw",
        }
    }
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingAttachment {
    pub filename: String,
    pub content: Vec<u8>,
    pub mime: Option<String>,
}

/// A fully formed message handed to a transport
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub mode: DeliveryMode,
    pub from_address: String,
    pub from_name: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub attachments: Vec<OutgoingAttachment>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Message could not be built: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("Message rejected by {transport} transport")]
    Rejected { transport: &'static str },
}

/// Outbound mail capability; a send either succeeds or fails, retries are
/// left to the caller.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: OutgoingMessage) -> Result<(), TransportError>;

    fn name(&self) -> &'static str;
}

/// Records messages instead of sending them.
///
/// Individual modes can be switched to fail, which is how the fallback path
/// is exercised without a mail server.
#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<OutgoingMessage>>,
    attempts: Mutex<Vec<DeliveryMode>>,
    failing: DashSet<DeliveryMode>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, mode: DeliveryMode) {
        self.failing.insert(mode);
    }

    pub fn recover(&self, mode: DeliveryMode) {
        self.failing.remove(&mode);
    }

    /// Successfully sent messages, oldest first
    pub async fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().await.clone()
    }

    /// Every send attempt, including failed ones
    pub async fn attempts(&self) -> Vec<DeliveryMode> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn send(&self, message: OutgoingMessage) -> Result<(), TransportError> {
        self.attempts.lock().await.push(message.mode);

        if self.failing.contains(&message.mode) {
            return Err(TransportError::Rejected {
                transport: self.name(),
            });
        }

        tracing::debug!(
            mode = %message.mode,
            to = ?message.to,
            subject = %message.subject,
            "Message recorded by memory transport"
        );
        self.sent.lock().await.push(message);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Create the configured transport
pub fn create_transport(config: &MailConfig) -> Result<Arc<dyn MailTransport>, TransportError> {
    match config.transport.as_str() {
        "memory" => {
            tracing::info!("Using memory mail transport");
            Ok(Arc::new(MemoryTransport::new()))
        }
        "smtp" => Ok(Arc::new(SmtpTransport::from_config(&config.smtp)?)),
        other => {
            tracing::warn!(
                transport = %other,
                "Unknown mail transport, falling back to smtp"
            );
            Ok(Arc::new(SmtpTransport::from_config(&config.smtp)?))
        }
    }
}
