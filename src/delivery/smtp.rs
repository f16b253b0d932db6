//! SMTP transport backed by lettre

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

use super::transport::{MailTransport, OutgoingMessage, TransportError};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpTransport {
    pub fn from_config(config: &SmtpConfig) -> Result<Self, TransportError> {
        let builder = match config.tls.as_str() {
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| TransportError::Smtp(e.to_string()))?,
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| TransportError::Smtp(e.to_string()))?,
        }
        .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        tracing::info!(
            host = %config.host,
            port = config.port,
            tls = %config.tls,
            "SMTP transport configured"
        );

        Ok(Self {
            mailer: builder.build(),
            host: config.host.clone(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

fn parse_address(address: &str) -> Result<Address, TransportError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|e| TransportError::Address {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

fn content_type(mime: Option<&str>) -> Result<ContentType, TransportError> {
    mime.and_then(|m| ContentType::parse(m).ok())
        .map(Ok)
        .unwrap_or_else(|| ContentType::parse(FALLBACK_CONTENT_TYPE))
        .map_err(|e| TransportError::Build(e.to_string()))
}

/// Convert an outgoing message into a lettre multipart message
pub fn build_message(message: &OutgoingMessage) -> Result<Message, TransportError> {
    let from_name = Some(message.from_name.clone()).filter(|name| !name.trim().is_empty());
    let mut builder = Message::builder()
        .from(Mailbox::new(from_name, parse_address(&message.from_address)?))
        .subject(message.subject.clone());

    for to in &message.to {
        builder = builder.to(Mailbox::new(None, parse_address(to)?));
    }
    for cc in &message.cc {
        builder = builder.cc(Mailbox::new(None, parse_address(cc)?));
    }

    let mut parts = MultiPart::mixed().singlepart(SinglePart::html(message.html_body.clone()));
    for attachment in &message.attachments {
        parts = parts.singlepart(
            Attachment::new(attachment.filename.clone()).body(
                attachment.content.clone(),
                content_type(attachment.mime.as_deref())?,
            ),
        );
    }

    builder
        .multipart(parts)
        .map_err(|e| TransportError::Build(e.to_string()))
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, message: OutgoingMessage) -> Result<(), TransportError> {
        let email = build_message(&message)?;
        self.mailer
            .send(email)
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
