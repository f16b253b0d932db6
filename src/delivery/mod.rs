//! Asynchronous email delivery.
//!
//! The notifier pushes [`EmailPayload`]s onto a [`DeliveryQueue`]; a
//! [`DeliveryWorker`] runs each as a [`DeliveryJob`] against a shared [`Mailer`].

mod fetch;
mod job;
mod layout;
mod payload;
mod queue;
mod smtp;
mod transport;

pub use fetch::{AttachmentFetcher, FetchError, HttpFetcher};
pub use job::{DeliveryJob, DeliveryOptions, DeliveryReport, JobState, Mailer, TEMP_PREFIX};
pub use layout::NotificationLayout;
pub use payload::{EmailPayload, PayloadSummary, DEFAULT_SUBJECT};
pub use queue::{DeliveryError, DeliveryQueue, DeliveryWorker};
pub use smtp::{build_message, SmtpTransport};
pub use transport::{
    create_transport, DeliveryMode, MailTransport, MemoryTransport, OutgoingAttachment,
    OutgoingMessage, TransportError,
};
