//! One delivery attempt: remote attachment resolution, primary send, raw
//! fallback and cleanup.
//!
//! A job never returns an error. Every failure ends in a [`DeliveryReport`]
//! with [`JobState::Failed`] and an error log carrying the payload summary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tempfile::TempPath;
use uuid::Uuid;

use crate::attachment::{guess_mime, AttachmentDescriptor};
use crate::config::MailConfig;
use crate::metrics::{AttachmentMetrics, DeliveryMetrics};

use super::fetch::AttachmentFetcher;
use super::layout::NotificationLayout;
use super::payload::EmailPayload;
use super::transport::{
    DeliveryMode, MailTransport, OutgoingAttachment, OutgoingMessage, TransportError,
};

pub const TEMP_PREFIX: &str = "mailmap_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "mode", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    AttachmentResolution,
    Sending(DeliveryMode),
    Fallback,
    Complete(DeliveryMode),
    Failed,
}

/// Outcome of a finished job
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub job_id: Uuid,
    pub state: JobState,
    /// Mode of the successful send
    pub mode: Option<DeliveryMode>,
    pub fell_back: bool,
    pub history: Vec<JobState>,
    pub attachments_requested: usize,
    pub attachments_sent: usize,
    pub error: Option<String>,
}

impl DeliveryReport {
    pub fn is_success(&self) -> bool {
        matches!(self.state, JobState::Complete(_))
    }
}

/// Sender identity and delivery switches
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    pub from_address: String,
    pub from_name: String,
    pub use_raw_fallback: bool,
    pub enable_logging: bool,
}

impl From<&MailConfig> for DeliveryOptions {
    fn from(config: &MailConfig) -> Self {
        Self {
            from_address: config.from_address.clone(),
            from_name: config.from_name.clone(),
            use_raw_fallback: config.use_raw_fallback,
            enable_logging: config.enable_logging,
        }
    }
}

/// Collaborators shared by every job
pub struct Mailer {
    transport: Arc<dyn MailTransport>,
    fetcher: Arc<dyn AttachmentFetcher>,
    layout: NotificationLayout,
    options: DeliveryOptions,
    temp_dir: PathBuf,
}

impl Mailer {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        fetcher: Arc<dyn AttachmentFetcher>,
        config: &MailConfig,
    ) -> Self {
        Self {
            transport,
            fetcher,
            layout: NotificationLayout::new(config.app_name.clone()),
            options: DeliveryOptions::from(config),
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Directory for downloaded attachments
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn options(&self) -> &DeliveryOptions {
        &self.options
    }

    fn message(
        &self,
        mode: DeliveryMode,
        payload: &EmailPayload,
        attachments: &[OutgoingAttachment],
    ) -> OutgoingMessage {
        let html_body = match mode {
            DeliveryMode::Primary => self.layout.render_now(&payload.body),
            DeliveryMode::Raw => payload.body.clone(),
        };

        OutgoingMessage {
            mode,
            from_address: self.options.from_address.clone(),
            from_name: self.options.from_name.clone(),
            to: payload.to.clone(),
            cc: payload.cc.clone(),
            subject: payload.subject.clone(),
            html_body,
            attachments: attachments.to_vec(),
        }
    }

    async fn send(
        &self,
        mode: DeliveryMode,
        payload: &EmailPayload,
        attachments: &[OutgoingAttachment],
    ) -> Result<(), TransportError> {
        let result = self
            .transport
            .send(self.message(mode, payload, attachments))
            .await;
        match &result {
            Ok(()) => DeliveryMetrics::record_sent(mode.as_str()),
            Err(_) => DeliveryMetrics::record_failed(mode.as_str()),
        }
        result
    }

    /// Download one remote attachment into a temporary file
    async fn download(
        &self,
        filename: &str,
        url: &str,
    ) -> Result<TempPath, Box<dyn std::error::Error + Send + Sync>> {
        let started = Instant::now();
        let bytes = self.fetcher.fetch(url).await;
        AttachmentMetrics::record_fetch_latency(started.elapsed().as_secs_f64());
        let bytes = bytes?;

        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(&format!("_{}", safe_file_name(filename)))
            .tempfile_in(&self.temp_dir)?
            .into_temp_path();
        tokio::fs::write(&temp, &bytes).await?;
        Ok(temp)
    }
}

fn safe_file_name(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}

/// A queued notification
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    pub id: Uuid,
    pub payload: EmailPayload,
}

struct Progress {
    history: Vec<JobState>,
    fell_back: bool,
}

impl Progress {
    fn new() -> Self {
        Self {
            history: vec![JobState::Pending],
            fell_back: false,
        }
    }

    fn enter(&mut self, state: JobState) {
        self.history.push(state);
    }
}

impl DeliveryJob {
    pub fn new(payload: EmailPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
        }
    }

    /// Run the job to completion
    #[tracing::instrument(skip(self, mailer), fields(job_id = %self.id, mapping_id = ?self.payload.mapping_id))]
    pub async fn handle(self, mailer: &Mailer) -> DeliveryReport {
        DeliveryMetrics::job_started();
        let mut progress = Progress::new();
        let attachments_requested = self.payload.attachments.len();

        progress.enter(JobState::AttachmentResolution);
        // Downloaded files live until this guard list drops at the end of the job
        let (descriptors, temp_files) = resolve_remote(mailer, &self.payload.attachments).await;
        let attachments = load_attachments(&descriptors, mailer.options.enable_logging).await;

        let result = self.send(mailer, &attachments, &mut progress).await;

        drop(temp_files);
        DeliveryMetrics::job_finished();

        let (state, mode, error) = match result {
            Ok(mode) => {
                if mailer.options.enable_logging {
                    tracing::info!(
                        mode = %mode,
                        fallback = progress.fell_back,
                        to = ?self.payload.to,
                        cc = ?self.payload.cc,
                        "Email notification sent"
                    );
                }
                (JobState::Complete(mode), Some(mode), None)
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    payload = ?self.payload.summary(),
                    "Email notification failed"
                );
                (JobState::Failed, None, Some(e.to_string()))
            }
        };
        progress.enter(state);

        DeliveryReport {
            job_id: self.id,
            state,
            mode,
            fell_back: progress.fell_back,
            history: progress.history,
            attachments_requested,
            attachments_sent: attachments.len(),
            error,
        }
    }

    async fn send(
        &self,
        mailer: &Mailer,
        attachments: &[OutgoingAttachment],
        progress: &mut Progress,
    ) -> Result<DeliveryMode, TransportError> {
        if self.payload.use_raw {
            progress.enter(JobState::Sending(DeliveryMode::Raw));
            mailer.send(DeliveryMode::Raw, &self.payload, attachments).await?;
            return Ok(DeliveryMode::Raw);
        }

        progress.enter(JobState::Sending(DeliveryMode::Primary));
        match mailer
            .send(DeliveryMode::Primary, &self.payload, attachments)
            .await
        {
            Ok(()) => Ok(DeliveryMode::Primary),
            Err(e) if !mailer.options.use_raw_fallback => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "Primary send failed, retrying with raw message");
                DeliveryMetrics::record_fallback();
                progress.fell_back = true;
                progress.enter(JobState::Fallback);
                progress.enter(JobState::Sending(DeliveryMode::Raw));
                mailer.send(DeliveryMode::Raw, &self.payload, attachments).await?;
                Ok(DeliveryMode::Raw)
            }
        }
    }
}

/// Replace every remote descriptor by an on-disk one backed by a temp file.
/// Failed downloads are dropped.
async fn resolve_remote(
    mailer: &Mailer,
    descriptors: &[AttachmentDescriptor],
) -> (Vec<AttachmentDescriptor>, Vec<TempPath>) {
    let mut resolved = Vec::with_capacity(descriptors.len());
    let mut temp_files = Vec::new();

    for descriptor in descriptors {
        let AttachmentDescriptor::Remote {
            filename,
            url,
            mime,
        } = descriptor
        else {
            resolved.push(descriptor.clone());
            continue;
        };

        match mailer.download(filename, url).await {
            Ok(temp) => {
                resolved.push(AttachmentDescriptor::OnDisk {
                    filename: filename.clone(),
                    path: temp.to_path_buf(),
                    mime: mime.clone().or_else(|| guess_mime(filename)),
                });
                temp_files.push(temp);
            }
            Err(e) => {
                AttachmentMetrics::record_dropped("fetch");
                tracing::warn!(url = %url, error = %e, "Remote attachment could not be fetched, dropped");
            }
        }
    }

    (resolved, temp_files)
}

/// Read attachment contents; unreadable files are skipped
async fn load_attachments(
    descriptors: &[AttachmentDescriptor],
    log_details: bool,
) -> Vec<OutgoingAttachment> {
    let mut attachments = Vec::with_capacity(descriptors.len());

    for descriptor in descriptors {
        let attachment = match descriptor {
            AttachmentDescriptor::InMemory {
                filename,
                content,
                mime,
            } => OutgoingAttachment {
                filename: filename.clone(),
                content: content.clone(),
                mime: mime.clone(),
            },
            AttachmentDescriptor::OnDisk {
                filename,
                path,
                mime,
            } => match read_file(path).await {
                Some(content) => OutgoingAttachment {
                    filename: filename.clone(),
                    content,
                    mime: mime.clone(),
                },
                None => continue,
            },
            AttachmentDescriptor::Remote { url, .. } => {
                // only reachable when resolution was skipped
                AttachmentMetrics::record_dropped("send");
                tracing::warn!(url = %url, "Unresolved remote attachment skipped");
                continue;
            }
        };

        if log_details {
            tracing::info!(
                filename = %attachment.filename,
                size = attachment.content.len(),
                mime = attachment.mime.as_deref().unwrap_or("unknown"),
                "Attaching file"
            );
        }
        attachments.push(attachment);
    }

    attachments
}

async fn read_file(path: &Path) -> Option<Vec<u8>> {
    match tokio::fs::read(path).await {
        Ok(content) => Some(content),
        Err(e) => {
            AttachmentMetrics::record_dropped("send");
            tracing::warn!(path = %path.display(), error = %e, "Attachment file unreadable, skipped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::fetch::FetchError;
    use crate::delivery::transport::MemoryTransport;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Serves fixed bodies per URL; anything else fails
    struct StubFetcher {
        bodies: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl AttachmentFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.bodies
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Other(format!("no stub for {}", url)))
        }
    }

    fn fetcher(entries: &[(&str, &[u8])]) -> Arc<StubFetcher> {
        Arc::new(StubFetcher {
            bodies: entries
                .iter()
                .map(|(url, body)| (url.to_string(), body.to_vec()))
                .collect(),
        })
    }

    fn config(use_raw_fallback: bool) -> MailConfig {
        MailConfig {
            use_raw_fallback,
            transport: "memory".to_string(),
            ..MailConfig::default()
        }
    }

    fn payload() -> EmailPayload {
        EmailPayload {
            to: vec!["c@x.com".to_string()],
            cc: Vec::new(),
            subject: "New lead".to_string(),
            body: "Hi Acme".to_string(),
            meta: Vec::new(),
            mapping_id: Some(1),
            attachments: Vec::new(),
            use_raw: false,
        }
    }

    fn temp_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_primary_send_wraps_body_in_layout() {
        let transport = Arc::new(MemoryTransport::new());
        let mailer = Mailer::new(transport.clone(), fetcher(&[]), &config(true));

        let report = DeliveryJob::new(payload()).handle(&mailer).await;

        assert_eq!(report.state, JobState::Complete(DeliveryMode::Primary));
        assert!(!report.fell_back);
        let sent = transport.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].html_body.contains("<div class=\"content\">\nHi Acme"));
        assert_eq!(sent[0].from_address, "no-reply@example.com");
    }

    #[tokio::test]
    async fn test_primary_failure_falls_back_to_raw() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_on(DeliveryMode::Primary);
        let mailer = Mailer::new(transport.clone(), fetcher(&[]), &config(true));

        let report = DeliveryJob::new(payload()).handle(&mailer).await;

        assert_eq!(report.state, JobState::Complete(DeliveryMode::Raw));
        assert!(report.fell_back);
        assert_eq!(
            report.history,
            vec![
                JobState::Pending,
                JobState::AttachmentResolution,
                JobState::Sending(DeliveryMode::Primary),
                JobState::Fallback,
                JobState::Sending(DeliveryMode::Raw),
                JobState::Complete(DeliveryMode::Raw),
            ]
        );
        let sent = transport.sent().await;
        assert_eq!(sent[0].html_body, "Hi Acme");
    }

    #[tokio::test]
    async fn test_disabled_fallback_fails_without_raw_attempt() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_on(DeliveryMode::Primary);
        let mailer = Mailer::new(transport.clone(), fetcher(&[]), &config(false));

        let report = DeliveryJob::new(payload()).handle(&mailer).await;

        assert_eq!(report.state, JobState::Failed);
        assert!(report.error.is_some());
        assert_eq!(transport.attempts().await, vec![DeliveryMode::Primary]);
    }

    #[tokio::test]
    async fn test_raw_failure_after_fallback_is_fatal() {
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_on(DeliveryMode::Primary);
        transport.fail_on(DeliveryMode::Raw);
        let mailer = Mailer::new(transport.clone(), fetcher(&[]), &config(true));

        let report = DeliveryJob::new(payload()).handle(&mailer).await;

        assert_eq!(report.state, JobState::Failed);
        assert!(report.fell_back);
        assert_eq!(
            transport.attempts().await,
            vec![DeliveryMode::Primary, DeliveryMode::Raw]
        );
    }

    #[tokio::test]
    async fn test_explicit_raw_skips_primary() {
        let transport = Arc::new(MemoryTransport::new());
        let mailer = Mailer::new(transport.clone(), fetcher(&[]), &config(true));

        let mut raw = payload();
        raw.use_raw = true;
        let report = DeliveryJob::new(raw).handle(&mailer).await;

        assert_eq!(report.mode, Some(DeliveryMode::Raw));
        assert_eq!(transport.attempts().await, vec![DeliveryMode::Raw]);
    }

    #[tokio::test]
    async fn test_remote_attachments_are_downloaded_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MemoryTransport::new());
        let mailer = Mailer::new(
            transport.clone(),
            fetcher(&[("https://files.example.com/quote.pdf", &b"%PDF-1.4"[..])]),
            &config(true),
        )
        .with_temp_dir(dir.path());

        let mut with_files = payload();
        with_files.attachments = vec![
            AttachmentDescriptor::Remote {
                filename: "quote.pdf".to_string(),
                url: "https://files.example.com/quote.pdf".to_string(),
                mime: None,
            },
            AttachmentDescriptor::Remote {
                filename: "gone.pdf".to_string(),
                url: "https://files.example.com/gone.pdf".to_string(),
                mime: None,
            },
            AttachmentDescriptor::InMemory {
                filename: "notes.txt".to_string(),
                content: b"hello".to_vec(),
                mime: Some("text/plain".to_string()),
            },
        ];

        let report = DeliveryJob::new(with_files).handle(&mailer).await;

        assert!(report.is_success());
        assert_eq!(report.attachments_requested, 3);
        assert_eq!(report.attachments_sent, 2);

        let sent = transport.sent().await;
        let quote = &sent[0].attachments[0];
        assert_eq!(quote.filename, "quote.pdf");
        assert_eq!(quote.content, b"%PDF-1.4");
        assert_eq!(quote.mime.as_deref(), Some("application/pdf"));
        assert_eq!(sent[0].attachments[1].filename, "notes.txt");

        assert_eq!(temp_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_temp_files_removed_when_job_fails() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MemoryTransport::new());
        transport.fail_on(DeliveryMode::Primary);
        let mailer = Mailer::new(
            transport.clone(),
            fetcher(&[("https://files.example.com/a.csv", &b"x,y"[..])]),
            &config(false),
        )
        .with_temp_dir(dir.path());

        let mut with_file = payload();
        with_file.attachments = vec![AttachmentDescriptor::Remote {
            filename: "a.csv".to_string(),
            url: "https://files.example.com/a.csv".to_string(),
            mime: None,
        }];

        let report = DeliveryJob::new(with_file).handle(&mailer).await;

        assert_eq!(report.state, JobState::Failed);
        assert_eq!(temp_entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_missing_on_disk_file_is_skipped() {
        let transport = Arc::new(MemoryTransport::new());
        let mailer = Mailer::new(transport.clone(), fetcher(&[]), &config(true));

        let mut with_file = payload();
        with_file.attachments = vec![AttachmentDescriptor::OnDisk {
            filename: "vanished.pdf".to_string(),
            path: PathBuf::from("/nonexistent/vanished.pdf"),
            mime: None,
        }];

        let report = DeliveryJob::new(with_file).handle(&mailer).await;

        assert!(report.is_success());
        assert_eq!(report.attachments_sent, 0);
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("a/b\\c:d.pdf"), "a_b_c_d.pdf");
    }
}
