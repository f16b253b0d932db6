use serde::{Deserialize, Serialize};

use crate::attachment::AttachmentDescriptor;
use crate::placeholder::EmailData;

pub const DEFAULT_SUBJECT: &str = "Notification";

/// Everything a delivery job needs to send one notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub meta: Vec<String>,
    pub mapping_id: Option<i64>,
    #[serde(default)]
    pub attachments: Vec<AttachmentDescriptor>,
    /// Skip the notification layout and send a bare message
    #[serde(default)]
    pub use_raw: bool,
}

impl EmailPayload {
    pub fn from_email_data(
        data: EmailData,
        meta: Vec<String>,
        attachments: Vec<AttachmentDescriptor>,
        use_raw: bool,
    ) -> Self {
        let subject = if data.subject.trim().is_empty() {
            DEFAULT_SUBJECT.to_string()
        } else {
            data.subject
        };

        Self {
            to: data.to,
            cc: data.cc,
            subject,
            body: data.body,
            meta,
            mapping_id: Some(data.mapping_id),
            attachments,
            use_raw,
        }
    }

    /// Loggable description without bodies or attachment content
    pub fn summary(&self) -> PayloadSummary<'_> {
        PayloadSummary {
            mapping_id: self.mapping_id,
            to: &self.to,
            cc: &self.cc,
            subject: &self.subject,
            attachments: self.attachments.iter().map(|a| a.filename()).collect(),
            use_raw: self.use_raw,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PayloadSummary<'a> {
    pub mapping_id: Option<i64>,
    pub to: &'a [String],
    pub cc: &'a [String],
    pub subject: &'a str,
    pub attachments: Vec<&'a str>,
    pub use_raw: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(subject: &str) -> EmailData {
        EmailData {
            to: vec!["a@example.com".to_string()],
            cc: Vec::new(),
            subject: subject.to_string(),
            body: "<p>hi</p>".to_string(),
            mapping_id: 3,
        }
    }

    #[test]
    fn test_empty_subject_gets_default() {
        let payload = EmailPayload::from_email_data(data("  "), Vec::new(), Vec::new(), false);
        assert_eq!(payload.subject, DEFAULT_SUBJECT);
        assert_eq!(payload.mapping_id, Some(3));
    }

    #[test]
    fn test_subject_kept_when_present() {
        let payload = EmailPayload::from_email_data(data("Hello"), Vec::new(), Vec::new(), true);
        assert_eq!(payload.subject, "Hello");
        assert!(payload.use_raw);
    }

    #[test]
    fn test_summary_omits_content() {
        let payload = EmailPayload::from_email_data(
            data("Hello"),
            Vec::new(),
            vec![AttachmentDescriptor::InMemory {
                filename: "a.txt".to_string(),
                content: b"secret".to_vec(),
                mime: None,
            }],
            false,
        );
        let json = serde_json::to_string(&payload.summary()).unwrap();
        assert!(json.contains("a.txt"));
        assert!(!json.contains("secret"));
        assert!(!json.contains("<p>hi</p>"));
    }
}
