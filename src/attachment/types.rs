//! Attachment inputs and canonical descriptors

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A normalized attachment, ready for the delivery job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentDescriptor {
    InMemory {
        filename: String,
        content: Vec<u8>,
        mime: Option<String>,
    },
    OnDisk {
        filename: String,
        path: PathBuf,
        mime: Option<String>,
    },
    /// Downloaded by the delivery job into a temporary file
    Remote {
        filename: String,
        url: String,
        mime: Option<String>,
    },
}

impl AttachmentDescriptor {
    pub fn filename(&self) -> &str {
        match self {
            AttachmentDescriptor::InMemory { filename, .. }
            | AttachmentDescriptor::OnDisk { filename, .. }
            | AttachmentDescriptor::Remote { filename, .. } => filename,
        }
    }

    pub fn mime(&self) -> Option<&str> {
        match self {
            AttachmentDescriptor::InMemory { mime, .. }
            | AttachmentDescriptor::OnDisk { mime, .. }
            | AttachmentDescriptor::Remote { mime, .. } => mime.as_deref(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, AttachmentDescriptor::Remote { .. })
    }
}

/// Attachment as handed to the notifier, before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum AttachmentInput {
    /// In-memory content
    Bytes {
        filename: String,
        content: Vec<u8>,
        mime: Option<String>,
    },
    /// A file received through an upload, already stored on disk
    Upload {
        path: PathBuf,
        original_name: Option<String>,
        mime: Option<String>,
    },
    /// An explicit path; it must exist as given
    File {
        path: PathBuf,
        filename: Option<String>,
        mime: Option<String>,
    },
    /// A bare path string, resolved against the search roots
    Path(String),
    Url(String),
    Normalized(AttachmentDescriptor),
}

impl AttachmentInput {
    /// Classify one JSON attachment entry.
    ///
    /// - `{content, filename, mime?}` → `Bytes`
    /// - `{path, filename?, mime?}` → `File`
    /// - `{url}` → `Url`; with `filename` or `mime` → a remote descriptor keeping them
    /// - `["single string"]` → unwrapped and classified as a string
    /// - a string with a URL scheme and host → `Url`, anything else → `Path`
    ///
    /// Returns `None` for entries that fit none of these shapes.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::from_string(s)),
            Value::Array(items) if items.len() == 1 => match &items[0] {
                Value::String(s) => Some(Self::from_string(s)),
                _ => None,
            },
            Value::Object(fields) => {
                let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);
                let mime = text("mime");

                if let (Some(content), Some(filename)) = (text("content"), text("filename")) {
                    return Some(AttachmentInput::Bytes {
                        filename,
                        content: content.into_bytes(),
                        mime,
                    });
                }
                if let Some(path) = text("path") {
                    return Some(AttachmentInput::File {
                        path: PathBuf::from(path),
                        filename: text("filename"),
                        mime,
                    });
                }
                let url = text("url")?;
                let filename = text("filename");
                if filename.is_none() && mime.is_none() {
                    return Some(AttachmentInput::Url(url));
                }
                Some(AttachmentInput::Normalized(AttachmentDescriptor::Remote {
                    filename: filename.unwrap_or_else(|| filename_from_url(&url)),
                    url,
                    mime,
                }))
            }
            _ => None,
        }
    }

    fn from_string(s: &str) -> Self {
        if is_remote_url(s) {
            AttachmentInput::Url(s.to_string())
        } else {
            AttachmentInput::Path(s.to_string())
        }
    }

    /// Whether this input reads from the local filesystem
    pub fn is_local_file(&self) -> bool {
        match self {
            AttachmentInput::Upload { .. }
            | AttachmentInput::File { .. }
            | AttachmentInput::Path(_) => true,
            AttachmentInput::Normalized(descriptor) => {
                matches!(descriptor, AttachmentDescriptor::OnDisk { .. })
            }
            AttachmentInput::Bytes { .. } | AttachmentInput::Url(_) => false,
        }
    }

    /// Classify a JSON array of entries, dropping the unclassifiable ones
    pub fn list_from_json(value: &Value) -> Vec<Self> {
        match value {
            Value::Array(items) => items
                .iter()
                .filter_map(|item| {
                    let input = Self::from_json(item);
                    if input.is_none() {
                        tracing::debug!(entry = %item, "Unrecognized attachment entry dropped");
                    }
                    input
                })
                .collect(),
            Value::Null => Vec::new(),
            single => Self::from_json(single).into_iter().collect(),
        }
    }
}

/// A URL with a host, e.g. `https://files.example.com/a.pdf`
pub fn is_remote_url(s: &str) -> bool {
    url::Url::parse(s.trim())
        .map(|url| url.has_host())
        .unwrap_or(false)
}

/// Last non-empty path segment of a URL, or `"attachment"`
pub fn filename_from_url(s: &str) -> String {
    url::Url::parse(s.trim())
        .ok()
        .and_then(|url| {
            url.path_segments().and_then(|segments| {
                segments
                    .filter(|segment| !segment.is_empty())
                    .last()
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| "attachment".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_object_shapes() {
        assert_eq!(
            AttachmentInput::from_json(&json!({ "filename": "a.txt", "content": "hi" })),
            Some(AttachmentInput::Bytes {
                filename: "a.txt".to_string(),
                content: b"hi".to_vec(),
                mime: None,
            })
        );
        assert!(matches!(
            AttachmentInput::from_json(&json!({ "path": "/tmp/a.pdf", "mime": "application/pdf" })),
            Some(AttachmentInput::File { .. })
        ));
        assert_eq!(
            AttachmentInput::from_json(&json!({ "url": "https://x.io/a.pdf" })),
            Some(AttachmentInput::Url("https://x.io/a.pdf".to_string()))
        );
        assert_eq!(
            AttachmentInput::from_json(&json!({
                "url": "https://x.io/download?id=7",
                "filename": "invoice.pdf",
                "mime": "application/pdf"
            })),
            Some(AttachmentInput::Normalized(AttachmentDescriptor::Remote {
                filename: "invoice.pdf".to_string(),
                url: "https://x.io/download?id=7".to_string(),
                mime: Some("application/pdf".to_string()),
            }))
        );
        assert_eq!(
            AttachmentInput::from_json(&json!({ "url": "https://x.io/a.pdf", "mime": "text/plain" })),
            Some(AttachmentInput::Normalized(AttachmentDescriptor::Remote {
                filename: "a.pdf".to_string(),
                url: "https://x.io/a.pdf".to_string(),
                mime: Some("text/plain".to_string()),
            }))
        );
        assert_eq!(AttachmentInput::from_json(&json!({ "other": 1 })), None);
        assert_eq!(AttachmentInput::from_json(&json!(42)), None);
    }

    #[test]
    fn test_classify_strings() {
        assert_eq!(
            AttachmentInput::from_json(&json!("https://cdn.example.com/files/report.pdf")),
            Some(AttachmentInput::Url(
                "https://cdn.example.com/files/report.pdf".to_string()
            ))
        );
        assert_eq!(
            AttachmentInput::from_json(&json!(["storage/report.pdf"])),
            Some(AttachmentInput::Path("storage/report.pdf".to_string()))
        );
        // Windows drive letters parse as a scheme but have no host
        assert_eq!(
            AttachmentInput::from_json(&json!("C:\\files\\report.pdf")),
            Some(AttachmentInput::Path("C:\\files\\report.pdf".to_string()))
        );
    }

    #[test]
    fn test_list_from_json_drops_unknown_entries() {
        let inputs = AttachmentInput::list_from_json(&json!([
            "https://x.io/a.pdf",
            { "nope": true },
            "local.txt"
        ]));
        assert_eq!(inputs.len(), 2);
        assert!(AttachmentInput::list_from_json(&Value::Null).is_empty());
    }

    #[test]
    fn test_local_file_inputs() {
        let inputs = AttachmentInput::list_from_json(&json!([
            "/etc/hostname",
            { "path": "reports/q1.pdf" },
            "https://x.io/a.pdf",
            { "url": "https://x.io/b", "filename": "b.pdf" },
            { "filename": "note.txt", "content": "hi" }
        ]));
        let local: Vec<bool> = inputs.iter().map(AttachmentInput::is_local_file).collect();
        assert_eq!(local, vec![true, true, false, false, false]);
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("https://x.io/files/report.pdf?sig=1"), "report.pdf");
        assert_eq!(filename_from_url("https://x.io/files/"), "files");
        assert_eq!(filename_from_url("https://x.io"), "attachment");
    }
}
