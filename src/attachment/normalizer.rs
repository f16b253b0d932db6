//! Turns loosely-typed attachment inputs into descriptors.
//!
//! Bare path strings get a forgiving resolution: the literal path, its
//! canonical form, slash-swapped variants, the path under each search root,
//! and finally a bounded recursive search of the roots for the same file name.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use walkdir::WalkDir;

use crate::config::AttachmentConfig;
use crate::metrics::AttachmentMetrics;

use super::types::{filename_from_url, AttachmentDescriptor, AttachmentInput};

/// MIME type from the file extension
pub fn guess_mime(name: impl AsRef<Path>) -> Option<String> {
    mime_guess::from_path(name).first().map(|mime| mime.to_string())
}

fn basename(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

#[derive(Debug, Clone)]
pub struct AttachmentNormalizer {
    search_roots: Vec<PathBuf>,
    max_depth: usize,
}

impl AttachmentNormalizer {
    pub fn new(settings: &AttachmentConfig) -> Self {
        Self {
            search_roots: settings.search_roots.clone(),
            max_depth: settings.search_max_depth,
        }
    }

    pub fn with_roots(search_roots: Vec<PathBuf>, max_depth: usize) -> Self {
        Self {
            search_roots,
            max_depth,
        }
    }

    /// Normalize every input, dropping the ones that cannot be resolved.
    /// Surviving entries keep their order.
    pub fn normalize(&self, inputs: Vec<AttachmentInput>) -> Vec<AttachmentDescriptor> {
        inputs
            .into_iter()
            .filter_map(|input| {
                let descriptor = self.normalize_one(&input);
                if descriptor.is_none() {
                    AttachmentMetrics::record_dropped("normalize");
                    tracing::debug!(input = ?summary(&input), "Attachment could not be resolved, dropped");
                }
                descriptor
            })
            .collect()
    }

    fn normalize_one(&self, input: &AttachmentInput) -> Option<AttachmentDescriptor> {
        match input {
            AttachmentInput::Bytes {
                filename,
                content,
                mime,
            } => Some(AttachmentDescriptor::InMemory {
                filename: filename.clone(),
                content: content.clone(),
                mime: mime.clone().or_else(|| guess_mime(filename)),
            }),
            AttachmentInput::Upload {
                path,
                original_name,
                mime,
            } => {
                if !path.is_file() {
                    return None;
                }
                let filename = original_name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .or_else(|| basename(path))?;
                Some(AttachmentDescriptor::OnDisk {
                    mime: mime.clone().or_else(|| guess_mime(&filename)),
                    filename,
                    path: path.clone(),
                })
            }
            AttachmentInput::File {
                path,
                filename,
                mime,
            } => {
                if !path.is_file() {
                    return None;
                }
                let filename = filename.clone().or_else(|| basename(path))?;
                Some(AttachmentDescriptor::OnDisk {
                    mime: mime.clone().or_else(|| guess_mime(path)),
                    filename,
                    path: path.clone(),
                })
            }
            AttachmentInput::Url(url) => Some(AttachmentDescriptor::Remote {
                filename: filename_from_url(url),
                url: url.trim().to_string(),
                mime: None,
            }),
            AttachmentInput::Path(raw) => {
                let path = self.resolve_path(raw)?;
                Some(AttachmentDescriptor::OnDisk {
                    filename: basename(&path)?,
                    mime: guess_mime(&path),
                    path,
                })
            }
            AttachmentInput::Normalized(descriptor) => Some(descriptor.clone()),
        }
    }

    /// Find an existing file for a loosely written path
    pub fn resolve_path(&self, raw: &str) -> Option<PathBuf> {
        let raw = raw.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace());
        if raw.is_empty() {
            return None;
        }

        let literal = PathBuf::from(raw);
        if literal.is_file() {
            return Some(literal);
        }
        if let Ok(canonical) = literal.canonicalize() {
            if canonical.is_file() {
                return Some(canonical);
            }
        }

        let sep = MAIN_SEPARATOR.to_string();
        let variants = [
            raw.replace(['\\', '/'], &sep),
            raw.replace('\\', "/"),
            raw.replace('/', "\\"),
        ];
        if let Some(found) = variants.iter().map(PathBuf::from).find(|p| p.is_file()) {
            return Some(found);
        }

        let relative = raw.trim_start_matches(['\\', '/']);
        if let Some(found) = self
            .search_roots
            .iter()
            .map(|root| root.join(relative))
            .find(|p| p.is_file())
        {
            return Some(found);
        }

        let name = Path::new(&raw.replace('\\', "/"))
            .file_name()?
            .to_os_string();
        self.search_roots
            .iter()
            .filter(|root| root.is_dir())
            .find_map(|root| {
                WalkDir::new(root)
                    .max_depth(self.max_depth)
                    .into_iter()
                    .filter_map(Result::ok)
                    .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
                    .map(|entry| entry.into_path())
            })
    }
}

/// Input description for logs, without in-memory content
fn summary(input: &AttachmentInput) -> String {
    match input {
        AttachmentInput::Bytes { filename, .. } => format!("bytes:{}", filename),
        AttachmentInput::Upload { path, .. } => format!("upload:{}", path.display()),
        AttachmentInput::File { path, .. } => format!("file:{}", path.display()),
        AttachmentInput::Path(raw) => format!("path:{}", raw),
        AttachmentInput::Url(url) => format!("url:{}", url),
        AttachmentInput::Normalized(descriptor) => format!("normalized:{}", descriptor.filename()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn normalizer_in(root: &Path) -> AttachmentNormalizer {
        AttachmentNormalizer::with_roots(vec![root.to_path_buf()], 6)
    }

    #[test]
    fn test_missing_path_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let normalizer = normalizer_in(dir.path());

        let out = normalizer.normalize(vec![AttachmentInput::Path(
            "/definitely/not/here.pdf".to_string(),
        )]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_url_yields_one_remote_descriptor() {
        let normalizer = AttachmentNormalizer::with_roots(Vec::new(), 1);
        let out = normalizer.normalize(vec![AttachmentInput::Url(
            "https://cdn.example.com/docs/quote.pdf".to_string(),
        )]);

        assert_eq!(
            out,
            vec![AttachmentDescriptor::Remote {
                filename: "quote.pdf".to_string(),
                url: "https://cdn.example.com/docs/quote.pdf".to_string(),
                mime: None,
            }]
        );
    }

    #[test]
    fn test_bytes_infer_mime_from_filename() {
        let normalizer = AttachmentNormalizer::with_roots(Vec::new(), 1);
        let out = normalizer.normalize(vec![AttachmentInput::Bytes {
            filename: "notes.txt".to_string(),
            content: b"hello".to_vec(),
            mime: None,
        }]);

        assert_eq!(out[0].mime(), Some("text/plain"));
    }

    #[test]
    fn test_quoted_literal_path_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.pdf");
        fs::write(&file, b"%PDF").unwrap();
        let normalizer = normalizer_in(dir.path());

        let quoted = format!("  \"{}\" ", file.display());
        let out = normalizer.normalize(vec![AttachmentInput::Path(quoted)]);

        assert_eq!(
            out,
            vec![AttachmentDescriptor::OnDisk {
                filename: "report.pdf".to_string(),
                path: file,
                mime: Some("application/pdf".to_string()),
            }]
        );
    }

    #[test]
    fn test_path_relative_to_search_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("uploads")).unwrap();
        fs::write(dir.path().join("uploads/a.csv"), b"x,y").unwrap();
        let normalizer = normalizer_in(dir.path());

        let resolved = normalizer.resolve_path("/uploads/a.csv").unwrap();
        assert_eq!(resolved, dir.path().join("uploads/a.csv"));
    }

    #[test]
    fn test_basename_search_finds_nested_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("storage/2024/05");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("invoice-77.pdf"), b"%PDF").unwrap();
        let normalizer = normalizer_in(dir.path());

        let resolved = normalizer.resolve_path("old/location/invoice-77.pdf").unwrap();
        assert_eq!(resolved, nested.join("invoice-77.pdf"));
    }

    #[test]
    fn test_basename_search_respects_depth() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("deep.txt"), b"x").unwrap();

        let shallow = AttachmentNormalizer::with_roots(vec![dir.path().to_path_buf()], 2);
        assert!(shallow.resolve_path("deep.txt").is_none());
    }

    #[test]
    fn test_file_input_requires_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.json");
        fs::write(&file, b"{}").unwrap();
        let normalizer = normalizer_in(dir.path());

        let out = normalizer.normalize(vec![
            AttachmentInput::File {
                path: file.clone(),
                filename: Some("export.json".to_string()),
                mime: None,
            },
            AttachmentInput::File {
                path: dir.path().join("missing.json"),
                filename: None,
                mime: None,
            },
            AttachmentInput::Upload {
                path: file.clone(),
                original_name: None,
                mime: Some("application/json".to_string()),
            },
        ]);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].filename(), "export.json");
        assert_eq!(out[1].filename(), "data.json");
        assert_eq!(out[1].mime(), Some("application/json"));
    }

    #[test]
    fn test_order_of_survivors_is_preserved() {
        let normalizer = AttachmentNormalizer::with_roots(Vec::new(), 1);
        let out = normalizer.normalize(vec![
            AttachmentInput::Url("https://x.io/1.pdf".to_string()),
            AttachmentInput::Path("nowhere.pdf".to_string()),
            AttachmentInput::Url("https://x.io/2.pdf".to_string()),
        ]);

        let names: Vec<&str> = out.iter().map(|d| d.filename()).collect();
        assert_eq!(names, vec!["1.pdf", "2.pdf"]);
    }
}
