//! Attachment inputs and their normalization into descriptors

mod normalizer;
mod types;

pub use normalizer::{guess_mime, AttachmentNormalizer};
pub use types::{filename_from_url, is_remote_url, AttachmentDescriptor, AttachmentInput};
