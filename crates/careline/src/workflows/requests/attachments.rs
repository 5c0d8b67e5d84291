use mime::Mime;

use super::domain::{AttachmentUpload, DocType};

pub const MEGABYTE: u64 = 1024 * 1024;

/// Default cap for files supplied when a request is created.
pub const DEFAULT_ATTACHMENT_CAP_MB: u64 = 10;
/// Default cap for files supplied with a patient resubmission.
pub const DEFAULT_RESUBMISSION_CAP_MB: u64 = 5;

/// Content types accepted for program documents.
pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/png",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
];

/// Validation errors raised before an upload is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachmentViolation {
    #[error("attachment for '{doc_type}' is missing a file name")]
    MissingFileName { doc_type: DocType },
    #[error("attachment '{file_name}' is empty")]
    Empty { file_name: String },
    #[error("attachment '{file_name}' is {size} bytes; the limit is {max} bytes")]
    TooLarge {
        file_name: String,
        size: u64,
        max: u64,
    },
    #[error("attachment '{file_name}' has unsupported content type '{content_type}'")]
    UnsupportedType {
        file_name: String,
        content_type: String,
    },
}

/// Size cap plus content-type allow-list applied to every upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentPolicy {
    max_bytes: u64,
}

impl AttachmentPolicy {
    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn with_max_megabytes(megabytes: u64) -> Self {
        Self::with_max_bytes(megabytes.saturating_mul(MEGABYTE))
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn validate(
        &self,
        doc_type: &DocType,
        upload: &AttachmentUpload,
    ) -> Result<(), AttachmentViolation> {
        if upload.file_name.trim().is_empty() {
            return Err(AttachmentViolation::MissingFileName {
                doc_type: doc_type.clone(),
            });
        }

        let size = upload.size();
        if size == 0 {
            return Err(AttachmentViolation::Empty {
                file_name: upload.file_name.clone(),
            });
        }
        if size > self.max_bytes {
            return Err(AttachmentViolation::TooLarge {
                file_name: upload.file_name.clone(),
                size,
                max: self.max_bytes,
            });
        }

        if !is_allowed_content_type(&upload.content_type) {
            return Err(AttachmentViolation::UnsupportedType {
                file_name: upload.file_name.clone(),
                content_type: upload.content_type.clone(),
            });
        }

        Ok(())
    }

    pub fn validate_all<'a, I>(&self, uploads: I) -> Result<(), AttachmentViolation>
    where
        I: IntoIterator<Item = &'a (DocType, AttachmentUpload)>,
    {
        uploads
            .into_iter()
            .try_for_each(|(doc_type, upload)| self.validate(doc_type, upload))
    }
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self::with_max_megabytes(DEFAULT_ATTACHMENT_CAP_MB)
    }
}

fn is_allowed_content_type(raw: &str) -> bool {
    match raw.trim().parse::<Mime>() {
        Ok(parsed) => {
            let essence = parsed.essence_str().to_ascii_lowercase();
            ALLOWED_CONTENT_TYPES.contains(&essence.as_str())
        }
        Err(_) => false,
    }
}
