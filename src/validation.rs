use crate::error::ValidationError;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10_000_000;

pub const DEFAULT_CATEGORY: &str = "general";

pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/jpeg",
    "image/jpg",
    "image/png",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

const FALLBACK_MIME_TYPE: &str = "application/octet-stream";
const MAX_NAME_CHARS: usize = 255;
const MAX_TAG_CHARS: usize = 100;

/// Raw upload as received from the client, before any checks.
#[derive(Debug, Default, Clone)]
pub struct UploadCandidate {
    pub bytes: Option<Vec<u8>>,
    pub original_name: Option<String>,
    pub mime_type: Option<String>,
    pub display_name: Option<String>,
    pub purpose: Option<String>,
    pub category: Option<String>,
    pub legacy_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub bytes: Vec<u8>,
    pub original_name: String,
    pub mime_type: String,
    pub display_name: String,
    pub purpose: String,
    pub category: String,
    pub legacy_type: Option<String>,
}

impl ValidatedUpload {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_bytes: u64,
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl UploadValidator {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn validate(&self, candidate: UploadCandidate) -> Result<ValidatedUpload, ValidationError> {
        let UploadCandidate {
            bytes,
            original_name,
            mime_type,
            display_name,
            purpose,
            category,
            legacy_type,
        } = candidate;

        let bytes = bytes.ok_or(ValidationError::MissingFile)?;
        if bytes.is_empty() {
            return Err(ValidationError::EmptyFile);
        }

        let mime_type = normalize_mime(mime_type.as_deref().unwrap_or(FALLBACK_MIME_TYPE));
        if !is_allowed_mime(&mime_type) {
            return Err(ValidationError::UnsupportedMimeType(mime_type));
        }

        let size = bytes.len() as u64;
        if size > self.max_bytes {
            return Err(ValidationError::TooLarge {
                size,
                limit: self.max_bytes,
            });
        }

        let original_name = verbatim(original_name, "filename", MAX_NAME_CHARS)?
            .ok_or(ValidationError::MissingField("filename"))?;
        let display_name = required(display_name, "display_name", MAX_NAME_CHARS)?;
        let purpose = required(purpose, "purpose", MAX_NAME_CHARS)?;
        let category = optional(category, "category", MAX_TAG_CHARS)?;
        let legacy_type = verbatim(legacy_type, "type", MAX_TAG_CHARS)?;

        if category.is_none() && legacy_type.is_none() {
            return Err(ValidationError::MissingField("category or type"));
        }

        Ok(ValidatedUpload {
            bytes,
            original_name,
            mime_type,
            display_name,
            purpose,
            category: category.unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            legacy_type,
        })
    }
}

pub fn normalize_mime(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn is_allowed_mime(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type)
}

fn required(
    value: Option<String>,
    field: &'static str,
    max_chars: usize,
) -> Result<String, ValidationError> {
    optional(value, field, max_chars)?.ok_or(ValidationError::MissingField(field))
}

fn optional(
    value: Option<String>,
    field: &'static str,
    max_chars: usize,
) -> Result<Option<String>, ValidationError> {
    let Some(trimmed) = value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Ok(None);
    };

    if trimmed.chars().count() > max_chars {
        return Err(ValidationError::InvalidInput(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Like [`optional`] but keeps the value exactly as the client sent it.
fn verbatim(
    value: Option<String>,
    field: &'static str,
    max_chars: usize,
) -> Result<Option<String>, ValidationError> {
    match value {
        Some(value) if !value.trim().is_empty() => {
            if value.chars().count() > max_chars {
                return Err(ValidationError::InvalidInput(format!(
                    "{field} must be at most {max_chars} characters"
                )));
            }
            Ok(Some(value))
        }
        _ => Ok(None),
    }
}
