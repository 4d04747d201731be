use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::PhotoError;

/// Upload body sent by the browser: `{ fileAsBase64, name, type }`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UploadRequest {
    /// Bare base64 or a `data:<mime>;base64,<data>` URL.
    #[serde(rename = "fileAsBase64")]
    pub file_as_base64: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
}

impl UploadRequest {
    /// Build a request the way the browser does: `readAsDataURL` on the file.
    pub fn from_bytes(name: &str, content_type: &str, bytes: &[u8]) -> Self {
        let mime = if content_type.is_empty() {
            "application/octet-stream"
        } else {
            content_type
        };
        Self {
            file_as_base64: format!("data:{};base64,{}", mime, STANDARD.encode(bytes)),
            name: Some(name.to_string()),
            content_type: Some(content_type.to_string()),
        }
    }
}

/// Result of a successful upload, returned to the caller.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoredPhoto {
    pub key: String,
    pub bucket: String,
    pub content_type: String,
    pub size: usize,
}

/// Payload after base64 decoding, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedUpload {
    pub key: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// How object keys are derived from the uploaded file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyPolicy {
    /// Key is the sanitized name; re-uploads replace the object.
    #[default]
    Name,
    /// Key is `<uuid>-<sanitized name>`; uploads never collide.
    Unique,
}

impl FromStr for KeyPolicy {
    type Err = PhotoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(KeyPolicy::Name),
            "unique" => Ok(KeyPolicy::Unique),
            other => Err(PhotoError::validation(format!(
                "unknown key policy '{other}' (expected name or unique)"
            ))),
        }
    }
}

/// Knobs for the create path, built once at cold start.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    pub key_policy: KeyPolicy,
    pub key_prefix: String,
    pub max_upload_bytes: usize,
}

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            key_policy: KeyPolicy::Name,
            key_prefix: String::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}
