use aws_lambda_events::event::s3::S3EventRecord;
use serde::{Deserialize, Serialize};

use crate::error::PhotoError;

/// Metadata record kept in step with the photo bucket.
/// Partition key is `id`, which equals the decoded object key.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PhotoRecord {
    pub id: String,
    pub object_key: String,
    pub bucket: String,
    pub size: i64,
    pub etag: Option<String>,
    pub event_time: String,

    /// Ordering token; stored in the table but never returned to callers.
    #[serde(skip_serializing, default)]
    pub sequencer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageEventKind {
    Created,
    Removed,
}

impl StorageEventKind {
    /// `ObjectCreated:*` / `ObjectRemoved:*`, with or without the `s3:` prefix.
    pub fn from_event_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix("s3:").unwrap_or(name);
        if name.starts_with("ObjectCreated:") {
            Some(Self::Created)
        } else if name.starts_with("ObjectRemoved:") {
            Some(Self::Removed)
        } else {
            None
        }
    }
}

/// One bucket notification, normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    pub kind: StorageEventKind,
    pub bucket: String,
    pub key: String,
    pub size: i64,
    pub etag: Option<String>,
    pub sequencer: Option<String>,
    pub event_time: String,
}

impl StorageEvent {
    pub fn to_record(&self) -> PhotoRecord {
        PhotoRecord {
            id: self.key.clone(),
            object_key: self.key.clone(),
            bucket: self.bucket.clone(),
            size: self.size,
            etag: self.etag.clone(),
            event_time: self.event_time.clone(),
            sequencer: self.sequencer.clone(),
        }
    }
}

impl TryFrom<&S3EventRecord> for StorageEvent {
    type Error = PhotoError;

    fn try_from(record: &S3EventRecord) -> Result<Self, Self::Error> {
        let event_name = record.event_name.as_deref().unwrap_or_default();
        let kind = StorageEventKind::from_event_name(event_name).ok_or_else(|| {
            PhotoError::validation(format!("unsupported event name '{event_name}'"))
        })?;

        let raw_key = record
            .s3
            .object
            .key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| PhotoError::validation("notification has no object key"))?;

        Ok(StorageEvent {
            kind,
            bucket: record.s3.bucket.name.clone().unwrap_or_default(),
            key: decode_object_key(raw_key)?,
            size: record.s3.object.size.unwrap_or(0),
            etag: record.s3.object.e_tag.clone().filter(|t| !t.is_empty()),
            sequencer: record
                .s3
                .object
                .sequencer
                .as_deref()
                .and_then(normalize_sequencer),
            event_time: record.event_time.to_rfc3339(),
        })
    }
}

/// S3 notifications carry form-encoded keys: `+` for space, `%XX` escapes.
pub fn decode_object_key(raw: &str) -> Result<String, PhotoError> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| PhotoError::validation(format!("bad escape in object key '{raw}'")))?;
                out.push(hex);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out)
        .map_err(|_| PhotoError::validation(format!("object key '{raw}' is not UTF-8")))
}

pub const SEQUENCER_WIDTH: usize = 32;

/// Upper-case and left-pad to a fixed width so string order is numeric order.
pub fn normalize_sequencer(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!(
        "{:0>width$}",
        trimmed.to_ascii_uppercase(),
        width = SEQUENCER_WIDTH
    ))
}
