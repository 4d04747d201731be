use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::model::{DecodedUpload, KeyPolicy, StoredPhoto, UploadOptions, UploadRequest};
use crate::error::PhotoError;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Write side of the photo bucket.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    fn bucket(&self) -> &str;

    async fn put_photo(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), PhotoError>;
}

/// Photo bucket backed by S3. The create function only holds write access.
#[derive(Debug, Clone)]
pub struct S3PhotoStore {
    client: S3Client,
    bucket: String,
}

impl S3PhotoStore {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl PhotoStore for S3PhotoStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_photo(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), PhotoError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map(|_| ())
            .map_err(|e| PhotoError::storage(format!("S3 put_object error: {}", e)))
    }
}

/// Decode the request body into the object we are about to write.
/// Pure: no I/O, so the create handler can reject bad input before touching S3.
pub fn decode_upload(
    request: &UploadRequest,
    options: &UploadOptions,
) -> Result<DecodedUpload, PhotoError> {
    let raw = request.file_as_base64.trim();
    let (data_url_type, encoded) = split_data_url(raw)?;

    if encoded.is_empty() {
        return Err(PhotoError::validation("fileAsBase64 is empty"));
    }

    // Cheap upper bound before allocating: every 4 base64 chars decode to 3 bytes.
    if encoded.len() / 4 * 3 > options.max_upload_bytes.saturating_add(3) {
        return Err(too_large(options.max_upload_bytes));
    }

    let bytes = STANDARD.decode(encoded)?;
    if bytes.is_empty() {
        return Err(PhotoError::validation("decoded file is empty"));
    }
    if bytes.len() > options.max_upload_bytes {
        return Err(too_large(options.max_upload_bytes));
    }

    let content_type = request
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or(data_url_type)
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string();

    let key = derive_object_key(request.name.as_deref(), &content_type, options);

    Ok(DecodedUpload {
        key,
        content_type,
        bytes,
    })
}

fn too_large(limit: usize) -> PhotoError {
    PhotoError::validation(format!("file exceeds the {limit} byte upload limit"))
}

/// Split `data:<mime>;base64,<payload>` into its media type and payload.
/// Anything without a `data:` prefix is taken as bare base64.
fn split_data_url(raw: &str) -> Result<(Option<&str>, &str), PhotoError> {
    let Some(rest) = raw.strip_prefix("data:") else {
        return Ok((None, raw));
    };
    let Some((meta, payload)) = rest.split_once(',') else {
        return Err(PhotoError::validation("data URL has no payload"));
    };
    let Some(mime) = meta.strip_suffix(";base64") else {
        return Err(PhotoError::validation("data URL is not base64 encoded"));
    };
    let mime = mime.trim();
    Ok(((!mime.is_empty()).then_some(mime), payload.trim()))
}

/// Object key for an upload, per the configured key policy.
pub fn derive_object_key(name: Option<&str>, content_type: &str, options: &UploadOptions) -> String {
    let sanitized = name.map(sanitize_name).filter(|n| !n.is_empty());

    let key = match (sanitized, options.key_policy) {
        (Some(name), KeyPolicy::Name) => name,
        (Some(name), KeyPolicy::Unique) => format!("{}-{}", uuid::Uuid::new_v4(), name),
        (None, _) => generated_key(content_type),
    };

    format!("{}{}", options.key_prefix, key)
}

fn generated_key(content_type: &str) -> String {
    let id = uuid::Uuid::new_v4();
    match extension_for(content_type) {
        Some(ext) => format!("{id}.{ext}"),
        None => id.to_string(),
    }
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    let exts = mime_guess::get_mime_extensions_str(content_type)?;
    // Prefer the subtype itself ("jpeg" over "jfif") when it is a known extension.
    let subtype = content_type.split('/').nth(1).unwrap_or_default();
    exts.iter()
        .find(|ext| ext.eq_ignore_ascii_case(subtype))
        .or_else(|| exts.first())
        .copied()
}

/// Final path component, trimmed, with anything outside `[A-Za-z0-9._-]`
/// replaced by `-` and leading dots removed.
pub fn sanitize_name(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

/// Decode and store one upload. The only side effect is the bucket write;
/// the metadata record follows from the storage event.
pub async fn create_photo(
    store: &dyn PhotoStore,
    options: &UploadOptions,
    request: UploadRequest,
) -> Result<StoredPhoto, PhotoError> {
    let upload = decode_upload(&request, options)?;
    let size = upload.bytes.len();

    store
        .put_photo(&upload.key, &upload.content_type, upload.bytes)
        .await?;

    Ok(StoredPhoto {
        key: upload.key,
        bucket: store.bucket().to_string(),
        content_type: upload.content_type,
        size,
    })
}
