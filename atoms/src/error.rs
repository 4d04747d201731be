use lambda_http::http::StatusCode;
use thiserror::Error;

/// Error kinds surfaced by the photo operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhotoError {
    /// The caller sent something we cannot act on.
    #[error("invalid request: {0}")]
    Validation(String),

    /// S3 or DynamoDB rejected or failed the call.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl PhotoError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Stable machine-readable kind, used as the `error` field of JSON bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::NotFound(_) => "not_found",
        }
    }

    /// `{ "error": <kind>, "message": <text> }`
    pub fn to_json(&self) -> serde_json::Value {
        let message = match self {
            Self::Validation(m) | Self::StorageUnavailable(m) | Self::NotFound(m) => m,
        };
        serde_json::json!({ "error": self.kind(), "message": message })
    }
}

impl From<serde_json::Error> for PhotoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("malformed JSON body: {err}"))
    }
}

impl From<base64::DecodeError> for PhotoError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Validation(format!("fileAsBase64 is not valid base64: {err}"))
    }
}
