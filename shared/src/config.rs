use photo_atoms::photos::{KeyPolicy, UploadOptions};
use photo_atoms::photos::model::DEFAULT_MAX_UPLOAD_BYTES;
use std::env;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration for the create function, read once at cold start.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoStoreConfig {
    pub bucket: String,
    pub upload: UploadOptions,
}

impl PhotoStoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bucket = required(&lookup, "BUCKET")?;

        let key_policy = match lookup("KEY_POLICY").filter(|v| !v.trim().is_empty()) {
            Some(value) => value.parse::<KeyPolicy>().map_err(|e| ConfigError::Invalid {
                var: "KEY_POLICY",
                reason: e.to_string(),
                value,
            })?,
            None => KeyPolicy::default(),
        };

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES").filter(|v| !v.trim().is_empty()) {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "MAX_UPLOAD_BYTES",
                        value,
                        reason: "expected a positive byte count".to_string(),
                    })
                }
            },
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            bucket,
            upload: UploadOptions {
                key_policy,
                key_prefix: lookup("KEY_PREFIX").unwrap_or_default(),
                max_upload_bytes,
            },
        })
    }
}

/// Configuration for the register and list functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTableConfig {
    pub table_name: String,
}

impl RecordTableConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            table_name: required(&lookup, "TABLE_NAME")?,
        })
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<String, ConfigError> {
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(var))
}
