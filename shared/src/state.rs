use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use photo_atoms::photos::{PhotoStore, S3PhotoStore, UploadOptions};
use photo_atoms::records::{DynamoRecordTable, RecordTable};

use crate::config::{ConfigError, PhotoStoreConfig, RecordTableConfig};

/// Everything the create function needs, built once per cold start.
pub struct UploadState {
    pub store: Box<dyn PhotoStore>,
    pub upload: UploadOptions,
}

impl UploadState {
    pub fn new(store: impl PhotoStore + 'static, upload: UploadOptions) -> Self {
        Self {
            store: Box::new(store),
            upload,
        }
    }

    /// Read `BUCKET` and friends, then wire an S3 client to them.
    pub async fn from_env() -> Result<Self, ConfigError> {
        let config = PhotoStoreConfig::from_env()?;
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        tracing::info!(
            "Upload state ready: bucket={}, key_policy={:?}, key_prefix={:?}, max_upload_bytes={}",
            config.bucket,
            config.upload.key_policy,
            config.upload.key_prefix,
            config.upload.max_upload_bytes
        );
        let store = S3PhotoStore::new(S3Client::new(&sdk_config), config.bucket);
        Ok(Self::new(store, config.upload))
    }
}

/// Everything the register and list functions need.
pub struct TableState {
    pub table: Box<dyn RecordTable>,
}

impl TableState {
    pub fn new(table: impl RecordTable + 'static) -> Self {
        Self {
            table: Box::new(table),
        }
    }

    /// Read `TABLE_NAME`, then wire a DynamoDB client to it.
    pub async fn from_env() -> Result<Self, ConfigError> {
        let config = RecordTableConfig::from_env()?;
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        tracing::info!("Table state ready: table={}", config.table_name);
        Ok(Self::new(DynamoRecordTable::new(
            DynamoClient::new(&sdk_config),
            config.table_name,
        )))
    }
}
