//! Runtime glue shared by the photo Lambda binaries: configuration,
//! AWS client bootstrap and path routing.

pub mod config;
pub mod routing;
pub mod state;

pub use config::{ConfigError, PhotoStoreConfig, RecordTableConfig};
pub use state::{TableState, UploadState};
