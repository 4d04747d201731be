use lambda_http::{http::StatusCode, Body, Error as LambdaError, Response};

use super::service::{list_records, RecordTable};
use crate::response;

/// HTTP Handler: GET /photos
pub async fn list_photos_handler(table: &dyn RecordTable) -> Result<Response<Body>, LambdaError> {
    match list_records(table).await {
        Ok(records) => {
            tracing::info!("Listed {} records from table={}", records.len(), table.table_name());
            response::json(StatusCode::OK, &records)
        }
        Err(e) => {
            tracing::error!("Failed to scan table {}: {}", table.table_name(), e);
            response::error(&e)
        }
    }
}
