use lambda_http::{http::StatusCode, Body, Error as LambdaError, Response};

use super::model::{UploadOptions, UploadRequest};
use super::service::{create_photo, PhotoStore};
use crate::error::PhotoError;
use crate::response;

/// HTTP Handler: POST /photo
pub async fn create_photo_handler(
    store: &dyn PhotoStore,
    options: &UploadOptions,
    body: &[u8],
) -> Result<Response<Body>, LambdaError> {
    let request: UploadRequest = match serde_json::from_slice(body) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!("Rejected upload body: {}", e);
            return response::error(&PhotoError::from(e));
        }
    };

    tracing::info!(
        "Upload received: bucket={}, name={:?}, type={:?}, encoded_len={}",
        store.bucket(),
        request.name,
        request.content_type,
        request.file_as_base64.len(),
    );

    match create_photo(store, options, request).await {
        Ok(stored) => {
            tracing::info!(
                "Stored photo: bucket={}, key={}, size={}",
                stored.bucket,
                stored.key,
                stored.size
            );
            response::json(StatusCode::OK, &stored)
        }
        Err(e @ PhotoError::Validation(_)) => {
            tracing::warn!("Rejected upload: {}", e);
            response::error(&e)
        }
        Err(e) => {
            tracing::error!("Failed to store photo in bucket {}: {}", store.bucket(), e);
            response::error(&e)
        }
    }
}
