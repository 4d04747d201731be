use lambda_http::{http::Method, Body, Error, Request, Response};
use photo_atoms::{photos, response};
use photo_shared::routing::last_segment;
use photo_shared::UploadState;
use std::sync::Arc;

/// Create Lambda handler - POST /photo stores an upload in the photo bucket
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<UploadState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    tracing::info!("Create Lambda invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == Method::OPTIONS {
        return response::preflight();
    }

    match (method, last_segment(path)) {
        (&Method::POST, "photo") => {
            photos::create_photo_handler(state.store.as_ref(), &state.upload, event.body()).await
        }
        (_, "photo") => response::method_not_allowed(),
        _ => {
            tracing::warn!("No route matched - Method: {} Path: {}", method, path);
            response::not_found()
        }
    }
}
