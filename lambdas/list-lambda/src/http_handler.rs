use lambda_http::{http::Method, Body, Error, Request, Response};
use photo_atoms::{records, response};
use photo_shared::routing::last_segment;
use photo_shared::TableState;
use std::sync::Arc;

/// List Lambda handler - GET /photos returns every metadata record
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<TableState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    tracing::info!("List Lambda invoked - Method: {} Path: {}", method, path);

    if method == Method::OPTIONS {
        return response::preflight();
    }

    // The list method also hangs off the /photo resource in the API.
    match (method, last_segment(path)) {
        (&Method::GET, "photos" | "photo") => records::list_photos_handler(state.table.as_ref()).await,
        (_, "photos" | "photo") => response::method_not_allowed(),
        _ => {
            tracing::warn!("No route matched - Method: {} Path: {}", method, path);
            response::not_found()
        }
    }
}
