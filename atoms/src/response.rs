use lambda_http::{http::StatusCode, Body, Error as LambdaError, Response};
use serde::Serialize;

use crate::error::PhotoError;

/// JSON response with the permissive CORS headers every route carries.
pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Result<Response<Body>, LambdaError> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "OPTIONS,POST,GET")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

pub fn error(err: &PhotoError) -> Result<Response<Body>, LambdaError> {
    json(err.status_code(), &err.to_json())
}

/// CORS preflight answer.
pub fn preflight() -> Result<Response<Body>, LambdaError> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Access-Control-Allow-Headers", "*")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "OPTIONS,POST,GET")
        .body(Body::Empty)
        .map_err(Box::new)?)
}

pub fn not_found() -> Result<Response<Body>, LambdaError> {
    error(&PhotoError::not_found("no such route"))
}

pub fn method_not_allowed() -> Result<Response<Body>, LambdaError> {
    json(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({"error": "method_not_allowed", "message": "Method not allowed"}),
    )
}
