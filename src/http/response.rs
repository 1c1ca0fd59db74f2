//! Client-facing responses.
//!
//! - Backend answers are forwarded with the backend's status and the filtered body
//! - Gateway errors become `{error, message, request_id}` with the mapped status
//! - Every response carries `x-request-id`

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::GatewayError;
use crate::pipeline::{ForwardedResponse, PipelineOutcome};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Error payload returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub request_id: Uuid,
}

impl IntoResponse for PipelineOutcome {
    fn into_response(self) -> Response {
        let request_id = self.request_id;
        let response = match self.result {
            Ok(forwarded) => forwarded_response(forwarded),
            Err(err) => error_response(&err, request_id),
        };
        with_request_id(response, request_id)
    }
}

fn forwarded_response(forwarded: ForwardedResponse) -> Response {
    let status = StatusCode::from_u16(forwarded.status).unwrap_or(StatusCode::BAD_GATEWAY);
    match forwarded.body {
        Value::String(text) => (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            text,
        )
            .into_response(),
        body => (status, Json(body)).into_response(),
    }
}

pub fn error_response(err: &GatewayError, request_id: Uuid) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorBody {
        error: err.kind.as_str(),
        message: err.user_message(),
        request_id,
    };
    with_request_id((status, Json(body)).into_response(), request_id)
}

pub fn with_request_id(mut response: Response, request_id: Uuid) -> Response {
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}
