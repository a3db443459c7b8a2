//! Error-to-response mapping and the single fault envelope.
//!
//! Every failure leaves the server in the same JSON shape, whether it came
//! from a handler returning an error or from a panic caught at the pipeline
//! boundary. The boundary learns about handler-produced faults through a
//! [`FaultMarker`] response extension instead of a second reporting path.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Stamped onto a response by [`ApiError::into_response`] so the fault
/// boundary can log the failure exactly once, with the request context.
#[derive(Debug, Clone)]
pub struct FaultMarker(pub String);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Error - {0}")]
    BadRequest(String),

    #[error("Error - authentication required")]
    Unauthorized,

    #[error("Error - {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let mut response = (
            self.status(),
            Json(json!({ "error": true, "errorMsg": message })),
        )
            .into_response();
        response.extensions_mut().insert(FaultMarker(message));
        response
    }
}

/// Envelope for faults that never produced a response (panics and other
/// escapes caught at the boundary). `detail` carries the verbose cause in
/// development deployments only.
pub fn fault_response(message: &str, detail: Option<String>) -> Response {
    let mut body = json!({ "error": true, "errorMsg": format!("Error - {message}") });
    if let Some(detail) = detail {
        body["detail"] = json!(detail);
    }
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}
