//! HTTP handlers for the server.

pub mod printer;
pub mod receipt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::{ErrorKind, PrinterError};

/// HTTP status for a printer failure.
pub fn status_for(error: &PrinterError) -> StatusCode {
    match error.kind() {
        ErrorKind::PlatformUnsupported => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::NotConnected => StatusCode::CONFLICT,
        ErrorKind::ConnectionFailed | ErrorKind::NoWritableCharacteristic => StatusCode::BAD_GATEWAY,
        ErrorKind::WriteFailed | ErrorKind::Io => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::InvalidCommand | ErrorKind::Config => StatusCode::BAD_REQUEST,
    }
}

/// Generate error response JSON.
pub fn error_response(error: &PrinterError) -> Response {
    (
        status_for(error),
        Json(json!({
            "success": false,
            "error": error.to_string(),
            "retryable": error.is_retryable(),
        })),
    )
        .into_response()
}
