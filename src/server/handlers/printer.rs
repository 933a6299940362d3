//! Connection handlers.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::super::state::AppState;
use super::error_response;
use crate::printer::PrinterStatus;

/// Handle GET /api/printer/status.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<PrinterStatus> {
    Json(state.printer.status())
}

/// Handle POST /api/printer/connect - pick and link a printer.
pub async fn connect(State(state): State<Arc<AppState>>) -> Response {
    match state.printer.connect().await {
        Ok(()) => Json(state.printer.status()).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle POST /api/printer/disconnect.
pub async fn disconnect(State(state): State<Arc<AppState>>) -> Json<PrinterStatus> {
    state.printer.disconnect().await;
    Json(state.printer.status())
}
