//! # HTTP Server for the Point of Sale
//!
//! The POS screen talks to the printer through this JSON API.
//!
//! ## Usage
//!
//! ```bash
//! struk serve --listen 0.0.0.0:8080 --device /dev/rfcomm0
//! ```
//!
//! ## Routes
//!
//! | Method | Path | Body | Response |
//! |--------|------|------|----------|
//! | GET | `/api/printer/status` | | `PrinterStatus` |
//! | POST | `/api/printer/connect` | | `PrinterStatus` or error |
//! | POST | `/api/printer/disconnect` | | `PrinterStatus` |
//! | POST | `/api/printer/print` | receipt request | `{success, transaction_id, writes}` |
//! | POST | `/api/receipt/preview` | receipt request | `{width, lines}` |
//!
//! Errors come back as `{"success": false, "error": "...", "retryable": bool}`
//! with a status code matching the failure (409 when no printer is
//! connected).

mod handlers;
mod state;

pub use handlers::receipt::ReceiptRequest;
pub use state::ServerConfig;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::PrinterError;
use crate::printer::PrinterService;
use state::AppState;

/// The API routes bound to `printer`.
pub fn router(printer: PrinterService) -> Router {
    let app_state = Arc::new(AppState::new(printer));

    Router::new()
        // Printer API
        .route("/api/printer/status", get(handlers::printer::status))
        .route("/api/printer/connect", post(handlers::printer::connect))
        .route("/api/printer/disconnect", post(handlers::printer::disconnect))
        .route("/api/printer/print", post(handlers::receipt::print))
        // Receipt API
        .route("/api/receipt/preview", post(handlers::receipt::preview))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Start the HTTP server.
///
/// ## Example
///
/// ```no_run
/// use std::sync::Arc;
/// use struk::printer::{PrinterConfig, PrinterService};
/// use struk::server::{serve, ServerConfig};
/// use struk::transport::RfcommAdapter;
///
/// # async fn example() -> Result<(), struk::error::PrinterError> {
/// let printer = PrinterService::new(
///     Arc::new(RfcommAdapter::new("/dev/rfcomm0")),
///     &PrinterConfig::default(),
/// )?;
/// let config = ServerConfig {
///     listen_addr: "0.0.0.0:8080".to_string(),
/// };
///
/// serve(config, printer).await?;
/// # Ok(())
/// # }
/// ```
pub async fn serve(config: ServerConfig, printer: PrinterService) -> Result<(), PrinterError> {
    let listen_addr = config.listen_addr;
    let app = router(printer);

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| {
            PrinterError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", listen_addr, e),
            ))
        })?;

    info!(addr = %listen_addr, "struk HTTP server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
