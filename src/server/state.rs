//! Server state and configuration.

use crate::printer::PrinterService;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8080")
    pub listen_addr: String,
}

/// Application state shared across handlers.
pub struct AppState {
    /// The process-wide printer; handlers never build their own
    pub printer: PrinterService,
}

impl AppState {
    pub fn new(printer: PrinterService) -> Self {
        Self { printer }
    }
}
