//! # Struk - Bluetooth Receipt Printing
//!
//! Struk prints point-of-sale receipts on 58mm ESC/POS thermal printers over
//! Bluetooth. It provides:
//!
//! - **Protocol**: the ESC/POS commands a receipt needs, as bytes
//! - **Receipt layout**: fixed-width text lines from a sale
//! - **Device session**: discovery, channel selection, link-loss handling
//! - **Print pipeline**: the ordered writes for one receipt
//! - **Service**: one shared printer handle with status for the UI
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::Local;
//! use struk::{
//!     printer::{PrinterConfig, PrinterService},
//!     receipt::demo_sale,
//!     transport::RfcommAdapter,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), struk::PrinterError> {
//! // One service per process
//! let printer = PrinterService::new(
//!     Arc::new(RfcommAdapter::new("/dev/rfcomm0")),
//!     &PrinterConfig::default(),
//! )?;
//!
//! printer.connect().await?;
//! printer.print_sale(&demo_sale(&Local::now())).await?;
//! println!("{:?}", printer.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | ESC/POS command encoder and text encodings |
//! | [`receipt`] | Sale data model and line formatter |
//! | [`transport`] | Bluetooth seam, RFCOMM and mock backends |
//! | [`printer`] | Config, device session, print pipeline, service |
//! | [`server`] | JSON API for the POS screen |
//! | [`error`] | Error types |
//!
//! ## Supported Printers
//!
//! Tested against the common 58mm clones (RPP02N, MTP-II) that expose
//! service `18F0` or an ISSC transparent UART. Other ESC/POS printers with
//! a writable characteristic should work.

pub mod error;
pub mod printer;
pub mod protocol;
pub mod receipt;
pub mod server;
pub mod transport;

// Re-exports for convenience
pub use error::{PrintResult, PrinterError};
pub use printer::{PrinterConfig, PrinterService, PrinterStatus};
pub use receipt::{ReceiptDocument, ReceiptLineItem, format_receipt};
pub use transport::{MockAdapter, RfcommAdapter};
