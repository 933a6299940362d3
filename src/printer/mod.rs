//! # Printer Module
//!
//! Everything between the point-of-sale UI and the physical printer.
//!
//! ## Modules
//!
//! - [`config`]: Paper, timing, discovery and shop settings
//! - [`session`]: The single device session and its connection state machine
//! - [`pipeline`]: Receipt to ordered writes, executed against the session
//! - [`service`]: The shared facade the UI talks to

pub mod config;
pub mod pipeline;
pub mod service;
pub mod session;

pub use config::{KNOWN_PRINTER_SERVICES, PrinterConfig};
pub use pipeline::{PrintJob, PrintPipeline, Step};
pub use service::{PrinterService, PrinterStatus};
pub use session::{DeviceSession, SessionState};
