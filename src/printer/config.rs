//! # Printer Configuration
//!
//! Paper, timing, discovery and shop settings for one receipt printer.
//!
//! ## Defaults
//!
//! | Setting | Default |
//! |---------|---------|
//! | `line_width` | 32 columns (58mm paper, font A) |
//! | `settle_delay_ms` | 100 ms after `ESC @` |
//! | `feed_lines` | 4 before the cut |
//! | `service_uuids` | [`KNOWN_PRINTER_SERVICES`] |
//! | `connect_timeout_ms` / `write_timeout_ms` | unset (transport decides) |
//! | `encoding` | UTF-8 |
//!
//! ## Loading
//!
//! ```no_run
//! use struk::printer::PrinterConfig;
//!
//! let config = PrinterConfig::from_file("printer.json")?;
//! println!("{} columns", config.line_width);
//! # Ok::<(), struk::error::PrinterError>(())
//! ```
//!
//! Missing keys take their default, so a file holding only
//! `{"store": {"name": "TOKO BARU"}}` is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{PrintResult, PrinterError};
use crate::protocol::{MAX_FEED_LINES, TextEncoding};
use crate::receipt::{
    CurrencyFormat, DEFAULT_LINE_WIDTH, DEFAULT_TIMESTAMP_FORMAT, ReceiptFormatter, StoreProfile,
};

/// GATT services advertised by common Bluetooth thermal printers.
///
/// No single identifier covers every vendor, so discovery offers all of
/// them.
pub const KNOWN_PRINTER_SERVICES: [Uuid; 3] = [
    // Generic "printer" service used by most 58mm clones
    Uuid::from_u128(0x000018f0_0000_1000_8000_00805f9b34fb),
    Uuid::from_u128(0xe7810a71_73ae_499d_8c15_faa9aef0c3f2),
    // Microchip ISSC transparent UART
    Uuid::from_u128(0x49535343_fe7d_4ae5_8fa9_9fafd205e455),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    /// Character columns per line
    pub line_width: usize,
    /// Pause after initialize before the next write
    pub settle_delay_ms: u64,
    /// Blank lines fed before cutting
    pub feed_lines: usize,
    /// Services requested during discovery
    pub service_uuids: Vec<Uuid>,
    /// Deadline for discovery plus link setup
    pub connect_timeout_ms: Option<u64>,
    /// Deadline for each write
    pub write_timeout_ms: Option<u64>,
    pub encoding: TextEncoding,
    pub store: StoreProfile,
    pub currency: CurrencyFormat,
    /// chrono format string for the `Tgl:` line
    pub timestamp_format: String,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            line_width: DEFAULT_LINE_WIDTH,
            settle_delay_ms: 100,
            feed_lines: 4,
            service_uuids: KNOWN_PRINTER_SERVICES.to_vec(),
            connect_timeout_ms: None,
            write_timeout_ms: None,
            encoding: TextEncoding::Utf8,
            store: StoreProfile::default(),
            currency: CurrencyFormat::default(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl PrinterConfig {
    /// Read a JSON config file and validate it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> PrintResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            PrinterError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> PrintResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| PrinterError::Config(format!("Invalid JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PrintResult<()> {
        if self.line_width < 8 {
            return Err(PrinterError::Config(format!(
                "line_width {} is too narrow for a receipt",
                self.line_width
            )));
        }
        if self.feed_lines > MAX_FEED_LINES {
            return Err(PrinterError::Config(format!(
                "feed_lines {} exceeds {}",
                self.feed_lines, MAX_FEED_LINES
            )));
        }
        if self.service_uuids.is_empty() {
            return Err(PrinterError::Config(
                "service_uuids must name at least one service".to_string(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    #[inline]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    #[inline]
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }

    /// The formatter matching this printer's paper and locale settings.
    pub fn formatter(&self) -> ReceiptFormatter {
        ReceiptFormatter {
            width: self.line_width,
            currency: self.currency.clone(),
            timestamp_format: self.timestamp_format.clone(),
        }
    }
}
