//! # ESC/POS Protocol Implementation
//!
//! Low-level, stateless building blocks for talking to thermal receipt
//! printers.
//!
//! ## Module Structure
//!
//! - [`commands`]: The printer directive set and its byte encodings
//! - [`encoding`]: Text to printer bytes (UTF-8 or code page 437)
//!
//! ## Usage Example
//!
//! ```
//! use struk::protocol::{PrinterCommand, TextEncoding, encode_all};
//!
//! let mut data = encode_all(&[PrinterCommand::Initialize, PrinterCommand::AlignCenter]);
//! data.extend(TextEncoding::Utf8.encode("RECEIPT"));
//! data.extend(PrinterCommand::FeedLine.encode());
//! data.extend(PrinterCommand::CutPaper.encode());
//! assert_eq!(&data[..2], &[0x1B, 0x40]);
//! ```

pub mod commands;
pub mod encoding;

pub use commands::{MAX_FEED_LINES, PrinterCommand, encode_all};
pub use encoding::TextEncoding;
