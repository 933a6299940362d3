//! # Error Types
//!
//! This module defines the error type shared by the encoder, the device
//! session, the print pipeline and the facade.
//!
//! ## Taxonomy
//!
//! | Variant | Raised by | Retry |
//! |---------|-----------|-------|
//! | `PlatformUnsupported` | session, before discovery | no |
//! | `ConnectionFailed` | discovery, link, enumeration | `connect()` again |
//! | `NoWritableCharacteristic` | service enumeration | `connect()` again |
//! | `NotConnected` | pipeline, before the first write | connect first |
//! | `WriteFailed` | a single transmission | reprint the receipt |
//! | `Timeout` | connect/write with a configured deadline | yes |
//!
//! A device-initiated disconnect is not an error: it is a session state
//! transition, and an in-flight print notices it as `WriteFailed`.

use thiserror::Error;

/// Main error type for printer operations
#[derive(Debug, Error)]
pub enum PrinterError {
    /// The host has no usable Bluetooth stack
    #[error("Bluetooth is not supported on this platform: {0}")]
    PlatformUnsupported(String),

    /// Discovery was cancelled, or the link could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The device exposes no characteristic accepting writes
    #[error("Connection failed: no writable characteristic found")]
    NoWritableCharacteristic,

    /// A print was requested without an active session
    #[error("Printer is not connected")]
    NotConnected,

    /// A single byte transmission failed
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// A connect or write exceeded its configured deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid command parameter
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Invalid or unreadable configuration
    #[error("Invalid config: {0}")]
    Config(String),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discriminant of [`PrinterError`], cheap to compare and log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PlatformUnsupported,
    ConnectionFailed,
    NoWritableCharacteristic,
    NotConnected,
    WriteFailed,
    Timeout,
    InvalidCommand,
    Config,
    Io,
}

impl PrinterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PlatformUnsupported(_) => ErrorKind::PlatformUnsupported,
            Self::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            Self::NoWritableCharacteristic => ErrorKind::NoWritableCharacteristic,
            Self::NotConnected => ErrorKind::NotConnected,
            Self::WriteFailed(_) => ErrorKind::WriteFailed,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::InvalidCommand(_) => ErrorKind::InvalidCommand,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether calling `connect()` again can reasonably succeed.
    ///
    /// `PlatformUnsupported` needs different hardware or host; configuration
    /// and command errors need a code or config change.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::PlatformUnsupported(_) | Self::InvalidCommand(_) | Self::Config(_)
        )
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrinterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(PrinterError::NotConnected.kind(), ErrorKind::NotConnected);
        assert_eq!(
            PrinterError::WriteFailed("gone".into()).kind(),
            ErrorKind::WriteFailed
        );
        assert_eq!(
            PrinterError::NoWritableCharacteristic.kind(),
            ErrorKind::NoWritableCharacteristic
        );
    }

    #[test]
    fn test_platform_unsupported_is_not_retryable() {
        assert!(!PrinterError::PlatformUnsupported("no adapter".into()).is_retryable());
        assert!(PrinterError::ConnectionFailed("cancelled".into()).is_retryable());
        assert!(PrinterError::NoWritableCharacteristic.is_retryable());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            PrinterError::NotConnected.to_string(),
            "Printer is not connected"
        );
        assert_eq!(
            PrinterError::WriteFailed("link lost".into()).to_string(),
            "Write failed: link lost"
        );
    }
}
