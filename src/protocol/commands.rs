//! # ESC/POS Commands
//!
//! The closed set of printer directives used by the receipt pipeline and
//! their byte encodings.
//!
//! ## Escape Sequence Structure
//!
//! - Single byte: `LF`
//! - Two bytes: `ESC @`
//! - Three bytes with a parameter: `ESC a n`, `ESC E n`, `GS ! n`, `ESC d n`
//!
//! ## Byte Table
//!
//! | Command | Hex |
//! |---------|-----|
//! | Initialize | 1B 40 |
//! | AlignLeft | 1B 61 00 |
//! | AlignCenter | 1B 61 01 |
//! | AlignRight | 1B 61 02 |
//! | BoldOn | 1B 45 01 |
//! | BoldOff | 1B 45 00 |
//! | DoubleHeightOn | 1D 21 10 |
//! | DoubleHeightOff | 1D 21 00 |
//! | FontSmall | 1B 4D 01 |
//! | FontNormal | 1B 4D 00 |
//! | FeedLine | 0A |
//! | FeedLines(n) | 1B 64 n |
//! | CutPaper | 1D 56 00 |
//!
//! These bytes are what the cheap 58mm Bluetooth printers sold for small
//! shops understand; they must not change.

use crate::error::{PrintResult, PrinterError};

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
pub const GS: u8 = 0x1D;

/// LF (Line Feed) - Print the line buffer and advance one line
pub const LF: u8 = 0x0A;

/// Largest repeat count `ESC d n` accepts.
pub const MAX_FEED_LINES: usize = 255;

/// A single printer directive.
///
/// Each variant maps to one fixed byte sequence via [`PrinterCommand::encode`].
/// `FeedLines` carries its repeat count as a `u8`, so every value of this
/// type is encodable; range checking happens in [`PrinterCommand::feed_lines`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterCommand {
    /// Reset the printer to its power-on state (ESC @)
    Initialize,
    AlignLeft,
    AlignCenter,
    AlignRight,
    BoldOn,
    BoldOff,
    /// Double character height (GS ! 0x10)
    DoubleHeightOn,
    DoubleHeightOff,
    /// Font B, the condensed font (ESC M 1)
    FontSmall,
    FontNormal,
    /// Print and advance one line (LF)
    FeedLine,
    /// Print and advance n lines (ESC d n)
    FeedLines(u8),
    /// Full cut (GS V 0)
    CutPaper,
}

impl PrinterCommand {
    /// Every fixed-parameter command, in table order.
    pub const ALL_FIXED: [PrinterCommand; 12] = [
        Self::Initialize,
        Self::AlignLeft,
        Self::AlignCenter,
        Self::AlignRight,
        Self::BoldOn,
        Self::BoldOff,
        Self::DoubleHeightOn,
        Self::DoubleHeightOff,
        Self::FontSmall,
        Self::FontNormal,
        Self::FeedLine,
        Self::CutPaper,
    ];

    /// Build a `FeedLines` command, rejecting counts above [`MAX_FEED_LINES`].
    ///
    /// ## Example
    ///
    /// ```
    /// use struk::protocol::PrinterCommand;
    ///
    /// let feed = PrinterCommand::feed_lines(4).unwrap();
    /// assert_eq!(feed.encode(), vec![0x1B, 0x64, 4]);
    /// assert!(PrinterCommand::feed_lines(256).is_err());
    /// ```
    pub fn feed_lines(n: usize) -> PrintResult<Self> {
        u8::try_from(n).map(Self::FeedLines).map_err(|_| {
            PrinterError::InvalidCommand(format!(
                "feed count {} exceeds maximum of {}",
                n, MAX_FEED_LINES
            ))
        })
    }

    /// Encode this command as raw ESC/POS bytes.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            Self::Initialize => vec![ESC, b'@'],
            Self::AlignLeft => vec![ESC, b'a', 0x00],
            Self::AlignCenter => vec![ESC, b'a', 0x01],
            Self::AlignRight => vec![ESC, b'a', 0x02],
            Self::BoldOn => vec![ESC, b'E', 0x01],
            Self::BoldOff => vec![ESC, b'E', 0x00],
            Self::DoubleHeightOn => vec![GS, b'!', 0x10],
            Self::DoubleHeightOff => vec![GS, b'!', 0x00],
            Self::FontSmall => vec![ESC, b'M', 0x01],
            Self::FontNormal => vec![ESC, b'M', 0x00],
            Self::FeedLine => vec![LF],
            Self::FeedLines(n) => vec![ESC, b'd', n],
            Self::CutPaper => vec![GS, b'V', 0x00],
        }
    }
}

/// Concatenate the encodings of several commands.
pub fn encode_all(commands: &[PrinterCommand]) -> Vec<u8> {
    commands.iter().flat_map(PrinterCommand::encode).collect()
}
