//! # Text Encoding
//!
//! Turns receipt lines into the bytes sent between ESC/POS commands.
//!
//! Most 58mm printers boot into code page 437, where ASCII passes through
//! unchanged and the upper half holds accented Latin letters, box drawing
//! and a few symbols. UTF-8 output prints correctly for pure ASCII receipts
//! and is the default.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// How text is converted to printer bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// Raw UTF-8 bytes
    #[default]
    Utf8,
    /// IBM code page 437, unmapped characters become `?`
    Cp437,
}

impl TextEncoding {
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Cp437 => encode_cp437(text),
        }
    }
}

/// Code page 437 bytes 0x80..=0xFF, in byte order.
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{00A0}',
];

/// Encode a string as CP437 bytes.
pub fn encode_cp437(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| {
            if ch.is_ascii() {
                return ch as u8;
            }
            match CP437_HIGH.iter().position(|&c| c == ch) {
                Some(index) => 0x80 + index as u8,
                None => {
                    warn!(character = %ch, codepoint = ch as u32, "no CP437 mapping, printing '?'");
                    b'?'
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_is_passthrough() {
        assert_eq!(TextEncoding::Utf8.encode("Kopi é"), "Kopi é".as_bytes());
    }

    #[test]
    fn test_cp437_ascii_passthrough() {
        assert_eq!(encode_cp437("TOTAL Rp 1.000"), b"TOTAL Rp 1.000".to_vec());
    }

    #[test]
    fn test_cp437_upper_half() {
        assert_eq!(encode_cp437("Ç"), vec![0x80]);
        assert_eq!(encode_cp437("é"), vec![0x82]);
        assert_eq!(encode_cp437("─"), vec![0xC4]);
        assert_eq!(encode_cp437("\u{00A0}"), vec![0xFF]);
    }

    #[test]
    fn test_cp437_unmapped_becomes_question_mark() {
        assert_eq!(encode_cp437("a€b"), vec![b'a', b'?', b'b']);
    }

    #[test]
    fn test_table_has_no_duplicates() {
        for (i, a) in CP437_HIGH.iter().enumerate() {
            assert!(!CP437_HIGH[i + 1..].contains(a), "duplicate {:?}", a);
        }
    }

    #[test]
    fn test_serde_names() {
        let enc: TextEncoding = serde_json::from_str("\"cp437\"").unwrap();
        assert_eq!(enc, TextEncoding::Cp437);
    }
}
