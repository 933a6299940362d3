//! Currency formatting for a zero-decimal currency.
//!
//! Amounts are whole units (`u64`); no fractional part is ever rendered.

use serde::{Deserialize, Serialize};

/// Prefix and digit grouping used to print amounts.
///
/// The default matches Indonesian rupiah as printed by the shop's browser
/// locale: `Rp 1.250.000`.
///
/// ## Example
///
/// ```
/// use struk::receipt::CurrencyFormat;
///
/// let rupiah = CurrencyFormat::default();
/// assert_eq!(rupiah.format(50_000), "Rp 50.000");
/// assert_eq!(rupiah.format(999), "Rp 999");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyFormat {
    /// Text placed before the digits, including any trailing space
    pub prefix: String,
    /// Thousands separator
    pub separator: char,
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self {
            prefix: "Rp ".to_string(),
            separator: '.',
        }
    }
}

impl CurrencyFormat {
    pub fn format(&self, amount: u64) -> String {
        format!("{}{}", self.prefix, group_digits(amount, self.separator))
    }
}

/// Group the decimal digits of `value` in threes from the right.
pub fn group_digits(value: u64, separator: char) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(ch);
    }
    out
}
