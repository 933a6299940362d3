//! # Fixed-Width Receipt Layout
//!
//! Renders a [`ReceiptDocument`] into plain text lines for a printer with a
//! fixed number of character columns (32 on 58mm paper with font A).
//!
//! ## Layout
//!
//! ```text
//! STAR VAPE                        store name
//! Jl. RS. Fatmawati Raya No.1      header lines (truncated to width)
//! --------------------------------
//! No: TRX1737374400000             transaction info
//! Tgl: 20/1/2026, 12.00.00
//! --------------------------------
//! Pod Kit                          item name (truncated to width - 2)
//! 2 x Rp 50.000         Rp 100.000 quantity x price ... subtotal
//! --------------------------------
//! TOTAL                 Rp 100.000
//! Bayar: Tunai (Cash)
//! --------------------------------
//! Terima kasih atas kunjungan Anda footer lines (truncated to width)
//! ~ STAR VAPE ~                    signature
//! ```
//!
//! Widths are counted in Unicode scalar values. Formatting is pure: the same
//! document and width always give the same lines.

use super::{CurrencyFormat, ReceiptDocument};

/// Character columns on 58mm paper.
pub const DEFAULT_LINE_WIDTH: usize = 32;

/// Timestamp layout of the `id-ID` locale: unpadded day and month, dotted time.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%-d/%-m/%Y, %H.%M.%S";

/// A formatted receipt, split into the sections the print pipeline styles
/// differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLayout {
    pub width: usize,
    /// `width` dashes
    pub separator: String,
    pub store_name: Option<String>,
    pub header_lines: Vec<String>,
    pub info_lines: Vec<String>,
    /// Two lines per item: name, then quantity/price and subtotal
    pub item_lines: Vec<String>,
    pub total_line: String,
    pub payment_line: String,
    pub footer_lines: Vec<String>,
    pub signature: Option<String>,
}

impl ReceiptLayout {
    /// All lines in print order, separators included.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        out.extend(self.store_name.iter().cloned());
        out.extend(self.header_lines.iter().cloned());
        out.push(self.separator.clone());
        out.extend(self.info_lines.iter().cloned());
        out.push(self.separator.clone());
        out.extend(self.item_lines.iter().cloned());
        out.push(self.separator.clone());
        out.push(self.total_line.clone());
        out.push(self.payment_line.clone());
        out.push(self.separator.clone());
        out.extend(self.footer_lines.iter().cloned());
        out.extend(self.signature.iter().cloned());
        out
    }
}

/// Formatter settings. [`Default`] gives 32 columns and rupiah.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptFormatter {
    pub width: usize,
    pub currency: CurrencyFormat,
    pub timestamp_format: String,
}

impl Default for ReceiptFormatter {
    fn default() -> Self {
        Self::with_width(DEFAULT_LINE_WIDTH)
    }
}

impl ReceiptFormatter {
    pub fn with_width(width: usize) -> Self {
        Self {
            width,
            currency: CurrencyFormat::default(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }

    pub fn layout(&self, doc: &ReceiptDocument) -> ReceiptLayout {
        let width = self.width;

        let mut header = doc.store_header_lines.iter().map(|l| truncate(l, width));
        let store_name = header.next();
        let header_lines = header.collect();

        let info_lines = vec![
            format!("No: {}", doc.transaction_id),
            format!("Tgl: {}", doc.timestamp.format(&self.timestamp_format)),
        ];

        let name_width = width.saturating_sub(2);
        let mut item_lines = Vec::with_capacity(doc.line_items.len() * 2);
        for item in &doc.line_items {
            item_lines.push(truncate(&item.name, name_width));
            let qty = format!("{} x {}", item.quantity, self.currency.format(item.unit_price));
            let subtotal = self.currency.format(item.subtotal());
            item_lines.push(pad_between(&qty, &subtotal, width));
        }

        ReceiptLayout {
            width,
            separator: "-".repeat(width),
            store_name,
            header_lines,
            info_lines,
            item_lines,
            total_line: pad_between("TOTAL", &self.currency.format(doc.total), width),
            payment_line: format!("Bayar: {}", doc.payment_method_label),
            footer_lines: doc.footer_lines.iter().map(|l| truncate(l, width)).collect(),
            signature: doc.signature_line.as_deref().map(|l| truncate(l, width)),
        }
    }

    pub fn format(&self, doc: &ReceiptDocument) -> Vec<String> {
        self.layout(doc).lines()
    }
}

/// Sectioned layout with default currency and timestamp settings.
pub fn layout_receipt(doc: &ReceiptDocument, width: usize) -> ReceiptLayout {
    ReceiptFormatter::with_width(width).layout(doc)
}

/// Receipt text lines with default currency and timestamp settings.
///
/// ## Example
///
/// ```
/// use chrono::NaiveDate;
/// use struk::receipt::{ReceiptDocument, ReceiptLineItem, Sale, StoreProfile, format_receipt};
///
/// let sale = Sale {
///     items: vec![ReceiptLineItem::new("Pod Kit", 2, 50_000)],
///     total: 100_000,
///     transaction_id: "TRX1".into(),
///     payment_method: "cash".parse().unwrap(),
/// };
/// let at = NaiveDate::from_ymd_opt(2026, 1, 20).unwrap().and_hms_opt(12, 0, 0).unwrap();
/// let doc = ReceiptDocument::from_sale(&StoreProfile::default(), &sale, at);
///
/// let lines = format_receipt(&doc, 32);
/// assert!(lines.contains(&"TOTAL                 Rp 100.000".to_string()));
/// ```
pub fn format_receipt(doc: &ReceiptDocument, width: usize) -> Vec<String> {
    layout_receipt(doc, width).lines()
}

/// Keep at most `max` characters of `s`.
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Left text, right text, and spaces between them filling `width`.
///
/// At least one space always separates the two; when they don't fit, the
/// line grows past `width` rather than cutting either side.
pub fn pad_between(left: &str, right: &str, width: usize) -> String {
    let used = left.chars().count() + right.chars().count();
    let spaces = width.saturating_sub(used).max(1);
    format!("{}{}{}", left, " ".repeat(spaces), right)
}
