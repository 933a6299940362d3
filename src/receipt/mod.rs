//! # Receipts
//!
//! The data a receipt is printed from, and the fixed-width formatter that
//! turns it into text lines.
//!
//! ```text
//! Sale (cart snapshot) + StoreProfile + timestamp
//!        │
//!        ▼
//! ReceiptDocument ──format──▶ ReceiptLayout ──lines()──▶ Vec<String>
//! ```
//!
//! A [`ReceiptDocument`] is built once per print and never mutated. The
//! formatter renders whatever it is given: it does not check that `total`
//! equals the sum of the line subtotals.

mod format;
mod money;

pub use format::{
    DEFAULT_LINE_WIDTH, DEFAULT_TIMESTAMP_FORMAT, ReceiptFormatter, ReceiptLayout, format_receipt,
    layout_receipt, pad_between, truncate,
};
pub use money::{CurrencyFormat, group_digits};

use chrono::{DateTime, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// One cart line at the moment of printing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLineItem {
    pub name: String,
    pub quantity: u32,
    /// Price per unit, in whole currency units
    #[serde(alias = "price")]
    pub unit_price: u64,
}

impl ReceiptLineItem {
    pub fn new(name: impl Into<String>, quantity: u32, unit_price: u64) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit_price,
        }
    }

    /// `quantity × unit_price`, saturating at `u64::MAX`.
    pub fn subtotal(&self) -> u64 {
        self.unit_price.saturating_mul(u64::from(self.quantity))
    }
}

/// How the customer paid.
///
/// Parsed from the POS payment codes; anything unrecognised is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Qris,
    Transfer,
    #[serde(other)]
    Other,
}

impl PaymentMethod {
    /// The label printed after `Bayar: `.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cash => "Tunai (Cash)",
            Self::Qris => "QRIS",
            Self::Transfer => "Transfer Bank",
            Self::Other => "Lainnya",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Qris => "qris",
            Self::Transfer => "transfer",
            Self::Other => "other",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "cash" => Self::Cash,
            "qris" => Self::Qris,
            "transfer" => Self::Transfer,
            _ => Self::Other,
        })
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Shop identity printed above and below the items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreProfile {
    /// Printed bold and double height
    pub name: String,
    /// Address and phone, printed in the small font
    pub address_lines: Vec<String>,
    /// Thank-you text, printed centered in the small font
    pub footer_lines: Vec<String>,
    /// Bold closing line
    pub signature: Option<String>,
}

impl Default for StoreProfile {
    fn default() -> Self {
        Self {
            name: "STAR VAPE".to_string(),
            address_lines: vec![
                "Jl. RS. Fatmawati Raya No.1".to_string(),
                "Pd. Labu, Cilandak, Jaksel".to_string(),
                "Telp: 0895-1446-5010".to_string(),
            ],
            footer_lines: vec![
                "Terima kasih atas kunjungan Anda!".to_string(),
                "Barang yang sudah dibeli".to_string(),
                "tidak dapat dikembalikan.".to_string(),
                String::new(),
            ],
            signature: Some("~ STAR VAPE ~".to_string()),
        }
    }
}

/// A completed sale as handed over by the checkout screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub items: Vec<ReceiptLineItem>,
    pub total: u64,
    pub transaction_id: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl Sale {
    /// Sum of the line subtotals, for callers that build a sale from a cart.
    pub fn items_total(items: &[ReceiptLineItem]) -> u64 {
        items
            .iter()
            .fold(0u64, |acc, item| acc.saturating_add(item.subtotal()))
    }
}

/// Everything printed on one receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiptDocument {
    /// Store name first, then address/phone lines
    pub store_header_lines: Vec<String>,
    pub transaction_id: String,
    pub timestamp: NaiveDateTime,
    pub line_items: Vec<ReceiptLineItem>,
    pub total: u64,
    pub payment_method_label: String,
    pub footer_lines: Vec<String>,
    pub signature_line: Option<String>,
}

impl ReceiptDocument {
    /// Build the document for `sale` under `store`'s header and footer.
    pub fn from_sale(store: &StoreProfile, sale: &Sale, timestamp: NaiveDateTime) -> Self {
        let mut store_header_lines = Vec::with_capacity(1 + store.address_lines.len());
        store_header_lines.push(store.name.clone());
        store_header_lines.extend(store.address_lines.iter().cloned());

        Self {
            store_header_lines,
            transaction_id: sale.transaction_id.clone(),
            timestamp,
            line_items: sale.items.clone(),
            total: sale.total,
            payment_method_label: sale.payment_method.label().to_string(),
            footer_lines: store.footer_lines.clone(),
            signature_line: store.signature.clone(),
        }
    }
}

/// Transaction id in the POS's `TRX<millis>` style, from epoch milliseconds.
pub fn transaction_id_at<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    format!("TRX{}", at.timestamp_millis())
}

/// A small cart used by `struk print --demo` and the preview endpoint docs.
pub fn demo_sale<Tz: TimeZone>(at: &DateTime<Tz>) -> Sale {
    let items = vec![
        ReceiptLineItem::new("Pod Kit", 2, 50_000),
        ReceiptLineItem::new("Liquid Salt Nic Mango 30ml 35mg", 1, 95_000),
        ReceiptLineItem::new("Coil Mesh 0.8 ohm", 3, 17_500),
    ];
    let total = Sale::items_total(&items);
    Sale {
        items,
        total,
        transaction_id: transaction_id_at(at),
        payment_method: PaymentMethod::Cash,
    }
}
