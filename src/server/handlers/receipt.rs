//! Receipt printing handlers.

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Local};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::super::state::AppState;
use super::error_response;
use crate::receipt::{PaymentMethod, ReceiptLineItem, Sale, transaction_id_at};

/// A checkout as posted by the POS screen.
///
/// ```json
/// {"items": [{"name": "Pod Kit", "quantity": 2, "price": 50000}],
///  "total": 100000, "transaction_id": "TRX1737350000000",
///  "payment_method": "cash"}
/// ```
#[derive(Debug, Deserialize)]
pub struct ReceiptRequest {
    pub items: Vec<ReceiptLineItem>,
    /// Defaults to the sum of the item subtotals
    #[serde(default)]
    pub total: Option<u64>,
    /// Defaults to `TRX<millis>` for the current time
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

impl ReceiptRequest {
    /// Fill in the defaults and turn the request into a sale.
    pub fn into_sale(self, now: DateTime<Local>) -> Sale {
        let total = self
            .total
            .unwrap_or_else(|| Sale::items_total(&self.items));
        Sale {
            transaction_id: self
                .transaction_id
                .unwrap_or_else(|| transaction_id_at(&now)),
            items: self.items,
            total,
            payment_method: self.payment_method,
        }
    }
}

/// Handle POST /api/printer/print - print the receipt.
pub async fn print(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReceiptRequest>,
) -> Response {
    let now = Local::now();
    let sale = request.into_sale(now);
    let doc = state.printer.document(&sale, now.naive_local());

    match state.printer.print_document(&doc).await {
        Ok(writes) => Json(json!({
            "success": true,
            "transaction_id": sale.transaction_id,
            "writes": writes,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handle POST /api/receipt/preview - the receipt as text lines.
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReceiptRequest>,
) -> impl IntoResponse {
    let now = Local::now();
    let sale = request.into_sale(now);
    let lines = state.printer.preview(&sale, now.naive_local());
    Json(json!({
        "width": state.printer.pipeline().formatter().width,
        "lines": lines,
    }))
}
