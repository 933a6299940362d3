//! # Printer Service
//!
//! The one printer handle an application holds. Build it once at startup
//! and hand clones to whoever needs it (HTTP handlers, the CLI); clones
//! share the same session, so connection state can't drift apart.
//!
//! ```
//! use std::sync::Arc;
//! use struk::printer::{PrinterConfig, PrinterService};
//! use struk::transport::{MockAdapter, MockPeripheral};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), struk::error::PrinterError> {
//! let printer = Arc::new(MockPeripheral::printer("RPP02N"));
//! let service = PrinterService::new(
//!     Arc::new(MockAdapter::new(printer)),
//!     &PrinterConfig::default(),
//! )?;
//!
//! service.connect().await?;
//! assert!(service.status().is_connected);
//! # Ok(())
//! # }
//! ```
//!
//! Operations run one at a time: a print, connect or disconnect waits for
//! the previous one to finish. `status()` never waits.

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as OperationGate;
use tracing::{debug, instrument};

use super::config::PrinterConfig;
use super::pipeline::PrintPipeline;
use super::session::DeviceSession;
use crate::error::PrintResult;
use crate::receipt::{PaymentMethod, ReceiptDocument, ReceiptLineItem, Sale, StoreProfile};
use crate::transport::BleAdapter;

/// What the UI shows about the printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrinterStatus {
    pub is_connected: bool,
    pub is_connecting: bool,
    pub last_error: Option<String>,
    pub device_name: Option<String>,
}

struct Shared {
    session: DeviceSession,
    pipeline: PrintPipeline,
    store: StoreProfile,
    gate: OperationGate<()>,
    last_error: Mutex<Option<String>>,
}

#[derive(Clone)]
pub struct PrinterService {
    shared: Arc<Shared>,
}

impl PrinterService {
    pub fn new(adapter: Arc<dyn BleAdapter>, config: &PrinterConfig) -> PrintResult<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                session: DeviceSession::from_config(adapter, config),
                pipeline: PrintPipeline::from_config(config)?,
                store: config.store.clone(),
                gate: OperationGate::new(()),
                last_error: Mutex::new(None),
            }),
        })
    }

    pub fn pipeline(&self) -> &PrintPipeline {
        &self.shared.pipeline
    }

    fn last_error(&self) -> MutexGuard<'_, Option<String>> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record<T>(&self, result: PrintResult<T>) -> PrintResult<T> {
        if let Err(e) = &result {
            *self.last_error() = Some(e.to_string());
        }
        result
    }

    /// Snapshot for the UI. A session left in `Error` by a connect nobody
    /// waited for still reports that error.
    pub fn status(&self) -> PrinterStatus {
        let state = self.shared.session.state();
        let last_error = self
            .last_error()
            .clone()
            .or_else(|| state.error().map(str::to_string));
        PrinterStatus {
            is_connected: state.is_connected(),
            is_connecting: state.is_connecting(),
            last_error,
            device_name: state.device_name().map(str::to_string),
        }
    }

    #[instrument(skip(self))]
    pub async fn connect(&self) -> PrintResult<()> {
        let _turn = self.shared.gate.lock().await;
        let result = self.shared.session.connect().await;
        if result.is_ok() {
            *self.last_error() = None;
        }
        self.record(result)
    }

    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        let _turn = self.shared.gate.lock().await;
        self.shared.session.disconnect().await;
        *self.last_error() = None;
        debug!("printer error cleared");
    }

    /// Print a receipt for a checkout, stamped with the local time.
    ///
    /// Unknown payment codes print as "Lainnya".
    pub async fn print_receipt(
        &self,
        items: &[ReceiptLineItem],
        total: u64,
        transaction_id: &str,
        payment_method: &str,
    ) -> PrintResult<usize> {
        let method = payment_method
            .parse::<PaymentMethod>()
            .unwrap_or_default();
        let sale = Sale {
            items: items.to_vec(),
            total,
            transaction_id: transaction_id.to_string(),
            payment_method: method,
        };
        self.print_sale(&sale).await
    }

    pub async fn print_sale(&self, sale: &Sale) -> PrintResult<usize> {
        let doc = self.document(sale, Local::now().naive_local());
        self.print_document(&doc).await
    }

    /// Print an already assembled document. Returns the number of writes
    /// sent.
    #[instrument(skip_all, fields(transaction = %doc.transaction_id))]
    pub async fn print_document(&self, doc: &ReceiptDocument) -> PrintResult<usize> {
        let _turn = self.shared.gate.lock().await;
        let result = self.shared.pipeline.print(&self.shared.session, doc).await;
        self.record(result)
    }

    pub fn document(&self, sale: &Sale, at: NaiveDateTime) -> ReceiptDocument {
        ReceiptDocument::from_sale(&self.shared.store, sale, at)
    }

    /// The receipt as text, without a printer.
    pub fn preview(&self, sale: &Sale, at: NaiveDateTime) -> Vec<String> {
        self.shared.pipeline.print_preview(&self.document(sale, at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::{MockAdapter, MockPeripheral};
    use crate::printer::session::ABANDONED_CONNECT;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn quick_config() -> PrinterConfig {
        PrinterConfig {
            settle_delay_ms: 0,
            ..PrinterConfig::default()
        }
    }

    fn setup() -> (Arc<MockAdapter>, PrinterService) {
        let printer = Arc::new(MockPeripheral::printer("RPP02N"));
        let adapter = Arc::new(MockAdapter::new(printer));
        let service = PrinterService::new(adapter.clone(), &quick_config()).unwrap();
        (adapter, service)
    }

    fn pod_kit() -> Vec<ReceiptLineItem> {
        vec![ReceiptLineItem::new("Pod Kit", 2, 50_000)]
    }

    #[test]
    fn test_initial_status() {
        let (_, service) = setup();
        assert_eq!(
            service.status(),
            PrinterStatus {
                is_connected: false,
                is_connecting: false,
                last_error: None,
                device_name: None,
            }
        );
    }

    #[test]
    fn test_rejects_invalid_config() {
        let printer = Arc::new(MockPeripheral::printer("RPP02N"));
        let config = PrinterConfig {
            line_width: 2,
            ..PrinterConfig::default()
        };
        assert!(PrinterService::new(Arc::new(MockAdapter::new(printer)), &config).is_err());
    }

    #[tokio::test]
    async fn test_clones_share_one_session() {
        let (_, service) = setup();
        let other = service.clone();
        service.connect().await.unwrap();
        let status = other.status();
        assert!(status.is_connected);
        assert_eq!(status.device_name.as_deref(), Some("RPP02N"));
    }

    #[tokio::test]
    async fn test_failed_connect_sets_error_and_success_clears_it() {
        let (adapter, service) = setup();
        adapter.cancel_selection(true);
        assert!(service.connect().await.is_err());
        let status = service.status();
        assert!(!status.is_connected);
        assert!(status.last_error.unwrap().contains("cancelled"));

        adapter.cancel_selection(false);
        service.connect().await.unwrap();
        assert_eq!(service.status().last_error, None);
    }

    #[tokio::test]
    async fn test_print_without_connection_records_error() {
        let (adapter, service) = setup();
        let err = service
            .print_receipt(&pod_kit(), 100_000, "TRX1", "cash")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert_eq!(adapter.peripheral().write_attempts(), 0);
        assert_eq!(
            service.status().last_error.as_deref(),
            Some("Printer is not connected")
        );
    }

    #[tokio::test]
    async fn test_print_receipt_writes_payment_label() {
        let (adapter, service) = setup();
        service.connect().await.unwrap();
        service
            .print_receipt(&pod_kit(), 100_000, "TRX1", "qris")
            .await
            .unwrap();
        let sent = String::from_utf8_lossy(&adapter.peripheral().sent_bytes()).into_owned();
        assert!(sent.contains("Bayar: QRIS\n"));
        assert!(sent.contains("No: TRX1\n"));
    }

    #[tokio::test]
    async fn test_unknown_payment_code_prints_other() {
        let (adapter, service) = setup();
        service.connect().await.unwrap();
        service
            .print_receipt(&pod_kit(), 100_000, "TRX2", "voucher")
            .await
            .unwrap();
        let sent = String::from_utf8_lossy(&adapter.peripheral().sent_bytes()).into_owned();
        assert!(sent.contains("Bayar: Lainnya\n"));
    }

    #[tokio::test]
    async fn test_concurrent_connects_discover_once() {
        let (adapter, service) = setup();
        let (a, b) = tokio::join!(service.connect(), service.connect());
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(adapter.discovery_count(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_clears_error() {
        let (adapter, service) = setup();
        service.connect().await.unwrap();
        adapter.peripheral().fail_write_at(1);
        assert!(service.print_receipt(&pod_kit(), 100_000, "TRX3", "cash").await.is_err());
        assert!(service.status().last_error.is_some());

        service.disconnect().await;
        let status = service.status();
        assert!(!status.is_connected);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn test_abandoned_connect_leaves_service_usable() {
        let (adapter, service) = setup();
        adapter.set_discovery_delay(Some(Duration::from_secs(30)));
        let gave_up = tokio::time::timeout(Duration::from_millis(20), service.connect()).await;
        assert!(gave_up.is_err());

        let status = service.status();
        assert!(!status.is_connecting);
        assert!(!status.is_connected);
        assert_eq!(status.last_error.as_deref(), Some(ABANDONED_CONNECT));

        adapter.set_discovery_delay(None);
        service.connect().await.unwrap();
        let status = service.status();
        assert!(status.is_connected);
        assert_eq!(status.last_error, None);
    }

    #[test]
    fn test_preview_uses_store_profile() {
        let (_, service) = setup();
        let at = NaiveDate::from_ymd_opt(2026, 1, 20)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let sale = Sale {
            items: pod_kit(),
            total: 100_000,
            transaction_id: "TRX9".into(),
            payment_method: PaymentMethod::Transfer,
        };
        let lines = service.preview(&sale, at);
        assert_eq!(lines[0], "STAR VAPE");
        assert!(lines.contains(&"Bayar: Transfer Bank".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("~ STAR VAPE ~"));
    }
}
