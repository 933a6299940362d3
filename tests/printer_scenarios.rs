//! End-to-end printer scenarios against the in-memory transport.

use chrono::Local;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use struk::error::ErrorKind;
use struk::printer::{
    DeviceSession, KNOWN_PRINTER_SERVICES, PrintPipeline, PrinterConfig, PrinterService,
    SessionState,
};
use struk::receipt::{PaymentMethod, ReceiptDocument, ReceiptLineItem, Sale};
use struk::transport::{MockAdapter, MockPeripheral, Peripheral};

fn config() -> PrinterConfig {
    PrinterConfig {
        settle_delay_ms: 0,
        ..PrinterConfig::default()
    }
}

fn service() -> (Arc<MockAdapter>, PrinterService) {
    let printer = Arc::new(MockPeripheral::printer("RPP02N"));
    let adapter = Arc::new(MockAdapter::new(printer));
    let service = PrinterService::new(adapter.clone(), &config()).unwrap();
    (adapter, service)
}

fn pod_kit() -> Vec<ReceiptLineItem> {
    vec![ReceiptLineItem::new("Pod Kit", 2, 50_000)]
}

fn sent_text(adapter: &MockAdapter) -> String {
    String::from_utf8_lossy(&adapter.peripheral().sent_bytes()).into_owned()
}

#[tokio::test]
async fn test_connect_twice_discovers_once() {
    let (adapter, service) = service();
    service.connect().await.unwrap();
    service.connect().await.unwrap();

    assert!(service.status().is_connected);
    assert_eq!(adapter.discovery_count(), 1);
}

#[tokio::test]
async fn test_discovery_offers_all_known_services() {
    let (adapter, service) = service();
    service.connect().await.unwrap();
    let filter = adapter.last_filter().unwrap();
    assert_eq!(filter.services.len(), 3);
    for uuid in KNOWN_PRINTER_SERVICES {
        assert!(filter.services.contains(&uuid));
    }
}

#[tokio::test]
async fn test_print_while_disconnected_writes_nothing() {
    let (adapter, service) = service();
    let err = service
        .print_receipt(&pod_kit(), 100_000, "TRX1", "cash")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotConnected);
    assert_eq!(adapter.peripheral().write_attempts(), 0);
    assert!(service.status().last_error.is_some());
}

#[tokio::test]
async fn test_fifth_write_failure_stops_the_receipt() {
    let (adapter, service) = service();
    service.connect().await.unwrap();
    adapter.peripheral().fail_write_at(5);

    let err = service
        .print_receipt(&pod_kit(), 100_000, "TRX1", "cash")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::WriteFailed);
    assert_eq!(adapter.peripheral().write_attempts(), 5);
    assert_eq!(adapter.peripheral().writes().len(), 4);
    // The store name line was the failing write
    assert!(!sent_text(&adapter).contains("Pod Kit"));
}

#[tokio::test]
async fn test_pod_kit_receipt_lines() {
    let (adapter, service) = service();
    service.connect().await.unwrap();
    service
        .print_receipt(&pod_kit(), 100_000, "TRX1", "cash")
        .await
        .unwrap();

    let text = sent_text(&adapter);
    assert!(text.contains("Pod Kit\n2 x Rp 50.000         Rp 100.000\n"));
    assert!(text.contains("TOTAL                 Rp 100.000\n"));
    assert!(text.contains("Bayar: Tunai (Cash)\n"));
}

#[tokio::test]
async fn test_link_loss_mid_print() {
    let printer = Arc::new(MockPeripheral::printer("RPP02N"));
    let adapter = Arc::new(MockAdapter::new(printer.clone()));
    let session = DeviceSession::new(adapter, KNOWN_PRINTER_SERVICES.to_vec());
    session.connect().await.unwrap();
    printer.drop_link_after_write(10);

    let pipeline = PrintPipeline::from_config(&config()).unwrap();
    let sale = Sale {
        items: pod_kit(),
        total: 100_000,
        transaction_id: "TRX1".into(),
        payment_method: PaymentMethod::Cash,
    };
    let doc = ReceiptDocument::from_sale(&config().store, &sale, Local::now().naive_local());
    let job = pipeline.compile(&doc);

    let failure = pipeline.execute(&job, &session).await.unwrap_err();
    assert_eq!(failure.writes_sent, 10);
    assert_eq!(failure.source.kind(), ErrorKind::WriteFailed);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(printer.write_attempts(), 10);
}

#[tokio::test]
async fn test_reconnect_after_link_loss() {
    let (adapter, service) = service();
    service.connect().await.unwrap();
    adapter.peripheral().trigger_link_lost("out of range");
    assert!(!service.status().is_connected);

    service.connect().await.unwrap();
    assert!(service.status().is_connected);
    assert_eq!(adapter.discovery_count(), 2);
    assert!(adapter.peripheral().is_connected());

    service
        .print_receipt(&pod_kit(), 100_000, "TRX2", "transfer")
        .await
        .unwrap();
    assert!(sent_text(&adapter).contains("Bayar: Transfer Bank\n"));
}

#[tokio::test]
async fn test_platform_without_bluetooth() {
    let (adapter, service) = service();
    adapter.set_available(false);
    let err = service.connect().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PlatformUnsupported);
    assert!(!err.is_retryable());
    assert!(!service.status().is_connecting);
}
