//! # Mock Transport
//!
//! An in-memory printer for tests and `--dry-run`.
//!
//! The mock records every write and can be told to fail selection, fail the
//! link, fail the n-th write, or drop the link right after the n-th write
//! the way a printer that runs out of battery would. Discovery can be slowed
//! down and service lookup can hang, for exercising abandoned connects.
//!
//! ```
//! use std::sync::Arc;
//! use struk::transport::{MockAdapter, MockPeripheral};
//!
//! let printer = Arc::new(MockPeripheral::printer("RPP02N"));
//! printer.fail_write_at(5);
//! let adapter = MockAdapter::new(printer.clone());
//! assert_eq!(adapter.discovery_count(), 0);
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::{
    BleAdapter, CharProperties, Characteristic, DiscoveryFilter, GattService, LinkLost, Peripheral,
    WriteKind,
};
use crate::error::{PrintResult, PrinterError};
use crate::printer::KNOWN_PRINTER_SERVICES;

/// Write characteristic used by most 58mm printers behind service 18F0.
pub const MOCK_WRITE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00002af1_0000_1000_8000_00805f9b34fb);

/// Notify characteristic paired with it.
pub const MOCK_NOTIFY_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x00002af0_0000_1000_8000_00805f9b34fb);

#[derive(Debug, Default)]
struct Behavior {
    fail_link: Option<String>,
    stall_services: bool,
    fail_write_at: Option<usize>,
    drop_link_after_write: Option<usize>,
}

/// One write as the printer received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub characteristic: Uuid,
    pub kind: WriteKind,
    pub data: Vec<u8>,
}

pub struct MockPeripheral {
    name: String,
    services: Vec<GattService>,
    connected: AtomicBool,
    link_count: AtomicUsize,
    write_attempts: AtomicUsize,
    writes: Mutex<Vec<RecordedWrite>>,
    behavior: Mutex<Behavior>,
    link_events: broadcast::Sender<LinkLost>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockPeripheral {
    pub fn new(name: impl Into<String>, services: Vec<GattService>) -> Self {
        let (link_events, _) = broadcast::channel(8);
        Self {
            name: name.into(),
            services,
            connected: AtomicBool::new(false),
            link_count: AtomicUsize::new(0),
            write_attempts: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            behavior: Mutex::new(Behavior::default()),
            link_events,
        }
    }

    /// A typical 58mm printer: a notify-only characteristic followed by a
    /// writable one, under the first known printer service.
    pub fn printer(name: impl Into<String>) -> Self {
        Self::new(
            name,
            vec![GattService {
                uuid: KNOWN_PRINTER_SERVICES[0],
                characteristics: vec![
                    Characteristic::new(
                        MOCK_NOTIFY_CHARACTERISTIC,
                        CharProperties {
                            notify: true,
                            ..Default::default()
                        },
                    ),
                    Characteristic::new(
                        MOCK_WRITE_CHARACTERISTIC,
                        CharProperties {
                            write: true,
                            write_without_response: true,
                            ..Default::default()
                        },
                    ),
                ],
            }],
        )
    }

    /// Make `connect()` fail with `ConnectionFailed(reason)`.
    pub fn fail_link(&self, reason: impl Into<String>) {
        lock(&self.behavior).fail_link = Some(reason.into());
    }

    /// Bring the link up but never answer service discovery.
    pub fn stall_services(&self, stall: bool) {
        lock(&self.behavior).stall_services = stall;
    }

    /// Make the `n`-th write attempt (1-based) fail.
    pub fn fail_write_at(&self, n: usize) {
        lock(&self.behavior).fail_write_at = Some(n);
    }

    /// Drop the link right after the `n`-th write succeeds.
    pub fn drop_link_after_write(&self, n: usize) {
        lock(&self.behavior).drop_link_after_write = Some(n);
    }

    /// Simulate the printer going away (power off, out of range).
    pub fn trigger_link_lost(&self, reason: impl Into<String>) {
        self.connected.store(false, Ordering::SeqCst);
        // No subscribers is fine: nobody is listening.
        let _ = self.link_events.send(LinkLost {
            reason: reason.into(),
        });
    }

    /// Write attempts so far, failed ones included.
    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Times `connect()` established the link.
    pub fn link_count(&self) -> usize {
        self.link_count.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        lock(&self.writes).clone()
    }

    /// All successfully written bytes, concatenated.
    pub fn sent_bytes(&self) -> Vec<u8> {
        lock(&self.writes)
            .iter()
            .flat_map(|w| w.data.iter().copied())
            .collect()
    }

    /// Number of active disconnect subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.link_events.receiver_count()
    }
}

#[async_trait]
impl Peripheral for MockPeripheral {
    fn id(&self) -> String {
        format!("mock:{}", self.name)
    }

    fn name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    async fn connect(&self) -> PrintResult<()> {
        if let Some(reason) = lock(&self.behavior).fail_link.clone() {
            return Err(PrinterError::ConnectionFailed(reason));
        }
        self.connected.store(true, Ordering::SeqCst);
        self.link_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn services(&self) -> PrintResult<Vec<GattService>> {
        if !self.is_connected() {
            return Err(PrinterError::ConnectionFailed("link is down".to_string()));
        }
        let stall = lock(&self.behavior).stall_services;
        if stall {
            std::future::pending::<()>().await;
        }
        Ok(self.services.clone())
    }

    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        kind: WriteKind,
    ) -> PrintResult<()> {
        let attempt = self.write_attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.is_connected() {
            return Err(PrinterError::WriteFailed("link is down".to_string()));
        }

        let (fail_at, drop_after) = {
            let behavior = lock(&self.behavior);
            (behavior.fail_write_at, behavior.drop_link_after_write)
        };
        if fail_at == Some(attempt) {
            return Err(PrinterError::WriteFailed(format!(
                "simulated failure on write {}",
                attempt
            )));
        }

        debug!(attempt, len = data.len(), "mock write");
        lock(&self.writes).push(RecordedWrite {
            characteristic: characteristic.uuid,
            kind,
            data: data.to_vec(),
        });

        if drop_after == Some(attempt) {
            self.trigger_link_lost(format!("simulated link loss after write {}", attempt));
        }
        Ok(())
    }

    async fn disconnect(&self) -> PrintResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe_disconnects(&self) -> broadcast::Receiver<LinkLost> {
        self.link_events.subscribe()
    }
}

/// Adapter that always "selects" the same mock peripheral.
pub struct MockAdapter {
    peripheral: Arc<MockPeripheral>,
    available: AtomicBool,
    cancel_selection: AtomicBool,
    discovery_delay: Mutex<Option<Duration>>,
    discovery_count: AtomicUsize,
    last_filter: Mutex<Option<DiscoveryFilter>>,
}

impl MockAdapter {
    pub fn new(peripheral: Arc<MockPeripheral>) -> Self {
        Self {
            peripheral,
            available: AtomicBool::new(true),
            cancel_selection: AtomicBool::new(false),
            discovery_delay: Mutex::new(None),
            discovery_count: AtomicUsize::new(0),
            last_filter: Mutex::new(None),
        }
    }

    /// Behave like a host without Bluetooth.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Behave like a user dismissing the device chooser.
    pub fn cancel_selection(&self, cancel: bool) {
        self.cancel_selection.store(cancel, Ordering::SeqCst);
    }

    /// Behave like a scan that takes `delay` before offering the device.
    pub fn set_discovery_delay(&self, delay: Option<Duration>) {
        *lock(&self.discovery_delay) = delay;
    }

    pub fn discovery_count(&self) -> usize {
        self.discovery_count.load(Ordering::SeqCst)
    }

    pub fn last_filter(&self) -> Option<DiscoveryFilter> {
        lock(&self.last_filter).clone()
    }

    pub fn peripheral(&self) -> &Arc<MockPeripheral> {
        &self.peripheral
    }
}

#[async_trait]
impl BleAdapter for MockAdapter {
    async fn ensure_available(&self) -> PrintResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PrinterError::PlatformUnsupported(
                "mock adapter is switched off".to_string(),
            ))
        }
    }

    async fn request_device(&self, filter: &DiscoveryFilter) -> PrintResult<Arc<dyn Peripheral>> {
        self.discovery_count.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_filter) = Some(filter.clone());

        let delay = *lock(&self.discovery_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.cancel_selection.load(Ordering::SeqCst) {
            return Err(PrinterError::ConnectionFailed(
                "device selection cancelled".to_string(),
            ));
        }
        let peripheral: Arc<dyn Peripheral> = self.peripheral.clone();
        Ok(peripheral)
    }
}
