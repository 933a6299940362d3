//! # Device Session
//!
//! The one connection between this process and a printer.
//!
//! ## State Machine
//!
//! ```text
//!                 connect()                 link + writable characteristic
//! Disconnected ────────────► Connecting ─────────────────────────────► Connected
//!      ▲                          │                                        │
//!      │                          │ failure                                │ disconnect()
//!      │                          ▼                                        │ or link lost
//!      └──────────────────── Error(msg) ◄──────────────────────────────────┘
//!            connect()/disconnect()           (link lost goes straight to
//!                                              Disconnected)
//! ```
//!
//! `Error` is a resting state: it reads as not connected and keeps the
//! message until the next `connect()` or `disconnect()`.
//!
//! `Connecting` always resolves. A `connect()` future dropped mid-flight
//! (a timeout around it, a client hanging up) leaves the session in
//! `Error` and closes whatever link it had half opened.
//!
//! ## Disconnect Notification
//!
//! Each link holds a [`LinkLost`] subscription taken at connect time and
//! dropped at disconnect. The session drains it before every write and
//! every state read, so a link loss that lands between two pipeline writes
//! is seen by the very next write, which then fails with `WriteFailed`.
//!
//! ## Channel Selection
//!
//! The first characteristic accepting writes, in service order, becomes the
//! data channel. There is no vendor-specific check; a printer exposing
//! several writable characteristics gets the first one.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use super::config::PrinterConfig;
use crate::error::{PrintResult, PrinterError};
use crate::transport::{BleAdapter, Characteristic, DiscoveryFilter, GattService, LinkLost, Peripheral};

/// Connection state of a [`DeviceSession`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    /// Discovery or link setup in progress
    Connecting,
    /// Link up with an active writable characteristic
    Connected { device: String },
    /// Last connect failed; not connected
    Error(String),
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, Self::Connecting)
    }

    /// A new connect attempt may start from here.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error(_))
    }

    pub fn device_name(&self) -> Option<&str> {
        match self {
            Self::Connected { device } => Some(device),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

/// An established link: the device, its data channel and its disconnect
/// subscription.
struct Link {
    peripheral: Arc<dyn Peripheral>,
    characteristic: Characteristic,
    events: broadcast::Receiver<LinkLost>,
}

#[derive(Default)]
struct Inner {
    state: SessionState,
    link: Option<Link>,
}

impl Inner {
    /// Apply any pending link-loss notification.
    fn drain_events(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        let reason = match link.events.try_recv() {
            Ok(event) => event.reason,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Lagged(n)) => format!("{} link events missed", n),
            Err(TryRecvError::Closed) => "peripheral went away".to_string(),
        };
        info!(%reason, "printer disconnected");
        self.link = None;
        self.state = SessionState::Disconnected;
    }
}

/// The single device session.
///
/// Share it behind an `Arc`; all methods take `&self`. Callers are expected
/// to serialize `connect`, `disconnect` and writes (the
/// [`PrinterService`](super::PrinterService) facade does).
pub struct DeviceSession {
    adapter: Arc<dyn BleAdapter>,
    filter: DiscoveryFilter,
    connect_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    inner: Mutex<Inner>,
}

impl DeviceSession {
    /// A session discovering devices that advertise any of `services`.
    pub fn new(adapter: Arc<dyn BleAdapter>, services: Vec<Uuid>) -> Self {
        Self {
            adapter,
            filter: DiscoveryFilter { services },
            connect_timeout: None,
            write_timeout: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn from_config(adapter: Arc<dyn BleAdapter>, config: &PrinterConfig) -> Self {
        Self::new(adapter, config.service_uuids.clone())
            .with_timeouts(config.connect_timeout(), config.write_timeout())
    }

    /// Bound `connect()` and each `write()`. `None` leaves it to the
    /// transport.
    pub fn with_timeouts(mut self, connect: Option<Duration>, write: Option<Duration>) -> Self {
        self.connect_timeout = connect;
        self.write_timeout = write;
        self
    }

    pub fn discovery_filter(&self) -> &DiscoveryFilter {
        &self.filter
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> SessionState {
        let mut inner = self.inner();
        inner.drain_events();
        inner.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Select a device, link to it and pick its data channel.
    ///
    /// Returns immediately when already connected, without discovery.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> PrintResult<()> {
        {
            let mut inner = self.inner();
            inner.drain_events();
            match &inner.state {
                SessionState::Connected { device } => {
                    debug!(%device, "already connected");
                    return Ok(());
                }
                SessionState::Connecting => {
                    return Err(PrinterError::ConnectionFailed(
                        "a connect attempt is already in progress".to_string(),
                    ));
                }
                SessionState::Disconnected | SessionState::Error(_) => {}
            }
            inner.state = SessionState::Connecting;
        }
        let mut attempt = ConnectAttempt {
            inner: &self.inner,
            selected: None,
            settled: false,
        };

        if let Err(e) = self.adapter.ensure_available().await {
            attempt.settled = true;
            self.fail(&e);
            return Err(e);
        }

        let result = with_deadline(
            self.connect_timeout,
            "connect",
            self.establish(&mut attempt.selected),
        )
        .await;

        match result {
            Ok(link) => {
                attempt.settled = true;
                let device = link
                    .peripheral
                    .name()
                    .unwrap_or_else(|| link.peripheral.id());
                info!(%device, characteristic = %link.characteristic.uuid, "printer connected");
                let mut inner = self.inner();
                inner.state = SessionState::Connected { device };
                inner.link = Some(link);
                Ok(())
            }
            Err(e) => {
                if let Some(peripheral) = attempt.selected.take() {
                    if let Err(teardown) = peripheral.disconnect().await {
                        debug!(error = %teardown, "teardown of half-open link failed");
                    }
                }
                attempt.settled = true;
                self.fail(&e);
                Err(e)
            }
        }
    }

    async fn establish(&self, selected: &mut Option<Arc<dyn Peripheral>>) -> PrintResult<Link> {
        let peripheral = self.adapter.request_device(&self.filter).await?;
        *selected = Some(peripheral.clone());
        debug!(id = %peripheral.id(), "device selected");

        // Subscribe before the link is up so an early drop is not missed
        let events = peripheral.subscribe_disconnects();
        peripheral.connect().await?;

        let services = peripheral.services().await?;
        let characteristic =
            find_writable_characteristic(&services).ok_or(PrinterError::NoWritableCharacteristic)?;

        Ok(Link {
            peripheral,
            characteristic,
            events,
        })
    }

    fn fail(&self, error: &PrinterError) {
        warn!(%error, "printer connect failed");
        let mut inner = self.inner();
        inner.link = None;
        inner.state = SessionState::Error(error.to_string());
    }

    /// Tear down the link if there is one. Always ends in `Disconnected`.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        let link = {
            let mut inner = self.inner();
            inner.state = SessionState::Disconnected;
            inner.link.take()
        };
        if let Some(link) = link {
            if let Err(e) = link.peripheral.disconnect().await {
                warn!(error = %e, "error while closing printer link");
            }
            info!("printer disconnected");
        }
    }

    /// Send one byte array on the active channel.
    ///
    /// `Err(WriteFailed)` when there is no active channel. Each call is a
    /// single transport write; nothing is buffered between calls.
    pub async fn write(&self, data: &[u8]) -> PrintResult<()> {
        let (peripheral, characteristic) = {
            let mut inner = self.inner();
            inner.drain_events();
            match &inner.link {
                Some(link) => (link.peripheral.clone(), link.characteristic.clone()),
                None => {
                    return Err(PrinterError::WriteFailed(
                        "no active printer channel".to_string(),
                    ));
                }
            }
        };

        let kind = characteristic.write_kind();
        trace!(len = data.len(), ?kind, "write");
        let result = with_deadline(
            self.write_timeout,
            "write",
            peripheral.write(&characteristic, data, kind),
        )
        .await;

        if let Err(e) = &result {
            warn!(error = %e, len = data.len(), "printer write failed");
            self.inner().drain_events();
        }
        result
    }
}

/// An in-flight `connect()`.
///
/// If the future is dropped before it settles (the caller gave up, an HTTP
/// client went away) the session moves to `Error` and any half-open link
/// is closed in the background, so the next `connect()` can start over.
struct ConnectAttempt<'a> {
    inner: &'a Mutex<Inner>,
    selected: Option<Arc<dyn Peripheral>>,
    settled: bool,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!("connect abandoned before it finished");
        {
            let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if inner.state.is_connecting() {
                inner.link = None;
                inner.state = SessionState::Error(ABANDONED_CONNECT.to_string());
            }
        }
        let Some(peripheral) = self.selected.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = peripheral.disconnect().await {
                        debug!(error = %e, "teardown of abandoned link failed");
                    }
                });
            }
            Err(_) => debug!("no runtime left to close the abandoned link"),
        }
    }
}

/// Session error left behind by a dropped `connect()`.
pub const ABANDONED_CONNECT: &str = "connect attempt was abandoned";

/// First characteristic accepting writes, across services in order.
pub fn find_writable_characteristic(services: &[GattService]) -> Option<Characteristic> {
    services
        .iter()
        .flat_map(|service| service.characteristics.iter())
        .find(|c| c.properties.is_writable())
        .cloned()
}

async fn with_deadline<T, F>(deadline: Option<Duration>, what: &str, fut: F) -> PrintResult<T>
where
    F: Future<Output = PrintResult<T>>,
{
    match deadline {
        None => fut.await,
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| PrinterError::Timeout(format!("{} exceeded {:?}", what, limit)))?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::printer::KNOWN_PRINTER_SERVICES;
    use crate::transport::mock::MOCK_WRITE_CHARACTERISTIC;
    use crate::transport::{CharProperties, MockAdapter, MockPeripheral, WriteKind};

    fn setup() -> (Arc<MockAdapter>, DeviceSession) {
        let printer = Arc::new(MockPeripheral::printer("RPP02N"));
        let adapter = Arc::new(MockAdapter::new(printer));
        let session = DeviceSession::new(adapter.clone(), KNOWN_PRINTER_SERVICES.to_vec());
        (adapter, session)
    }

    fn props(write: bool, write_without_response: bool) -> CharProperties {
        CharProperties {
            write,
            write_without_response,
            ..Default::default()
        }
    }

    #[test]
    fn test_state_predicates() {
        assert!(SessionState::default().can_connect());
        assert!(SessionState::Error("x".into()).can_connect());
        assert!(!SessionState::Error("x".into()).is_connected());
        assert!(SessionState::Connecting.is_connecting());
        let up = SessionState::Connected {
            device: "RPP02N".into(),
        };
        assert!(up.is_connected());
        assert!(!up.can_connect());
        assert_eq!(up.device_name(), Some("RPP02N"));
    }

    #[test]
    fn test_find_writable_first_match() {
        let services = vec![
            GattService {
                uuid: Uuid::from_u128(1),
                characteristics: vec![Characteristic::new(
                    Uuid::from_u128(10),
                    CharProperties {
                        notify: true,
                        ..Default::default()
                    },
                )],
            },
            GattService {
                uuid: Uuid::from_u128(2),
                characteristics: vec![
                    Characteristic::new(Uuid::from_u128(20), props(true, false)),
                    Characteristic::new(Uuid::from_u128(21), props(true, true)),
                ],
            },
            GattService {
                uuid: Uuid::from_u128(3),
                characteristics: vec![Characteristic::new(Uuid::from_u128(30), props(false, true))],
            },
        ];
        let found = find_writable_characteristic(&services).unwrap();
        assert_eq!(found.uuid, Uuid::from_u128(20));
        assert!(find_writable_characteristic(&services[..1]).is_none());
        assert!(find_writable_characteristic(&[]).is_none());
    }

    #[tokio::test]
    async fn test_connect_selects_writable_channel() {
        let (adapter, session) = setup();
        session.connect().await.unwrap();

        assert_eq!(
            session.state(),
            SessionState::Connected {
                device: "RPP02N".into()
            }
        );
        let filter = adapter.last_filter().unwrap();
        assert_eq!(filter.services, KNOWN_PRINTER_SERVICES.to_vec());

        session.write(b"hello").await.unwrap();
        let writes = adapter.peripheral().writes();
        assert_eq!(writes[0].characteristic, MOCK_WRITE_CHARACTERISTIC);
        assert_eq!(writes[0].kind, WriteKind::WithoutResponse);
    }

    #[tokio::test]
    async fn test_connect_when_connected_skips_discovery() {
        let (adapter, session) = setup();
        session.connect().await.unwrap();
        session.connect().await.unwrap();
        assert!(session.is_connected());
        assert_eq!(adapter.discovery_count(), 1);
        assert_eq!(adapter.peripheral().link_count(), 1);
    }

    #[tokio::test]
    async fn test_platform_unsupported() {
        let (adapter, session) = setup();
        adapter.set_available(false);
        let err = session.connect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PlatformUnsupported);
        assert_eq!(adapter.discovery_count(), 0);
        assert!(session.state().error().is_some());
    }

    #[tokio::test]
    async fn test_cancelled_selection_then_retry() {
        let (adapter, session) = setup();
        adapter.cancel_selection(true);
        let err = session.connect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
        assert!(!session.is_connected());

        adapter.cancel_selection(false);
        session.connect().await.unwrap();
        assert!(session.is_connected());
        assert_eq!(adapter.discovery_count(), 2);
    }

    #[tokio::test]
    async fn test_no_writable_characteristic_tears_down_link() {
        let printer = Arc::new(MockPeripheral::new(
            "Notify Only",
            vec![GattService {
                uuid: KNOWN_PRINTER_SERVICES[0],
                characteristics: vec![Characteristic::new(
                    Uuid::from_u128(0x2af0),
                    CharProperties {
                        notify: true,
                        read: true,
                        ..Default::default()
                    },
                )],
            }],
        ));
        let adapter = Arc::new(MockAdapter::new(printer.clone()));
        let session = DeviceSession::new(adapter, KNOWN_PRINTER_SERVICES.to_vec());

        let err = session.connect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoWritableCharacteristic);
        assert!(!printer.is_connected());
        assert_eq!(printer.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_acknowledged_write_when_required() {
        let printer = Arc::new(MockPeripheral::new(
            "Acked",
            vec![GattService {
                uuid: KNOWN_PRINTER_SERVICES[2],
                characteristics: vec![Characteristic::new(Uuid::from_u128(0x42), props(true, false))],
            }],
        ));
        let adapter = Arc::new(MockAdapter::new(printer.clone()));
        let session = DeviceSession::new(adapter, KNOWN_PRINTER_SERVICES.to_vec());
        session.connect().await.unwrap();
        session.write(&[0x1B, 0x40]).await.unwrap();
        assert_eq!(printer.writes()[0].kind, WriteKind::WithResponse);
    }

    #[tokio::test]
    async fn test_write_without_channel_fails() {
        let (adapter, session) = setup();
        let err = session.write(b"x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailed);
        assert_eq!(adapter.peripheral().write_attempts(), 0);
    }

    #[tokio::test]
    async fn test_link_lost_moves_to_disconnected() {
        let (adapter, session) = setup();
        session.connect().await.unwrap();
        session.write(b"one").await.unwrap();

        adapter.peripheral().trigger_link_lost("battery");
        assert_eq!(session.state(), SessionState::Disconnected);

        let err = session.write(b"two").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailed);
        assert_eq!(adapter.peripheral().writes().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_unsubscribes() {
        let (adapter, session) = setup();
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);

        session.connect().await.unwrap();
        assert_eq!(adapter.peripheral().subscriber_count(), 1);
        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(adapter.peripheral().subscriber_count(), 0);
        assert!(!adapter.peripheral().is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_clears_error_state() {
        let (adapter, session) = setup();
        adapter.cancel_selection(true);
        let _ = session.connect().await;
        assert!(session.state().error().is_some());
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let printer = Arc::new(MockPeripheral::printer("RPP02N"));
        let adapter = Arc::new(MockAdapter::new(printer));
        adapter.set_discovery_delay(Some(Duration::from_secs(30)));
        let session = DeviceSession::new(adapter, KNOWN_PRINTER_SERVICES.to_vec())
            .with_timeouts(Some(Duration::from_millis(20)), None);
        let err = session.connect().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(session.state().error().is_some());
    }

    #[tokio::test]
    async fn test_dropped_connect_during_discovery_can_retry() {
        let (adapter, session) = setup();
        adapter.set_discovery_delay(Some(Duration::from_secs(30)));

        let gave_up = tokio::time::timeout(Duration::from_millis(20), session.connect()).await;
        assert!(gave_up.is_err());
        assert_eq!(session.state(), SessionState::Error(ABANDONED_CONNECT.to_string()));

        adapter.set_discovery_delay(None);
        session.connect().await.unwrap();
        assert!(session.is_connected());
        assert_eq!(adapter.discovery_count(), 2);
    }

    #[tokio::test]
    async fn test_dropped_connect_closes_half_open_link() {
        let (adapter, session) = setup();
        let printer = adapter.peripheral().clone();
        printer.stall_services(true);

        let gave_up = tokio::time::timeout(Duration::from_millis(20), session.connect()).await;
        assert!(gave_up.is_err());
        assert!(!session.state().is_connecting());
        assert_eq!(printer.subscriber_count(), 0);

        // Teardown runs on a spawned task
        for _ in 0..50 {
            if !printer.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(!printer.is_connected());

        printer.stall_services(false);
        session.connect().await.unwrap();
        assert!(session.is_connected());
        assert_eq!(printer.link_count(), 2);
    }
}
