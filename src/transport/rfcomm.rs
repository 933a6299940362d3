//! # Bluetooth RFCOMM Transport
//!
//! Talks to a paired printer through a Linux RFCOMM serial device. The
//! Serial Port Profile link carries no GATT table, so the peripheral
//! presents itself as one SPP service holding one write-without-response
//! characteristic; the device session treats it like any other printer.
//!
//! ## Bluetooth Setup (Linux)
//!
//! ```bash
//! # 1. Find the printer's Bluetooth address
//! $ bluetoothctl
//! [bluetooth]# scan on
//! # Look for "RPP02N", "MTP-II", "BlueTooth Printer"...
//!
//! # 2. Pair with the printer (PIN is usually 0000 or 1234)
//! [bluetooth]# pair 66:22:XX:XX:XX:XX
//!
//! # 3. Bind to an RFCOMM device
//! $ sudo rfcomm bind 0 66:22:XX:XX:XX:XX
//! # This creates /dev/rfcomm0
//! ```
//!
//! Given a MAC address instead of a bound device, the adapter looks for an
//! existing binding and creates one with `rfcomm bind` (root required).
//!
//! ## TTY Configuration
//!
//! The device is opened in raw mode so ESC/POS bytes pass through unchanged:
//! no CR/LF translation, 8-bit characters, no echo, no XON/XOFF.
//!
//! ## Link Loss
//!
//! When the printer powers off, writes fail with `EIO`, `ENODEV`,
//! `EHOSTDOWN` or a broken pipe. The peripheral then closes the device and
//! broadcasts [`LinkLost`].

use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    BleAdapter, CharProperties, Characteristic, DiscoveryFilter, GattService, LinkLost, Peripheral,
    WriteKind,
};
use crate::error::{PrintResult, PrinterError};

/// Default RFCOMM device path
pub const DEFAULT_DEVICE: &str = "/dev/rfcomm0";

/// Serial Port Profile service class.
pub const SPP_SERVICE: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805f9b34fb);

/// Largest single `write(2)` to the TTY.
const CHUNK_SIZE: usize = 512;

/// Pause between chunks of one write.
const CHUNK_DELAY_MS: u64 = 2;

const BIND_POLLS: usize = 20;
const BIND_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Finds (or binds) the RFCOMM device for a printer.
#[derive(Debug, Clone)]
pub struct RfcommAdapter {
    device: PathBuf,
    mac: Option<String>,
    bind_channel: u8,
}

impl RfcommAdapter {
    /// Use an already bound device such as `/dev/rfcomm0`.
    pub fn new<P: Into<PathBuf>>(device: P) -> Self {
        Self {
            device: device.into(),
            mac: None,
            bind_channel: 0,
        }
    }

    /// Resolve the device from a MAC address, binding `/dev/rfcomm<channel>`
    /// if no binding exists yet.
    pub fn for_mac(mac: impl Into<String>, bind_channel: u8) -> PrintResult<Self> {
        let mac = mac.into();
        if !is_valid_mac(&mac) {
            return Err(PrinterError::Config(format!("Invalid MAC address: {}", mac)));
        }
        Ok(Self {
            device: PathBuf::from(format!("/dev/rfcomm{}", bind_channel)),
            mac: Some(mac),
            bind_channel,
        })
    }

    pub fn device(&self) -> &Path {
        &self.device
    }
}

impl Default for RfcommAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE)
    }
}

#[async_trait]
impl BleAdapter for RfcommAdapter {
    async fn ensure_available(&self) -> PrintResult<()> {
        if !cfg!(target_os = "linux") {
            return Err(PrinterError::PlatformUnsupported(
                "RFCOMM devices are only available on Linux".to_string(),
            ));
        }
        if self.device.exists() || has_bluetooth_controller() {
            Ok(())
        } else {
            Err(PrinterError::PlatformUnsupported(
                "no Bluetooth controller found in /sys/class/bluetooth".to_string(),
            ))
        }
    }

    async fn request_device(&self, filter: &DiscoveryFilter) -> PrintResult<Arc<dyn Peripheral>> {
        // SPP devices don't advertise GATT services; the filter can't narrow
        // anything down here.
        debug!(services = filter.services.len(), "RFCOMM discovery ignores service filter");

        let device = match &self.mac {
            None => self.device.clone(),
            Some(mac) => {
                let mac = mac.clone();
                let channel = self.bind_channel;
                tokio::task::spawn_blocking(move || resolve_device(&mac, channel))
                    .await
                    .map_err(|e| PrinterError::ConnectionFailed(format!("Task error: {}", e)))??
            }
        };

        if !device.exists() {
            return Err(PrinterError::ConnectionFailed(format!(
                "{} does not exist (is the printer bound with `rfcomm bind`?)",
                device.display()
            )));
        }

        info!(device = %device.display(), "selected RFCOMM printer");
        let peripheral: Arc<dyn Peripheral> = Arc::new(RfcommPeripheral::new(device, self.mac.clone()));
        Ok(peripheral)
    }
}

fn resolve_device(mac: &str, index: u8) -> PrintResult<PathBuf> {
    match find_rfcomm_for_mac(mac) {
        Some(device) => {
            debug!(device = %device.display(), "reusing RFCOMM binding");
            Ok(device)
        }
        None => bind_rfcomm(mac, index),
    }
}

fn has_bluetooth_controller() -> bool {
    std::fs::read_dir("/sys/class/bluetooth")
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// A printer behind an RFCOMM TTY.
pub struct RfcommPeripheral {
    device: PathBuf,
    mac: Option<String>,
    file: Arc<Mutex<Option<File>>>,
    connected: Arc<AtomicBool>,
    link_events: broadcast::Sender<LinkLost>,
}

impl RfcommPeripheral {
    pub fn new(device: PathBuf, mac: Option<String>) -> Self {
        let (link_events, _) = broadcast::channel(4);
        Self {
            device,
            mac,
            file: Arc::new(Mutex::new(None)),
            connected: Arc::new(AtomicBool::new(false)),
            link_events,
        }
    }

    fn characteristic() -> Characteristic {
        Characteristic::new(
            SPP_SERVICE,
            CharProperties {
                write_without_response: true,
                ..Default::default()
            },
        )
    }
}

#[async_trait]
impl Peripheral for RfcommPeripheral {
    fn id(&self) -> String {
        self.mac
            .clone()
            .unwrap_or_else(|| self.device.display().to_string())
    }

    fn name(&self) -> Option<String> {
        self.device
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    async fn connect(&self) -> PrintResult<()> {
        let device = self.device.clone();
        let file = tokio::task::spawn_blocking(move || open_raw(&device))
            .await
            .map_err(|e| PrinterError::ConnectionFailed(format!("Task error: {}", e)))??;

        *lock(&self.file) = Some(file);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn services(&self) -> PrintResult<Vec<GattService>> {
        if !self.is_connected() {
            return Err(PrinterError::ConnectionFailed("device is not open".to_string()));
        }
        Ok(vec![GattService {
            uuid: SPP_SERVICE,
            characteristics: vec![Self::characteristic()],
        }])
    }

    async fn write(
        &self,
        _characteristic: &Characteristic,
        data: &[u8],
        _kind: WriteKind,
    ) -> PrintResult<()> {
        let file = self.file.clone();
        let data = data.to_vec();
        let result = tokio::task::spawn_blocking(move || write_chunked(&file, &data))
            .await
            .map_err(|e| PrinterError::WriteFailed(format!("Task error: {}", e)))?;

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                if is_link_loss(&e) {
                    warn!(error = %e, device = %self.device.display(), "printer dropped the link");
                    *lock(&self.file) = None;
                    self.connected.store(false, Ordering::SeqCst);
                    let _ = self.link_events.send(LinkLost {
                        reason: e.to_string(),
                    });
                }
                Err(PrinterError::WriteFailed(e.to_string()))
            }
        }
    }

    async fn disconnect(&self) -> PrintResult<()> {
        *lock(&self.file) = None;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe_disconnects(&self) -> broadcast::Receiver<LinkLost> {
        self.link_events.subscribe()
    }
}

fn open_raw(device: &Path) -> PrintResult<File> {
    let file = OpenOptions::new().write(true).open(device).map_err(|e| {
        PrinterError::ConnectionFailed(format!("Failed to open {}: {}", device.display(), e))
    })?;
    configure_tty_raw(&file)?;
    Ok(file)
}

fn write_chunked(file: &Mutex<Option<File>>, data: &[u8]) -> io::Result<()> {
    let mut guard = lock(file);
    let file = guard
        .as_mut()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "device is not open"))?;

    for (i, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
        if i > 0 {
            thread::sleep(Duration::from_millis(CHUNK_DELAY_MS));
        }
        file.write_all(chunk)?;
    }
    file.flush()
}

/// Errors meaning the remote end is gone rather than a transient hiccup.
fn is_link_loss(e: &io::Error) -> bool {
    if matches!(
        e.kind(),
        io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected | io::ErrorKind::ConnectionReset
    ) {
        return true;
    }
    #[cfg(unix)]
    {
        matches!(
            e.raw_os_error(),
            Some(libc::EIO) | Some(libc::ENODEV) | Some(libc::EHOSTDOWN) | Some(libc::ENXIO)
        )
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Put the TTY in raw mode: binary-safe, no line discipline.
///
/// `cfmakeraw` also clears IXON/IXOFF, which matters because 0x11 and 0x13
/// show up in command parameters.
#[cfg(unix)]
fn configure_tty_raw(file: &File) -> PrintResult<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let failed = |call: &str| {
        PrinterError::ConnectionFailed(format!("{} failed: {}", call, io::Error::last_os_error()))
    };

    // SAFETY: `fd` stays open for the borrow of `file`, and `termios` is
    // plain data filled in by tcgetattr before it is read.
    let mut termios: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut termios) } != 0 {
        return Err(failed("tcgetattr"));
    }
    unsafe { libc::cfmakeraw(&mut termios) };
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(failed("tcsetattr"));
    }
    Ok(())
}

#[cfg(not(unix))]
fn configure_tty_raw(_file: &File) -> PrintResult<()> {
    Ok(())
}

// ============================================================================
// RFCOMM BINDING
// ============================================================================

/// Checks for a `XX:XX:XX:XX:XX:XX` Bluetooth address.
pub fn is_valid_mac(mac: &str) -> bool {
    mac.len() == 17
        && mac.split(':').count() == 6
        && mac
            .split(':')
            .all(|octet| octet.len() == 2 && octet.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn bound_device_in(listing: &str, mac: &str) -> Option<PathBuf> {
    parse_rfcomm_listing(listing)
        .into_iter()
        .find(|(_, bound)| bound.eq_ignore_ascii_case(mac))
        .map(|(device, _)| PathBuf::from(device))
}

/// The existing `/dev/rfcommN` bound to `mac`, if its node is present.
pub fn find_rfcomm_for_mac(mac: &str) -> Option<PathBuf> {
    let listing = std::fs::read_to_string("/proc/net/rfcomm").ok()?;
    bound_device_in(&listing, mac).filter(|device| device.exists())
}

/// Bind `/dev/rfcomm<index>` to `mac` on RFCOMM channel 1, where these
/// printers serve SPP. Needs root.
pub fn bind_rfcomm(mac: &str, index: u8) -> PrintResult<PathBuf> {
    let device = PathBuf::from(format!("/dev/rfcomm{}", index));
    info!(%mac, device = %device.display(), "binding RFCOMM device");

    let output = Command::new("rfcomm")
        .args(["bind", &index.to_string(), mac, "1"])
        .output()
        .map_err(|e| PrinterError::ConnectionFailed(format!("could not run rfcomm: {}", e)))?;
    if !output.status.success() {
        return Err(PrinterError::ConnectionFailed(format!(
            "rfcomm bind failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    // udev creates the node after the bind returns
    for _ in 0..BIND_POLLS {
        if device.exists() {
            return Ok(device);
        }
        thread::sleep(BIND_POLL_INTERVAL);
    }
    Err(PrinterError::ConnectionFailed(format!(
        "{} did not appear after binding",
        device.display()
    )))
}

/// Bound RFCOMM devices as `(device, mac)` pairs, from `/proc/net/rfcomm`.
pub fn list_bound_devices() -> Vec<(String, String)> {
    std::fs::read_to_string("/proc/net/rfcomm")
        .map(|contents| parse_rfcomm_listing(&contents))
        .unwrap_or_default()
}

fn parse_rfcomm_listing(listing: &str) -> Vec<(String, String)> {
    listing
        .lines()
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            let mac = rest.split_whitespace().find(|word| is_valid_mac(word))?;
            Some((format!("/dev/{}", name.trim()), mac.to_uppercase()))
        })
        .collect()
}
