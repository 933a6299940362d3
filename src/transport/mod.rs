//! # Printer Transport Layer
//!
//! The seam between the device session and the host's Bluetooth stack.
//!
//! The session only needs four things from a platform: pick a device,
//! enumerate its services and characteristics, write bytes to one
//! characteristic, and report when the device drops the link. Those are the
//! [`BleAdapter`] and [`Peripheral`] traits.
//!
//! ## Available Transports
//!
//! - [`rfcomm`]: Linux RFCOMM serial devices (`/dev/rfcommN`)
//! - [`mock`]: In-memory printer with scriptable failures

pub mod mock;
pub mod rfcomm;

pub use mock::{MockAdapter, MockPeripheral};
pub use rfcomm::{RfcommAdapter, RfcommPeripheral};

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::PrintResult;

/// What a characteristic allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
}

impl CharProperties {
    /// Accepts writes with or without acknowledgment.
    pub fn is_writable(&self) -> bool {
        self.write || self.write_without_response
    }
}

/// How a write is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Acknowledged by the peripheral
    WithResponse,
    /// Fire-and-forget, faster on most printers
    WithoutResponse,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Characteristic {
    pub uuid: Uuid,
    pub properties: CharProperties,
}

impl Characteristic {
    pub fn new(uuid: Uuid, properties: CharProperties) -> Self {
        Self { uuid, properties }
    }

    /// Unacknowledged when the characteristic supports it, acknowledged
    /// otherwise.
    pub fn write_kind(&self) -> WriteKind {
        if self.properties.write_without_response {
            WriteKind::WithoutResponse
        } else {
            WriteKind::WithResponse
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<Characteristic>,
}

/// Services a device may expose for the session to be allowed to use them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryFilter {
    pub services: Vec<Uuid>,
}

/// Sent by a peripheral when the remote side drops the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLost {
    pub reason: String,
}

/// Host Bluetooth stack: availability and device selection.
#[async_trait]
pub trait BleAdapter: Send + Sync {
    /// `Err(PlatformUnsupported)` when the host cannot do Bluetooth at all.
    async fn ensure_available(&self) -> PrintResult<()>;

    /// Let the user (or the platform) pick one device.
    ///
    /// Suspends until selection completes. Cancelled or failed selection is
    /// `Err(ConnectionFailed)`.
    async fn request_device(&self, filter: &DiscoveryFilter) -> PrintResult<Arc<dyn Peripheral>>;
}

/// One remote device.
#[async_trait]
pub trait Peripheral: Send + Sync {
    fn id(&self) -> String;

    fn name(&self) -> Option<String>;

    /// Establish the link.
    async fn connect(&self) -> PrintResult<()>;

    fn is_connected(&self) -> bool;

    /// Primary services and their characteristics, in device order.
    async fn services(&self) -> PrintResult<Vec<GattService>>;

    async fn write(
        &self,
        characteristic: &Characteristic,
        data: &[u8],
        kind: WriteKind,
    ) -> PrintResult<()>;

    /// Tear down the link. Does not emit [`LinkLost`].
    async fn disconnect(&self) -> PrintResult<()>;

    /// A new receiver for device-initiated disconnects. Dropping it
    /// unsubscribes.
    fn subscribe_disconnects(&self) -> broadcast::Receiver<LinkLost>;
}
