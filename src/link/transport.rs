//! Sensor link trait definitions and core types.
//!
//! Defines the abstract sensor interface that the simulated link and any
//! real vendor-SDK bridge conform to. Discovery and signal data arrive as
//! channel streams so the coordination core can be tested deterministically
//! without a physical transport.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::LinkError;
use crate::types::{SampleKind, SensorSlot};

/// Signal streams a sensor can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Gyroscope,
    Acceleration,
}

impl SignalKind {
    /// Both signal kinds, in subscription order.
    pub const ALL: [SignalKind; 2] = [SignalKind::Gyroscope, SignalKind::Acceleration];

    /// The sample kind recorded for readings from this signal.
    pub fn sample_kind(&self) -> SampleKind {
        match self {
            SignalKind::Gyroscope => SampleKind::Gyroscope,
            SignalKind::Acceleration => SampleKind::Acceleration,
        }
    }
}

/// LED color used for on-device visual acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorColor {
    Green,
    Blue,
    Red,
}

/// A device seen during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Opaque device handle; ownership stays with the link.
    pub id: Uuid,
    /// Received signal strength in dBm.
    pub rssi: i16,
}

/// A raw 3-axis reading from a subscribed signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawReading {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Seconds since the Unix epoch, stamped by the link.
    pub timestamp: f64,
}

/// The transport collaborator: scan, connect, subscribe, and device control.
///
/// Implementations must tolerate redundant calls (`stop_scan` with no active
/// scan, `unsubscribe` of an unknown stream) as no-ops.
#[async_trait]
pub trait SensorLink: Send + Sync {
    /// Start scanning for the given slot. Discovered devices arrive on the
    /// returned stream until `stop_scan` is called or the receiver is
    /// dropped. At most one scan per slot may be active.
    async fn scan(&self, slot: SensorSlot) -> Result<mpsc::Receiver<DiscoveredDevice>, LinkError>;

    /// Stop an active scan for the slot.
    async fn stop_scan(&self, slot: SensorSlot) -> Result<(), LinkError>;

    /// Connect the slot to a previously discovered device.
    async fn connect(&self, slot: SensorSlot, device: &DiscoveredDevice) -> Result<(), LinkError>;

    /// Subscribe to a signal stream of a connected slot.
    async fn subscribe(
        &self,
        slot: SensorSlot,
        kind: SignalKind,
    ) -> Result<mpsc::Receiver<RawReading>, LinkError>;

    /// Tear down a signal subscription.
    async fn unsubscribe(&self, slot: SensorSlot, kind: SignalKind) -> Result<(), LinkError>;

    /// Read the battery charge percentage of a connected slot.
    async fn read_battery(&self, slot: SensorSlot) -> Result<u8, LinkError>;

    /// Whether the slot currently holds a live connection.
    async fn is_connected(&self, slot: SensorSlot) -> bool;

    /// Reset the device link, dropping the connection. User-requested; does
    /// not count as an unexpected drop.
    async fn reset(&self, slot: SensorSlot) -> Result<(), LinkError>;

    /// Flash the device LED as a visual acknowledgment.
    async fn flash_indicator(
        &self,
        slot: SensorSlot,
        color: IndicatorColor,
        count: u8,
    ) -> Result<(), LinkError>;

    /// Unexpected-drop notifications. Emits the slot whose connection was
    /// lost outside a user-requested disconnect.
    fn drop_events(&self) -> broadcast::Receiver<SensorSlot>;
}
