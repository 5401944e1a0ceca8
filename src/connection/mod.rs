//! Sensor connection management.
//!
//! One state machine per sensor slot, driven by [`ConnectionCoordinator`].
//! Presentation reads [`SlotStatus`]; everything else reacts to
//! [`SlotEvent`]s.

pub mod coordinator;

pub use coordinator::{ConnectionCoordinator, CoordinatorConfig};

use uuid::Uuid;

use crate::types::SensorSlot;

/// Connection lifecycle of a slot.
///
/// `Idle → Scanning → Found → Connected → Disconnecting → Idle`, with a
/// direct `Connected → Idle` edge on unexpected loss. Transitions are made
/// only by the slot's driver task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Found,
    Connected,
    Disconnecting,
}

/// Battery reading with the coarse 5-level fill indicator used by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    /// Charge percentage as reported by the device.
    pub percent: u8,
    /// Fill level in steps of 25 (0, 25, 50, 75, 100).
    pub fill: u8,
}

impl BatteryStatus {
    pub fn from_percent(percent: u8) -> Self {
        Self {
            percent,
            fill: (percent / 20).min(4) * 25,
        }
    }
}

/// Live status of one slot, readable at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotStatus {
    pub state: ConnectionState,
    /// Opaque device handle; present iff connected (or mid-disconnect).
    pub device: Option<Uuid>,
    /// Last successful battery reading, if any.
    pub battery: Option<BatteryStatus>,
}

impl SlotStatus {
    pub fn idle() -> Self {
        Self {
            state: ConnectionState::Idle,
            device: None,
            battery: None,
        }
    }
}

/// Events emitted by the coordinator for downstream consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotEvent {
    /// A scan/connect cycle completed successfully.
    Connected(SensorSlot),
    /// A scan or connect attempt failed; the slot is idle again.
    ConnectFailed(SensorSlot),
    /// The connection dropped outside a user-requested disconnect.
    Disconnected {
        slot: SensorSlot,
        while_recording: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_fill_levels() {
        assert_eq!(BatteryStatus::from_percent(100).fill, 100);
        assert_eq!(BatteryStatus::from_percent(85).fill, 100);
        assert_eq!(BatteryStatus::from_percent(79).fill, 75);
        assert_eq!(BatteryStatus::from_percent(45).fill, 50);
        assert_eq!(BatteryStatus::from_percent(19).fill, 0);
        assert_eq!(BatteryStatus::from_percent(0).fill, 0);
    }
}
