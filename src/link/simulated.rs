//! In-process sensor link simulator.
//!
//! Provides a simulated two-slot sensor link where tests and demos can
//! stage discoveries, feed signal readings, and force connection drops
//! without real hardware. Mirrors the behavior contract of a vendor-SDK
//! bridge: scans are per-slot streams, subscriptions require a live
//! connection, and resets drop the link silently.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex};
use uuid::Uuid;

use super::transport::{
    DiscoveredDevice, IndicatorColor, RawReading, SensorLink, SignalKind,
};
use super::LinkError;
use crate::types::SensorSlot;

struct SimSlot {
    connected: bool,
    fail_next_connect: bool,
    battery: u8,
    scan_tx: Option<mpsc::Sender<DiscoveredDevice>>,
    signal_txs: HashMap<SignalKind, mpsc::Sender<RawReading>>,
    flashes: Vec<(IndicatorColor, u8)>,
    resets: u32,
}

impl Default for SimSlot {
    fn default() -> Self {
        Self {
            connected: false,
            fail_next_connect: false,
            battery: 100,
            scan_tx: None,
            signal_txs: HashMap::new(),
            flashes: Vec::new(),
            resets: 0,
        }
    }
}

/// A simulated sensor link covering both slots.
pub struct SimSensorLink {
    slots: [Mutex<SimSlot>; 2],
    drops_tx: broadcast::Sender<SensorSlot>,
}

impl SimSensorLink {
    pub fn new() -> Arc<Self> {
        let (drops_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            slots: [Mutex::new(SimSlot::default()), Mutex::new(SimSlot::default())],
            drops_tx,
        })
    }

    fn slot(&self, slot: SensorSlot) -> &Mutex<SimSlot> {
        &self.slots[slot.index()]
    }

    /// Stage a device appearing during an active scan. Returns the device
    /// if a scan was running to receive it.
    pub async fn advertise(&self, slot: SensorSlot, rssi: i16) -> Option<DiscoveredDevice> {
        let device = DiscoveredDevice {
            id: Uuid::new_v4(),
            rssi,
        };
        let guard = self.slot(slot).lock().await;
        let tx = guard.scan_tx.clone()?;
        drop(guard);
        tx.send(device).await.ok()?;
        Some(device)
    }

    /// Feed a reading into an active signal subscription. Returns whether
    /// a subscriber received it.
    pub async fn emit_reading(
        &self,
        slot: SensorSlot,
        kind: SignalKind,
        axes: [f32; 3],
        timestamp: f64,
    ) -> bool {
        let guard = self.slot(slot).lock().await;
        let Some(tx) = guard.signal_txs.get(&kind).cloned() else {
            return false;
        };
        drop(guard);
        tx.send(RawReading {
            x: axes[0],
            y: axes[1],
            z: axes[2],
            timestamp,
        })
        .await
        .is_ok()
    }

    /// Drop the slot's connection and emit an unexpected-drop event.
    pub async fn drop_connection(&self, slot: SensorSlot) {
        {
            let mut guard = self.slot(slot).lock().await;
            guard.connected = false;
            guard.signal_txs.clear();
        }
        let _ = self.drops_tx.send(slot);
    }

    /// Drop the connection without emitting an event, as a flaky link
    /// would. Only the status poll can notice this.
    pub async fn silent_drop(&self, slot: SensorSlot) {
        let mut guard = self.slot(slot).lock().await;
        guard.connected = false;
        guard.signal_txs.clear();
    }

    pub async fn set_battery(&self, slot: SensorSlot, percent: u8) {
        self.slot(slot).lock().await.battery = percent;
    }

    /// Make the next `connect` on this slot fail.
    pub async fn fail_next_connect(&self, slot: SensorSlot) {
        self.slot(slot).lock().await.fail_next_connect = true;
    }

    pub async fn is_scanning(&self, slot: SensorSlot) -> bool {
        self.slot(slot).lock().await.scan_tx.is_some()
    }

    /// Indicator flashes issued so far, in order.
    pub async fn flashes(&self, slot: SensorSlot) -> Vec<(IndicatorColor, u8)> {
        self.slot(slot).lock().await.flashes.clone()
    }

    pub async fn reset_count(&self, slot: SensorSlot) -> u32 {
        self.slot(slot).lock().await.resets
    }

    pub async fn subscription_count(&self, slot: SensorSlot) -> usize {
        self.slot(slot).lock().await.signal_txs.len()
    }
}

#[async_trait]
impl SensorLink for SimSensorLink {
    async fn scan(&self, slot: SensorSlot) -> Result<mpsc::Receiver<DiscoveredDevice>, LinkError> {
        let mut guard = self.slot(slot).lock().await;
        if guard.scan_tx.is_some() {
            return Err(LinkError::ScanError("scan already active".into()));
        }
        let (tx, rx) = mpsc::channel(16);
        guard.scan_tx = Some(tx);
        Ok(rx)
    }

    async fn stop_scan(&self, slot: SensorSlot) -> Result<(), LinkError> {
        self.slot(slot).lock().await.scan_tx = None;
        Ok(())
    }

    async fn connect(&self, slot: SensorSlot, _device: &DiscoveredDevice) -> Result<(), LinkError> {
        let mut guard = self.slot(slot).lock().await;
        if guard.fail_next_connect {
            guard.fail_next_connect = false;
            return Err(LinkError::ConnectionError("simulated connect failure".into()));
        }
        guard.connected = true;
        Ok(())
    }

    async fn subscribe(
        &self,
        slot: SensorSlot,
        kind: SignalKind,
    ) -> Result<mpsc::Receiver<RawReading>, LinkError> {
        let mut guard = self.slot(slot).lock().await;
        if !guard.connected {
            return Err(LinkError::SignalError("sensor not connected".into()));
        }
        let (tx, rx) = mpsc::channel(64);
        guard.signal_txs.insert(kind, tx);
        Ok(rx)
    }

    async fn unsubscribe(&self, slot: SensorSlot, kind: SignalKind) -> Result<(), LinkError> {
        self.slot(slot).lock().await.signal_txs.remove(&kind);
        Ok(())
    }

    async fn read_battery(&self, slot: SensorSlot) -> Result<u8, LinkError> {
        let guard = self.slot(slot).lock().await;
        if !guard.connected {
            return Err(LinkError::BatteryError("sensor not connected".into()));
        }
        Ok(guard.battery)
    }

    async fn is_connected(&self, slot: SensorSlot) -> bool {
        self.slot(slot).lock().await.connected
    }

    async fn reset(&self, slot: SensorSlot) -> Result<(), LinkError> {
        let mut guard = self.slot(slot).lock().await;
        guard.connected = false;
        guard.resets += 1;
        guard.signal_txs.clear();
        Ok(())
    }

    async fn flash_indicator(
        &self,
        slot: SensorSlot,
        color: IndicatorColor,
        count: u8,
    ) -> Result<(), LinkError> {
        self.slot(slot).lock().await.flashes.push((color, count));
        Ok(())
    }

    fn drop_events(&self) -> broadcast::Receiver<SensorSlot> {
        self.drops_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scan_is_exclusive_per_slot() {
        let link = SimSensorLink::new();
        let _rx = link.scan(SensorSlot::Primary).await.unwrap();
        assert!(link.scan(SensorSlot::Primary).await.is_err());
        // The other slot is independent
        assert!(link.scan(SensorSlot::Secondary).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_requires_connection() {
        let link = SimSensorLink::new();
        assert!(link
            .subscribe(SensorSlot::Primary, SignalKind::Gyroscope)
            .await
            .is_err());

        let mut rx = link.scan(SensorSlot::Primary).await.unwrap();
        let device = link.advertise(SensorSlot::Primary, -40).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), device);
        link.connect(SensorSlot::Primary, &device).await.unwrap();

        let mut readings = link
            .subscribe(SensorSlot::Primary, SignalKind::Gyroscope)
            .await
            .unwrap();
        assert!(
            link.emit_reading(SensorSlot::Primary, SignalKind::Gyroscope, [1.0, 2.0, 3.0], 10.0)
                .await
        );
        let reading = readings.recv().await.unwrap();
        assert_eq!(reading.x, 1.0);
    }

    #[tokio::test]
    async fn test_drop_connection_emits_event() {
        let link = SimSensorLink::new();
        let mut drops = link.drop_events();
        let device = DiscoveredDevice {
            id: Uuid::new_v4(),
            rssi: -50,
        };
        link.connect(SensorSlot::Secondary, &device).await.unwrap();
        link.drop_connection(SensorSlot::Secondary).await;
        assert_eq!(drops.recv().await.unwrap(), SensorSlot::Secondary);
        assert!(!link.is_connected(SensorSlot::Secondary).await);
    }
}
