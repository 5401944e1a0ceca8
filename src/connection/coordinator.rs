//! Per-slot connection drivers.
//!
//! Each sensor slot gets one spawned driver task that owns every state
//! transition for that slot: commands, unexpected-drop events from the link,
//! and a periodic status poll all funnel through the same task, so
//! transitions can never interleave. The two slot drivers are fully
//! independent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{BatteryStatus, ConnectionState, SlotEvent, SlotStatus};
use crate::alerts::{Alert, NotificationGate};
use crate::config::SharedSettings;
use crate::link::{IndicatorColor, SensorLink};
use crate::types::SensorSlot;

/// Disconnect-alert bodies, chosen by whether a session is recording.
const DISCONNECT_BODY_RECORDING: &str = "Ongoing walking session temporarily suspended. \
     Please reconnect to your IMU sensor on the app.";
const DISCONNECT_BODY_IDLE: &str = "Walking detection is not available while disconnected. \
     Please reconnect to your IMU sensor on the app.";

/// Coordinator tuning.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Minimum RSSI (dBm, exclusive) a discovery must exceed, per slot.
    /// The secondary slot accepts any signal strength.
    pub rssi_thresholds: [i16; 2],
    /// How often a connected slot verifies the link is still alive.
    pub poll_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            rssi_thresholds: [-90, i16::MIN],
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum SlotCommand {
    Scan,
    CancelScan,
    Disconnect,
    Ping,
    RefreshBattery,
    Shutdown,
}

struct SlotHandle {
    cmd_tx: mpsc::Sender<SlotCommand>,
    status: Arc<RwLock<SlotStatus>>,
    _task: JoinHandle<()>,
}

/// Owns the two slot state machines and their driver tasks.
pub struct ConnectionCoordinator {
    slots: [SlotHandle; 2],
    events_tx: broadcast::Sender<SlotEvent>,
}

impl ConnectionCoordinator {
    pub fn new(
        link: Arc<dyn SensorLink>,
        settings: SharedSettings,
        gate: Arc<NotificationGate>,
        recording: Arc<AtomicBool>,
    ) -> Self {
        Self::with_config(link, settings, gate, recording, CoordinatorConfig::default())
    }

    pub fn with_config(
        link: Arc<dyn SensorLink>,
        settings: SharedSettings,
        gate: Arc<NotificationGate>,
        recording: Arc<AtomicBool>,
        config: CoordinatorConfig,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(32);
        let slots = SensorSlot::ALL.map(|slot| {
            let status = Arc::new(RwLock::new(SlotStatus::idle()));
            let (cmd_tx, cmd_rx) = mpsc::channel(8);
            let driver = SlotDriver {
                slot,
                link: Arc::clone(&link),
                settings: settings.clone(),
                gate: Arc::clone(&gate),
                recording: Arc::clone(&recording),
                status: Arc::clone(&status),
                events_tx: events_tx.clone(),
                rssi_threshold: config.rssi_thresholds[slot.index()],
                poll_interval: config.poll_interval,
            };
            let task = tokio::spawn(driver.run(cmd_rx));
            SlotHandle {
                cmd_tx,
                status,
                _task: task,
            }
        });
        Self { slots, events_tx }
    }

    /// Begin a scan/connect cycle for the slot. Ignored unless idle.
    pub async fn scan(&self, slot: SensorSlot) {
        self.send(slot, SlotCommand::Scan).await;
    }

    /// Abort an in-progress scan, forcing the slot back to idle.
    pub async fn cancel_scan(&self, slot: SensorSlot) {
        self.send(slot, SlotCommand::CancelScan).await;
    }

    /// User-requested disconnect: resets the link and ends in idle.
    pub async fn disconnect(&self, slot: SensorSlot) {
        self.send(slot, SlotCommand::Disconnect).await;
    }

    /// Flash the device LED so the user can tell the two sensors apart.
    pub async fn ping(&self, slot: SensorSlot) {
        self.send(slot, SlotCommand::Ping).await;
    }

    /// Re-read the battery state of a connected slot.
    pub async fn refresh_battery(&self, slot: SensorSlot) {
        self.send(slot, SlotCommand::RefreshBattery).await;
    }

    /// Stop both slot drivers.
    pub async fn shutdown(&self) {
        for slot in SensorSlot::ALL {
            self.send(slot, SlotCommand::Shutdown).await;
        }
    }

    pub fn status(&self, slot: SensorSlot) -> SlotStatus {
        *self.slots[slot.index()]
            .status
            .read()
            .expect("status lock poisoned")
    }

    pub fn is_connected(&self, slot: SensorSlot) -> bool {
        self.status(slot).state == ConnectionState::Connected
    }

    /// Subscribe to slot lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<SlotEvent> {
        self.events_tx.subscribe()
    }

    async fn send(&self, slot: SensorSlot, cmd: SlotCommand) {
        if self.slots[slot.index()].cmd_tx.send(cmd).await.is_err() {
            log::warn!("slot driver for {:?} is no longer running", slot);
        }
    }
}

/// The single-writer state machine for one slot.
struct SlotDriver {
    slot: SensorSlot,
    link: Arc<dyn SensorLink>,
    settings: SharedSettings,
    gate: Arc<NotificationGate>,
    recording: Arc<AtomicBool>,
    status: Arc<RwLock<SlotStatus>>,
    events_tx: broadcast::Sender<SlotEvent>,
    rssi_threshold: i16,
    poll_interval: Duration,
}

impl SlotDriver {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SlotCommand>) {
        let mut drops = self.link.drop_events();
        let mut drops_open = true;
        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe = cmd_rx.recv() => {
                    let Some(cmd) = maybe else { break };
                    match cmd {
                        SlotCommand::Scan => {
                            if self.scan(&mut cmd_rx).await {
                                break;
                            }
                        }
                        // No scan in flight outside `scan`, nothing to cancel
                        SlotCommand::CancelScan => {}
                        SlotCommand::Disconnect => self.disconnect().await,
                        SlotCommand::Ping => self.ping().await,
                        SlotCommand::RefreshBattery => self.refresh_battery().await,
                        SlotCommand::Shutdown => break,
                    }
                }
                result = drops.recv(), if drops_open => match result {
                    Ok(slot) if slot == self.slot => {
                        if self.handle_drop(&mut cmd_rx).await {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("slot {:?} missed {} drop events", self.slot, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => drops_open = false,
                },
                _ = poll.tick() => {
                    if self.poll_status(&mut cmd_rx).await {
                        break;
                    }
                }
            }
        }
    }

    /// One scan/connect cycle. Keeps servicing the command queue while the
    /// scan is in flight, so cancellation works and a second scan for this
    /// slot cannot start. Returns true if shutdown was requested.
    async fn scan(&mut self, cmd_rx: &mut mpsc::Receiver<SlotCommand>) -> bool {
        if self.state() != ConnectionState::Idle {
            log::debug!("scan ignored for {:?} in state {:?}", self.slot, self.state());
            return false;
        }
        self.set_state(ConnectionState::Scanning, None);
        log::info!("scanning for {:?}", self.slot);

        let mut discoveries = match self.link.scan(self.slot).await {
            Ok(rx) => rx,
            Err(e) => {
                log::warn!("scan failed for {:?}: {}", self.slot, e);
                self.set_state(ConnectionState::Idle, None);
                self.emit(SlotEvent::ConnectFailed(self.slot));
                return false;
            }
        };

        loop {
            tokio::select! {
                maybe = discoveries.recv() => {
                    let Some(device) = maybe else {
                        self.set_state(ConnectionState::Idle, None);
                        return false;
                    };
                    if device.rssi <= self.rssi_threshold {
                        continue;
                    }
                    let _ = self.link.stop_scan(self.slot).await;
                    self.set_state(ConnectionState::Found, None);
                    match self.link.connect(self.slot, &device).await {
                        Ok(()) => {
                            self.set_state(ConnectionState::Connected, Some(device.id));
                            let _ = self
                                .link
                                .flash_indicator(self.slot, IndicatorColor::Green, 3)
                                .await;
                            log::info!("sensor connected on {:?}", self.slot);
                            self.emit(SlotEvent::Connected(self.slot));
                        }
                        Err(e) => {
                            log::warn!("connect failed for {:?}: {}", self.slot, e);
                            self.set_state(ConnectionState::Idle, None);
                            self.emit(SlotEvent::ConnectFailed(self.slot));
                        }
                    }
                    return false;
                }
                maybe = cmd_rx.recv() => match maybe {
                    Some(SlotCommand::CancelScan) | Some(SlotCommand::Disconnect) => {
                        let _ = self.link.stop_scan(self.slot).await;
                        self.set_state(ConnectionState::Idle, None);
                        log::info!("scan cancelled for {:?}", self.slot);
                        return false;
                    }
                    // Already scanning: at most one scan per slot
                    Some(SlotCommand::Scan) => {}
                    Some(SlotCommand::Ping) | Some(SlotCommand::RefreshBattery) => {}
                    Some(SlotCommand::Shutdown) | None => {
                        let _ = self.link.stop_scan(self.slot).await;
                        self.set_state(ConnectionState::Idle, None);
                        return true;
                    }
                },
            }
        }
    }

    /// React to an unexpected drop: back to idle, then either rescan
    /// (auto-reconnect) or alert the user. Returns true on shutdown.
    async fn handle_drop(&mut self, cmd_rx: &mut mpsc::Receiver<SlotCommand>) -> bool {
        if self.state() != ConnectionState::Connected {
            return false;
        }
        log::warn!("sensor on {:?} disconnected unexpectedly", self.slot);
        self.set_state(ConnectionState::Idle, None);
        let recording = self.recording.load(Ordering::SeqCst);
        self.emit(SlotEvent::Disconnected {
            slot: self.slot,
            while_recording: recording,
        });

        let settings = self.settings.snapshot();
        if settings.auto_reconnect_enabled {
            return self.scan(cmd_rx).await;
        }
        if settings.disconnect_alerts_enabled {
            let body = if recording {
                DISCONNECT_BODY_RECORDING
            } else {
                DISCONNECT_BODY_IDLE
            };
            self.gate
                .notify(
                    Alert::new("Sensor Disconnected", body)
                        .rate_limited(60, "sensor-disconnect-alert"),
                )
                .await;
        }
        false
    }

    async fn disconnect(&mut self) {
        if self.state() != ConnectionState::Connected {
            log::debug!(
                "disconnect ignored for {:?} in state {:?}",
                self.slot,
                self.state()
            );
            return;
        }
        self.set_state(ConnectionState::Disconnecting, self.device());
        let _ = self
            .link
            .flash_indicator(self.slot, IndicatorColor::Red, 1)
            .await;
        if let Err(e) = self.link.reset(self.slot).await {
            log::warn!("link reset failed for {:?}: {}", self.slot, e);
        }
        self.set_state(ConnectionState::Idle, None);
        self.refresh_battery().await;
        log::info!("sensor on {:?} disconnected", self.slot);
    }

    async fn ping(&mut self) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        let _ = self
            .link
            .flash_indicator(self.slot, IndicatorColor::Blue, 3)
            .await;
    }

    async fn refresh_battery(&mut self) {
        // Keep the last known reading when the device is unreachable
        if !self.link.is_connected(self.slot).await {
            return;
        }
        match self.link.read_battery(self.slot).await {
            Ok(percent) => {
                let mut status = self.status.write().expect("status lock poisoned");
                status.battery = Some(BatteryStatus::from_percent(percent));
            }
            Err(e) => log::warn!("battery read failed for {:?}: {}", self.slot, e),
        }
    }

    /// Detect silent drops the link never reported.
    async fn poll_status(&mut self, cmd_rx: &mut mpsc::Receiver<SlotCommand>) -> bool {
        if self.state() == ConnectionState::Connected && !self.link.is_connected(self.slot).await {
            return self.handle_drop(cmd_rx).await;
        }
        false
    }

    fn state(&self) -> ConnectionState {
        self.status.read().expect("status lock poisoned").state
    }

    fn device(&self) -> Option<Uuid> {
        self.status.read().expect("status lock poisoned").device
    }

    fn set_state(&self, state: ConnectionState, device: Option<Uuid>) {
        let mut status = self.status.write().expect("status lock poisoned");
        status.state = state;
        status.device = device;
    }

    fn emit(&self, event: SlotEvent) {
        let _ = self.events_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::MemoryAlertChannel;
    use crate::link::simulated::SimSensorLink;

    const SETTLE: Duration = Duration::from_millis(50);

    struct Fixture {
        coordinator: ConnectionCoordinator,
        link: Arc<SimSensorLink>,
        channel: Arc<MemoryAlertChannel>,
        settings: SharedSettings,
        recording: Arc<AtomicBool>,
    }

    fn fixture() -> Fixture {
        let link = SimSensorLink::new();
        let channel = MemoryAlertChannel::new();
        let settings = SharedSettings::default();
        let gate = Arc::new(NotificationGate::new(channel.clone()));
        let recording = Arc::new(AtomicBool::new(false));
        let coordinator = ConnectionCoordinator::new(
            Arc::clone(&link) as Arc<dyn SensorLink>,
            settings.clone(),
            gate,
            Arc::clone(&recording),
        );
        Fixture {
            coordinator,
            link,
            channel,
            settings,
            recording,
        }
    }

    async fn wait_for_state(
        coordinator: &ConnectionCoordinator,
        slot: SensorSlot,
        state: ConnectionState,
    ) {
        for _ in 0..200 {
            if coordinator.status(slot).state == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "slot {:?} never reached {:?} (stuck in {:?})",
            slot,
            state,
            coordinator.status(slot).state
        );
    }

    /// Advertise once the slot's scan stream is actually registered; the
    /// driver flips its status to `Scanning` just before opening the stream.
    async fn advertise(f: &Fixture, slot: SensorSlot, rssi: i16) {
        for _ in 0..200 {
            if f.link.advertise(slot, rssi).await.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no active scan for {:?}", slot);
    }

    async fn connect_slot(f: &Fixture, slot: SensorSlot) {
        f.coordinator.scan(slot).await;
        advertise(f, slot, -40).await;
        wait_for_state(&f.coordinator, slot, ConnectionState::Connected).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_filters_weak_signal_then_connects() {
        let f = fixture();
        f.coordinator.scan(SensorSlot::Primary).await;

        // Below the -90 dBm primary threshold: ignored, scan continues
        advertise(&f, SensorSlot::Primary, -95).await;
        tokio::time::sleep(SETTLE).await;
        assert_eq!(
            f.coordinator.status(SensorSlot::Primary).state,
            ConnectionState::Scanning
        );

        advertise(&f, SensorSlot::Primary, -40).await;
        wait_for_state(&f.coordinator, SensorSlot::Primary, ConnectionState::Connected).await;
        assert!(f.coordinator.is_connected(SensorSlot::Primary));
        assert!(f.coordinator.status(SensorSlot::Primary).device.is_some());
        assert_eq!(
            f.link.flashes(SensorSlot::Primary).await,
            vec![(IndicatorColor::Green, 3)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_reverts_to_idle() {
        let f = fixture();
        let mut events = f.coordinator.events();
        f.link.fail_next_connect(SensorSlot::Primary).await;

        f.coordinator.scan(SensorSlot::Primary).await;
        advertise(&f, SensorSlot::Primary, -40).await;
        wait_for_state(&f.coordinator, SensorSlot::Primary, ConnectionState::Idle).await;

        assert_eq!(
            events.recv().await.unwrap(),
            SlotEvent::ConnectFailed(SensorSlot::Primary)
        );
        assert!(f.coordinator.status(SensorSlot::Primary).device.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_scan_forces_idle() {
        let f = fixture();
        f.coordinator.scan(SensorSlot::Secondary).await;
        wait_for_state(&f.coordinator, SensorSlot::Secondary, ConnectionState::Scanning).await;

        f.coordinator.cancel_scan(SensorSlot::Secondary).await;
        wait_for_state(&f.coordinator, SensorSlot::Secondary, ConnectionState::Idle).await;
        assert!(!f.link.is_scanning(SensorSlot::Secondary).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_always_ends_idle() {
        let f = fixture();
        connect_slot(&f, SensorSlot::Primary).await;

        f.coordinator.disconnect(SensorSlot::Primary).await;
        wait_for_state(&f.coordinator, SensorSlot::Primary, ConnectionState::Idle).await;
        assert_eq!(f.link.reset_count(SensorSlot::Primary).await, 1);
        assert_eq!(
            f.link.flashes(SensorSlot::Primary).await,
            vec![(IndicatorColor::Green, 3), (IndicatorColor::Red, 1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_drop_without_reconnect_alerts_once() {
        let f = fixture();
        connect_slot(&f, SensorSlot::Primary).await;

        f.link.drop_connection(SensorSlot::Primary).await;
        wait_for_state(&f.coordinator, SensorSlot::Primary, ConnectionState::Idle).await;
        tokio::time::sleep(SETTLE).await;

        // No rescan was started
        assert!(!f.link.is_scanning(SensorSlot::Primary).await);
        let delivered = f.channel.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].0, "Sensor Disconnected");
        assert!(delivered[0].1.starts_with("Walking detection is not available"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_while_recording_uses_session_body() {
        let f = fixture();
        connect_slot(&f, SensorSlot::Primary).await;
        f.recording.store(true, Ordering::SeqCst);

        f.link.drop_connection(SensorSlot::Primary).await;
        wait_for_state(&f.coordinator, SensorSlot::Primary, ConnectionState::Idle).await;
        tokio::time::sleep(SETTLE).await;

        let delivered = f.channel.delivered();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].1.starts_with("Ongoing walking session"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_reconnect_rescans_without_alert() {
        let f = fixture();
        f.settings.update(|s| s.auto_reconnect_enabled = true);
        connect_slot(&f, SensorSlot::Primary).await;

        f.link.drop_connection(SensorSlot::Primary).await;
        wait_for_state(&f.coordinator, SensorSlot::Primary, ConnectionState::Scanning).await;
        assert!(f.channel.delivered().is_empty());

        // The rescan connects again once a device reappears
        advertise(&f, SensorSlot::Primary, -30).await;
        wait_for_state(&f.coordinator, SensorSlot::Primary, ConnectionState::Connected).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_drop_detected_by_status_poll() {
        let f = fixture();
        connect_slot(&f, SensorSlot::Primary).await;

        f.link.silent_drop(SensorSlot::Primary).await;
        // The 1-second poll notices the dead link
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            f.coordinator.status(SensorSlot::Primary).state,
            ConnectionState::Idle
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_battery_refresh_updates_fill() {
        let f = fixture();
        connect_slot(&f, SensorSlot::Primary).await;
        f.link.set_battery(SensorSlot::Primary, 79).await;

        f.coordinator.refresh_battery(SensorSlot::Primary).await;
        tokio::time::sleep(SETTLE).await;

        let battery = f.coordinator.status(SensorSlot::Primary).battery.unwrap();
        assert_eq!(battery.percent, 79);
        assert_eq!(battery.fill, 75);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_flashes_blue_when_connected() {
        let f = fixture();
        // Not connected yet: ignored
        f.coordinator.ping(SensorSlot::Primary).await;
        tokio::time::sleep(SETTLE).await;
        assert!(f.link.flashes(SensorSlot::Primary).await.is_empty());

        connect_slot(&f, SensorSlot::Primary).await;
        f.coordinator.ping(SensorSlot::Primary).await;
        tokio::time::sleep(SETTLE).await;
        assert_eq!(
            f.link.flashes(SensorSlot::Primary).await,
            vec![(IndicatorColor::Green, 3), (IndicatorColor::Blue, 3)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_scan_independently() {
        let f = fixture();
        f.coordinator.scan(SensorSlot::Primary).await;
        f.coordinator.scan(SensorSlot::Secondary).await;
        wait_for_state(&f.coordinator, SensorSlot::Primary, ConnectionState::Scanning).await;

        // Secondary has no signal floor; a weak device still connects
        advertise(&f, SensorSlot::Secondary, -95).await;
        wait_for_state(&f.coordinator, SensorSlot::Secondary, ConnectionState::Connected).await;
        assert_eq!(
            f.coordinator.status(SensorSlot::Primary).state,
            ConnectionState::Scanning
        );
    }
}
