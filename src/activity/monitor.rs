//! Walking monitor: turns classifier decisions into session directives.
//!
//! Consumes motion observations, applies the connectivity and location
//! gates, raises the user-facing walking notifications, and tells the app
//! layer when to start or stop a recording session. The monitor never
//! starts a session itself; that stays an explicit external trigger.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::classifier::{ActivityClassifier, MotionEvent};
use crate::alerts::{Alert, NotificationGate};
use crate::config::SharedSettings;
use crate::connection::{ConnectionCoordinator, SlotEvent};
use crate::location::LocationSource;
use crate::types::SensorSlot;

/// What the app layer should do with the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDirective {
    Start,
    Stop,
}

pub struct WalkingMonitor {
    classifier: ActivityClassifier,
    settings: SharedSettings,
    gate: Arc<NotificationGate>,
    coordinator: Arc<ConnectionCoordinator>,
    location: Arc<dyn LocationSource>,
    recording: Arc<AtomicBool>,
    initialized: bool,
    /// Wall-clock hours during which walking notifications are allowed
    /// unless the all-day setting is on.
    notification_hours: Range<u32>,
}

impl WalkingMonitor {
    pub fn new(
        settings: SharedSettings,
        gate: Arc<NotificationGate>,
        coordinator: Arc<ConnectionCoordinator>,
        location: Arc<dyn LocationSource>,
        recording: Arc<AtomicBool>,
    ) -> Self {
        let classifier = ActivityClassifier::new(settings.clone(), Utc::now());
        Self {
            classifier,
            settings,
            gate,
            coordinator,
            location,
            recording,
            initialized: false,
            notification_hours: 8..18,
        }
    }

    /// One-time arming, invoked on the first sensor connect. Subsequent
    /// calls are ignored.
    pub async fn initialize(&mut self, now: DateTime<Utc>) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        self.classifier.reset(now);
        if self
            .settings
            .snapshot()
            .walking_detection_notifications_enabled
        {
            self.location.start_recording().await;
        }
        log::info!("walking detection armed");
    }

    /// Feed one motion observation. Returns a directive when a sustained
    /// walking transition passes all gates.
    pub async fn handle_motion_event(
        &mut self,
        event: MotionEvent,
        now: DateTime<Utc>,
    ) -> Option<SessionDirective> {
        if !self.initialized {
            return None;
        }
        self.classifier.observe(&event, now);
        let settings = self.settings.snapshot();

        if self.recording.load(Ordering::SeqCst) {
            if self.classifier.should_stop_session(now) {
                log::info!("walking stop detected");
                if self.may_notify(now, &settings) {
                    self.gate
                        .notify_at(
                            now,
                            Alert::new(
                                "Walking Stopped Detected",
                                "Don't forget to stop the walking session!",
                            ),
                        )
                        .await;
                }
                return Some(SessionDirective::Stop);
            }
        } else if self.classifier.should_start_session(now) {
            if !self.coordinator.is_connected(SensorSlot::Primary) {
                log::debug!("walking detected, but the sensor is not connected");
                return None;
            }
            if self.location.is_disabled() {
                log::debug!("walking detected, but location services are disabled");
                return None;
            }
            log::info!("walking start detected");
            if self.may_notify(now, &settings) {
                self.gate
                    .notify_at(
                        now,
                        Alert::new(
                            "Walking Detected",
                            "Don't forget to start the walking session!",
                        ),
                    )
                    .await;
            }
            return Some(SessionDirective::Start);
        }
        None
    }

    fn may_notify(&self, now: DateTime<Utc>, settings: &crate::config::Settings) -> bool {
        settings.walking_detection_notifications_enabled
            && (settings.walking_detection_all_day_enabled
                || self.notification_hours.contains(&now.hour()))
    }

    /// Run the monitor as a task: motion events in, directives out.
    /// Also watches coordinator events to arm itself on the first connect.
    pub fn spawn(
        mut self,
        mut events: mpsc::Receiver<MotionEvent>,
    ) -> (mpsc::Receiver<SessionDirective>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);
        let mut slot_events = self.coordinator.events();
        let handle = tokio::spawn(async move {
            let mut slots_open = true;
            loop {
                tokio::select! {
                    maybe = events.recv() => {
                        let Some(event) = maybe else { break };
                        if let Some(directive) = self.handle_motion_event(event, Utc::now()).await {
                            if tx.send(directive).await.is_err() {
                                break;
                            }
                        }
                    }
                    result = slot_events.recv(), if slots_open => match result {
                        Ok(SlotEvent::Connected(_)) => self.initialize(Utc::now()).await,
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => slots_open = false,
                    },
                }
            }
        });
        (rx, handle)
    }
}
