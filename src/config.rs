//! User-configurable settings consumed by the core.
//!
//! Settings arrive from the app's remote-config/preferences layer and can
//! change at any time; consumers read them fresh at each decision point
//! through a [`SharedSettings`] handle rather than caching values.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Named settings recognized by the core. Field names mirror the keys the
/// app-layer config store uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Re-scan automatically after an unexpected sensor drop.
    pub auto_reconnect_enabled: bool,
    /// Emit "walking detected"/"walking stopped" notifications.
    pub walking_detection_notifications_enabled: bool,
    /// Allow walking-detection notifications outside daytime hours.
    pub walking_detection_all_day_enabled: bool,
    /// Sustained-motion duration (seconds) required to trigger a walking
    /// start/stop decision. Zero or negative makes every event decisive.
    pub walking_detection_sensitivity_seconds: i64,
    /// Swap the waist/wrist roles of the two physical slots.
    pub waist_wrist_role_swap: bool,
    /// Alert the user when a connected sensor drops unexpectedly.
    pub disconnect_alerts_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_reconnect_enabled: false,
            walking_detection_notifications_enabled: false,
            walking_detection_all_day_enabled: false,
            walking_detection_sensitivity_seconds: 45,
            waist_wrist_role_swap: false,
            disconnect_alerts_enabled: true,
        }
    }
}

/// Shared, live-updatable settings handle.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
}

impl SharedSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// A point-in-time copy of the current settings.
    pub fn snapshot(&self) -> Settings {
        self.inner.read().expect("settings lock poisoned").clone()
    }

    /// Apply a mutation, visible to all holders immediately.
    pub fn update(&self, apply: impl FnOnce(&mut Settings)) {
        let mut guard = self.inner.write().expect("settings lock poisoned");
        apply(&mut guard);
    }
}
