//! Location collaborator.
//!
//! `current_location` is a cheap read of the platform's last fix and is
//! called once per ingested sample; only start/stop of location recording
//! may suspend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::types::GeoPoint;

#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Last known fix. Returns the zero triple before any fix exists.
    fn current_location(&self) -> GeoPoint;

    /// Begin continuous location updates.
    async fn start_recording(&self);

    /// End continuous location updates.
    async fn stop_recording(&self);

    /// Whether location services are unavailable or denied.
    fn is_disabled(&self) -> bool;
}

/// A controllable location source for tests and demos.
#[derive(Default)]
pub struct SimLocationSource {
    fix: RwLock<Option<GeoPoint>>,
    disabled: AtomicBool,
    recording: AtomicBool,
}

impl SimLocationSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fix(&self, fix: GeoPoint) {
        *self.fix.write().expect("fix lock poisoned") = Some(fix);
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::SeqCst);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationSource for SimLocationSource {
    fn current_location(&self) -> GeoPoint {
        self.fix
            .read()
            .expect("fix lock poisoned")
            .unwrap_or(GeoPoint::ZERO)
    }

    async fn start_recording(&self) {
        self.recording.store(true, Ordering::SeqCst);
    }

    async fn stop_recording(&self) {
        self.recording.store(false, Ordering::SeqCst);
    }

    fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }
}
