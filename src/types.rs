//! Core data types shared across the coordination core.
//!
//! Samples are immutable once constructed and serialize with the exact
//! field names the backend expects, so a flushed batch is just a JSON
//! array of these records keyed by its generated id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch, with sub-second precision.
pub fn epoch_seconds(t: DateTime<Utc>) -> f64 {
    t.timestamp_millis() as f64 / 1000.0
}

/// One of the two physical sensor roles.
///
/// Slots are fixed connection endpoints; the user-facing waist/wrist
/// assignment is a presentation concern resolved through [`SensorSlot::tag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorSlot {
    Primary,
    Secondary,
}

impl SensorSlot {
    /// All slots, in driver order.
    pub const ALL: [SensorSlot; 2] = [SensorSlot::Primary, SensorSlot::Secondary];

    /// Zero-based index used for per-slot storage.
    pub fn index(&self) -> usize {
        match self {
            SensorSlot::Primary => 0,
            SensorSlot::Secondary => 1,
        }
    }

    /// Wire slot number carried on every sample: 1 for primary, 2 for
    /// secondary, swapped when the waist/wrist role-swap setting is on.
    pub fn tag(&self, role_swap: bool) -> u8 {
        match (self, role_swap) {
            (SensorSlot::Primary, false) | (SensorSlot::Secondary, true) => 1,
            (SensorSlot::Primary, true) | (SensorSlot::Secondary, false) => 2,
        }
    }
}

/// Kind of reading a sample carries.
///
/// `Null` marks the placeholder sample synthesized for single-point hazard
/// reports, which carry no real sensor data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Gyroscope,
    Acceleration,
    Null,
}

/// A GPS fix: latitude, longitude, altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GeoPoint {
    /// The zero triple, used when a session produced no samples.
    pub const ZERO: GeoPoint = GeoPoint {
        latitude: 0.0,
        longitude: 0.0,
        altitude: 0.0,
    };

    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }
}

/// A single recorded sensor sample, tagged with location and time.
///
/// Immutable after construction. Field names match the persisted batch
/// record shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    /// What the 3-axis reading measures.
    pub kind: SampleKind,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    #[serde(rename = "alt")]
    pub altitude: f64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    /// Wire slot number (1 or 2; 0 for synthesized placeholder samples).
    pub slot: u8,
}

impl MotionSample {
    pub fn new(
        kind: SampleKind,
        axes: [f32; 3],
        location: GeoPoint,
        timestamp: f64,
        slot: u8,
    ) -> Self {
        Self {
            kind,
            x: axes[0],
            y: axes[1],
            z: axes[2],
            latitude: location.latitude,
            longitude: location.longitude,
            altitude: location.altitude,
            timestamp,
            slot,
        }
    }

    /// The placeholder sample used by single-point hazard reports.
    pub fn placeholder(location: GeoPoint, timestamp: f64) -> Self {
        Self::new(SampleKind::Null, [0.0, 0.0, 0.0], location, timestamp, 0)
    }

    /// The location this sample was recorded at.
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude, self.altitude)
    }
}

/// An ordered group of samples flushed together under one identifier.
///
/// Insertion order is significant: it reconstructs the recording timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleBatch {
    samples: Vec<MotionSample>,
}

impl SampleBatch {
    pub fn new(samples: Vec<MotionSample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[MotionSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
