// SafeStep Core - Walking-Session Coordination Engine

//! Session and state coordination core for a two-sensor wearable walking
//! recorder.
//!
//! The app layer (GUI, vendor sensor SDK, cloud SDK, platform location and
//! notification services) lives outside this crate and is reached through
//! the collaborator traits in [`link`], [`store`], [`location`], and
//! [`alerts`]. What lives here is the logic with real semantics:
//!
//! - [`connection`] — per-slot connection state machines with
//!   auto-reconnect and battery status;
//! - [`activity`] — debounced walking detection over noisy
//!   motion-confidence events;
//! - [`session`] — sample batching with at-least-once upload and the
//!   session lifecycle through finalize/cancel;
//! - [`alerts`] — rate-limited user alerting.
//!
//! Simulated collaborators ship in-tree, so the whole core can run and be
//! tested in-process; see `src/bin/sim_session.rs` for an end-to-end drive.

pub mod activity;
pub mod alerts;
pub mod config;
pub mod connection;
pub mod link;
pub mod location;
pub mod session;
pub mod store;
pub mod types;

pub use activity::{ActivityClassifier, Confidence, MotionEvent, SessionDirective, WalkingMonitor};
pub use alerts::{Alert, AlertChannel, NotificationGate};
pub use config::{Settings, SharedSettings};
pub use connection::{ConnectionCoordinator, ConnectionState, SlotEvent, SlotStatus};
pub use link::{SensorLink, SignalKind};
pub use location::LocationSource;
pub use session::{SessionError, SessionRecorder};
pub use store::{HazardDetails, HazardRecord, RecordStore};
pub use types::{GeoPoint, MotionSample, SampleBatch, SampleKind, SensorSlot};
