//! Walking activity detection.
//!
//! [`classifier`] holds the hysteresis state machine that turns noisy
//! motion-confidence events into walking start/stop decisions;
//! [`monitor`] wires it to connectivity and location gates and emits
//! session directives.

pub mod classifier;
pub mod monitor;

pub use classifier::{ActivityClassifier, Confidence, MotionEvent};
pub use monitor::{SessionDirective, WalkingMonitor};
