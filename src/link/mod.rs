//! Sensor link layer.
//!
//! Abstracts the vendor sensor SDK behind the [`SensorLink`] trait, with an
//! in-process simulated link for tests and demos. The real transport lives
//! outside this crate.

pub mod simulated;
pub mod transport;

pub use transport::{DiscoveredDevice, IndicatorColor, RawReading, SensorLink, SignalKind};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Scan error: {0}")]
    ScanError(String),

    #[error("Signal error: {0}")]
    SignalError(String),

    #[error("Battery read error: {0}")]
    BatteryError(String),

    #[error("Sensor disconnected")]
    Disconnected,

    #[error("Operation timed out")]
    Timeout,
}
