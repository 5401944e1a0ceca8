//! Recording session management.
//!
//! [`buffer`] accumulates samples into capped batches, [`persist`] drains
//! flushed batches to the store in the background, and [`recorder`] owns the
//! session lifecycle from start through finalize or cancel.

pub mod buffer;
pub mod persist;
pub mod recorder;

pub use buffer::{SampleBuffer, DEFAULT_BATCH_CAP};
pub use persist::{BatchWrite, PersistQueue};
pub use recorder::SessionRecorder;

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("no active recording session")]
    NotActive,

    #[error(transparent)]
    Store(#[from] StoreError),
}
