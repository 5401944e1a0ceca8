//! Background persistence of flushed batches.
//!
//! Ingestion must never wait on the store, so flushed batches travel over
//! an unbounded channel to a writer task. Batch ids are generated
//! client-side before the handoff, which makes every write idempotent and
//! safe to retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::store::{HazardRecord, RecordStore, StoreError};
use crate::types::SampleBatch;

const WRITE_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// A flushed batch on its way to the store.
#[derive(Debug)]
pub struct BatchWrite {
    pub id: Uuid,
    pub batch: SampleBatch,
}

/// Writer task draining batch writes to the store.
pub struct PersistQueue {
    tx: mpsc::UnboundedSender<BatchWrite>,
    _task: JoinHandle<()>,
}

impl PersistQueue {
    pub fn spawn(store: Arc<dyn RecordStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BatchWrite>();
        let task = tokio::spawn(async move {
            while let Some(write) = rx.recv().await {
                write_batch_with_retry(store.as_ref(), write.id, &write.batch).await;
            }
        });
        Self { tx, _task: task }
    }

    /// A sender for handing batches to the writer.
    pub fn sender(&self) -> mpsc::UnboundedSender<BatchWrite> {
        self.tx.clone()
    }
}

/// At-least-once batch write. Failures are retried a few times and then
/// logged; the id stays recorded in the session list either way.
pub async fn write_batch_with_retry(store: &dyn RecordStore, id: Uuid, batch: &SampleBatch) {
    for attempt in 1..=WRITE_ATTEMPTS {
        match store.write_batch(id, batch).await {
            Ok(()) => {
                log::debug!("batch {} persisted ({} samples)", id, batch.len());
                return;
            }
            Err(e) if attempt < WRITE_ATTEMPTS => {
                log::warn!("batch {} write failed (attempt {}): {}", id, attempt, e);
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => {
                log::error!(
                    "batch {} write failed after {} attempts: {}",
                    id,
                    WRITE_ATTEMPTS,
                    e
                );
            }
        }
    }
}

/// Hazard-record write with the same retry policy; the final failure is
/// returned to the caller since a report without its record is lost work.
pub async fn write_record_with_retry(
    store: &dyn RecordStore,
    record: &HazardRecord,
) -> Result<(), StoreError> {
    let mut last_err = None;
    for attempt in 1..=WRITE_ATTEMPTS {
        match store.write_hazard_record(record).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                log::warn!("hazard record write failed (attempt {}): {}", attempt, e);
                last_err = Some(e);
                if attempt < WRITE_ATTEMPTS {
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
    Err(last_err.expect("at least one write attempt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecordStore;
    use crate::types::{GeoPoint, MotionSample};

    fn one_sample_batch() -> SampleBatch {
        SampleBatch::new(vec![MotionSample::placeholder(GeoPoint::ZERO, 0.0)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let store = MemoryRecordStore::new();
        store.fail_next_batch_writes(2);
        let id = Uuid::new_v4();

        write_batch_with_retry(store.as_ref(), id, &one_sample_batch()).await;

        let batches = store.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0, id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_gives_up() {
        let store = MemoryRecordStore::new();
        store.fail_next_batch_writes(3);

        write_batch_with_retry(store.as_ref(), Uuid::new_v4(), &one_sample_batch()).await;
        assert!(store.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_drains_in_order() {
        let store = MemoryRecordStore::new();
        let queue = PersistQueue::spawn(store.clone() as Arc<dyn RecordStore>);
        let sender = queue.sender();

        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            sender
                .send(BatchWrite {
                    id: *id,
                    batch: one_sample_batch(),
                })
                .unwrap();
        }

        for _ in 0..100 {
            if store.batches().len() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let written: Vec<Uuid> = store.batches().iter().map(|(id, _)| *id).collect();
        assert_eq!(written, ids);
    }
}
