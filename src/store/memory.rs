//! In-memory record store.
//!
//! Backs tests and the demo binary. Supports injecting write failures to
//! exercise the retry path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use super::{HazardRecord, RecordStore, StoreError};
use crate::types::SampleBatch;

#[derive(Default)]
pub struct MemoryRecordStore {
    connects: AtomicU32,
    fail_batch_writes: AtomicU32,
    batches: Mutex<Vec<(Uuid, SampleBatch)>>,
    records: Mutex<Vec<HazardRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Batches written so far, in arrival order.
    pub fn batches(&self) -> Vec<(Uuid, SampleBatch)> {
        self.batches.lock().expect("store lock poisoned").clone()
    }

    pub fn records(&self) -> Vec<HazardRecord> {
        self.records.lock().expect("store lock poisoned").clone()
    }

    pub fn connect_count(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Fail the next `count` batch writes with a write error.
    pub fn fail_next_batch_writes(&self, count: u32) {
        self.fail_batch_writes.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn connect(&self) -> Result<(), StoreError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write_batch(&self, id: Uuid, batch: &SampleBatch) -> Result<(), StoreError> {
        let remaining = self.fail_batch_writes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_batch_writes.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::WriteError("injected failure".into()));
        }
        self.batches
            .lock()
            .expect("store lock poisoned")
            .push((id, batch.clone()));
        Ok(())
    }

    async fn write_hazard_record(&self, record: &HazardRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .expect("store lock poisoned")
            .push(record.clone());
        Ok(())
    }
}
