//! Capped sample buffer with batch flushing.
//!
//! Samples append in arrival order; once the buffer exceeds its cap, the
//! oldest `cap` samples are snapshotted into a batch, assigned a fresh id,
//! and handed to the persistence queue in one step. The id is recorded
//! before the handoff, so the session's id list is always in flush order
//! regardless of when writes complete. The buffer is shared behind a mutex;
//! holding it across append-and-flush is what makes the flush atomic with
//! respect to concurrent appends.

use tokio::sync::mpsc;
use uuid::Uuid;

use super::persist::BatchWrite;
use crate::types::{GeoPoint, MotionSample, SampleBatch};

/// Samples per batch before a flush triggers (30 s at 50 Hz x 2 sensors).
pub const DEFAULT_BATCH_CAP: usize = 3000;

pub struct SampleBuffer {
    cap: usize,
    samples: Vec<MotionSample>,
    batch_ids: Vec<Uuid>,
    last_location: Option<GeoPoint>,
    sink: mpsc::UnboundedSender<BatchWrite>,
}

impl SampleBuffer {
    pub fn new(cap: usize, sink: mpsc::UnboundedSender<BatchWrite>) -> Self {
        Self {
            cap,
            samples: Vec::new(),
            batch_ids: Vec::new(),
            last_location: None,
            sink,
        }
    }

    /// Append a sample, flushing the oldest `cap` samples if the buffer
    /// now exceeds its cap. No sample is ever both flushed and retained.
    pub fn add_sample(&mut self, sample: MotionSample) {
        self.last_location = Some(sample.location());
        self.samples.push(sample);
        if self.samples.len() > self.cap {
            let batch: Vec<MotionSample> = self.samples.drain(..self.cap).collect();
            self.dispatch(batch);
        }
    }

    /// Flush whatever is buffered, however little. Returns the batch id,
    /// or `None` when there is nothing to flush.
    pub fn flush_remainder(&mut self) -> Option<Uuid> {
        if self.samples.is_empty() {
            return None;
        }
        let batch = std::mem::take(&mut self.samples);
        Some(self.dispatch(batch))
    }

    /// Discard buffered samples and the session id list without flushing.
    /// Called when a fresh session starts.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.batch_ids.clear();
        self.last_location = None;
    }

    /// Batch ids emitted this session, in flush order.
    pub fn batch_ids(&self) -> &[Uuid] {
        &self.batch_ids
    }

    /// Location of the most recently appended sample this session.
    pub fn last_location(&self) -> Option<GeoPoint> {
        self.last_location
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn dispatch(&mut self, samples: Vec<MotionSample>) -> Uuid {
        let id = Uuid::new_v4();
        self.batch_ids.push(id);
        let batch = SampleBatch::new(samples);
        log::debug!("flushing batch {} ({} samples)", id, batch.len());
        if self.sink.send(BatchWrite { id, batch }).is_err() {
            log::error!("persistence queue is gone; batch {} dropped", id);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SampleKind;

    fn sample(n: u8) -> MotionSample {
        MotionSample::new(
            SampleKind::Gyroscope,
            [n as f32, 0.0, 0.0],
            GeoPoint::new(n as f64, -(n as f64), 100.0),
            n as f64,
            1,
        )
    }

    fn buffer(cap: usize) -> (SampleBuffer, mpsc::UnboundedReceiver<BatchWrite>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SampleBuffer::new(cap, tx), rx)
    }

    #[test]
    fn test_cap_plus_one_flushes_exactly_cap() {
        let (mut buf, mut rx) = buffer(3);
        for n in 1..=4 {
            buf.add_sample(sample(n));
        }

        let write = rx.try_recv().expect("one flush");
        assert_eq!(write.batch.len(), 3);
        assert_eq!(write.batch.samples()[0].x, 1.0);
        assert_eq!(write.batch.samples()[2].x, 3.0);
        assert!(rx.try_recv().is_err());

        assert_eq!(buf.len(), 1);
        assert_eq!(buf.batch_ids().len(), 1);
        assert_eq!(buf.batch_ids()[0], write.id);
    }

    #[test]
    fn test_flush_remainder_single_sample() {
        let (mut buf, mut rx) = buffer(3);
        for n in 1..=4 {
            buf.add_sample(sample(n));
        }
        rx.try_recv().expect("cap flush");

        let id = buf.flush_remainder().expect("remainder flush");
        let write = rx.try_recv().expect("remainder write");
        assert_eq!(write.id, id);
        assert_eq!(write.batch.len(), 1);
        assert_eq!(write.batch.samples()[0].x, 4.0);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_flush_remainder_on_empty_buffer_is_noop() {
        let (mut buf, mut rx) = buffer(3);
        assert!(buf.flush_remainder().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_batch_ids_unique_and_in_flush_order() {
        let (mut buf, mut rx) = buffer(2);
        for n in 1..=7 {
            buf.add_sample(sample(n));
        }
        buf.flush_remainder();

        let ids = buf.batch_ids().to_vec();
        assert_eq!(ids.len(), 4); // 3 cap flushes + remainder
        for (i, id) in ids.iter().enumerate() {
            assert!(!ids[i + 1..].contains(id), "duplicate batch id");
            assert_eq!(rx.try_recv().unwrap().id, *id);
        }
    }

    #[test]
    fn test_reset_discards_without_flushing() {
        let (mut buf, mut rx) = buffer(10);
        buf.add_sample(sample(1));
        buf.add_sample(sample(2));
        buf.reset();

        assert!(buf.is_empty());
        assert!(buf.batch_ids().is_empty());
        assert!(buf.last_location().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_last_location_survives_flush() {
        let (mut buf, _rx) = buffer(2);
        for n in 1..=5 {
            buf.add_sample(sample(n));
        }
        // Two cap flushes happened; the last appended sample still wins
        let last = buf.last_location().unwrap();
        assert_eq!(last.latitude, 5.0);
    }
}
