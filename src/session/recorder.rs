//! Session lifecycle orchestration.
//!
//! [`SessionRecorder`] is the owned session context: it holds the shared
//! recording flag, the sample buffer, and the persistence queue, and walks a
//! session through start → ingestion → stop → finalize (or cancel). Stopping
//! tears down ingestion only; persistence of the aggregate record is the
//! separate, explicit finalize step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::buffer::{SampleBuffer, DEFAULT_BATCH_CAP};
use super::persist::{self, PersistQueue};
use super::SessionError;
use crate::config::SharedSettings;
use crate::link::{RawReading, SensorLink, SignalKind};
use crate::location::LocationSource;
use crate::store::{HazardDetails, HazardRecord, RecordStore};
use crate::types::{epoch_seconds, GeoPoint, MotionSample, SampleBatch, SensorSlot};

struct IngestHandle {
    slot: SensorSlot,
    kind: SignalKind,
    task: JoinHandle<()>,
}

struct ActiveSession {
    start_time: f64,
    start_location: GeoPoint,
    ingest: Vec<IngestHandle>,
}

pub struct SessionRecorder {
    link: Arc<dyn SensorLink>,
    location: Arc<dyn LocationSource>,
    store: Arc<dyn RecordStore>,
    settings: SharedSettings,
    recording: Arc<AtomicBool>,
    buffer: Arc<Mutex<SampleBuffer>>,
    session: Mutex<Option<ActiveSession>>,
    _persist: PersistQueue,
}

impl SessionRecorder {
    pub fn new(
        link: Arc<dyn SensorLink>,
        location: Arc<dyn LocationSource>,
        store: Arc<dyn RecordStore>,
        settings: SharedSettings,
    ) -> Self {
        Self::with_batch_cap(link, location, store, settings, DEFAULT_BATCH_CAP)
    }

    pub fn with_batch_cap(
        link: Arc<dyn SensorLink>,
        location: Arc<dyn LocationSource>,
        store: Arc<dyn RecordStore>,
        settings: SharedSettings,
        batch_cap: usize,
    ) -> Self {
        let persist = PersistQueue::spawn(Arc::clone(&store));
        let buffer = Arc::new(Mutex::new(SampleBuffer::new(batch_cap, persist.sender())));
        Self {
            link,
            location,
            store,
            settings,
            recording: Arc::new(AtomicBool::new(false)),
            buffer,
            session: Mutex::new(None),
            _persist: persist,
        }
    }

    /// The shared recording flag, read by the coordinator and monitor.
    pub fn recording_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.recording)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    /// Samples currently buffered (not yet flushed).
    pub async fn buffered_samples(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Batch ids flushed so far this session, in flush order.
    pub async fn batch_ids(&self) -> Vec<Uuid> {
        self.buffer.lock().await.batch_ids().to_vec()
    }

    /// Start a recording session: reset the buffer, capture the start
    /// fix and time, and subscribe ingestion per slot per signal kind.
    /// A slot whose subscription fails is skipped, not fatal.
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Err(SessionError::AlreadyRecording);
        }

        self.buffer.lock().await.reset();
        self.location.start_recording().await;
        self.store.connect().await?;

        let start_location = self.location.current_location();
        let start_time = epoch_seconds(Utc::now());
        self.recording.store(true, Ordering::SeqCst);

        let mut ingest = Vec::new();
        for slot in SensorSlot::ALL {
            for kind in SignalKind::ALL {
                match self.link.subscribe(slot, kind).await {
                    Ok(rx) => ingest.push(self.spawn_ingest(slot, kind, rx)),
                    Err(e) => {
                        log::warn!("skipping {:?}/{:?} ingestion: {}", slot, kind, e);
                    }
                }
            }
        }

        *session = Some(ActiveSession {
            start_time,
            start_location,
            ingest,
        });
        log::info!("recording session started");
        Ok(())
    }

    /// Stop ingestion. Does not persist anything; call
    /// [`finalize`](Self::finalize) or [`cancel`](Self::cancel) next.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let mut session = self.session.lock().await;
        let Some(active) = session.as_mut() else {
            return Err(SessionError::NotActive);
        };
        self.teardown_ingest(active).await;
        self.recording.store(false, Ordering::SeqCst);
        if !self
            .settings
            .snapshot()
            .walking_detection_notifications_enabled
        {
            self.location.stop_recording().await;
        }
        log::info!("recording session stopped");
        Ok(())
    }

    /// Flush the remainder, assemble the hazard record from the session
    /// aggregates, persist it, and consume the session.
    pub async fn finalize(&self, details: &HazardDetails) -> Result<HazardRecord, SessionError> {
        let mut session = self.session.lock().await;
        let Some(mut active) = session.take() else {
            return Err(SessionError::NotActive);
        };
        self.teardown_ingest(&mut active).await;
        self.recording.store(false, Ordering::SeqCst);

        self.store.connect().await?;
        let (last_location, batch_ids) = {
            let mut buffer = self.buffer.lock().await;
            let last = buffer.last_location().unwrap_or(GeoPoint::ZERO);
            buffer.flush_remainder();
            (last, buffer.batch_ids().to_vec())
        };

        let record = HazardRecord::build(
            details,
            batch_ids,
            active.start_location,
            last_location,
            active.start_time,
        );
        persist::write_record_with_retry(self.store.as_ref(), &record).await?;
        log::info!("hazard record persisted ({} batches)", record.batch_ids.len());
        Ok(record)
    }

    /// Report a hazard without an active session: one placeholder sample
    /// at the current fix becomes the entire batch, and start and last
    /// location coincide.
    pub async fn report_single_point(
        &self,
        details: &HazardDetails,
    ) -> Result<HazardRecord, SessionError> {
        self.store.connect().await?;

        let now = epoch_seconds(Utc::now());
        let location = self.location.current_location();
        let batch_id = Uuid::new_v4();
        let batch = SampleBatch::new(vec![MotionSample::placeholder(location, now)]);
        persist::write_batch_with_retry(self.store.as_ref(), batch_id, &batch).await;

        let record = HazardRecord::build(details, vec![batch_id], location, location, now);
        persist::write_record_with_retry(self.store.as_ref(), &record).await?;
        log::info!("single-point hazard record persisted");
        Ok(record)
    }

    /// Abandon the session: the remainder is still flushed (batches stay
    /// durable under their ids) but no hazard record is written.
    pub async fn cancel(&self) -> Result<(), SessionError> {
        let mut session = self.session.lock().await;
        let Some(mut active) = session.take() else {
            return Err(SessionError::NotActive);
        };
        self.teardown_ingest(&mut active).await;
        self.recording.store(false, Ordering::SeqCst);

        self.store.connect().await?;
        self.buffer.lock().await.flush_remainder();
        log::info!("recording session cancelled; batches retained");
        Ok(())
    }

    fn spawn_ingest(
        &self,
        slot: SensorSlot,
        kind: SignalKind,
        mut rx: mpsc::Receiver<RawReading>,
    ) -> IngestHandle {
        let buffer = Arc::clone(&self.buffer);
        let location = Arc::clone(&self.location);
        let settings = self.settings.clone();
        let task = tokio::spawn(async move {
            while let Some(reading) = rx.recv().await {
                // Role swap is read per sample so a settings change applies live
                let tag = slot.tag(settings.snapshot().waist_wrist_role_swap);
                let sample = MotionSample::new(
                    kind.sample_kind(),
                    [reading.x, reading.y, reading.z],
                    location.current_location(),
                    reading.timestamp,
                    tag,
                );
                buffer.lock().await.add_sample(sample);
            }
        });
        IngestHandle { slot, kind, task }
    }

    async fn teardown_ingest(&self, active: &mut ActiveSession) {
        for handle in active.ingest.drain(..) {
            handle.task.abort();
            let _ = self.link.unsubscribe(handle.slot, handle.kind).await;
        }
    }
}
