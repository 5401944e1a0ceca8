//! End-to-end drive of the coordination core over simulated collaborators.
//!
//! Connects both simulated sensors, triggers walking detection, records a
//! short session with batch flushes, and finalizes a hazard report.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --bin sim_session

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rand::Rng;

use safestep_core::activity::{MotionEvent, SessionDirective, WalkingMonitor};
use safestep_core::alerts::{MemoryAlertChannel, NotificationGate};
use safestep_core::config::SharedSettings;
use safestep_core::connection::ConnectionCoordinator;
use safestep_core::link::simulated::SimSensorLink;
use safestep_core::link::{SensorLink, SignalKind};
use safestep_core::location::{LocationSource, SimLocationSource};
use safestep_core::session::SessionRecorder;
use safestep_core::store::{HazardDetails, MemoryRecordStore, RecordStore};
use safestep_core::types::{epoch_seconds, GeoPoint, SensorSlot};

const BATCH_CAP: usize = 250;
const READINGS_PER_STREAM: usize = 150;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let link = SimSensorLink::new();
    let location = SimLocationSource::new();
    let store = MemoryRecordStore::new();
    let channel = MemoryAlertChannel::new();
    let settings = SharedSettings::default();
    settings.update(|s| s.walking_detection_notifications_enabled = true);
    settings.update(|s| s.walking_detection_all_day_enabled = true);

    location.set_fix(GeoPoint::new(42.2936, -83.7166, 264.0));

    let gate = Arc::new(NotificationGate::new(channel.clone()));
    let recorder = SessionRecorder::with_batch_cap(
        Arc::clone(&link) as Arc<dyn SensorLink>,
        Arc::clone(&location) as Arc<dyn LocationSource>,
        Arc::clone(&store) as Arc<dyn RecordStore>,
        settings.clone(),
        BATCH_CAP,
    );
    let coordinator = Arc::new(ConnectionCoordinator::new(
        Arc::clone(&link) as Arc<dyn SensorLink>,
        settings.clone(),
        Arc::clone(&gate),
        recorder.recording_flag(),
    ));

    // Pair both sensors
    for slot in SensorSlot::ALL {
        coordinator.scan(slot).await;
        while link.advertise(slot, -42).await.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        while !coordinator.is_connected(slot) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        println!("{:?} sensor connected", slot);
    }

    // Sustained walking trips the detector after the 45 s trigger
    let mut monitor = WalkingMonitor::new(
        settings.clone(),
        Arc::clone(&gate),
        Arc::clone(&coordinator),
        Arc::clone(&location) as Arc<dyn LocationSource>,
        recorder.recording_flag(),
    );
    let t0 = Utc::now();
    monitor.initialize(t0).await;
    let mut directive = None;
    for i in 0..=46 {
        let now = t0 + chrono::Duration::seconds(i);
        directive = monitor.handle_motion_event(MotionEvent::high(true), now).await;
        if directive.is_some() {
            break;
        }
    }
    assert_eq!(directive, Some(SessionDirective::Start));
    println!("walking detected, starting session");
    recorder.start().await?;

    // Stream noisy readings from both sensors, both signal kinds
    let mut rng = rand::thread_rng();
    for n in 0..READINGS_PER_STREAM {
        let timestamp = epoch_seconds(Utc::now()) + n as f64 * 0.02;
        for slot in SensorSlot::ALL {
            for kind in SignalKind::ALL {
                let axes = [
                    rng.gen_range(-2.0..2.0),
                    rng.gen_range(-2.0..2.0),
                    9.8 + rng.gen_range(-0.5..0.5),
                ];
                link.emit_reading(slot, kind, axes, timestamp).await;
            }
        }
    }
    // Let ingestion and the persistence queue drain
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!(
        "{} samples buffered, {} batches flushed",
        recorder.buffered_samples().await,
        recorder.batch_ids().await.len()
    );

    recorder.stop().await?;
    let record = recorder
        .finalize(&HazardDetails {
            hazards: vec!["uneven pavement".into(), "poor lighting".into()],
            intensities: vec![3, 1],
            image_id: String::new(),
            building: None,
        })
        .await?;

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("\nhazard record:\n{}", serde_json::to_string_pretty(&record)?);
    println!(
        "\nstore now holds {} batches and {} records",
        store.batches().len(),
        store.records().len()
    );
    for (title, body) in channel.delivered() {
        println!("notification delivered: {} - {}", title, body);
    }

    coordinator.shutdown().await;
    Ok(())
}
