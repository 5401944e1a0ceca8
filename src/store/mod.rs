//! Cloud persistence layer.
//!
//! The backend is an external collaborator reached through [`RecordStore`];
//! this module defines the trait, the persisted hazard-record shape, and an
//! in-memory store used by tests and the demo binary.

pub mod memory;

pub use memory::MemoryRecordStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{GeoPoint, SampleBatch};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Write error: {0}")]
    WriteError(String),
}

/// The persistence collaborator.
///
/// `connect` is idempotent and cheap once established; every finalize or
/// cancel path calls it before writing. Batch ids are generated client-side,
/// so re-sending a batch under its id is safe.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn connect(&self) -> Result<(), StoreError>;

    async fn write_batch(&self, id: Uuid, batch: &SampleBatch) -> Result<(), StoreError>;

    async fn write_hazard_record(&self, record: &HazardRecord) -> Result<(), StoreError>;
}

/// Optional building metadata attached to indoor hazard reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingInfo {
    pub id: String,
    pub floor: String,
    pub remarks: String,
    pub hazard_location: String,
}

/// Hazard details supplied by the reporting flow.
#[derive(Debug, Clone, Default)]
pub struct HazardDetails {
    pub hazards: Vec<String>,
    pub intensities: Vec<i32>,
    pub image_id: String,
    pub building: Option<BuildingInfo>,
}

/// The finalized hazard report handed to the store. Immutable once built.
///
/// `batch_ids` is ordered by flush time and reconstructs the session's
/// sensor timeline when joined against the batch documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HazardRecord {
    pub hazard_types: Vec<String>,
    pub intensities: Vec<i32>,
    pub image_id: String,
    pub batch_ids: Vec<Uuid>,
    pub start_location: GeoPoint,
    pub last_location: GeoPoint,
    /// Seconds since the Unix epoch.
    pub start_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_floor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_remarks: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub building_hazard_location: Option<String>,
}

impl HazardRecord {
    /// Assemble a record from report details and session aggregates.
    pub fn build(
        details: &HazardDetails,
        batch_ids: Vec<Uuid>,
        start_location: GeoPoint,
        last_location: GeoPoint,
        start_time: f64,
    ) -> Self {
        let building = details.building.as_ref();
        Self {
            hazard_types: details.hazards.clone(),
            intensities: details.intensities.clone(),
            image_id: details.image_id.clone(),
            batch_ids,
            start_location,
            last_location,
            start_time,
            building_id: building.map(|b| b.id.clone()),
            building_floor: building.map(|b| b.floor.clone()),
            building_remarks: building.map(|b| b.remarks.clone()),
            building_hazard_location: building.map(|b| b.hazard_location.clone()),
        }
    }
}
