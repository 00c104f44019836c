// libs/doctor-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// CORE DOCTOR MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: String,
    pub specialization: String,
    pub is_active: bool,
    /// Soft delete marker. Queries that must exclude deleted doctors filter
    /// on this explicitly; there is no automatic exclusion.
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One recurring weekly availability window. Times are HH:MM wall-clock
/// strings; `day_of_week` runs 0 (Sunday) through 6 (Saturday).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
    pub slot_duration_minutes: i32,
    pub max_patients_per_slot: i32,
    pub is_active: bool,
}

/// Minimal appointment projection used by the slot engine; only the
/// scheduled instant matters for exact-slot exclusion.
#[derive(Debug, Clone, Deserialize)]
pub struct BookedAppointment {
    pub scheduled_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    pub full_name: String,
    pub specialization: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDoctorRequest {
    pub full_name: Option<String>,
    pub specialization: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWindowInput {
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
    pub slot_duration_minutes: i32,
    pub max_patients_per_slot: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceScheduleRequest {
    pub availability: Vec<ScheduleWindowInput>,
}

/// Summary echoed back from the schedule-replacement transaction and written
/// to the audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleReplaceSummary {
    pub window_count: i64,
    pub active_day_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableSlotsResponse {
    pub available_slots: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}
