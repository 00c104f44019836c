// libs/appointment-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    /// The patient whose account made the booking.
    pub booked_by_patient_id: Uuid,
    /// Set when the appointment was booked on behalf of a relative.
    pub family_member_id: Option<Uuid>,
    /// Reassigned to a different patient once a merge is resolved.
    pub subject_patient_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub appointment_type: AppointmentType,
    pub service_category: String,
    pub status: AppointmentStatus,
    pub symptoms: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub requires_merge: bool,
    /// Email used at booking time; may not match the authenticated account later.
    pub original_patient_email: Option<String>,
    pub merge_resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    InPerson,
    Online,
}

/// Who the appointment is actually for, relative to the authenticated account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingFor {
    #[serde(rename = "self")]
    Myself,
    FamilyMember,
    SomeoneElse,
}

impl Default for BookingFor {
    fn default() -> Self {
        BookingFor::Myself
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub appointment_type: AppointmentType,
    pub service_category: String,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub booking_for: BookingFor,
    pub family_member_id: Option<Uuid>,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub symptoms: String,
    #[serde(default)]
    pub consent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListAppointmentsQuery {
    pub status: Option<AppointmentListFilter>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentListFilter {
    Upcoming,
    Past,
}

/// A patient's appointments split for display. A cancelled appointment lands
/// in `past` even when its date is still in the future; deliberate product
/// choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientAppointmentsResponse {
    pub upcoming: Vec<Appointment>,
    pub past: Vec<Appointment>,
}

// ==============================================================================
// BUSINESS RULES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct CancellationPolicy {
    pub min_notice_hours: i64,
}

impl Default for CancellationPolicy {
    fn default() -> Self {
        Self {
            min_notice_hours: 24, // Must cancel at least 24 hours ahead
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingValidationRules {
    pub min_symptoms_length: usize,
}

impl Default for BookingValidationRules {
    fn default() -> Self {
        Self {
            min_symptoms_length: 10,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Patient profile not found")]
    PatientNotFound,

    #[error("Cannot cancel an appointment that has already passed")]
    PastAppointment,

    #[error("Appointment is already cancelled")]
    AlreadyCancelled,

    #[error("Appointments must be cancelled at least {min_notice_hours} hours in advance")]
    CancellationNotice {
        min_notice_hours: i64,
        hours_remaining: i64,
    },

    #[error("Appointment cannot be cancelled in status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("The requested slot is already booked")]
    SlotTaken,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized access to appointment")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}
