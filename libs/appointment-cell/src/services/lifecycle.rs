// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentListFilter, AppointmentStatus, CancellationPolicy,
    PatientAppointmentsResponse,
};

/// Which display bucket an appointment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentBucket {
    Upcoming,
    Past,
}

/// Upcoming means still ahead of now AND not cancelled; everything else is
/// past, including a cancelled appointment whose date has not arrived yet.
pub fn classify(
    status: AppointmentStatus,
    scheduled_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> AppointmentBucket {
    if scheduled_at >= now && status != AppointmentStatus::Cancelled {
        AppointmentBucket::Upcoming
    } else {
        AppointmentBucket::Past
    }
}

/// Valid next statuses: scheduled -> confirmed -> completed, with cancellation
/// allowed from any non-terminal state. Completed and cancelled are terminal.
pub fn valid_transitions(current: AppointmentStatus) -> Vec<AppointmentStatus> {
    match current {
        AppointmentStatus::Scheduled => vec![
            AppointmentStatus::Confirmed,
            AppointmentStatus::Cancelled,
        ],
        AppointmentStatus::Confirmed => vec![
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
        ],
        AppointmentStatus::Completed => vec![],
        AppointmentStatus::Cancelled => vec![],
    }
}

/// Gatekeeper for the one-way transition to cancelled. Guard order matters:
/// past-time first (immutability of past appointments wins over every other
/// message), then the already-cancelled check, then the notice window.
pub fn validate_cancellation(
    status: AppointmentStatus,
    scheduled_at: DateTime<Utc>,
    now: DateTime<Utc>,
    policy: &CancellationPolicy,
) -> Result<(), AppointmentError> {
    if scheduled_at <= now {
        return Err(AppointmentError::PastAppointment);
    }

    if status == AppointmentStatus::Cancelled {
        return Err(AppointmentError::AlreadyCancelled);
    }

    if !valid_transitions(status).contains(&AppointmentStatus::Cancelled) {
        return Err(AppointmentError::InvalidStatusTransition(status));
    }

    let remaining = scheduled_at - now;
    if remaining < Duration::hours(policy.min_notice_hours) {
        return Err(AppointmentError::CancellationNotice {
            min_notice_hours: policy.min_notice_hours,
            hours_remaining: remaining.num_hours(),
        });
    }

    Ok(())
}

pub struct AppointmentLifecycleService {
    supabase: SupabaseClient,
    policy: CancellationPolicy,
}

impl AppointmentLifecycleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            policy: CancellationPolicy::default(),
        }
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row).map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Cancel an appointment on behalf of the booking patient.
    ///
    /// The PATCH filters on `status=neq.cancelled`, so two racing cancels
    /// cannot both win: the loser matches zero rows and surfaces as
    /// already-cancelled.
    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Cancelling appointment {}", appointment_id);

        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        if appointment.booked_by_patient_id != patient_id {
            return Err(AppointmentError::Unauthorized);
        }

        let now = Utc::now();
        validate_cancellation(appointment.status, appointment.scheduled_at, now, &self.policy)?;

        let update_data = json!({
            "status": "cancelled",
            "cancelled_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=neq.cancelled",
            appointment_id
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        // Zero rows patched: a concurrent cancel got there first.
        let row = result
            .into_iter()
            .next()
            .ok_or(AppointmentError::AlreadyCancelled)?;
        let cancelled: Appointment = serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        info!("Appointment {} cancelled", appointment_id);
        Ok(cancelled)
    }

    /// A patient's appointments partitioned into upcoming and past.
    pub async fn list_patient_appointments(
        &self,
        patient_id: Uuid,
        filter: Option<AppointmentListFilter>,
        limit: Option<usize>,
        auth_token: &str,
    ) -> Result<PatientAppointmentsResponse, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?booked_by_patient_id=eq.{}&order=scheduled_at.asc",
            patient_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointments: Vec<Appointment> = result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
            })
            .collect::<Result<_, _>>()?;

        let now = Utc::now();
        let mut upcoming = Vec::new();
        let mut past = Vec::new();
        for appointment in appointments {
            match classify(appointment.status, appointment.scheduled_at, now) {
                AppointmentBucket::Upcoming => upcoming.push(appointment),
                AppointmentBucket::Past => past.push(appointment),
            }
        }

        // Upcoming soonest-first; past most-recent-first.
        past.reverse();

        if let Some(limit) = limit {
            upcoming.truncate(limit);
            past.truncate(limit);
        }

        match filter {
            Some(AppointmentListFilter::Upcoming) => Ok(PatientAppointmentsResponse {
                upcoming,
                past: Vec::new(),
            }),
            Some(AppointmentListFilter::Past) => Ok(PatientAppointmentsResponse {
                upcoming: Vec::new(),
                past,
            }),
            None => Ok(PatientAppointmentsResponse { upcoming, past }),
        }
    }
}
