use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use patient_cell::services::patient::PatientService;
use patient_cell::{Patient, PatientError};

use crate::models::{AppointmentError, BookAppointmentRequest, ListAppointmentsQuery};
use crate::services::{
    booking::AppointmentBookingService, lifecycle::AppointmentLifecycleService,
    merge::MergeReconciliationService,
};

fn map_appointment_error(error: AppointmentError) -> AppError {
    match error {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
        AppointmentError::PatientNotFound => {
            AppError::NotFound("Patient profile not found".to_string())
        }
        AppointmentError::PastAppointment => AppError::BusinessRule(
            "Cannot cancel an appointment that has already passed".to_string(),
            None,
        ),
        AppointmentError::AlreadyCancelled => {
            AppError::BusinessRule("Appointment is already cancelled".to_string(), None)
        }
        AppointmentError::CancellationNotice {
            min_notice_hours,
            hours_remaining,
        } => AppError::BusinessRule(
            format!(
                "Appointments must be cancelled at least {} hours in advance",
                min_notice_hours
            ),
            Some(json!({ "hours_remaining": hours_remaining })),
        ),
        AppointmentError::InvalidStatusTransition(status) => AppError::BusinessRule(
            format!("Appointment cannot be cancelled in status: {}", status),
            None,
        ),
        AppointmentError::SlotTaken => {
            AppError::BusinessRule("The requested slot is already booked".to_string(), None)
        }
        AppointmentError::ValidationError(msg) => AppError::Validation(msg),
        AppointmentError::Unauthorized => {
            AppError::Forbidden("Not authorized to access this appointment".to_string())
        }
        AppointmentError::DatabaseError(msg) => AppError::Internal(msg),
    }
}

/// Every appointment operation acts on behalf of the caller's patient profile.
async fn resolve_caller_patient(
    state: &AppConfig,
    user: &User,
    token: &str,
) -> Result<Patient, AppError> {
    let patient_service = PatientService::new(state);
    patient_service
        .get_patient_by_user(&user.id, token)
        .await
        .map_err(|e| match e {
            PatientError::NotFound => {
                AppError::NotFound("Patient profile not found".to_string())
            }
            other => AppError::Internal(other.to_string()),
        })
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let booking_service = AppointmentBookingService::new(&state);

    let appointment = booking_service
        .book_appointment(request, &user, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let patient = resolve_caller_patient(&state, &user, token).await?;

    let lifecycle_service = AppointmentLifecycleService::new(&state);

    let cancelled = lifecycle_service
        .cancel_appointment(appointment_id, patient.id, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": cancelled,
        "message": "Appointment cancelled successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_patient_appointments(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<ListAppointmentsQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let patient = resolve_caller_patient(&state, &user, token).await?;

    let lifecycle_service = AppointmentLifecycleService::new(&state);

    let partitioned = lifecycle_service
        .list_patient_appointments(patient.id, query.status, query.limit, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!(partitioned)))
}

#[axum::debug_handler]
pub async fn list_merge_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let patient = resolve_caller_patient(&state, &user, token).await?;

    let patient_service = PatientService::new(&state);
    let family_member_ids = patient_service
        .family_member_ids(patient.id, token)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let merge_service = MergeReconciliationService::new(&state);
    let appointments = merge_service
        .list_merge_eligible(patient.id, &family_member_ids, &patient.email, token)
        .await
        .map_err(map_appointment_error)?;

    let total = appointments.len();
    Ok(Json(json!({
        "appointments": appointments,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn count_merge_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let patient = resolve_caller_patient(&state, &user, token).await?;

    let patient_service = PatientService::new(&state);
    let family_member_ids = patient_service
        .family_member_ids(patient.id, token)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let merge_service = MergeReconciliationService::new(&state);
    let count = merge_service
        .count_merge_eligible(patient.id, &family_member_ids, &patient.email, token)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "count": count })))
}
