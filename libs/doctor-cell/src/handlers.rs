use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AvailableSlotsResponse, CreateDoctorRequest, DoctorError, ReplaceScheduleRequest,
    UpdateDoctorRequest,
};
use crate::services::{availability::AvailabilityService, doctor::DoctorService};

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
    #[serde(alias = "doctorId")]
    pub doctor_id: String,
}

fn map_doctor_error(error: DoctorError) -> AppError {
    match error {
        DoctorError::NotFound => AppError::NotFound("Doctor not found".to_string()),
        DoctorError::ValidationError(msg) => AppError::Validation(msg),
        DoctorError::DatabaseError(msg) => AppError::Internal(msg),
    }
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
) -> Result<Json<Value>, AppError> {
    let doctor_service = DoctorService::new(&state);

    let doctors = doctor_service
        .list_active_doctors(None)
        .await
        .map_err(map_doctor_error)?;

    let total = doctors.len();
    Ok(Json(json!({
        "doctors": doctors,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let doctor_service = DoctorService::new(&state);

    let doctor = doctor_service
        .get_active_doctor(&doctor_id, None)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<AvailableSlotsResponse>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let response = availability_service
        .get_available_slots(&doctor_id, query.date, None)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(response))
}

/// Flat variant of the slots lookup: `GET /availability?doctorId&date`.
#[axum::debug_handler]
pub async fn get_availability(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailableSlotsResponse>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let response = availability_service
        .get_available_slots(&query.doctor_id, query.date, None)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(response))
}

#[axum::debug_handler]
pub async fn get_weekly_schedule(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let schedule = availability_service
        .get_weekly_schedule(&doctor_id, None)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "availability": schedule
    })))
}

// ==============================================================================
// PROTECTED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_doctor(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin {
        return Err(AppError::Forbidden(
            "Only administrators can create doctor profiles".to_string(),
        ));
    }

    let doctor_service = DoctorService::new(&state);

    let doctor = doctor_service
        .create_doctor(request, token)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn update_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin {
        return Err(AppError::Forbidden(
            "Only administrators can update doctor profiles".to_string(),
        ));
    }

    let doctor_service = DoctorService::new(&state);

    let doctor = doctor_service
        .update_doctor(&doctor_id, request, token)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn delete_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    if !user.is_admin {
        return Err(AppError::Forbidden(
            "Only administrators can remove doctors".to_string(),
        ));
    }

    let doctor_service = DoctorService::new(&state);

    doctor_service
        .soft_delete_doctor(&doctor_id, token)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({ "success": true })))
}

#[axum::debug_handler]
pub async fn replace_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ReplaceScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    // Administrators may edit any schedule; a doctor only their own.
    let is_doctor_self = user.is_doctor && user.id == doctor_id;
    if !user.is_admin && !is_doctor_self {
        return Err(AppError::Forbidden(
            "Not authorized to edit this doctor's schedule".to_string(),
        ));
    }

    let availability_service = AvailabilityService::new(&state);

    let summary = availability_service
        .replace_schedule(&doctor_id, request, &user.id, token)
        .await
        .map_err(map_doctor_error)?;

    Ok(Json(json!({
        "success": true,
        "doctor_id": doctor_id,
        "summary": summary
    })))
}
