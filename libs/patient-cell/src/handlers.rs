use std::sync::Arc;

use axum::{
    extract::{Extension, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateFamilyMemberRequest, PatientError, UpdatePatientRequest};
use crate::services::patient::PatientService;

fn map_patient_error(error: PatientError) -> AppError {
    match error {
        PatientError::NotFound => AppError::NotFound("Patient profile not found".to_string()),
        PatientError::FamilyMemberNotFound => {
            AppError::NotFound("Family member not found".to_string())
        }
        PatientError::ValidationError(msg) => AppError::Validation(msg),
        PatientError::DatabaseError(msg) => AppError::Internal(msg),
    }
}

#[axum::debug_handler]
pub async fn get_my_profile(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let patient_service = PatientService::new(&state);

    let patient = patient_service
        .get_patient_by_user(&user.id, token)
        .await
        .map_err(map_patient_error)?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn update_my_profile(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let patient_service = PatientService::new(&state);

    let patient = patient_service
        .get_patient_by_user(&user.id, token)
        .await
        .map_err(map_patient_error)?;

    let updated = patient_service
        .update_patient(patient.id, request, token)
        .await
        .map_err(map_patient_error)?;

    Ok(Json(json!(updated)))
}

#[axum::debug_handler]
pub async fn list_family_members(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let patient_service = PatientService::new(&state);

    let patient = patient_service
        .get_patient_by_user(&user.id, token)
        .await
        .map_err(map_patient_error)?;

    let members = patient_service
        .list_family_members(patient.id, token)
        .await
        .map_err(map_patient_error)?;

    let total = members.len();
    Ok(Json(json!({
        "family_members": members,
        "total": total
    })))
}

#[axum::debug_handler]
pub async fn create_family_member(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateFamilyMemberRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let patient_service = PatientService::new(&state);

    let patient = patient_service
        .get_patient_by_user(&user.id, token)
        .await
        .map_err(map_patient_error)?;

    let member = patient_service
        .create_family_member(patient.id, request, token)
        .await
        .map_err(map_patient_error)?;

    Ok(Json(json!(member)))
}
