use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{CreateDoctorRequest, Doctor, DoctorError, UpdateDoctorRequest};

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Resolve a doctor for patient-facing flows: must exist, be active and
    /// not soft-deleted.
    pub async fn get_active_doctor(
        &self,
        doctor_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Doctor, DoctorError> {
        let path = format!(
            "/rest/v1/doctors?id=eq.{}&is_active=eq.true&deleted_at=is.null",
            doctor_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;
        serde_json::from_value(row).map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    /// Resolve a doctor regardless of activity flag (admin and self-service
    /// schedule management still works for deactivated doctors). Soft-deleted
    /// doctors stay invisible.
    pub async fn get_doctor(
        &self,
        doctor_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Doctor, DoctorError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&deleted_at=is.null", doctor_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;
        serde_json::from_value(row).map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    pub async fn list_active_doctors(
        &self,
        auth_token: Option<&str>,
    ) -> Result<Vec<Doctor>, DoctorError> {
        let path =
            "/rest/v1/doctors?is_active=eq.true&deleted_at=is.null&order=full_name.asc";
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, path, auth_token, None)
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| DoctorError::DatabaseError(e.to_string()))
            })
            .collect()
    }

    pub async fn create_doctor(
        &self,
        request: CreateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        debug!("Creating doctor profile: {}", request.full_name);

        if request.full_name.trim().is_empty() {
            return Err(DoctorError::ValidationError(
                "Doctor name is required".to_string(),
            ));
        }
        if request.specialization.trim().is_empty() {
            return Err(DoctorError::ValidationError(
                "Specialization is required".to_string(),
            ));
        }

        let doctor_data = json!({
            "full_name": request.full_name,
            "specialization": request.specialization,
            "is_active": true,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctors",
                Some(auth_token),
                Some(doctor_data),
                Some(headers),
            )
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| DoctorError::DatabaseError("Failed to create doctor".to_string()))?;
        serde_json::from_value(row).map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    pub async fn update_doctor(
        &self,
        doctor_id: &str,
        request: UpdateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        debug!("Updating doctor: {}", doctor_id);

        // Confirm the doctor exists and is not soft-deleted before patching.
        self.get_doctor(doctor_id, Some(auth_token)).await?;

        let mut update_data = serde_json::Map::new();
        if let Some(full_name) = request.full_name {
            update_data.insert("full_name".to_string(), json!(full_name));
        }
        if let Some(specialization) = request.specialization {
            update_data.insert("specialization".to_string(), json!(specialization));
        }
        if let Some(is_active) = request.is_active {
            update_data.insert("is_active".to_string(), json!(is_active));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/doctors?id=eq.{}&deleted_at=is.null", doctor_id);
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
                Some(Value::Object(update_data)),
                Some(headers),
            )
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(DoctorError::NotFound)?;
        serde_json::from_value(row).map_err(|e| DoctorError::DatabaseError(e.to_string()))
    }

    /// Soft delete: stamp `deleted_at` and deactivate; the row stays in place.
    pub async fn soft_delete_doctor(
        &self,
        doctor_id: &str,
        auth_token: &str,
    ) -> Result<(), DoctorError> {
        debug!("Soft-deleting doctor: {}", doctor_id);

        self.get_doctor(doctor_id, Some(auth_token)).await?;

        let update_data = json!({
            "deleted_at": Utc::now().to_rfc3339(),
            "is_active": false,
            "updated_at": Utc::now().to_rfc3339()
        });

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(headers),
            )
            .await
            .map_err(|e| DoctorError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
