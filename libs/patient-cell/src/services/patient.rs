use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    CreateFamilyMemberRequest, FamilyMember, Patient, PatientError, UpdatePatientRequest,
};

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Resolve the patient profile belonging to an auth user.
    pub async fn get_patient_by_user(
        &self,
        user_id: &str,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let path = format!("/rest/v1/patients?user_id=eq.{}", user_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(PatientError::NotFound)?;
        serde_json::from_value(row).map_err(|e| PatientError::DatabaseError(e.to_string()))
    }

    pub async fn update_patient(
        &self,
        patient_id: Uuid,
        request: UpdatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Updating patient profile: {}", patient_id);

        let mut update_data = serde_json::Map::new();
        if let Some(first_name) = request.first_name {
            if first_name.trim().is_empty() {
                return Err(PatientError::ValidationError(
                    "First name cannot be empty".to_string(),
                ));
            }
            update_data.insert("first_name".to_string(), json!(first_name));
        }
        if let Some(last_name) = request.last_name {
            if last_name.trim().is_empty() {
                return Err(PatientError::ValidationError(
                    "Last name cannot be empty".to_string(),
                ));
            }
            update_data.insert("last_name".to_string(), json!(last_name));
        }
        if let Some(phone_number) = request.phone_number {
            update_data.insert("phone_number".to_string(), json!(phone_number));
        }
        if let Some(date_of_birth) = request.date_of_birth {
            update_data.insert(
                "date_of_birth".to_string(),
                json!(date_of_birth.format("%Y-%m-%d").to_string()),
            );
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
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
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(PatientError::NotFound)?;
        serde_json::from_value(row).map_err(|e| PatientError::DatabaseError(e.to_string()))
    }

    pub async fn list_family_members(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<FamilyMember>, PatientError> {
        let path = format!(
            "/rest/v1/family_members?patient_id=eq.{}&order=created_at.asc",
            patient_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| PatientError::DatabaseError(e.to_string()))
            })
            .collect()
    }

    /// Ids of the patient's family members, used by booking validation and
    /// merge reconciliation predicates.
    pub async fn family_member_ids(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Uuid>, PatientError> {
        Ok(self
            .list_family_members(patient_id, auth_token)
            .await?
            .into_iter()
            .map(|member| member.id)
            .collect())
    }

    /// Confirm a family member belongs to the given patient.
    pub async fn get_owned_family_member(
        &self,
        family_member_id: Uuid,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<FamilyMember, PatientError> {
        let path = format!(
            "/rest/v1/family_members?id=eq.{}&patient_id=eq.{}",
            family_member_id, patient_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or(PatientError::FamilyMemberNotFound)?;
        serde_json::from_value(row).map_err(|e| PatientError::DatabaseError(e.to_string()))
    }

    pub async fn create_family_member(
        &self,
        patient_id: Uuid,
        request: CreateFamilyMemberRequest,
        auth_token: &str,
    ) -> Result<FamilyMember, PatientError> {
        debug!("Adding family member for patient: {}", patient_id);

        if request.first_name.trim().is_empty() || request.last_name.trim().is_empty() {
            return Err(PatientError::ValidationError(
                "Family member name is required".to_string(),
            ));
        }
        if request.relationship.trim().is_empty() {
            return Err(PatientError::ValidationError(
                "Relationship is required".to_string(),
            ));
        }

        let member_data = json!({
            "patient_id": patient_id,
            "first_name": request.first_name,
            "last_name": request.last_name,
            "relationship": request.relationship,
            "date_of_birth": request.date_of_birth.map(|d| d.format("%Y-%m-%d").to_string()),
            "created_at": Utc::now().to_rfc3339()
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
                "/rest/v1/family_members",
                Some(auth_token),
                Some(member_data),
                Some(headers),
            )
            .await
            .map_err(|e| PatientError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            PatientError::DatabaseError("Failed to create family member".to_string())
        })?;
        serde_json::from_value(row).map_err(|e| PatientError::DatabaseError(e.to_string()))
    }
}
