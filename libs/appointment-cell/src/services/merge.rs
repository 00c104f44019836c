// libs/appointment-cell/src/services/merge.rs
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;

/// Merge-eligibility predicate, mirrored by the PostgREST filter below.
/// An appointment needs review for a patient when it still carries the merge
/// flag, has not been resolved, and is tied to the patient by booking
/// identity, family membership, or the booking-time email.
pub fn is_merge_eligible(
    requires_merge: bool,
    merge_resolved_at_set: bool,
    booked_by_patient_id: Uuid,
    family_member_id: Option<Uuid>,
    original_patient_email: Option<&str>,
    patient_id: Uuid,
    family_member_ids: &[Uuid],
    patient_email: &str,
) -> bool {
    if !requires_merge || merge_resolved_at_set {
        return false;
    }

    if booked_by_patient_id == patient_id {
        return true;
    }

    if let Some(member_id) = family_member_id {
        if family_member_ids.contains(&member_id) {
            return true;
        }
    }

    if let Some(email) = original_patient_email {
        if email.eq_ignore_ascii_case(patient_email) {
            return true;
        }
    }

    false
}

/// Backslash-escape the LIKE metacharacters so an ilike comparison behaves as
/// case-insensitive equality.
pub fn escape_like_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub struct MergeReconciliationService {
    supabase: SupabaseClient,
}

impl MergeReconciliationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Merge-eligible appointments with their related records embedded,
    /// newest first. The resolved filter applies to listing and counting
    /// alike so the UI badge always matches the list length.
    pub async fn list_merge_eligible(
        &self,
        patient_id: Uuid,
        family_member_ids: &[Uuid],
        patient_email: &str,
        auth_token: &str,
    ) -> Result<Vec<Value>, AppointmentError> {
        let path = format!(
            "{}&select=*,doctor:doctors(*),booked_by:patients(*),family_member:family_members(*)&order=created_at.desc",
            self.merge_filter_path(patient_id, family_member_ids, patient_email)
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        debug!("Found {} merge-eligible appointments", result.len());
        Ok(result)
    }

    pub async fn count_merge_eligible(
        &self,
        patient_id: Uuid,
        family_member_ids: &[Uuid],
        patient_email: &str,
        auth_token: &str,
    ) -> Result<usize, AppointmentError> {
        let path = format!(
            "{}&select=id",
            self.merge_filter_path(patient_id, family_member_ids, patient_email)
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(result.len())
    }

    fn merge_filter_path(
        &self,
        patient_id: Uuid,
        family_member_ids: &[Uuid],
        patient_email: &str,
    ) -> String {
        let mut disjuncts = vec![format!("booked_by_patient_id.eq.{}", patient_id)];

        if !family_member_ids.is_empty() {
            let ids = family_member_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            disjuncts.push(format!("family_member_id.in.({})", ids));
        }

        // ilike gives the case-insensitive match; the email must be escaped
        // so `_` and `%` in an address stay literal instead of acting as
        // LIKE wildcards.
        disjuncts.push(format!(
            "original_patient_email.ilike.{}",
            urlencoding::encode(&escape_like_pattern(patient_email))
        ));

        format!(
            "/rest/v1/appointments?requires_merge=eq.true&merge_resolved_at=is.null&or=({})",
            disjuncts.join(",")
        )
    }
}
