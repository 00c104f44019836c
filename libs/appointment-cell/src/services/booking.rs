// libs/appointment-cell/src/services/booking.rs
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use doctor_cell::services::doctor::DoctorService;
use doctor_cell::DoctorError;
use patient_cell::services::patient::PatientService;
use patient_cell::{Patient, PatientError};

use crate::models::{
    Appointment, AppointmentError, BookAppointmentRequest, BookingFor, BookingValidationRules,
};
use crate::services::notify::NotificationService;

/// Schema-level checks that need no database access. Contact details are
/// required unless the caller books for themselves with an existing profile.
pub fn validate_booking_request(
    request: &BookAppointmentRequest,
    has_patient_profile: bool,
    rules: &BookingValidationRules,
    now: DateTime<Utc>,
) -> Result<(), AppointmentError> {
    if !request.consent {
        return Err(AppointmentError::ValidationError(
            "Consent to the privacy policy is required".to_string(),
        ));
    }

    if request.service_category.trim().is_empty() {
        return Err(AppointmentError::ValidationError(
            "Service category is required".to_string(),
        ));
    }

    if request.symptoms.trim().len() < rules.min_symptoms_length {
        return Err(AppointmentError::ValidationError(format!(
            "Symptom description must be at least {} characters",
            rules.min_symptoms_length
        )));
    }

    if request.scheduled_at <= now {
        return Err(AppointmentError::ValidationError(
            "Appointment must be scheduled for a future time".to_string(),
        ));
    }

    match request.booking_for {
        BookingFor::Myself => {
            if !has_patient_profile {
                require_contact_details(request)?;
            }
        }
        BookingFor::FamilyMember => {
            if request.family_member_id.is_none() {
                return Err(AppointmentError::ValidationError(
                    "A family member must be selected".to_string(),
                ));
            }
        }
        BookingFor::SomeoneElse => {
            require_contact_details(request)?;
        }
    }

    if let Some(email) = request.contact_email.as_deref() {
        if !is_valid_email(email) {
            return Err(AppointmentError::ValidationError(
                "Contact email is not a valid email address".to_string(),
            ));
        }
    }

    Ok(())
}

fn require_contact_details(request: &BookAppointmentRequest) -> Result<(), AppointmentError> {
    let name_ok = request
        .contact_name
        .as_deref()
        .map(|n| !n.trim().is_empty())
        .unwrap_or(false);
    let email_ok = request
        .contact_email
        .as_deref()
        .map(|e| !e.trim().is_empty())
        .unwrap_or(false);
    let phone_ok = request
        .contact_phone
        .as_deref()
        .map(|p| !p.trim().is_empty())
        .unwrap_or(false);

    if !name_ok || !email_ok || !phone_ok {
        return Err(AppointmentError::ValidationError(
            "Contact name, email and phone are required".to_string(),
        ));
    }
    Ok(())
}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"))
        .is_match(email)
}

/// A booking needs merge review when the email it was made under does not
/// match the authenticated account, so the same person may exist twice.
pub fn detect_identity_mismatch(user: &User, contact_email: Option<&str>) -> Option<String> {
    let email = contact_email?;
    if user.email_matches(email) {
        None
    } else {
        Some(email.to_string())
    }
}

pub struct AppointmentBookingService {
    supabase: SupabaseClient,
    doctor_service: DoctorService,
    patient_service: PatientService,
    notification_service: NotificationService,
    rules: BookingValidationRules,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            doctor_service: DoctorService::new(config),
            patient_service: PatientService::new(config),
            notification_service: NotificationService::new(config),
            rules: BookingValidationRules::default(),
        }
    }

    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment with doctor {} at {}",
            request.doctor_id, request.scheduled_at
        );

        let patient = match self
            .patient_service
            .get_patient_by_user(&user.id, auth_token)
            .await
        {
            Ok(patient) => Some(patient),
            Err(PatientError::NotFound) => None,
            Err(e) => return Err(AppointmentError::DatabaseError(e.to_string())),
        };

        validate_booking_request(&request, patient.is_some(), &self.rules, Utc::now())?;

        let patient = patient.ok_or(AppointmentError::PatientNotFound)?;

        // Family member references must belong to the caller; validation has
        // already required the id to be present.
        if let (BookingFor::FamilyMember, Some(family_member_id)) =
            (request.booking_for, request.family_member_id)
        {
            self.patient_service
                .get_owned_family_member(family_member_id, patient.id, auth_token)
                .await
                .map_err(|e| match e {
                    PatientError::FamilyMemberNotFound => AppointmentError::ValidationError(
                        "Selected family member does not belong to this account".to_string(),
                    ),
                    other => AppointmentError::DatabaseError(other.to_string()),
                })?;
        }

        self.doctor_service
            .get_active_doctor(&request.doctor_id.to_string(), Some(auth_token))
            .await
            .map_err(|e| match e {
                DoctorError::NotFound => AppointmentError::DoctorNotFound,
                other => AppointmentError::DatabaseError(other.to_string()),
            })?;

        self.check_slot_free(&request, auth_token).await?;

        let appointment = self
            .insert_appointment(&request, &patient, user, auth_token)
            .await?;

        // Confirmation email is an opaque external service; only its boolean
        // outcome is observed, and a failure never fails the booking.
        let recipient = appointment
            .contact_email
            .clone()
            .unwrap_or_else(|| patient.email.clone());
        let sent = self
            .notification_service
            .send_booking_confirmation(&appointment, &recipient, auth_token)
            .await;
        if !sent {
            warn!(
                "Confirmation email for appointment {} was not delivered",
                appointment.id
            );
        }

        Ok(appointment)
    }

    async fn check_slot_free(
        &self,
        request: &BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&scheduled_at=eq.{}&status=neq.cancelled&select=id",
            request.doctor_id,
            urlencoding::encode(&request.scheduled_at.to_rfc3339())
        );
        let existing: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if !existing.is_empty() {
            return Err(AppointmentError::SlotTaken);
        }
        Ok(())
    }

    async fn insert_appointment(
        &self,
        request: &BookAppointmentRequest,
        patient: &Patient,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let mismatch_email = detect_identity_mismatch(user, request.contact_email.as_deref());
        let requires_merge = mismatch_email.is_some();

        let appointment_data = json!({
            "doctor_id": request.doctor_id,
            "booked_by_patient_id": patient.id,
            "family_member_id": request.family_member_id,
            "scheduled_at": request.scheduled_at.to_rfc3339(),
            "appointment_type": request.appointment_type,
            "service_category": request.service_category,
            "status": "scheduled",
            "symptoms": request.symptoms,
            "contact_name": request.contact_name,
            "contact_email": request.contact_email,
            "contact_phone": request.contact_phone,
            "requires_merge": requires_merge,
            "original_patient_email": mismatch_email,
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
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or_else(|| {
            AppointmentError::DatabaseError("Failed to create appointment".to_string())
        })?;

        let appointment: Appointment = serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;
        debug!("Appointment created with ID: {}", appointment.id);

        Ok(appointment)
    }
}
