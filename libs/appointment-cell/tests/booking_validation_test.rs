use assert_matches::assert_matches;
use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::{
    AppointmentError, AppointmentType, BookAppointmentRequest, BookingFor, BookingValidationRules,
};
use appointment_cell::services::booking::{
    detect_identity_mismatch, is_valid_email, validate_booking_request,
};
use shared_utils::test_utils::TestUser;

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 31, 12, 0, 0).unwrap()
}

fn base_request() -> BookAppointmentRequest {
    BookAppointmentRequest {
        doctor_id: Uuid::new_v4(),
        appointment_type: AppointmentType::InPerson,
        service_category: "general-consultation".to_string(),
        scheduled_at: now() + Duration::days(3),
        booking_for: BookingFor::Myself,
        family_member_id: None,
        contact_name: None,
        contact_email: None,
        contact_phone: None,
        symptoms: "Persistent cough and mild fever for a week".to_string(),
        consent: true,
    }
}

fn rules() -> BookingValidationRules {
    BookingValidationRules::default()
}

#[test]
fn self_booking_with_profile_needs_no_contact_details() {
    let request = base_request();
    assert!(validate_booking_request(&request, true, &rules(), now()).is_ok());
}

#[test]
fn missing_consent_is_rejected() {
    let request = BookAppointmentRequest {
        consent: false,
        ..base_request()
    };
    assert_matches!(
        validate_booking_request(&request, true, &rules(), now()),
        Err(AppointmentError::ValidationError(_))
    );
}

#[test]
fn blank_service_category_is_rejected() {
    let request = BookAppointmentRequest {
        service_category: "   ".to_string(),
        ..base_request()
    };
    assert_matches!(
        validate_booking_request(&request, true, &rules(), now()),
        Err(AppointmentError::ValidationError(_))
    );
}

#[test]
fn short_symptom_description_is_rejected() {
    let request = BookAppointmentRequest {
        symptoms: "cough".to_string(),
        ..base_request()
    };
    assert_matches!(
        validate_booking_request(&request, true, &rules(), now()),
        Err(AppointmentError::ValidationError(_))
    );
}

#[test]
fn past_scheduled_time_is_rejected() {
    let request = BookAppointmentRequest {
        scheduled_at: now() - Duration::hours(1),
        ..base_request()
    };
    assert_matches!(
        validate_booking_request(&request, true, &rules(), now()),
        Err(AppointmentError::ValidationError(_))
    );
}

#[test]
fn self_booking_without_profile_requires_contact_details() {
    let request = base_request();
    assert_matches!(
        validate_booking_request(&request, false, &rules(), now()),
        Err(AppointmentError::ValidationError(_))
    );

    let request = BookAppointmentRequest {
        contact_name: Some("Rosa Lindqvist".to_string()),
        contact_email: Some("rosa@example.com".to_string()),
        contact_phone: Some("+46 70 123 45 67".to_string()),
        ..base_request()
    };
    assert!(validate_booking_request(&request, false, &rules(), now()).is_ok());
}

#[test]
fn family_booking_requires_a_family_member() {
    let request = BookAppointmentRequest {
        booking_for: BookingFor::FamilyMember,
        family_member_id: None,
        ..base_request()
    };
    assert_matches!(
        validate_booking_request(&request, true, &rules(), now()),
        Err(AppointmentError::ValidationError(_))
    );

    let request = BookAppointmentRequest {
        booking_for: BookingFor::FamilyMember,
        family_member_id: Some(Uuid::new_v4()),
        ..base_request()
    };
    assert!(validate_booking_request(&request, true, &rules(), now()).is_ok());
}

#[test]
fn someone_else_booking_always_requires_contact_details() {
    // Even with a full patient profile of their own, the caller must say who
    // the appointment is for.
    let request = BookAppointmentRequest {
        booking_for: BookingFor::SomeoneElse,
        ..base_request()
    };
    assert_matches!(
        validate_booking_request(&request, true, &rules(), now()),
        Err(AppointmentError::ValidationError(_))
    );
}

#[test]
fn malformed_contact_email_is_rejected() {
    let request = BookAppointmentRequest {
        contact_email: Some("not-an-email".to_string()),
        ..base_request()
    };
    assert_matches!(
        validate_booking_request(&request, true, &rules(), now()),
        Err(AppointmentError::ValidationError(_))
    );
}

#[test]
fn email_shape_check() {
    assert!(is_valid_email("someone@example.com"));
    assert!(is_valid_email("first.last+tag@clinic.co.uk"));
    assert!(!is_valid_email("no-at-sign.example.com"));
    assert!(!is_valid_email("spaces in@example.com"));
    assert!(!is_valid_email("trailing@domain"));
    assert!(!is_valid_email(""));
}

#[test]
fn matching_contact_email_needs_no_merge() {
    let user = TestUser::patient("rosa@example.com").to_user();

    assert_eq!(detect_identity_mismatch(&user, Some("rosa@example.com")), None);
    // Case differences are not an identity mismatch.
    assert_eq!(detect_identity_mismatch(&user, Some("ROSA@Example.COM")), None);
    assert_eq!(detect_identity_mismatch(&user, None), None);
}

#[test]
fn different_contact_email_flags_a_merge() {
    let user = TestUser::patient("rosa@example.com").to_user();

    assert_eq!(
        detect_identity_mismatch(&user, Some("old-address@example.com")),
        Some("old-address@example.com".to_string())
    );
}
