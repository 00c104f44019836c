use assert_matches::assert_matches;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{AppointmentError, AppointmentStatus};
use appointment_cell::services::lifecycle::AppointmentLifecycleService;
use shared_utils::test_utils::TestConfig;

fn appointment_row(
    id: Uuid,
    patient_id: Uuid,
    scheduled_at: DateTime<Utc>,
    status: &str,
) -> serde_json::Value {
    json!({
        "id": id,
        "doctor_id": Uuid::new_v4(),
        "booked_by_patient_id": patient_id,
        "family_member_id": null,
        "subject_patient_id": null,
        "scheduled_at": scheduled_at.to_rfc3339(),
        "appointment_type": "in_person",
        "service_category": "general-consultation",
        "status": status,
        "symptoms": "Persistent cough and mild fever",
        "contact_name": null,
        "contact_email": null,
        "contact_phone": null,
        "requires_merge": false,
        "original_patient_email": null,
        "merge_resolved_at": null,
        "created_at": "2026-08-01T10:00:00Z",
        "confirmed_at": null,
        "completed_at": null,
        "cancelled_at": if status == "cancelled" { json!(Utc::now().to_rfc3339()) } else { json!(null) },
        "updated_at": "2026-08-01T10:00:00Z"
    })
}

#[tokio::test]
async fn cancel_with_enough_notice_succeeds() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let scheduled_at = Utc::now() + Duration::days(3);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, patient_id, scheduled_at, "scheduled")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "neq.cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, patient_id, scheduled_at, "cancelled")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_base_url(&mock_server.uri()).to_app_config();
    let service = AppointmentLifecycleService::new(&config);

    let cancelled = service
        .cancel_appointment(appointment_id, patient_id, "test-token")
        .await
        .expect("cancellation should succeed");

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());
}

#[tokio::test]
async fn losing_a_cancel_race_reports_already_cancelled() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let scheduled_at = Utc::now() + Duration::days(3);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, patient_id, scheduled_at, "scheduled")
        ])))
        .mount(&mock_server)
        .await;

    // The conditional PATCH matched zero rows: someone else cancelled between
    // the read and the write.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_base_url(&mock_server.uri()).to_app_config();
    let service = AppointmentLifecycleService::new(&config);

    let result = service
        .cancel_appointment(appointment_id, patient_id, "test-token")
        .await;

    assert_matches!(result, Err(AppointmentError::AlreadyCancelled));
}

#[tokio::test]
async fn cancelling_someone_elses_appointment_is_rejected_without_a_write() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let owner = Uuid::new_v4();
    let intruder = Uuid::new_v4();
    let scheduled_at = Utc::now() + Duration::days(3);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, owner, scheduled_at, "scheduled")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_base_url(&mock_server.uri()).to_app_config();
    let service = AppointmentLifecycleService::new(&config);

    let result = service
        .cancel_appointment(appointment_id, intruder, "test-token")
        .await;

    assert_matches!(result, Err(AppointmentError::Unauthorized));
}

#[tokio::test]
async fn short_notice_cancel_never_reaches_the_database() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let scheduled_at = Utc::now() + Duration::hours(6);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(appointment_id, patient_id, scheduled_at, "scheduled")
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_base_url(&mock_server.uri()).to_app_config();
    let service = AppointmentLifecycleService::new(&config);

    let result = service
        .cancel_appointment(appointment_id, patient_id, "test-token")
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::CancellationNotice { min_notice_hours: 24, .. })
    );
}

#[tokio::test]
async fn patient_listing_partitions_upcoming_and_past() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();

    let future_scheduled = appointment_row(
        Uuid::new_v4(),
        patient_id,
        Utc::now() + Duration::days(2),
        "scheduled",
    );
    let future_cancelled = appointment_row(
        Uuid::new_v4(),
        patient_id,
        Utc::now() + Duration::days(4),
        "cancelled",
    );
    let elapsed_completed = appointment_row(
        Uuid::new_v4(),
        patient_id,
        Utc::now() - Duration::days(7),
        "completed",
    );

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("booked_by_patient_id", format!("eq.{}", patient_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            elapsed_completed, future_scheduled, future_cancelled
        ])))
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_base_url(&mock_server.uri()).to_app_config();
    let service = AppointmentLifecycleService::new(&config);

    let response = service
        .list_patient_appointments(patient_id, None, None, "test-token")
        .await
        .expect("listing should succeed");

    assert_eq!(response.upcoming.len(), 1);
    assert_eq!(response.upcoming[0].status, AppointmentStatus::Scheduled);

    // The cancelled-but-future appointment lands in past, newest first.
    assert_eq!(response.past.len(), 2);
    assert_eq!(response.past[0].status, AppointmentStatus::Cancelled);
    assert_eq!(response.past[1].status, AppointmentStatus::Completed);
}
