use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::services::merge::{
    escape_like_pattern, is_merge_eligible, MergeReconciliationService,
};
use shared_utils::test_utils::TestConfig;

fn eligible_base(patient_id: Uuid) -> bool {
    is_merge_eligible(
        true,
        false,
        patient_id,
        None,
        None,
        patient_id,
        &[],
        "rosa@example.com",
    )
}

#[test]
fn own_booking_with_merge_flag_is_eligible() {
    let patient_id = Uuid::new_v4();
    assert!(eligible_base(patient_id));
}

#[test]
fn unflagged_appointment_is_never_eligible() {
    let patient_id = Uuid::new_v4();
    assert!(!is_merge_eligible(
        false,
        false,
        patient_id,
        None,
        Some("rosa@example.com"),
        patient_id,
        &[],
        "rosa@example.com",
    ));
}

#[test]
fn resolved_appointment_is_no_longer_eligible() {
    let patient_id = Uuid::new_v4();
    assert!(!is_merge_eligible(
        true,
        true,
        patient_id,
        None,
        None,
        patient_id,
        &[],
        "rosa@example.com",
    ));
}

#[test]
fn family_member_link_grants_eligibility() {
    let patient_id = Uuid::new_v4();
    let other_patient = Uuid::new_v4();
    let member_id = Uuid::new_v4();

    assert!(is_merge_eligible(
        true,
        false,
        other_patient,
        Some(member_id),
        None,
        patient_id,
        &[member_id],
        "rosa@example.com",
    ));

    // A family member belonging to someone else does not count.
    assert!(!is_merge_eligible(
        true,
        false,
        other_patient,
        Some(Uuid::new_v4()),
        None,
        patient_id,
        &[member_id],
        "rosa@example.com",
    ));
}

#[test]
fn booking_time_email_matches_case_insensitively() {
    let patient_id = Uuid::new_v4();
    let other_patient = Uuid::new_v4();

    assert!(is_merge_eligible(
        true,
        false,
        other_patient,
        None,
        Some("ROSA@Example.COM"),
        patient_id,
        &[],
        "rosa@example.com",
    ));

    assert!(!is_merge_eligible(
        true,
        false,
        other_patient,
        None,
        Some("unrelated@example.com"),
        patient_id,
        &[],
        "rosa@example.com",
    ));
}

#[test]
fn like_metacharacters_are_escaped() {
    assert_eq!(escape_like_pattern("j_doe@example.com"), r"j\_doe@example.com");
    assert_eq!(escape_like_pattern("50%off@example.com"), r"50\%off@example.com");
    assert_eq!(escape_like_pattern(r"back\slash"), r"back\\slash");
    assert_eq!(escape_like_pattern("rosa@example.com"), "rosa@example.com");
}

fn merge_row(id: Uuid) -> serde_json::Value {
    json!({
        "id": id,
        "requires_merge": true,
        "merge_resolved_at": null,
        "original_patient_email": "old-address@example.com"
    })
}

#[tokio::test]
async fn list_and_count_apply_the_same_filter() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();

    // One mock serves both calls; if either dropped the resolved filter it
    // would no longer match and the request would 404.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("requires_merge", "eq.true"))
        .and(query_param("merge_resolved_at", "is.null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            merge_row(Uuid::new_v4()),
            merge_row(Uuid::new_v4()),
        ])))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_base_url(&mock_server.uri()).to_app_config();
    let service = MergeReconciliationService::new(&config);

    let listed = service
        .list_merge_eligible(patient_id, &[], "rosa@example.com", "test-token")
        .await
        .expect("list should succeed");
    let counted = service
        .count_merge_eligible(patient_id, &[], "rosa@example.com", "test-token")
        .await
        .expect("count should succeed");

    assert_eq!(listed.len(), 2);
    assert_eq!(counted, listed.len());
}

#[tokio::test]
async fn underscore_in_account_email_stays_literal_in_the_filter() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();

    // Without escaping, `_` is a single-character LIKE wildcard, so
    // j_doe@… would also match rows booked under jxdoe@….
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param(
            "or",
            format!(
                r"(booked_by_patient_id.eq.{},original_patient_email.ilike.j\_doe@example.com)",
                patient_id
            ),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_base_url(&mock_server.uri()).to_app_config();
    let service = MergeReconciliationService::new(&config);

    let counted = service
        .count_merge_eligible(patient_id, &[], "j_doe@example.com", "test-token")
        .await
        .expect("count should succeed");

    assert_eq!(counted, 0);
}

#[tokio::test]
async fn merge_filter_includes_family_member_disjunct() {
    let mock_server = MockServer::start().await;
    let patient_id = Uuid::new_v4();
    let member_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("requires_merge", "eq.true"))
        .and(query_param("merge_resolved_at", "is.null"))
        .and(query_param(
            "or",
            format!(
                "(booked_by_patient_id.eq.{},family_member_id.in.({}),original_patient_email.ilike.rosa@example.com)",
                patient_id, member_id
            ),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = TestConfig::with_base_url(&mock_server.uri()).to_app_config();
    let service = MergeReconciliationService::new(&config);

    let counted = service
        .count_merge_eligible(patient_id, &[member_id], "rosa@example.com", "test-token")
        .await
        .expect("count should succeed");

    assert_eq!(counted, 0);
}
