use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::Json;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_cell::handlers::{
    login, request_magic_link, validate_token, verify_token, LoginRequest, MagicLinkRequest,
};
use auth_cell::services::rate_limit::{LoginRateLimiter, RateLimitConfig};
use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn create_test_config() -> AppConfig {
    TestConfig::default().to_app_config()
}

fn create_auth_header(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    headers
}

fn open_limiter() -> Extension<Arc<LoginRateLimiter>> {
    Extension(Arc::new(LoginRateLimiter::with_defaults()))
}

#[tokio::test]
async fn validate_token_accepts_a_freshly_minted_token() {
    let config = Arc::new(create_test_config());
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let headers = create_auth_header(&token);

    let result = validate_token(State(config), headers).await;

    let response = result.expect("token should validate").0;
    assert!(response.valid);
    assert_eq!(response.user_id, user.id);
    assert_eq!(response.email, Some(user.email));
    assert!(!response.is_doctor);
    assert!(!response.is_admin);
}

#[tokio::test]
async fn validate_token_flags_admin_role() {
    let config = Arc::new(create_test_config());
    let user = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    let headers = create_auth_header(&token);

    let response = validate_token(State(config), headers)
        .await
        .expect("token should validate")
        .0;

    assert!(response.is_admin);
    assert!(!response.is_doctor);
}

#[tokio::test]
async fn validate_token_rejects_missing_header() {
    let config = Arc::new(create_test_config());

    let result = validate_token(State(config), HeaderMap::new()).await;

    match result.unwrap_err() {
        AppError::Unauthorized(msg) => assert_eq!(msg, "Missing authorization header"),
        other => panic!("Expected Unauthorized, got {:?}", other),
    }
}

#[tokio::test]
async fn validate_token_rejects_non_bearer_header() {
    let config = Arc::new(create_test_config());
    let mut headers = HeaderMap::new();
    headers.insert("authorization", HeaderValue::from_static("sometoken"));

    let result = validate_token(State(config), headers).await;

    match result.unwrap_err() {
        AppError::Unauthorized(msg) => assert_eq!(msg, "Invalid authorization header format"),
        other => panic!("Expected Unauthorized, got {:?}", other),
    }
}

#[tokio::test]
async fn verify_token_reports_expired_tokens_as_invalid() {
    let config = Arc::new(create_test_config());
    let user = TestUser::default();
    let token = JwtTestUtils::create_expired_token(&user, &config.supabase_jwt_secret);
    let headers = create_auth_header(&token);

    let response = verify_token(State(config), headers)
        .await
        .expect("verify never errors on a bad token")
        .0;

    assert_eq!(response, json!({ "valid": false }));
}

#[tokio::test]
async fn login_returns_session_on_valid_credentials() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "jwt-here",
            "token_type": "bearer",
            "expires_in": 3600
        })))
        .mount(&mock_server)
        .await;

    let config = Arc::new(TestConfig::with_base_url(&mock_server.uri()).to_app_config());

    let result = login(
        State(config),
        open_limiter(),
        HeaderMap::new(),
        Json(LoginRequest {
            email: "patient@example.com".to_string(),
            password: "correct-horse".to_string(),
        }),
    )
    .await;

    let session = result.expect("login should succeed").0;
    assert_eq!(session["access_token"], "jwt-here");
}

#[tokio::test]
async fn login_maps_rejected_credentials_to_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&mock_server)
        .await;

    let config = Arc::new(TestConfig::with_base_url(&mock_server.uri()).to_app_config());

    let result = login(
        State(config),
        open_limiter(),
        HeaderMap::new(),
        Json(LoginRequest {
            email: "patient@example.com".to_string(),
            password: "wrong".to_string(),
        }),
    )
    .await;

    match result.unwrap_err() {
        AppError::Unauthorized(msg) => assert_eq!(msg, "Invalid email or password"),
        other => panic!("Expected Unauthorized, got {:?}", other),
    }
}

#[tokio::test]
async fn magic_link_response_is_generic_even_when_upstream_fails() {
    let mock_server = MockServer::start().await;

    // An unknown account makes the auth API error; the caller must not be
    // able to tell.
    Mock::given(method("POST"))
        .and(path("/auth/v1/otp"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "msg": "user not found"
        })))
        .mount(&mock_server)
        .await;

    let config = Arc::new(TestConfig::with_base_url(&mock_server.uri()).to_app_config());

    let result = request_magic_link(
        State(config),
        open_limiter(),
        HeaderMap::new(),
        Json(MagicLinkRequest {
            email: "nobody@example.com".to_string(),
        }),
    )
    .await;

    let body = result.expect("magic link endpoint never leaks").0;
    assert!(body["message"].as_str().unwrap().starts_with("If an account exists"));
}

#[tokio::test]
async fn magic_link_rejects_malformed_email() {
    let config = Arc::new(create_test_config());

    let result = request_magic_link(
        State(config),
        open_limiter(),
        HeaderMap::new(),
        Json(MagicLinkRequest {
            email: "not-an-email".to_string(),
        }),
    )
    .await;

    match result.unwrap_err() {
        AppError::Validation(_) => {}
        other => panic!("Expected Validation, got {:?}", other),
    }
}

#[tokio::test]
async fn login_attempts_are_throttled_per_caller() {
    let config = Arc::new(create_test_config());
    let limiter = Arc::new(LoginRateLimiter::new(RateLimitConfig {
        max_attempts: 2,
        window: Duration::from_secs(900),
        max_entries: 100,
    }));

    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7"));

    for _ in 0..2 {
        // Invalid-credential failures still consume attempts.
        let _ = login(
            State(config.clone()),
            Extension(limiter.clone()),
            headers.clone(),
            Json(LoginRequest {
                email: "patient@example.com".to_string(),
                password: "wrong".to_string(),
            }),
        )
        .await;
    }

    let result = login(
        State(config),
        Extension(limiter),
        headers,
        Json(LoginRequest {
            email: "patient@example.com".to_string(),
            password: "wrong".to_string(),
        }),
    )
    .await;

    match result.unwrap_err() {
        AppError::BusinessRule(_, details) => {
            assert!(details.unwrap().get("retry_after_seconds").is_some());
        }
        other => panic!("Expected BusinessRule, got {:?}", other),
    }
}
