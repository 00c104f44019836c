use std::sync::{Arc, OnceLock};

use axum::{
    extract::{Extension, State},
    http::HeaderMap,
    Json,
};
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{TokenResponse, User};
use shared_models::error::AppError;
use shared_utils::extractor::caller_address;
use shared_utils::jwt::validate_token as check_token;

use crate::services::rate_limit::LoginRateLimiter;

#[derive(Debug, Deserialize)]
pub struct MagicLinkRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// Helper function to extract token
fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid authorization header format".to_string()))?;

    if !auth_value.starts_with("Bearer ") {
        return Err(AppError::Unauthorized(
            "Invalid authorization header format".to_string(),
        ));
    }

    Ok(auth_value[7..].to_string())
}

fn is_plausible_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern"))
        .is_match(email)
}

fn throttle(
    limiter: &LoginRateLimiter,
    headers: &HeaderMap,
) -> Result<(), AppError> {
    let address = caller_address(headers);
    limiter.try_acquire(&address).map_err(|limited| {
        warn!("Login throttle engaged for {}", address);
        AppError::BusinessRule(
            "Too many attempts, please try again later".to_string(),
            Some(json!({ "retry_after_seconds": limited.retry_after.as_secs() })),
        )
    })
}

#[axum::debug_handler]
pub async fn request_magic_link(
    State(config): State<Arc<AppConfig>>,
    Extension(limiter): Extension<Arc<LoginRateLimiter>>,
    headers: HeaderMap,
    Json(request): Json<MagicLinkRequest>,
) -> Result<Json<Value>, AppError> {
    throttle(&limiter, &headers)?;

    if !is_plausible_email(&request.email) {
        return Err(AppError::Validation(
            "A valid email address is required".to_string(),
        ));
    }

    let client = SupabaseClient::new(&config);

    // Respond identically whether or not the account exists; the auth
    // provider's answer must not become an account oracle.
    if let Err(e) = client.send_magic_link(&request.email).await {
        warn!("Magic link request failed: {}", e);
    }

    Ok(Json(json!({
        "message": "If an account exists for that address, a sign-in link has been sent"
    })))
}

#[axum::debug_handler]
pub async fn login(
    State(config): State<Arc<AppConfig>>,
    Extension(limiter): Extension<Arc<LoginRateLimiter>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    throttle(&limiter, &headers)?;

    if !is_plausible_email(&request.email) || request.password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    }

    let client = SupabaseClient::new(&config);

    let session = client
        .sign_in_with_password(&request.email, &request.password)
        .await
        .map_err(|e| {
            debug!("Password sign-in rejected: {}", e);
            AppError::Unauthorized("Invalid email or password".to_string())
        })?;

    Ok(Json(session))
}

#[axum::debug_handler]
pub async fn validate_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let token = extract_bearer_token(&headers)?;

    match check_token(&token, &config.supabase_jwt_secret) {
        Ok(user) => {
            let response = TokenResponse {
                valid: true,
                user_id: user.id,
                email: user.email,
                role: user.role,
                is_doctor: user.is_doctor,
                is_admin: user.is_admin,
            };

            Ok(Json(response))
        }
        Err(err) => Err(AppError::Unauthorized(err)),
    }
}

#[axum::debug_handler]
pub async fn verify_token(
    State(config): State<Arc<AppConfig>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    debug!("Verifying token");

    let token = extract_bearer_token(&headers)?;

    match check_token(&token, &config.supabase_jwt_secret) {
        Ok(_) => Ok(Json(json!({ "valid": true }))),
        Err(_) => Ok(Json(json!({ "valid": false }))),
    }
}

#[axum::debug_handler]
pub async fn get_profile(
    State(config): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    debug!("Getting profile for user: {}", user.id);

    let token = extract_bearer_token(&headers)?;

    let client = SupabaseClient::new(&config);

    let auth_profile = client
        .get_auth_user(&token)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(json!({
        "user_id": user.id,
        "auth_profile": auth_profile
    })))
}
