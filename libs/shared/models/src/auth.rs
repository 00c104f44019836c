use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Authenticated identity attached to every protected request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_doctor: bool,
    pub is_admin: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Case-insensitive comparison against the account email.
    pub fn email_matches(&self, other: &str) -> bool {
        self.email
            .as_deref()
            .map(|e| e.eq_ignore_ascii_case(other))
            .unwrap_or(false)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub valid: bool,
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_doctor: bool,
    pub is_admin: bool,
}
