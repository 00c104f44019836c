use std::sync::Arc;

use axum::{
    extract::Extension,
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::rate_limit::LoginRateLimiter;

pub fn auth_routes(state: Arc<AppConfig>) -> Router {
    // One limiter shared across sign-in endpoints for the process lifetime
    let rate_limiter = Arc::new(LoginRateLimiter::with_defaults());

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/magic-link", post(handlers::request_magic_link))
        .route("/login", post(handlers::login))
        .route("/validate", get(handlers::validate_token))
        .route("/verify", get(handlers::verify_token));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/profile", get(handlers::get_profile))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(Extension(rate_limiter))
        .with_state(state)
}
