use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn patient_routes(state: Arc<AppConfig>) -> Router {
    // All patient operations require authentication
    Router::new()
        .route("/me", get(handlers::get_my_profile))
        .route("/me", patch(handlers::update_my_profile))
        .route("/me/family-members", get(handlers::list_family_members))
        .route("/me/family-members", post(handlers::create_family_member))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
