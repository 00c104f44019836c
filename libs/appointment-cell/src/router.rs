// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    // All appointment operations require authentication
    Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/{appointment_id}/cancel", patch(handlers::cancel_appointment))
        .route("/patient", get(handlers::get_patient_appointments))
        .route("/merge", get(handlers::list_merge_appointments))
        .route("/merge/count", get(handlers::count_merge_appointments))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
