pub mod rest;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use state::AppState;
use std::sync::Arc;

pub use rest::{
    confirm_attendance_handler, create_descriptor_handler, create_student_handler,
    health_handler, list_attendance_handler, list_descriptors_handler, list_students_handler,
    list_untrained_students_handler, mark_trained_handler,
};

/// Builds the API router. Shared by the server binary and the integration
/// tests so both exercise the same routes.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/students",
            get(list_students_handler).post(create_student_handler),
        )
        .route("/students/untrained", get(list_untrained_students_handler))
        .route("/students/{id}/trained", post(mark_trained_handler))
        .route(
            "/face-descriptors",
            get(list_descriptors_handler).post(create_descriptor_handler),
        )
        .route("/attendance/confirm", post(confirm_attendance_handler))
        .route("/attendance", get(list_attendance_handler))
        .with_state(app_state)
}
