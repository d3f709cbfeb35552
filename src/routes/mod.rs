pub mod health;
pub mod student;
pub mod teacher;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::middleware::auth::require_bearer_auth;
use crate::AppState;

/// All routes with state applied. Transport layers (CORS, tracing) are
/// added by the binary.
pub fn router(state: AppState) -> Router {
    let teacher_api = Router::new()
        .route("/api/teacher/tests", post(teacher::create_test))
        .route("/api/teacher/tests/:id", get(teacher::get_test))
        .route(
            "/api/teacher/tests/:id/activation",
            patch(teacher::update_activation),
        )
        .route(
            "/api/teacher/tests/:id/questions",
            post(teacher::add_question),
        )
        .route(
            "/api/teacher/tests/:id/questions/:question_id",
            delete(teacher::remove_question),
        )
        .route(
            "/api/teacher/tests/:id/attempts",
            get(teacher::list_test_attempts),
        )
        .route(
            "/api/teacher/tests/:id/analytics",
            get(teacher::get_analytics),
        );

    let student_api = Router::new()
        .route(
            "/api/student/tests/:id/attempts",
            get(student::list_attempts).post(student::start_attempt),
        )
        .route("/api/student/attempts/:id", get(student::get_attempt))
        .route(
            "/api/student/attempts/:id/questions",
            get(student::get_attempt_questions),
        )
        .route(
            "/api/student/attempts/:id/answers/:question_id",
            put(student::submit_answer),
        )
        .route(
            "/api/student/attempts/:id/complete",
            post(student::complete_attempt),
        );

    let protected = teacher_api
        .merge(student_api)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_bearer_auth,
        ));

    Router::new()
        .route("/health", get(health::health))
        .merge(protected)
        .with_state(state)
}
