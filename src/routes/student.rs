use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;

use crate::dto::attempt_dto::{AttemptResponse, SubmitAnswerRequest, SubmitAnswerResponse};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::utils::time;
use crate::AppState;

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<Response> {
    let student_id = claims.user_id()?;
    let attempt = state
        .attempt_service
        .start_attempt(student_id, test_id, time::now())
        .await?;
    Ok((StatusCode::CREATED, Json(AttemptResponse::from(attempt))).into_response())
}

#[axum::debug_handler]
pub async fn list_attempts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<Response> {
    let student_id = claims.user_id()?;
    let attempts: Vec<AttemptResponse> = state
        .attempt_service
        .list_student_attempts(student_id, test_id)
        .await?
        .into_iter()
        .map(AttemptResponse::from)
        .collect();
    Ok(Json(attempts).into_response())
}

#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response> {
    state
        .attempt_service
        .attempt_of(attempt_id, claims.user_id()?)
        .await?;
    let details = state.attempt_service.get_attempt(attempt_id).await?;
    Ok(Json(details).into_response())
}

#[axum::debug_handler]
pub async fn get_attempt_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response> {
    state
        .attempt_service
        .attempt_of(attempt_id, claims.user_id()?)
        .await?;
    let questions = state.attempt_service.attempt_questions(attempt_id).await?;
    Ok(Json(questions).into_response())
}

#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((attempt_id, question_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<Response> {
    state
        .attempt_service
        .attempt_of(attempt_id, claims.user_id()?)
        .await?;
    let submitted = state
        .attempt_service
        .submit_answer(attempt_id, question_id, req.answer, time::now())
        .await?;
    Ok(Json(SubmitAnswerResponse::from(submitted)).into_response())
}

#[axum::debug_handler]
pub async fn complete_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<Response> {
    state
        .attempt_service
        .attempt_of(attempt_id, claims.user_id()?)
        .await?;
    let attempt = state
        .attempt_service
        .complete_attempt(attempt_id, time::now())
        .await?;
    Ok(Json(AttemptResponse::from(attempt)).into_response())
}
