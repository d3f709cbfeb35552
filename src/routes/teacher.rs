use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use uuid::Uuid;

use crate::dto::attempt_dto::AttemptResponse;
use crate::dto::test_dto::{
    AnalyticsQuery, CreateQuestionPayload, CreateTestPayload, UpdateActivationPayload,
};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::utils::time;
use crate::AppState;

#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTestPayload>,
) -> Result<Response> {
    let owner = claims.user_id()?;
    let created = state.test_service.create_test(payload, owner).await?;
    state
        .audit_service
        .log(Some(owner), "create_test", "test", created.test.id, None)
        .await;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

#[axum::debug_handler]
pub async fn get_test(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let test = state.test_service.get_test_with_questions(id).await?;
    Ok(Json(test).into_response())
}

#[axum::debug_handler]
pub async fn update_activation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateActivationPayload>,
) -> Result<Response> {
    let changes = serde_json::to_value(&payload)?;
    let test = state
        .test_service
        .update_activation(id, payload, time::now())
        .await?;
    state
        .audit_service
        .log(claims.user_id().ok(), "update_activation", "test", id, Some(changes))
        .await;
    Ok(Json(test).into_response())
}

#[axum::debug_handler]
pub async fn add_question(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateQuestionPayload>,
) -> Result<Response> {
    let question = state.test_service.add_question(id, payload).await?;
    Ok((StatusCode::CREATED, Json(question)).into_response())
}

#[axum::debug_handler]
pub async fn remove_question(
    State(state): State<AppState>,
    Path((test_id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<Response> {
    state
        .test_service
        .remove_question(test_id, question_id, time::now())
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[axum::debug_handler]
pub async fn list_test_attempts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response> {
    let attempts: Vec<AttemptResponse> = state
        .attempt_service
        .list_test_attempts(id)
        .await?
        .into_iter()
        .map(AttemptResponse::from)
        .collect();
    Ok(Json(attempts).into_response())
}

#[axum::debug_handler]
pub async fn get_analytics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Response> {
    let report = state
        .analytics_service
        .get_analytics(id, query.top)
        .await?;
    Ok(Json(report).into_response())
}
