use std::sync::Arc;

use assessment_backend::{
    config::EngineSettings, database::memory::MemoryStore, middleware::auth::issue_token,
    routes, AppState,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value as JsonValue};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "test_secret_key";

fn app() -> Router {
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        SECRET,
        EngineSettings::default(),
    );
    routes::router(state)
}

fn token(user: Uuid) -> String {
    issue_token(SECRET, user, None, chrono::Duration::minutes(30)).expect("token")
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<Uuid>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
    }
    let req = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };
    (status, value)
}

fn stress_test_body() -> JsonValue {
    json!({
        "title": "Наголоси в іменниках",
        "kind": "stress",
        "time_limit_minutes": 15,
        "max_attempts": 2,
        "show_hints": false,
        "show_correct_answers": true,
        "questions": [
            { "points": 2, "prompt": "фартух", "kind": "stress", "position": 1 },
            { "points": 1, "prompt": "завдання", "kind": "stress", "position": 2,
              "hint": "Другий склад" }
        ]
    })
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = app();
    let uri = format!("/api/teacher/tests/{}", Uuid::new_v4());
    let (status, body) = call(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let forged = issue_token("other", Uuid::new_v4(), None, chrono::Duration::minutes(5)).unwrap();
    let req = Request::builder()
        .uri(&uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", forged))
        .body(Body::empty())
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn student_flow_end_to_end() {
    let app = app();
    let teacher = Uuid::new_v4();
    let student = Uuid::new_v4();

    let (status, created) = call(
        &app,
        Method::POST,
        "/api/teacher/tests",
        Some(teacher),
        Some(stress_test_body()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let test_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["owner_teacher_id"], teacher.to_string());
    let q1 = created["questions"][0]["id"].as_str().unwrap().to_string();
    let q2 = created["questions"][1]["id"].as_str().unwrap().to_string();

    let (status, attempt) = call(
        &app,
        Method::POST,
        &format!("/api/student/tests/{}/attempts", test_id),
        Some(student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(attempt["attempt_number"], 1);
    assert_eq!(attempt["status"], "in_progress");
    let attempt_id = attempt["id"].as_str().unwrap().to_string();

    let (status, questions) = call(
        &app,
        Method::GET,
        &format!("/api/student/attempts/{}/questions", attempt_id),
        Some(student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(questions.as_array().unwrap().len(), 2);
    assert!(questions[1].get("hint").is_none());
    assert!(questions[0].get("position").is_none());

    let (status, saved) = call(
        &app,
        Method::PUT,
        &format!("/api/student/attempts/{}/answers/{}", attempt_id, q1),
        Some(student),
        Some(json!({ "answer": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["is_correct"], true);
    assert_eq!(saved["correct_answer"], 1);

    let (status, saved) = call(
        &app,
        Method::PUT,
        &format!("/api/student/attempts/{}/answers/{}", attempt_id, q2),
        Some(student),
        Some(json!({ "answer": "3" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["is_correct"], false);

    let (status, body) = call(
        &app,
        Method::PUT,
        &format!("/api/student/attempts/{}/answers/{}", attempt_id, q2),
        Some(student),
        Some(json!({ "answer": [2] })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_answer");

    // Another student cannot see or finish this attempt.
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/student/attempts/{}/complete", attempt_id),
        Some(Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, done) = call(
        &app,
        Method::POST,
        &format!("/api/student/attempts/{}/complete", attempt_id),
        Some(student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");
    assert_eq!(done["score"], 2);
    assert_eq!(done["max_score"], 3);

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/student/attempts/{}/complete", attempt_id),
        Some(student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "attempt_completed");

    let (status, details) = call(
        &app,
        Method::GET,
        &format!("/api/student/attempts/{}", attempt_id),
        Some(student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["answers"].as_array().unwrap().len(), 2);

    let (status, mine) = call(
        &app,
        Method::GET,
        &format!("/api/student/tests/{}/attempts", test_id),
        Some(student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (status, report) = call(
        &app,
        Method::GET,
        &format!("/api/teacher/tests/{}/analytics?top=3", test_id),
        Some(teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["completed_attempts"], 1);
    assert_eq!(report["grade_distribution"]["good"], 1);
    assert_eq!(report["questions"][1]["common_mistakes"][0]["answer"], "3");
}

#[tokio::test]
async fn quota_and_activation_errors_map_to_statuses() {
    let app = app();
    let teacher = Uuid::new_v4();
    let student = Uuid::new_v4();

    let mut body = stress_test_body();
    body["max_attempts"] = json!(1);
    let (_, created) = call(&app, Method::POST, "/api/teacher/tests", Some(teacher), Some(body)).await;
    let test_id = created["id"].as_str().unwrap().to_string();
    let start_uri = format!("/api/student/tests/{}/attempts", test_id);

    let (_, attempt) = call(&app, Method::POST, &start_uri, Some(student), None).await;
    let attempt_id = attempt["id"].as_str().unwrap().to_string();
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/api/student/attempts/{}/complete", attempt_id),
        Some(student),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, Method::POST, &start_uri, Some(student), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "quota_exceeded");

    let (status, updated) = call(
        &app,
        Method::PATCH,
        &format!("/api/teacher/tests/{}/activation", test_id),
        Some(teacher),
        Some(json!({ "is_active": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["is_active"], false);

    let (status, body) = call(&app, Method::POST, &start_uri, Some(Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "test_inactive");

    let (status, attempts) = call(
        &app,
        Method::GET,
        &format!("/api/teacher/tests/{}/attempts", test_id),
        Some(teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(attempts.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn authoring_questions() {
    let app = app();
    let teacher = Uuid::new_v4();
    let (_, created) = call(
        &app,
        Method::POST,
        "/api/teacher/tests",
        Some(teacher),
        Some(stress_test_body()),
    )
    .await;
    let test_id = created["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/api/teacher/tests/{}/questions", test_id),
        Some(teacher),
        Some(json!({ "points": 1, "prompt": "кома", "kind": "punctuation", "positions": [3] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, question) = call(
        &app,
        Method::POST,
        &format!("/api/teacher/tests/{}/questions", test_id),
        Some(teacher),
        Some(json!({ "points": 1, "prompt": "черговий", "kind": "stress", "position": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(question["order_index"], 3);
    let question_id = question["id"].as_str().unwrap().to_string();

    let uri = format!("/api/teacher/tests/{}/questions/{}", test_id, question_id);
    let (status, _) = call(&app, Method::DELETE, &uri, Some(teacher), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::DELETE, &uri, Some(teacher), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, test) = call(
        &app,
        Method::GET,
        &format!("/api/teacher/tests/{}", test_id),
        Some(teacher),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(test["questions"].as_array().unwrap().len(), 2);
}
