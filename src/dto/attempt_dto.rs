use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::answer::Answer;
use crate::models::test_attempt::{AttemptStatus, TestAttempt};
use crate::services::attempt_service::SubmittedAnswer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerRequest {
    pub answer: JsonValue,
}

/// What the student learns after saving an answer. Correctness is only
/// disclosed when the test shows correct answers.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitAnswerResponse {
    pub saved: bool,
    pub question_id: Uuid,
    pub answered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points_awarded: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<JsonValue>,
}

impl From<SubmittedAnswer> for SubmitAnswerResponse {
    fn from(submitted: SubmittedAnswer) -> Self {
        let reveal = submitted.correct_answer.is_some();
        let Answer {
            question_id,
            is_correct,
            points_awarded,
            answered_at,
            ..
        } = submitted.answer;
        Self {
            saved: true,
            question_id,
            answered_at,
            is_correct: reveal.then_some(is_correct),
            points_awarded: reveal.then_some(points_awarded),
            correct_answer: submitted.correct_answer,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptResponse {
    #[serde(flatten)]
    pub attempt: TestAttempt,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
}

impl From<TestAttempt> for AttemptResponse {
    fn from(attempt: TestAttempt) -> Self {
        Self {
            status: attempt.status(),
            duration_seconds: attempt.duration_seconds(),
            attempt,
        }
    }
}
