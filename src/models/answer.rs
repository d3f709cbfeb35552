use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub id: Uuid,
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    pub student_answer: JsonValue,
    pub is_correct: bool,
    pub points_awarded: i32,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub attempt_id: Uuid,
    pub question_id: Uuid,
    pub student_answer: JsonValue,
    pub is_correct: bool,
    pub points_awarded: i32,
    pub answered_at: DateTime<Utc>,
}
