use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::question::{Question, QuestionDetails};
use crate::models::test::{ActivationFlags, Test, TestKind};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateQuestionPayload {
    pub order_index: Option<i32>,
    #[validate(range(min = 1, max = 10000, message = "Points must be between 1 and 10000"))]
    pub points: i32,
    #[validate(length(min = 1))]
    pub prompt: String,
    pub hint: Option<String>,
    #[serde(flatten)]
    pub details: QuestionDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateTestPayload {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub kind: TestKind,
    #[validate(range(min = 1, message = "Time limit must be at least 1 minute"))]
    pub time_limit_minutes: i32,
    #[validate(range(min = 1, message = "At least one attempt must be allowed"))]
    pub max_attempts: Option<i32>,
    pub active_from: Option<DateTime<Utc>>,
    pub active_until: Option<DateTime<Utc>>,
    pub show_hints: Option<bool>,
    pub show_correct_answers: Option<bool>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub questions: Vec<CreateQuestionPayload>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateActivationPayload {
    pub is_active: Option<bool>,
    pub show_hints: Option<bool>,
    pub show_correct_answers: Option<bool>,
}

impl From<UpdateActivationPayload> for ActivationFlags {
    fn from(p: UpdateActivationPayload) -> Self {
        ActivationFlags {
            is_active: p.is_active,
            show_hints: p.show_hints,
            show_correct_answers: p.show_correct_answers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestWithQuestions {
    #[serde(flatten)]
    pub test: Test,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsQuery {
    pub top: Option<usize>,
}
