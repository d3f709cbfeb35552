use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestAttempt {
    pub id: Uuid,
    pub test_id: Uuid,
    pub student_id: Uuid,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub is_completed: bool,
    pub score: i32,
    pub max_score: i32,
    pub percentage: Decimal,
}

impl TestAttempt {
    pub fn status(&self) -> AttemptStatus {
        if self.is_completed {
            AttemptStatus::Completed
        } else {
            AttemptStatus::InProgress
        }
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        self.completed_at
            .map(|done| crate::utils::time::seconds_between(self.started_at, done))
    }
}

/// Row to insert when a student opens an attempt.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub test_id: Uuid,
    pub student_id: Uuid,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
}

/// Score fields written once, on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptScore {
    pub score: i32,
    pub max_score: i32,
    pub percentage: Decimal,
}
