//! Persistence boundary of the assessment core.
//!
//! Services only talk to storage through [`Store`]; `PgStore` backs it with
//! Postgres and `MemoryStore` keeps everything in process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::answer::{Answer, NewAnswer};
use crate::models::audit_log::{AuditLog, NewAuditLog};
use crate::models::question::{NewQuestion, Question};
use crate::models::test::{ActivationFlags, NewTest, Test};
use crate::models::test_attempt::{AttemptScore, NewAttempt, TestAttempt};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_test(&self, test: NewTest) -> Result<Test>;

    async fn get_test(&self, test_id: Uuid) -> Result<Option<Test>>;

    async fn update_activation(
        &self,
        test_id: Uuid,
        flags: ActivationFlags,
        now: DateTime<Utc>,
    ) -> Result<Option<Test>>;

    async fn insert_question(&self, question: NewQuestion) -> Result<Question>;

    /// Live questions of a test ordered by `order_index`.
    async fn list_questions(&self, test_id: Uuid) -> Result<Vec<Question>>;

    /// Marks the question removed and drops its answers in open attempts.
    /// Completed attempts keep their answers. Returns false when the question
    /// is unknown, belongs to another test or is already removed.
    async fn remove_question(
        &self,
        test_id: Uuid,
        question_id: Uuid,
        removed_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn count_attempts(&self, test_id: Uuid, student_id: Uuid) -> Result<i64>;

    async fn count_completed_attempts(&self, test_id: Uuid, student_id: Uuid) -> Result<i64>;

    async fn find_open_attempt(&self, test_id: Uuid, student_id: Uuid)
        -> Result<Option<TestAttempt>>;

    /// Fails with `ConcurrencyConflict` when the attempt number is taken.
    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<TestAttempt>;

    async fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<TestAttempt>>;

    /// Attempts of a test, optionally narrowed to one student, ordered by
    /// student then attempt number.
    async fn list_attempts(
        &self,
        test_id: Uuid,
        student_id: Option<Uuid>,
    ) -> Result<Vec<TestAttempt>>;

    /// Writes the score and closes the attempt. Returns `None` when the
    /// attempt was already completed.
    async fn complete_attempt(
        &self,
        attempt_id: Uuid,
        score: AttemptScore,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>>;

    /// Inserts or replaces the answer for (attempt, question). Returns `None`
    /// when the attempt is already completed.
    async fn upsert_answer(&self, answer: NewAnswer) -> Result<Option<Answer>>;

    async fn list_answers(&self, attempt_id: Uuid) -> Result<Vec<Answer>>;

    async fn list_answers_for_test(&self, test_id: Uuid) -> Result<Vec<Answer>>;

    async fn insert_audit_log(&self, entry: NewAuditLog) -> Result<AuditLog>;
}
