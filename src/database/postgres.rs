use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::store::Store;
use crate::error::{Error, Result};
use crate::models::answer::{Answer, NewAnswer};
use crate::models::audit_log::{AuditLog, NewAuditLog};
use crate::models::question::{NewQuestion, Question, QuestionDetails};
use crate::models::test::{ActivationFlags, NewTest, Test};
use crate::models::test_attempt::{AttemptScore, NewAttempt, TestAttempt};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct TestRow {
    id: Uuid,
    title: String,
    owner_teacher_id: Uuid,
    kind: String,
    time_limit_minutes: i32,
    max_attempts: i32,
    active_from: Option<DateTime<Utc>>,
    active_until: Option<DateTime<Utc>>,
    show_hints: bool,
    show_correct_answers: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TestRow> for Test {
    type Error = Error;

    fn try_from(row: TestRow) -> Result<Self> {
        Ok(Test {
            id: row.id,
            title: row.title,
            owner_teacher_id: row.owner_teacher_id,
            kind: row.kind.parse().map_err(Error::Internal)?,
            time_limit_minutes: row.time_limit_minutes,
            max_attempts: row.max_attempts,
            active_from: row.active_from,
            active_until: row.active_until,
            show_hints: row.show_hints,
            show_correct_answers: row.show_correct_answers,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct QuestionRow {
    id: Uuid,
    test_id: Uuid,
    order_index: i32,
    points: i32,
    prompt: String,
    hint: Option<String>,
    details: Json<QuestionDetails>,
    created_at: DateTime<Utc>,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Question {
            id: row.id,
            test_id: row.test_id,
            order_index: row.order_index,
            points: row.points,
            prompt: row.prompt,
            hint: row.hint,
            details: row.details.0,
            created_at: row.created_at,
        }
    }
}

const TEST_COLUMNS: &str = r#"id, title, owner_teacher_id, kind, time_limit_minutes, max_attempts,
    active_from, active_until, show_hints, show_correct_answers, is_active, created_at, updated_at"#;

const QUESTION_COLUMNS: &str =
    "id, test_id, order_index, points, prompt, hint, details, created_at";

#[async_trait]
impl Store for PgStore {
    async fn insert_test(&self, test: NewTest) -> Result<Test> {
        let row = sqlx::query_as::<_, TestRow>(&format!(
            r#"
            INSERT INTO tests (
                id, title, owner_teacher_id, kind, time_limit_minutes, max_attempts,
                active_from, active_until, show_hints, show_correct_answers, is_active
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {TEST_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(test.title)
        .bind(test.owner_teacher_id)
        .bind(test.kind.as_str())
        .bind(test.time_limit_minutes)
        .bind(test.max_attempts)
        .bind(test.active_from)
        .bind(test.active_until)
        .bind(test.show_hints)
        .bind(test.show_correct_answers)
        .bind(test.is_active)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn get_test(&self, test_id: Uuid) -> Result<Option<Test>> {
        let row = sqlx::query_as::<_, TestRow>(&format!(
            "SELECT {TEST_COLUMNS} FROM tests WHERE id = $1"
        ))
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Test::try_from).transpose()
    }

    async fn update_activation(
        &self,
        test_id: Uuid,
        flags: ActivationFlags,
        now: DateTime<Utc>,
    ) -> Result<Option<Test>> {
        let row = sqlx::query_as::<_, TestRow>(&format!(
            r#"
            UPDATE tests
            SET is_active = COALESCE($2, is_active),
                show_hints = COALESCE($3, show_hints),
                show_correct_answers = COALESCE($4, show_correct_answers),
                updated_at = $5
            WHERE id = $1
            RETURNING {TEST_COLUMNS}
            "#
        ))
        .bind(test_id)
        .bind(flags.is_active)
        .bind(flags.show_hints)
        .bind(flags.show_correct_answers)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Test::try_from).transpose()
    }

    async fn insert_question(&self, question: NewQuestion) -> Result<Question> {
        let row = sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            INSERT INTO questions (id, test_id, order_index, points, prompt, hint, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {QUESTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(question.test_id)
        .bind(question.order_index)
        .bind(question.points)
        .bind(question.prompt)
        .bind(question.hint)
        .bind(Json(question.details))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list_questions(&self, test_id: Uuid) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>(&format!(
            r#"
            SELECT {QUESTION_COLUMNS} FROM questions
            WHERE test_id = $1 AND removed_at IS NULL
            ORDER BY order_index, created_at
            "#
        ))
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Question::from).collect())
    }

    async fn remove_question(
        &self,
        test_id: Uuid,
        question_id: Uuid,
        removed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE questions SET removed_at = $3
            WHERE id = $1 AND test_id = $2 AND removed_at IS NULL
            "#,
        )
        .bind(question_id)
        .bind(test_id)
        .bind(removed_at)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        // Completed attempts keep their answers; open ones lose them.
        sqlx::query(
            r#"
            DELETE FROM answers
            WHERE question_id = $1
              AND attempt_id IN (SELECT id FROM test_attempts WHERE is_completed = FALSE)
            "#,
        )
        .bind(question_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn count_attempts(&self, test_id: Uuid, student_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM test_attempts WHERE test_id = $1 AND student_id = $2"#,
        )
        .bind(test_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_completed_attempts(&self, test_id: Uuid, student_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM test_attempts
               WHERE test_id = $1 AND student_id = $2 AND is_completed = TRUE"#,
        )
        .bind(test_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn find_open_attempt(
        &self,
        test_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<TestAttempt>> {
        let attempt = sqlx::query_as::<_, TestAttempt>(
            r#"SELECT * FROM test_attempts
               WHERE test_id = $1 AND student_id = $2 AND is_completed = FALSE
               ORDER BY attempt_number DESC
               LIMIT 1"#,
        )
        .bind(test_id)
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<TestAttempt> {
        let row = sqlx::query_as::<_, TestAttempt>(
            r#"
            INSERT INTO test_attempts (
                id, test_id, student_id, attempt_number, started_at,
                completed_at, is_completed, score, max_score, percentage
            ) VALUES ($1, $2, $3, $4, $5, NULL, FALSE, 0, 0, 0)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(attempt.test_id)
        .bind(attempt.student_id)
        .bind(attempt.attempt_number)
        .bind(attempt.started_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<TestAttempt>> {
        let attempt =
            sqlx::query_as::<_, TestAttempt>(r#"SELECT * FROM test_attempts WHERE id = $1"#)
                .bind(attempt_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(attempt)
    }

    async fn list_attempts(
        &self,
        test_id: Uuid,
        student_id: Option<Uuid>,
    ) -> Result<Vec<TestAttempt>> {
        let rows = sqlx::query_as::<_, TestAttempt>(
            r#"
            SELECT * FROM test_attempts
            WHERE test_id = $1
              AND ($2::uuid IS NULL OR student_id = $2)
            ORDER BY student_id, attempt_number
            "#,
        )
        .bind(test_id)
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn complete_attempt(
        &self,
        attempt_id: Uuid,
        score: AttemptScore,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>> {
        let updated = sqlx::query_as::<_, TestAttempt>(
            r#"
            UPDATE test_attempts
            SET is_completed = TRUE, completed_at = $2,
                score = $3, max_score = $4, percentage = $5
            WHERE id = $1 AND is_completed = FALSE
            RETURNING *
            "#,
        )
        .bind(attempt_id)
        .bind(completed_at)
        .bind(score.score)
        .bind(score.max_score)
        .bind(score.percentage)
        .fetch_optional(&self.pool)
        .await?;
        Ok(updated)
    }

    async fn upsert_answer(&self, answer: NewAnswer) -> Result<Option<Answer>> {
        let row = sqlx::query_as::<_, Answer>(
            r#"
            INSERT INTO answers (
                id, attempt_id, question_id, student_answer, is_correct, points_awarded, answered_at
            )
            SELECT $1, $2, $3, $4, $5, $6, $7
            WHERE EXISTS (
                SELECT 1 FROM test_attempts WHERE id = $2 AND is_completed = FALSE
            )
            ON CONFLICT (attempt_id, question_id) DO UPDATE
            SET student_answer = EXCLUDED.student_answer,
                is_correct = EXCLUDED.is_correct,
                points_awarded = EXCLUDED.points_awarded,
                answered_at = EXCLUDED.answered_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(answer.attempt_id)
        .bind(answer.question_id)
        .bind(answer.student_answer)
        .bind(answer.is_correct)
        .bind(answer.points_awarded)
        .bind(answer.answered_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_answers(&self, attempt_id: Uuid) -> Result<Vec<Answer>> {
        let rows = sqlx::query_as::<_, Answer>(
            r#"SELECT * FROM answers WHERE attempt_id = $1 ORDER BY answered_at"#,
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_answers_for_test(&self, test_id: Uuid) -> Result<Vec<Answer>> {
        let rows = sqlx::query_as::<_, Answer>(
            r#"
            SELECT a.* FROM answers a
            JOIN test_attempts ta ON ta.id = a.attempt_id
            WHERE ta.test_id = $1
            ORDER BY a.answered_at
            "#,
        )
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_audit_log(&self, entry: NewAuditLog) -> Result<AuditLog> {
        let row = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (id, actor_id, action, entity_type, entity_id, changes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.actor_id)
        .bind(entry.action)
        .bind(entry.entity_type)
        .bind(entry.entity_id)
        .bind(entry.changes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}
