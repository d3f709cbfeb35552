use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::config::{EngineSettings, OpenAttemptPolicy};
use crate::database::store::Store;
use crate::error::{Error, Result};
use crate::models::answer::{Answer, NewAnswer};
use crate::models::question::StudentQuestion;
use crate::models::test::Test;
use crate::models::test_attempt::{AttemptStatus, NewAttempt, TestAttempt};
use crate::services::audit_service::AuditService;
use crate::services::grading_service::GradingService;
use crate::services::scoring_service::ScoringService;
use crate::utils::pair_lock::KeyedLock;

/// Drives an attempt from start to completion.
///
/// Every mutation for a (student, test) pair runs under that pair's lock, so
/// attempt numbers, the quota and the set of answers a score is computed
/// from cannot interleave inside one process. Across processes the store's
/// unique attempt number and conditional updates hold the same line.
#[derive(Clone)]
pub struct AttemptService {
    store: Arc<dyn Store>,
    audit: AuditService,
    locks: KeyedLock<(Uuid, Uuid)>,
    settings: EngineSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmittedAnswer {
    pub answer: Answer,
    /// Present only when the test discloses correct answers.
    pub correct_answer: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptDetails {
    pub attempt: TestAttempt,
    pub status: AttemptStatus,
    pub answers: Vec<Answer>,
}

impl AttemptService {
    pub fn new(store: Arc<dyn Store>, audit: AuditService, settings: EngineSettings) -> Self {
        Self {
            store,
            audit,
            locks: KeyedLock::new(),
            settings,
        }
    }

    pub async fn start_attempt(
        &self,
        student_id: Uuid,
        test_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TestAttempt> {
        let test = self.load_test(test_id).await?;
        if !test.is_active {
            tracing::warn!(%test_id, %student_id, "Start refused: test inactive");
            return Err(Error::TestInactive);
        }
        if !test.is_within_window(now) {
            tracing::warn!(%test_id, %student_id, %now, "Start refused: outside active window");
            return Err(Error::OutsideActiveWindow);
        }

        let _guard = self.locks.lock((student_id, test_id)).await;
        let mut conflicts = 0;
        loop {
            let completed = self
                .store
                .count_completed_attempts(test_id, student_id)
                .await?;
            if completed >= test.max_attempts as i64 {
                tracing::warn!(%test_id, %student_id, completed, "Start refused: quota exceeded");
                return Err(Error::QuotaExceeded {
                    used: completed,
                    max: test.max_attempts,
                });
            }

            if let Some(open) = self.store.find_open_attempt(test_id, student_id).await? {
                match self.settings.open_attempt_policy {
                    OpenAttemptPolicy::Allow => {}
                    OpenAttemptPolicy::Resume => {
                        tracing::info!(attempt_id = %open.id, "Resuming open attempt");
                        return Ok(open);
                    }
                    OpenAttemptPolicy::Reject => return Err(Error::AttemptInProgress(open.id)),
                }
            }

            let total = self.store.count_attempts(test_id, student_id).await?;
            let attempt_number = i32::try_from(total + 1)
                .map_err(|_| Error::Internal("attempt number overflow".to_string()))?;

            match self
                .store
                .insert_attempt(NewAttempt {
                    test_id,
                    student_id,
                    attempt_number,
                    started_at: now,
                })
                .await
            {
                Ok(attempt) => {
                    tracing::info!(
                        attempt_id = %attempt.id,
                        %test_id,
                        %student_id,
                        attempt_number,
                        "Attempt started"
                    );
                    self.audit
                        .log(
                            Some(student_id),
                            "start_attempt",
                            "test_attempt",
                            attempt.id,
                            Some(json!({ "attempt_number": attempt_number })),
                        )
                        .await;
                    return Ok(attempt);
                }
                Err(Error::ConcurrencyConflict(reason))
                    if conflicts < self.settings.attempt_start_retries =>
                {
                    conflicts += 1;
                    tracing::warn!(
                        %test_id,
                        %student_id,
                        attempt_number,
                        retry = conflicts,
                        %reason,
                        "Attempt number taken, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn submit_answer(
        &self,
        attempt_id: Uuid,
        question_id: Uuid,
        payload: JsonValue,
        now: DateTime<Utc>,
    ) -> Result<SubmittedAnswer> {
        let attempt = self.load_attempt(attempt_id).await?;
        let _guard = self.locks.lock((attempt.student_id, attempt.test_id)).await;
        let attempt = self.load_attempt(attempt_id).await?;
        if attempt.is_completed {
            return Err(Error::AttemptCompleted);
        }

        let test = self.load_test(attempt.test_id).await?;
        if now - attempt.started_at > test.time_limit() {
            tracing::warn!(%attempt_id, %question_id, "Answer refused: time limit exceeded");
            return Err(Error::TimeLimitExceeded {
                limit_minutes: test.time_limit_minutes,
            });
        }

        let question = self
            .store
            .list_questions(test.id)
            .await?
            .into_iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Question {} not found in test {}",
                    question_id, test.id
                ))
            })?;

        let evaluation = GradingService::evaluate(&question, &payload)?;
        let answer = self
            .store
            .upsert_answer(NewAnswer {
                attempt_id,
                question_id,
                student_answer: payload,
                is_correct: evaluation.is_correct,
                points_awarded: evaluation.points_awarded,
                answered_at: now,
            })
            .await?
            .ok_or(Error::AttemptCompleted)?;

        tracing::debug!(
            %attempt_id,
            %question_id,
            is_correct = evaluation.is_correct,
            "Answer recorded"
        );

        Ok(SubmittedAnswer {
            answer,
            correct_answer: test
                .show_correct_answers
                .then(|| question.details.correct_answer()),
        })
    }

    pub async fn complete_attempt(
        &self,
        attempt_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<TestAttempt> {
        let attempt = self.load_attempt(attempt_id).await?;
        let _guard = self.locks.lock((attempt.student_id, attempt.test_id)).await;
        let attempt = self.load_attempt(attempt_id).await?;
        if attempt.is_completed {
            return Err(Error::AttemptCompleted);
        }

        let test = self.load_test(attempt.test_id).await?;
        let completed = self
            .store
            .count_completed_attempts(test.id, attempt.student_id)
            .await?;
        if completed >= test.max_attempts as i64 {
            tracing::warn!(%attempt_id, completed, "Completion refused: quota exceeded");
            return Err(Error::QuotaExceeded {
                used: completed,
                max: test.max_attempts,
            });
        }

        let answers = self.store.list_answers(attempt_id).await?;
        let questions = self.store.list_questions(test.id).await?;
        let score = ScoringService::score(&answers, &questions);

        let completed_at = now.max(attempt.started_at);
        let finished = self
            .store
            .complete_attempt(attempt_id, score, completed_at)
            .await?
            .ok_or(Error::AttemptCompleted)?;

        tracing::info!(
            %attempt_id,
            score = finished.score,
            max_score = finished.max_score,
            percentage = %finished.percentage,
            "Attempt completed"
        );
        self.audit
            .log(
                Some(finished.student_id),
                "complete_attempt",
                "test_attempt",
                finished.id,
                Some(json!({
                    "score": finished.score,
                    "max_score": finished.max_score,
                    "percentage": finished.percentage,
                })),
            )
            .await;

        Ok(finished)
    }

    pub async fn get_attempt(&self, attempt_id: Uuid) -> Result<AttemptDetails> {
        let attempt = self.load_attempt(attempt_id).await?;
        let answers = self.store.list_answers(attempt_id).await?;
        Ok(AttemptDetails {
            status: attempt.status(),
            attempt,
            answers,
        })
    }

    /// Loads the attempt if it belongs to `student_id`. Someone else's
    /// attempt is reported as missing.
    pub async fn attempt_of(&self, attempt_id: Uuid, student_id: Uuid) -> Result<TestAttempt> {
        let attempt = self.load_attempt(attempt_id).await?;
        if attempt.student_id != student_id {
            tracing::warn!(%attempt_id, %student_id, "Attempt requested by another student");
            return Err(Error::NotFound(format!("Attempt {} not found", attempt_id)));
        }
        Ok(attempt)
    }

    /// Questions as the student sees them during the attempt.
    pub async fn attempt_questions(&self, attempt_id: Uuid) -> Result<Vec<StudentQuestion>> {
        let attempt = self.load_attempt(attempt_id).await?;
        let test = self.load_test(attempt.test_id).await?;
        let questions = self.store.list_questions(test.id).await?;
        Ok(questions
            .iter()
            .map(|q| q.to_student_view(test.show_hints))
            .collect())
    }

    pub async fn list_student_attempts(
        &self,
        student_id: Uuid,
        test_id: Uuid,
    ) -> Result<Vec<TestAttempt>> {
        self.load_test(test_id).await?;
        self.store.list_attempts(test_id, Some(student_id)).await
    }

    pub async fn list_test_attempts(&self, test_id: Uuid) -> Result<Vec<TestAttempt>> {
        self.load_test(test_id).await?;
        self.store.list_attempts(test_id, None).await
    }

    async fn load_test(&self, test_id: Uuid) -> Result<Test> {
        self.store
            .get_test(test_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))
    }

    async fn load_attempt(&self, attempt_id: Uuid) -> Result<TestAttempt> {
        self.store
            .get_attempt(attempt_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Attempt {} not found", attempt_id)))
    }
}
