use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::store::Store;
use crate::error::{Error, Result};
use crate::models::answer::{Answer, NewAnswer};
use crate::models::audit_log::{AuditLog, NewAuditLog};
use crate::models::question::{NewQuestion, Question};
use crate::models::test::{ActivationFlags, NewTest, Test};
use crate::models::test_attempt::{AttemptScore, NewAttempt, TestAttempt};

#[derive(Default)]
struct MemoryState {
    tests: HashMap<Uuid, Test>,
    questions: HashMap<Uuid, Question>,
    removed_questions: HashMap<Uuid, DateTime<Utc>>,
    attempts: HashMap<Uuid, TestAttempt>,
    answers: HashMap<(Uuid, Uuid), Answer>,
    audit_logs: Vec<AuditLog>,
}

/// Process-local store. Every operation runs under one lock, which gives the
/// same atomicity the Postgres statements provide.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn audit_logs(&self) -> Vec<AuditLog> {
        self.state.read().await.audit_logs.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_test(&self, test: NewTest) -> Result<Test> {
        let now = Utc::now();
        let row = Test {
            id: Uuid::new_v4(),
            title: test.title,
            owner_teacher_id: test.owner_teacher_id,
            kind: test.kind,
            time_limit_minutes: test.time_limit_minutes,
            max_attempts: test.max_attempts,
            active_from: test.active_from,
            active_until: test.active_until,
            show_hints: test.show_hints,
            show_correct_answers: test.show_correct_answers,
            is_active: test.is_active,
            created_at: now,
            updated_at: now,
        };
        self.state.write().await.tests.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_test(&self, test_id: Uuid) -> Result<Option<Test>> {
        Ok(self.state.read().await.tests.get(&test_id).cloned())
    }

    async fn update_activation(
        &self,
        test_id: Uuid,
        flags: ActivationFlags,
        now: DateTime<Utc>,
    ) -> Result<Option<Test>> {
        let mut state = self.state.write().await;
        let Some(test) = state.tests.get_mut(&test_id) else {
            return Ok(None);
        };
        if let Some(v) = flags.is_active {
            test.is_active = v;
        }
        if let Some(v) = flags.show_hints {
            test.show_hints = v;
        }
        if let Some(v) = flags.show_correct_answers {
            test.show_correct_answers = v;
        }
        test.updated_at = now;
        Ok(Some(test.clone()))
    }

    async fn insert_question(&self, question: NewQuestion) -> Result<Question> {
        let mut state = self.state.write().await;
        if !state.tests.contains_key(&question.test_id) {
            return Err(Error::NotFound(format!("Test {} not found", question.test_id)));
        }
        let row = Question {
            id: Uuid::new_v4(),
            test_id: question.test_id,
            order_index: question.order_index,
            points: question.points,
            prompt: question.prompt,
            hint: question.hint,
            details: question.details,
            created_at: Utc::now(),
        };
        state.questions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn list_questions(&self, test_id: Uuid) -> Result<Vec<Question>> {
        let state = self.state.read().await;
        let mut questions: Vec<Question> = state
            .questions
            .values()
            .filter(|q| q.test_id == test_id && !state.removed_questions.contains_key(&q.id))
            .cloned()
            .collect();
        questions.sort_by_key(|q| (q.order_index, q.created_at));
        Ok(questions)
    }

    async fn remove_question(
        &self,
        test_id: Uuid,
        question_id: Uuid,
        removed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let belongs = state
            .questions
            .get(&question_id)
            .is_some_and(|q| q.test_id == test_id);
        if !belongs || state.removed_questions.contains_key(&question_id) {
            return Ok(false);
        }
        state.removed_questions.insert(question_id, removed_at);

        let open: HashSet<Uuid> = state
            .attempts
            .values()
            .filter(|a| !a.is_completed)
            .map(|a| a.id)
            .collect();
        state
            .answers
            .retain(|(attempt_id, q), _| *q != question_id || !open.contains(attempt_id));
        Ok(true)
    }

    async fn count_attempts(&self, test_id: Uuid, student_id: Uuid) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .values()
            .filter(|a| a.test_id == test_id && a.student_id == student_id)
            .count() as i64)
    }

    async fn count_completed_attempts(&self, test_id: Uuid, student_id: Uuid) -> Result<i64> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .values()
            .filter(|a| a.test_id == test_id && a.student_id == student_id && a.is_completed)
            .count() as i64)
    }

    async fn find_open_attempt(
        &self,
        test_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<TestAttempt>> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .values()
            .filter(|a| a.test_id == test_id && a.student_id == student_id && !a.is_completed)
            .max_by_key(|a| a.attempt_number)
            .cloned())
    }

    async fn insert_attempt(&self, attempt: NewAttempt) -> Result<TestAttempt> {
        let mut state = self.state.write().await;
        let taken = state.attempts.values().any(|a| {
            a.test_id == attempt.test_id
                && a.student_id == attempt.student_id
                && a.attempt_number == attempt.attempt_number
        });
        if taken {
            return Err(Error::ConcurrencyConflict(format!(
                "attempt number {} already exists",
                attempt.attempt_number
            )));
        }
        let row = TestAttempt {
            id: Uuid::new_v4(),
            test_id: attempt.test_id,
            student_id: attempt.student_id,
            attempt_number: attempt.attempt_number,
            started_at: attempt.started_at,
            completed_at: None,
            is_completed: false,
            score: 0,
            max_score: 0,
            percentage: rust_decimal::Decimal::ZERO,
        };
        state.attempts.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get_attempt(&self, attempt_id: Uuid) -> Result<Option<TestAttempt>> {
        Ok(self.state.read().await.attempts.get(&attempt_id).cloned())
    }

    async fn list_attempts(
        &self,
        test_id: Uuid,
        student_id: Option<Uuid>,
    ) -> Result<Vec<TestAttempt>> {
        let state = self.state.read().await;
        let mut attempts: Vec<TestAttempt> = state
            .attempts
            .values()
            .filter(|a| a.test_id == test_id && student_id.map_or(true, |s| a.student_id == s))
            .cloned()
            .collect();
        attempts.sort_by_key(|a| (a.student_id, a.attempt_number));
        Ok(attempts)
    }

    async fn complete_attempt(
        &self,
        attempt_id: Uuid,
        score: AttemptScore,
        completed_at: DateTime<Utc>,
    ) -> Result<Option<TestAttempt>> {
        let mut state = self.state.write().await;
        match state.attempts.get_mut(&attempt_id) {
            Some(attempt) if !attempt.is_completed => {
                attempt.is_completed = true;
                attempt.completed_at = Some(completed_at);
                attempt.score = score.score;
                attempt.max_score = score.max_score;
                attempt.percentage = score.percentage;
                Ok(Some(attempt.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn upsert_answer(&self, answer: NewAnswer) -> Result<Option<Answer>> {
        let mut state = self.state.write().await;
        let open = state
            .attempts
            .get(&answer.attempt_id)
            .is_some_and(|a| !a.is_completed);
        if !open {
            return Ok(None);
        }
        let key = (answer.attempt_id, answer.question_id);
        let id = state.answers.get(&key).map_or_else(Uuid::new_v4, |a| a.id);
        let row = Answer {
            id,
            attempt_id: answer.attempt_id,
            question_id: answer.question_id,
            student_answer: answer.student_answer,
            is_correct: answer.is_correct,
            points_awarded: answer.points_awarded,
            answered_at: answer.answered_at,
        };
        state.answers.insert(key, row.clone());
        Ok(Some(row))
    }

    async fn list_answers(&self, attempt_id: Uuid) -> Result<Vec<Answer>> {
        let state = self.state.read().await;
        let mut answers: Vec<Answer> = state
            .answers
            .values()
            .filter(|a| a.attempt_id == attempt_id)
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.answered_at);
        Ok(answers)
    }

    async fn list_answers_for_test(&self, test_id: Uuid) -> Result<Vec<Answer>> {
        let state = self.state.read().await;
        let mut answers: Vec<Answer> = state
            .answers
            .values()
            .filter(|a| {
                state
                    .attempts
                    .get(&a.attempt_id)
                    .is_some_and(|attempt| attempt.test_id == test_id)
            })
            .cloned()
            .collect();
        answers.sort_by_key(|a| a.answered_at);
        Ok(answers)
    }

    async fn insert_audit_log(&self, entry: NewAuditLog) -> Result<AuditLog> {
        let row = AuditLog {
            id: Uuid::new_v4(),
            actor_id: entry.actor_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            changes: entry.changes,
            created_at: Utc::now(),
        };
        self.state.write().await.audit_logs.push(row.clone());
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{QuestionDetails, StressDetails};
    use crate::models::test::TestKind;
    use serde_json::json;

    async fn seeded() -> (MemoryStore, Test, Question) {
        let store = MemoryStore::new();
        let test = store
            .insert_test(NewTest {
                title: "Наголоси".into(),
                owner_teacher_id: Uuid::new_v4(),
                kind: TestKind::Stress,
                time_limit_minutes: 15,
                max_attempts: 2,
                active_from: None,
                active_until: None,
                show_hints: false,
                show_correct_answers: false,
                is_active: true,
            })
            .await
            .unwrap();
        let question = store
            .insert_question(NewQuestion {
                test_id: test.id,
                order_index: 1,
                points: 1,
                prompt: "випадок".into(),
                hint: None,
                details: QuestionDetails::Stress(StressDetails { position: 2 }),
            })
            .await
            .unwrap();
        (store, test, question)
    }

    #[tokio::test]
    async fn duplicate_attempt_number_is_a_conflict() {
        let (store, test, _) = seeded().await;
        let student = Uuid::new_v4();
        let new = NewAttempt {
            test_id: test.id,
            student_id: student,
            attempt_number: 1,
            started_at: Utc::now(),
        };
        store.insert_attempt(new.clone()).await.unwrap();
        let err = store.insert_attempt(new).await.unwrap_err();
        assert!(matches!(err, Error::ConcurrencyConflict(_)));
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_and_stops_after_completion() {
        let (store, test, question) = seeded().await;
        let attempt = store
            .insert_attempt(NewAttempt {
                test_id: test.id,
                student_id: Uuid::new_v4(),
                attempt_number: 1,
                started_at: Utc::now(),
            })
            .await
            .unwrap();
        let answer = |value: serde_json::Value| NewAnswer {
            attempt_id: attempt.id,
            question_id: question.id,
            student_answer: value,
            is_correct: false,
            points_awarded: 0,
            answered_at: Utc::now(),
        };

        let first = store.upsert_answer(answer(json!("1"))).await.unwrap().unwrap();
        let second = store.upsert_answer(answer(json!("3"))).await.unwrap().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.list_answers(attempt.id).await.unwrap().len(), 1);

        let score = AttemptScore {
            score: 0,
            max_score: 1,
            percentage: rust_decimal::Decimal::ZERO,
        };
        assert!(store
            .complete_attempt(attempt.id, score, Utc::now())
            .await
            .unwrap()
            .is_some());
        assert!(store
            .complete_attempt(attempt.id, score, Utc::now())
            .await
            .unwrap()
            .is_none());
        assert!(store.upsert_answer(answer(json!("2"))).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn removing_a_question_keeps_answers_of_completed_attempts() {
        let (store, test, question) = seeded().await;
        let mut attempts = Vec::new();
        for attempt_number in 1..=2 {
            let attempt = store
                .insert_attempt(NewAttempt {
                    test_id: test.id,
                    student_id: Uuid::new_v4(),
                    attempt_number,
                    started_at: Utc::now(),
                })
                .await
                .unwrap();
            store
                .upsert_answer(NewAnswer {
                    attempt_id: attempt.id,
                    question_id: question.id,
                    student_answer: json!(2),
                    is_correct: true,
                    points_awarded: 1,
                    answered_at: Utc::now(),
                })
                .await
                .unwrap();
            attempts.push(attempt);
        }
        let score = AttemptScore {
            score: 1,
            max_score: 1,
            percentage: rust_decimal::Decimal::from(100),
        };
        store
            .complete_attempt(attempts[0].id, score, Utc::now())
            .await
            .unwrap();

        assert!(!store
            .remove_question(Uuid::new_v4(), question.id, Utc::now())
            .await
            .unwrap());
        assert!(store
            .remove_question(test.id, question.id, Utc::now())
            .await
            .unwrap());
        assert!(!store
            .remove_question(test.id, question.id, Utc::now())
            .await
            .unwrap());

        assert!(store.list_questions(test.id).await.unwrap().is_empty());
        assert_eq!(store.list_answers(attempts[0].id).await.unwrap().len(), 1);
        assert!(store.list_answers(attempts[1].id).await.unwrap().is_empty());
    }
}
