use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::database::store::Store;
use crate::dto::test_dto::{
    CreateQuestionPayload, CreateTestPayload, TestWithQuestions, UpdateActivationPayload,
};
use crate::error::{Error, Result};
use crate::models::question::{NewQuestion, Question, QuestionDetails};
use crate::models::test::{NewTest, Test, TestKind};

/// Read view of tests and questions plus the authoring calls that feed it.
#[derive(Clone)]
pub struct TestService {
    store: Arc<dyn Store>,
}

impl TestService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_test(
        &self,
        payload: CreateTestPayload,
        owner_teacher_id: Uuid,
    ) -> Result<TestWithQuestions> {
        payload.validate()?;
        if let (Some(from), Some(until)) = (payload.active_from, payload.active_until) {
            if from >= until {
                return Err(Error::BadRequest(
                    "active_from must be earlier than active_until".to_string(),
                ));
            }
        }
        for question in &payload.questions {
            check_question(payload.kind, question)?;
        }
        check_total_points(payload.questions.iter().map(|q| q.points))?;

        let test = self
            .store
            .insert_test(NewTest {
                title: payload.title.trim().to_string(),
                owner_teacher_id,
                kind: payload.kind,
                time_limit_minutes: payload.time_limit_minutes,
                max_attempts: payload.max_attempts.unwrap_or(1),
                active_from: payload.active_from,
                active_until: payload.active_until,
                show_hints: payload.show_hints.unwrap_or(false),
                show_correct_answers: payload.show_correct_answers.unwrap_or(false),
                is_active: payload.is_active.unwrap_or(true),
            })
            .await?;

        let mut questions = Vec::with_capacity(payload.questions.len());
        for (idx, q) in payload.questions.into_iter().enumerate() {
            let order_index = q.order_index.unwrap_or((idx as i32) + 1);
            questions.push(self.store.insert_question(new_question(test.id, order_index, q)).await?);
        }
        questions.sort_by_key(|q| q.order_index);

        tracing::info!(
            test_id = %test.id,
            kind = %test.kind,
            questions = questions.len(),
            "Test created"
        );
        Ok(TestWithQuestions { test, questions })
    }

    pub async fn get_test(&self, test_id: Uuid) -> Result<Test> {
        self.store
            .get_test(test_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))
    }

    pub async fn list_questions(&self, test_id: Uuid) -> Result<Vec<Question>> {
        self.store.list_questions(test_id).await
    }

    pub async fn get_test_with_questions(&self, test_id: Uuid) -> Result<TestWithQuestions> {
        let test = self.get_test(test_id).await?;
        let questions = self.list_questions(test_id).await?;
        Ok(TestWithQuestions { test, questions })
    }

    pub async fn add_question(
        &self,
        test_id: Uuid,
        payload: CreateQuestionPayload,
    ) -> Result<Question> {
        let test = self.get_test(test_id).await?;
        check_question(test.kind, &payload)?;

        let existing = self.list_questions(test_id).await?;
        check_total_points(
            existing
                .iter()
                .map(|q| q.points)
                .chain(std::iter::once(payload.points)),
        )?;

        let order_index = match payload.order_index {
            Some(idx) => idx,
            None => existing.iter().map(|q| q.order_index).max().unwrap_or(0) + 1,
        };
        let question = self
            .store
            .insert_question(new_question(test_id, order_index, payload))
            .await?;
        tracing::info!(%test_id, question_id = %question.id, "Question added");
        Ok(question)
    }

    /// Retires a question. Answers already scored in completed attempts stay.
    pub async fn remove_question(
        &self,
        test_id: Uuid,
        question_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if !self
            .store
            .remove_question(test_id, question_id, now)
            .await?
        {
            return Err(Error::NotFound(format!(
                "Question {} not found in test {}",
                question_id, test_id
            )));
        }
        tracing::info!(%test_id, %question_id, "Question removed");
        Ok(())
    }

    pub async fn update_activation(
        &self,
        test_id: Uuid,
        payload: UpdateActivationPayload,
        now: DateTime<Utc>,
    ) -> Result<Test> {
        let test = self
            .store
            .update_activation(test_id, payload.into(), now)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))?;
        tracing::info!(
            %test_id,
            is_active = test.is_active,
            show_hints = test.show_hints,
            show_correct_answers = test.show_correct_answers,
            "Activation flags updated"
        );
        Ok(test)
    }
}

fn new_question(test_id: Uuid, order_index: i32, q: CreateQuestionPayload) -> NewQuestion {
    NewQuestion {
        test_id,
        order_index,
        points: q.points,
        prompt: q.prompt,
        hint: q.hint.filter(|h| !h.trim().is_empty()),
        details: q.details,
    }
}

/// A test's points must add up to something an attempt score can hold.
fn check_total_points(points: impl Iterator<Item = i32>) -> Result<()> {
    let total: i64 = points.map(i64::from).sum();
    if total > i64::from(i32::MAX) {
        return Err(Error::BadRequest(format!(
            "Total points of a test cannot exceed {}",
            i32::MAX
        )));
    }
    Ok(())
}

/// Field validation plus the kind-specific shape of the correctness data.
fn check_question(kind: TestKind, question: &CreateQuestionPayload) -> Result<()> {
    question.validate()?;
    if question.details.kind() != kind {
        return Err(Error::BadRequest(format!(
            "Question of kind '{}' cannot be added to a '{}' test",
            question.details.kind(),
            kind
        )));
    }

    match &question.details {
        QuestionDetails::GapFill(d) => {
            if d.letters.is_empty() || d.letters.iter().any(|l| l.trim().is_empty()) {
                return Err(Error::BadRequest(
                    "Gap-fill questions need a non-empty letter for every gap".to_string(),
                ));
            }
        }
        QuestionDetails::Punctuation(d) => {
            if d.positions.is_empty() || d.positions.iter().any(|p| *p < 0) {
                return Err(Error::BadRequest(
                    "Punctuation questions need at least one non-negative position".to_string(),
                ));
            }
        }
        QuestionDetails::Stress(d) => {
            if d.position < 1 {
                return Err(Error::BadRequest(
                    "Stress position is a 1-based syllable number".to_string(),
                ));
            }
        }
        QuestionDetails::MultiChoice(d) => {
            if d.correct.is_empty() {
                return Err(Error::BadRequest(
                    "Multiple-choice questions need at least one correct answer".to_string(),
                ));
            }
            if !d.free_text {
                let ids: HashSet<&str> = d.options.iter().map(|o| o.id.as_str()).collect();
                if ids.len() != d.options.len() {
                    return Err(Error::BadRequest("Option ids must be unique".to_string()));
                }
                if let Some(missing) = d.correct.iter().find(|c| !ids.contains(c.as_str())) {
                    return Err(Error::BadRequest(format!(
                        "Correct option '{}' is not one of the options",
                        missing
                    )));
                }
            }
        }
    }
    Ok(())
}
