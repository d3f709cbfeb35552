//! Teacher-facing statistics over every attempt of a test.
//!
//! Reports are recomputed on each call from a plain read of the store; the
//! aggregation itself is the synchronous [`build_report`] so it can be fed
//! fixed rows.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use uuid::Uuid;

use crate::database::store::Store;
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::question::Question;
use crate::models::test::{Test, TestKind};
use crate::models::test_attempt::TestAttempt;
use crate::services::grading_service::GradingService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeBand {
    Excellent,
    Good,
    Satisfactory,
    Unsatisfactory,
}

impl GradeBand {
    pub fn for_percentage(percentage: Decimal) -> Self {
        if percentage >= Decimal::from(80) {
            GradeBand::Excellent
        } else if percentage >= Decimal::from(60) {
            GradeBand::Good
        } else if percentage >= Decimal::from(40) {
            GradeBand::Satisfactory
        } else {
            GradeBand::Unsatisfactory
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GradeDistribution {
    pub excellent: usize,
    pub good: usize,
    pub satisfactory: usize,
    pub unsatisfactory: usize,
}

impl GradeDistribution {
    fn record(&mut self, band: GradeBand) {
        match band {
            GradeBand::Excellent => self.excellent += 1,
            GradeBand::Good => self.good += 1,
            GradeBand::Satisfactory => self.satisfactory += 1,
            GradeBand::Unsatisfactory => self.unsatisfactory += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.excellent + self.good + self.satisfactory + self.unsatisfactory
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommonMistake {
    pub answer: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionAnalytics {
    pub question_id: Uuid,
    pub order_index: i32,
    pub prompt: String,
    pub points: i32,
    pub total_answers: usize,
    pub correct_count: usize,
    pub incorrect_count: usize,
    /// Fraction in `0..=1`.
    pub success_rate: f64,
    pub common_mistakes: Vec<CommonMistake>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub test_id: Uuid,
    pub kind: TestKind,
    pub total_students: usize,
    pub completed_students: usize,
    pub in_progress_students: usize,
    pub total_attempts: usize,
    pub completed_attempts: usize,
    pub average_score: Decimal,
    pub average_percentage: Decimal,
    pub highest_score: Option<i32>,
    pub lowest_score: Option<i32>,
    pub first_completed_at: Option<DateTime<Utc>>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub average_duration_seconds: f64,
    pub grade_distribution: GradeDistribution,
    pub questions: Vec<QuestionAnalytics>,
}

#[derive(Clone)]
pub struct AnalyticsService {
    store: Arc<dyn Store>,
    default_top: usize,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn Store>, default_top: usize) -> Self {
        Self { store, default_top }
    }

    /// `top` overrides how many common mistakes are kept per question.
    pub async fn get_analytics(&self, test_id: Uuid, top: Option<usize>) -> Result<AnalyticsReport> {
        let test = self
            .store
            .get_test(test_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Test {} not found", test_id)))?;
        let questions = self.store.list_questions(test_id).await?;
        let attempts = self.store.list_attempts(test_id, None).await?;
        let answers = self.store.list_answers_for_test(test_id).await?;

        let report = build_report(
            &test,
            &questions,
            &attempts,
            &answers,
            top.unwrap_or(self.default_top),
        );
        tracing::debug!(
            %test_id,
            attempts = report.total_attempts,
            completed = report.completed_attempts,
            "Analytics computed"
        );
        Ok(report)
    }
}

pub fn build_report(
    test: &Test,
    questions: &[Question],
    attempts: &[TestAttempt],
    answers: &[Answer],
    top: usize,
) -> AnalyticsReport {
    let completed: Vec<&TestAttempt> = attempts.iter().filter(|a| a.is_completed).collect();

    let students: HashSet<Uuid> = attempts.iter().map(|a| a.student_id).collect();
    let completed_students: HashSet<Uuid> = completed.iter().map(|a| a.student_id).collect();
    let in_progress_students: HashSet<Uuid> = attempts
        .iter()
        .filter(|a| !a.is_completed)
        .map(|a| a.student_id)
        .collect();

    let mut distribution = GradeDistribution::default();
    for attempt in &completed {
        distribution.record(GradeBand::for_percentage(attempt.percentage));
    }

    let (average_score, average_percentage) = if completed.is_empty() {
        (Decimal::ZERO, Decimal::ZERO)
    } else {
        let n = Decimal::from(completed.len() as u64);
        let score_sum: Decimal = completed.iter().map(|a| Decimal::from(a.score)).sum();
        let pct_sum: Decimal = completed.iter().map(|a| a.percentage).sum();
        (round2(score_sum / n), round2(pct_sum / n))
    };

    let completion_times: Vec<DateTime<Utc>> =
        completed.iter().filter_map(|a| a.completed_at).collect();
    let durations: Vec<i64> = completed.iter().filter_map(|a| a.duration_seconds()).collect();
    let average_duration_seconds = if durations.is_empty() {
        0.0
    } else {
        durations.iter().sum::<i64>() as f64 / durations.len() as f64
    };

    AnalyticsReport {
        test_id: test.id,
        kind: test.kind,
        total_students: students.len(),
        completed_students: completed_students.len(),
        in_progress_students: in_progress_students.len(),
        total_attempts: attempts.len(),
        completed_attempts: completed.len(),
        average_score,
        average_percentage,
        highest_score: completed.iter().map(|a| a.score).max(),
        lowest_score: completed.iter().map(|a| a.score).min(),
        first_completed_at: completion_times.iter().min().copied(),
        last_completed_at: completion_times.iter().max().copied(),
        average_duration_seconds,
        grade_distribution: distribution,
        questions: question_breakdown(test.kind, questions, answers, top),
    }
}

fn question_breakdown(
    kind: TestKind,
    questions: &[Question],
    answers: &[Answer],
    top: usize,
) -> Vec<QuestionAnalytics> {
    let mut by_question: HashMap<Uuid, Vec<&Answer>> = HashMap::new();
    for answer in answers {
        by_question.entry(answer.question_id).or_default().push(answer);
    }

    let mut ordered: Vec<&Question> = questions.iter().collect();
    ordered.sort_by_key(|q| q.order_index);

    ordered
        .into_iter()
        .map(|question| {
            let given = by_question.remove(&question.id).unwrap_or_default();
            let correct_count = given.iter().filter(|a| a.is_correct).count();
            let total_answers = given.len();
            let success_rate = if total_answers == 0 {
                0.0
            } else {
                correct_count as f64 / total_answers as f64
            };

            QuestionAnalytics {
                question_id: question.id,
                order_index: question.order_index,
                prompt: question.prompt.clone(),
                points: question.points,
                total_answers,
                correct_count,
                incorrect_count: total_answers - correct_count,
                success_rate,
                common_mistakes: common_mistakes(kind, &given, top),
            }
        })
        .collect()
}

/// Incorrect answers grouped by their normalized value, most frequent first.
/// Equal counts are ordered by the value itself.
pub fn common_mistakes(kind: TestKind, answers: &[&Answer], top: usize) -> Vec<CommonMistake> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for answer in answers.iter().filter(|a| !a.is_correct) {
        *counts
            .entry(GradingService::mistake_key(kind, &answer.student_answer))
            .or_insert(0) += 1;
    }

    let mut ranked: Vec<CommonMistake> = counts
        .into_iter()
        .map(|(answer, count)| CommonMistake { answer, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.answer.cmp(&b.answer)));
    ranked.truncate(top);
    ranked
}

fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
