use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::answer::Answer;
use crate::models::question::Question;
use crate::models::test_attempt::AttemptScore;

pub struct ScoringService;

impl ScoringService {
    /// Score from the attempt's answers against the questions the test has
    /// right now. Questions added or removed after the attempt started count
    /// toward `max_score` as they stand at completion.
    pub fn score(answers: &[Answer], questions: &[Question]) -> AttemptScore {
        let score = saturating_total(answers.iter().map(|a| a.points_awarded));
        let max_score = saturating_total(questions.iter().map(|q| q.points));

        AttemptScore {
            score,
            max_score,
            percentage: Self::percentage(score, max_score),
        }
    }

    /// `100 * score / max_score`, two decimals, clamped into [0, 100].
    pub fn percentage(score: i32, max_score: i32) -> Decimal {
        if max_score <= 0 {
            return Decimal::ZERO;
        }
        let raw = Decimal::from(score) * Decimal::ONE_HUNDRED / Decimal::from(max_score);
        raw.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
    }
}

fn saturating_total(points: impl Iterator<Item = i32>) -> i32 {
    let total: i64 = points.map(i64::from).sum();
    i32::try_from(total).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::{GapFillDetails, QuestionDetails};
    use chrono::Utc;
    use serde_json::json;
    use std::str::FromStr;
    use uuid::Uuid;

    fn question(points: i32) -> Question {
        Question {
            id: Uuid::new_v4(),
            test_id: Uuid::nil(),
            order_index: 0,
            points,
            prompt: "_".into(),
            hint: None,
            details: QuestionDetails::GapFill(GapFillDetails {
                letters: vec!["а".into()],
            }),
            created_at: Utc::now(),
        }
    }

    fn answer(points_awarded: i32) -> Answer {
        Answer {
            id: Uuid::new_v4(),
            attempt_id: Uuid::nil(),
            question_id: Uuid::new_v4(),
            student_answer: json!("а"),
            is_correct: points_awarded > 0,
            points_awarded,
            answered_at: Utc::now(),
        }
    }

    #[test]
    fn two_of_three_is_sixty_six_point_six_seven() {
        let questions = vec![question(1), question(1), question(1)];
        let answers = vec![answer(1), answer(1), answer(0)];

        let result = ScoringService::score(&answers, &questions);
        assert_eq!(result.score, 2);
        assert_eq!(result.max_score, 3);
        assert_eq!(result.percentage, Decimal::from_str("66.67").unwrap());
    }

    #[test]
    fn empty_test_scores_zero_percent() {
        let result = ScoringService::score(&[], &[]);
        assert_eq!(result.max_score, 0);
        assert_eq!(result.percentage, Decimal::ZERO);
    }

    #[test]
    fn unanswered_questions_still_count_toward_max() {
        let questions = vec![question(2), question(3)];
        let result = ScoringService::score(&[answer(2)], &questions);
        assert_eq!(result.score, 2);
        assert_eq!(result.max_score, 5);
        assert_eq!(result.percentage, Decimal::from(40));
    }

    #[test]
    fn percentage_never_leaves_bounds() {
        assert_eq!(ScoringService::percentage(5, 4), Decimal::ONE_HUNDRED);
        assert_eq!(ScoringService::percentage(1, 3), Decimal::from_str("33.33").unwrap());
        assert_eq!(ScoringService::percentage(3, 3), Decimal::ONE_HUNDRED);
    }

    #[test]
    fn huge_point_totals_saturate_instead_of_wrapping() {
        let questions = vec![question(1_500_000_000); 3];
        let answers = vec![answer(1_500_000_000); 2];

        let result = ScoringService::score(&answers, &questions);
        assert_eq!(result.score, i32::MAX);
        assert_eq!(result.max_score, i32::MAX);
        assert_eq!(result.percentage, Decimal::ONE_HUNDRED);
    }
}
