//! Per-kind answer evaluation.
//!
//! Every kind implements [`Evaluate`]; [`GradingService::evaluate`] dispatches
//! on the question's details and turns the verdict into awarded points. There
//! is no partial credit: a question yields either all of its points or none.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::models::question::{
    GapFillDetails, MultiChoiceDetails, PunctuationDetails, Question, QuestionDetails,
    StressDetails,
};
use crate::models::test::TestKind;

/// Separates the letters of a multi-gap word in a submitted string.
pub const GAP_SEPARATOR: char = ',';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub is_correct: bool,
    pub points_awarded: i32,
}

pub trait Evaluate {
    /// Ok(false) for a well-formed wrong answer, Err for a payload of the
    /// wrong shape.
    fn is_correct(&self, answer: &JsonValue) -> Result<bool>;
}

impl Evaluate for GapFillDetails {
    fn is_correct(&self, answer: &JsonValue) -> Result<bool> {
        let parts: Vec<String> = match answer {
            JsonValue::String(s) => s.split(GAP_SEPARATOR).map(str::to_string).collect(),
            JsonValue::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        Error::InvalidAnswer("gap answers must be strings".to_string())
                    })
                })
                .collect::<Result<_>>()?,
            other => {
                return Err(Error::InvalidAnswer(format!(
                    "expected letters as a string or list, got {}",
                    json_type(other)
                )))
            }
        };

        if parts.len() != self.letters.len() {
            return Ok(false);
        }
        Ok(parts
            .iter()
            .zip(&self.letters)
            .all(|(given, expected)| fold_text(given) == fold_text(expected)))
    }
}

impl Evaluate for PunctuationDetails {
    fn is_correct(&self, answer: &JsonValue) -> Result<bool> {
        let raw = match answer {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_i64().map(|p| p.to_string()).ok_or_else(|| {
                        Error::InvalidAnswer("positions must be integers".to_string())
                    })
                })
                .collect::<Result<Vec<_>>>()?
                .join(","),
            other => {
                return Err(Error::InvalidAnswer(format!(
                    "expected positions as a string or list, got {}",
                    json_type(other)
                )))
            }
        };

        Ok(normalize_positions(&raw) == self.canonical())
    }
}

impl PunctuationDetails {
    /// Sorted digit string the submitted answer is compared against.
    pub fn canonical(&self) -> String {
        let joined: String = self.positions.iter().map(|p| p.to_string()).collect();
        normalize_positions(&joined)
    }
}

impl Evaluate for StressDetails {
    fn is_correct(&self, answer: &JsonValue) -> Result<bool> {
        match answer {
            JsonValue::String(s) => Ok(s
                .trim()
                .parse::<i64>()
                .is_ok_and(|given| given == self.position as i64)),
            JsonValue::Number(n) => Ok(n.as_i64() == Some(self.position as i64)),
            other => Err(Error::InvalidAnswer(format!(
                "expected a syllable number, got {}",
                json_type(other)
            ))),
        }
    }
}

impl Evaluate for MultiChoiceDetails {
    fn is_correct(&self, answer: &JsonValue) -> Result<bool> {
        if self.free_text {
            let JsonValue::String(text) = answer else {
                return Err(Error::InvalidAnswer(format!(
                    "expected a text answer, got {}",
                    json_type(answer)
                )));
            };
            let given = fold_text(text);
            return Ok(self.correct.iter().any(|accepted| fold_text(accepted) == given));
        }

        let selected: BTreeSet<String> = match answer {
            JsonValue::Array(items) => items
                .iter()
                .map(option_id)
                .collect::<Result<_>>()?,
            single @ (JsonValue::String(_) | JsonValue::Number(_)) => {
                BTreeSet::from([option_id(single)?])
            }
            other => {
                return Err(Error::InvalidAnswer(format!(
                    "expected selected option ids, got {}",
                    json_type(other)
                )))
            }
        };
        let correct: BTreeSet<String> = self.correct.iter().cloned().collect();
        Ok(selected == correct)
    }
}

pub struct GradingService;

impl GradingService {
    pub fn evaluate(question: &Question, answer: &JsonValue) -> Result<Evaluation> {
        let is_correct = match &question.details {
            QuestionDetails::GapFill(d) => d.is_correct(answer)?,
            QuestionDetails::Punctuation(d) => d.is_correct(answer)?,
            QuestionDetails::Stress(d) => d.is_correct(answer)?,
            QuestionDetails::MultiChoice(d) => d.is_correct(answer)?,
        };

        Ok(Evaluation {
            is_correct,
            points_awarded: if is_correct { question.points } else { 0 },
        })
    }

    /// Grouping key for an incorrect answer in the common-mistake ranking.
    /// Numeric kinds keep the submitted value as is; text kinds are trimmed
    /// and lowercased.
    pub fn mistake_key(kind: TestKind, answer: &JsonValue) -> String {
        if kind.is_numeric() {
            return match answer {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            };
        }

        match answer {
            JsonValue::String(s) if kind == TestKind::GapFill => s
                .split(GAP_SEPARATOR)
                .map(fold_text)
                .collect::<Vec<_>>()
                .join(&GAP_SEPARATOR.to_string()),
            JsonValue::String(s) => fold_text(s),
            JsonValue::Array(items) => {
                let mut parts: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        JsonValue::String(s) => fold_text(s),
                        other => other.to_string(),
                    })
                    .collect();
                if kind == TestKind::MultiChoice {
                    parts.sort();
                    parts.dedup();
                }
                parts.join(&GAP_SEPARATOR.to_string())
            }
            other => other.to_string(),
        }
    }
}

/// Drops everything but ASCII digits and sorts what is left.
pub fn normalize_positions(raw: &str) -> String {
    let mut digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.sort_unstable();
    digits.into_iter().collect()
}

fn fold_text(s: &str) -> String {
    s.trim().to_lowercase()
}

fn option_id(value: &JsonValue) -> Result<String> {
    match value {
        JsonValue::String(s) => Ok(s.trim().to_string()),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(Error::InvalidAnswer(format!(
            "option ids must be strings, got {}",
            json_type(other)
        ))),
    }
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "list",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::ChoiceOption;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn question(points: i32, details: QuestionDetails) -> Question {
        Question {
            id: Uuid::new_v4(),
            test_id: Uuid::new_v4(),
            order_index: 1,
            points,
            prompt: "prompt".into(),
            hint: None,
            details,
            created_at: Utc::now(),
        }
    }

    fn gap_fill(letters: &[&str]) -> Question {
        question(
            2,
            QuestionDetails::GapFill(GapFillDetails {
                letters: letters.iter().map(|l| l.to_string()).collect(),
            }),
        )
    }

    #[test]
    fn gap_fill_ignores_case_and_whitespace() {
        let q = gap_fill(&["Е", "и"]);
        let eval = GradingService::evaluate(&q, &json!(" е , И ")).unwrap();
        assert_eq!(
            eval,
            Evaluation {
                is_correct: true,
                points_awarded: 2
            }
        );
        assert!(GradingService::evaluate(&q, &json!(["е", "и"])).unwrap().is_correct);
    }

    #[test]
    fn gap_fill_requires_every_gap() {
        let q = gap_fill(&["е", "и"]);
        let eval = GradingService::evaluate(&q, &json!("е")).unwrap();
        assert!(!eval.is_correct);
        assert_eq!(eval.points_awarded, 0);
        assert!(!GradingService::evaluate(&q, &json!("е,е")).unwrap().is_correct);
    }

    #[test]
    fn gap_fill_rejects_non_text_payloads() {
        let q = gap_fill(&["а"]);
        assert!(matches!(
            GradingService::evaluate(&q, &json!({"letter": "а"})),
            Err(Error::InvalidAnswer(_))
        ));
        assert!(matches!(
            GradingService::evaluate(&q, &json!([1])),
            Err(Error::InvalidAnswer(_))
        ));
    }

    #[test]
    fn punctuation_compares_sorted_digits() {
        let q = question(
            1,
            QuestionDetails::Punctuation(PunctuationDetails {
                positions: vec![1, 3],
            }),
        );
        assert!(GradingService::evaluate(&q, &json!("31")).unwrap().is_correct);
        assert!(GradingService::evaluate(&q, &json!("3, 1")).unwrap().is_correct);
        assert!(GradingService::evaluate(&q, &json!([3, 1])).unwrap().is_correct);
        assert!(!GradingService::evaluate(&q, &json!("13 4")).unwrap().is_correct);
        assert!(!GradingService::evaluate(&q, &json!("")).unwrap().is_correct);
    }

    #[test]
    fn punctuation_canonical_form_is_sorted() {
        let details = PunctuationDetails {
            positions: vec![5, 2, 4],
        };
        assert_eq!(details.canonical(), "245");
        assert_eq!(normalize_positions("4-2,5"), "245");
    }

    #[test]
    fn stress_mismatch_is_incorrect_not_an_error() {
        let q = question(1, QuestionDetails::Stress(StressDetails { position: 3 }));
        let eval = GradingService::evaluate(&q, &json!("2")).unwrap();
        assert!(!eval.is_correct);
        assert_eq!(eval.points_awarded, 0);
        assert!(!GradingService::evaluate(&q, &json!("третій")).unwrap().is_correct);
        assert!(GradingService::evaluate(&q, &json!(" 3 ")).unwrap().is_correct);
        assert!(GradingService::evaluate(&q, &json!(3)).unwrap().is_correct);
        assert!(GradingService::evaluate(&q, &json!(true)).is_err());
    }

    #[test]
    fn multi_choice_uses_set_equality() {
        let q = question(
            3,
            QuestionDetails::MultiChoice(MultiChoiceDetails {
                options: vec![
                    ChoiceOption {
                        id: "a".into(),
                        text: "іменник".into(),
                    },
                    ChoiceOption {
                        id: "b".into(),
                        text: "дієслово".into(),
                    },
                    ChoiceOption {
                        id: "c".into(),
                        text: "прислівник".into(),
                    },
                ],
                correct: vec!["a".into(), "c".into()],
                free_text: false,
            }),
        );
        let eval = GradingService::evaluate(&q, &json!(["c", "a"])).unwrap();
        assert_eq!(eval.points_awarded, 3);
        assert!(!GradingService::evaluate(&q, &json!(["a"])).unwrap().is_correct);
        assert!(!GradingService::evaluate(&q, &json!(["a", "b", "c"])).unwrap().is_correct);
        assert!(!GradingService::evaluate(&q, &json!("a")).unwrap().is_correct);
        assert!(GradingService::evaluate(&q, &json!(null)).is_err());
    }

    #[test]
    fn free_text_multi_choice_folds_case() {
        let q = question(
            1,
            QuestionDetails::MultiChoice(MultiChoiceDetails {
                options: vec![],
                correct: vec!["Кома".into()],
                free_text: true,
            }),
        );
        assert!(GradingService::evaluate(&q, &json!("  кома ")).unwrap().is_correct);
        assert!(!GradingService::evaluate(&q, &json!("крапка")).unwrap().is_correct);
        assert!(GradingService::evaluate(&q, &json!(["кома"])).is_err());
    }

    #[test]
    fn mistake_keys_fold_text_but_keep_numbers_raw() {
        assert_eq!(
            GradingService::mistake_key(TestKind::GapFill, &json!("  О ")),
            "о"
        );
        assert_eq!(
            GradingService::mistake_key(TestKind::Stress, &json!(" 2")),
            " 2"
        );
        assert_eq!(GradingService::mistake_key(TestKind::Stress, &json!(2)), "2");
        assert_eq!(
            GradingService::mistake_key(TestKind::MultiChoice, &json!(["c", "A"])),
            "a,c"
        );
    }

    #[test]
    fn gap_fill_string_and_list_share_a_mistake_key() {
        let from_string = GradingService::mistake_key(TestKind::GapFill, &json!(" Е , и "));
        let from_list = GradingService::mistake_key(TestKind::GapFill, &json!(["е", " И"]));
        assert_eq!(from_string, "е,и");
        assert_eq!(from_string, from_list);
    }
}
