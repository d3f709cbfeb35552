use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::models::test::TestKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub test_id: Uuid,
    pub order_index: i32,
    pub points: i32,
    pub prompt: String,
    pub hint: Option<String>,
    pub details: QuestionDetails,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub test_id: Uuid,
    pub order_index: i32,
    pub points: i32,
    pub prompt: String,
    pub hint: Option<String>,
    pub details: QuestionDetails,
}

/// Kind-specific correctness data. The tag matches `TestKind` names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionDetails {
    GapFill(GapFillDetails),
    Punctuation(PunctuationDetails),
    Stress(StressDetails),
    MultiChoice(MultiChoiceDetails),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapFillDetails {
    /// One entry per gap, in order.
    pub letters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PunctuationDetails {
    pub positions: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressDetails {
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiChoiceDetails {
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
    /// Correct option ids, or accepted strings when `free_text` is set.
    pub correct: Vec<String>,
    #[serde(default)]
    pub free_text: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub text: String,
}

impl QuestionDetails {
    pub fn kind(&self) -> TestKind {
        match self {
            QuestionDetails::GapFill(_) => TestKind::GapFill,
            QuestionDetails::Punctuation(_) => TestKind::Punctuation,
            QuestionDetails::Stress(_) => TestKind::Stress,
            QuestionDetails::MultiChoice(_) => TestKind::MultiChoice,
        }
    }

    /// The answer shown to students when the test discloses correct answers.
    pub fn correct_answer(&self) -> JsonValue {
        match self {
            QuestionDetails::GapFill(d) => json!(d.letters),
            QuestionDetails::Punctuation(d) => {
                let mut positions = d.positions.clone();
                positions.sort_unstable();
                json!(positions)
            }
            QuestionDetails::Stress(d) => json!(d.position),
            QuestionDetails::MultiChoice(d) => json!(d.correct),
        }
    }
}

/// Question as presented during an attempt: no correctness data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentQuestion {
    pub id: Uuid,
    pub order_index: i32,
    pub points: i32,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    pub gaps: Option<usize>,
    pub options: Option<Vec<ChoiceOption>>,
}

impl Question {
    pub fn kind(&self) -> TestKind {
        self.details.kind()
    }

    pub fn to_student_view(&self, show_hints: bool) -> StudentQuestion {
        let (gaps, options) = match &self.details {
            QuestionDetails::GapFill(d) => (Some(d.letters.len()), None),
            QuestionDetails::MultiChoice(d) if !d.free_text => (None, Some(d.options.clone())),
            _ => (None, None),
        };
        StudentQuestion {
            id: self.id,
            order_index: self.order_index,
            points: self.points,
            prompt: self.prompt.clone(),
            hint: if show_hints { self.hint.clone() } else { None },
            gaps,
            options,
        }
    }
}
