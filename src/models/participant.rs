//! Participant model and typed survey answers.
//!
//! A participant is an immutable record: an identifier, an optional age,
//! and a map of survey answers. Answers use a small closed value enum so
//! that field extraction is exhaustive and compiler-checked rather than
//! an untyped dictionary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single survey answer.
///
/// The closed variant set keeps rule evaluation fail-closed: a rule that
/// needs a number and finds `Text("maybe")` simply fails for that
/// participant instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnswerValue {
    /// Free-text or single-choice answer.
    Text(String),
    /// Multi-choice answer (already split into options).
    Many(Vec<String>),
    /// Numeric answer (e.g., a 1-10 preference scale).
    Number(f64),
    /// The question was not answered.
    Absent,
}

impl AnswerValue {
    /// Creates a text answer.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Creates a multi-choice answer.
    pub fn many<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Many(values.into_iter().map(Into::into).collect())
    }

    /// The answer as trimmed text, if it is a non-empty text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then_some(t)
            }
            _ => None,
        }
    }

    /// The answer as a number.
    ///
    /// `Number` values are returned directly; `Text` values are parsed.
    /// Anything else is `None` (fail-closed for numeric rules).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// The answer as a set of trimmed option strings.
    ///
    /// `Many` values are used as-is; `Text` values are comma-split
    /// (the common encoding for multi-choice survey exports). Empty
    /// entries are dropped.
    pub fn as_options(&self) -> Vec<String> {
        match self {
            Self::Many(vs) => vs
                .iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
            Self::Text(s) => s
                .split(',')
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Whether the question went unanswered (or answered emptily).
    pub fn is_absent(&self) -> bool {
        match self {
            Self::Absent => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Many(vs) => vs.iter().all(|v| v.trim().is_empty()),
            Self::Number(n) => !n.is_finite(),
        }
    }
}

/// An individually-profiled participant.
///
/// Immutable once loaded into the engine; owned exclusively by the run
/// for its duration. The engine addresses participants by their position
/// in the input slice — the `id` is carried through untouched for the
/// caller's persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Caller-supplied identifier (opaque to the engine).
    pub id: String,
    /// Age in years, if reported.
    pub age: Option<f64>,
    /// Survey answers keyed by field name. Ordered for determinism.
    pub answers: BTreeMap<String, AnswerValue>,
}

impl Participant {
    /// Creates a participant with no age and no answers.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            age: None,
            answers: BTreeMap::new(),
        }
    }

    /// Sets the age.
    pub fn with_age(mut self, age: f64) -> Self {
        self.age = Some(age);
        self
    }

    /// Sets an answer.
    pub fn with_answer(mut self, field: impl Into<String>, value: AnswerValue) -> Self {
        self.answers.insert(field.into(), value);
        self
    }

    /// Convenience: sets a text answer.
    pub fn with_text(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_answer(field, AnswerValue::text(value))
    }

    /// The answer for a field, treating a missing entry as `Absent`.
    pub fn answer(&self, field: &str) -> &AnswerValue {
        self.answers.get(field).unwrap_or(&AnswerValue::Absent)
    }

    /// Trimmed text answer for a field, if any.
    pub fn text_answer(&self, field: &str) -> Option<&str> {
        self.answers.get(field).and_then(AnswerValue::as_text)
    }

    /// Numeric answer for a field, if present and parseable.
    pub fn numeric_answer(&self, field: &str) -> Option<f64> {
        self.answers.get(field).and_then(AnswerValue::as_number)
    }
}
