//! Run-scoped flexible-answer normalization.
//!
//! Survey answers like "doesn't matter" should match every concrete
//! option other participants picked for that field. The table learns,
//! once per run, which concrete values exist per field by scanning the
//! full population; flexible tokens then expand to that set during rule
//! evaluation.
//!
//! The table is rebuilt at the start of every run — there is no global
//! mutable state to leak between runs.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::models::{AnswerValue, Participant, Policy};

/// Per-field expansion table for flexible answers.
#[derive(Debug, Clone, Default)]
pub struct NormalizationTable {
    /// Field → concrete (non-flexible) values observed in the population.
    concrete_values: BTreeMap<String, BTreeSet<String>>,
}

impl NormalizationTable {
    /// Builds the table by scanning the full population.
    ///
    /// Only fields that participate in normalization-aware rules are
    /// scanned: categorical-equality, multi-choice, and homogeneity
    /// fields.
    pub fn build(participants: &[Participant], policy: &Policy) -> Self {
        let mut concrete_values: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        let fields: BTreeSet<&String> = policy
            .categorical_fields
            .iter()
            .chain(&policy.multi_choice_fields)
            .chain(&policy.homogeneity_fields)
            .collect();

        for field in fields {
            let values = concrete_values.entry(field.clone()).or_default();
            for participant in participants {
                for option in participant.answer(field).as_options() {
                    if !policy.is_flexible_answer(&option) {
                        values.insert(option);
                    }
                }
            }
            debug!(
                field = field.as_str(),
                concrete = values.len(),
                "normalization table entry built"
            );
        }

        Self { concrete_values }
    }

    /// Normalizes a single token to its set of acceptable values.
    ///
    /// A flexible token expands to every concrete value observed for the
    /// field; when the field has no concrete values the token stands for
    /// itself (flexible-only populations still match each other).
    pub fn normalize(&self, policy: &Policy, field: &str, token: &str) -> BTreeSet<String> {
        let token = token.trim();
        if policy.is_flexible_answer(token) {
            if let Some(values) = self.concrete_values.get(field) {
                if !values.is_empty() {
                    return values.clone();
                }
            }
        }
        BTreeSet::from([token.to_string()])
    }

    /// Normalizes a whole answer to its set of acceptable values.
    ///
    /// Absent answers yield the empty set (fail-closed: an empty set
    /// intersects nothing).
    pub fn normalize_answer(
        &self,
        policy: &Policy,
        field: &str,
        value: &AnswerValue,
    ) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        for option in value.as_options() {
            result.extend(self.normalize(policy, field, &option));
        }
        result
    }

    /// Concrete values observed for a field.
    pub fn concrete_values(&self, field: &str) -> Option<&BTreeSet<String>> {
        self.concrete_values.get(field)
    }
}
