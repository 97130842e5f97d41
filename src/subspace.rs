//! Population partitioning by hard subspace fields.
//!
//! Subspace fields cut the population into disjoint pools before any
//! pairwise work happens: participants in different subspaces are never
//! compared, which keeps the O(n²) matrix builds small. Keys are the
//! participant's subspace answers rendered as `field=value|field=value`
//! in field order; with no subspace fields configured everyone lands in
//! the single `global` pool.

use std::collections::BTreeMap;

use tracing::debug;

use crate::models::{AnswerValue, Participant, Policy};

/// Key used when no subspace fields are configured.
pub const GLOBAL_SUBSPACE: &str = "global";

/// Splits `eligible` into disjoint subspace pools.
///
/// Values are lowercased and trimmed so that "Tel Aviv" and "tel aviv"
/// share a pool; an unanswered subspace field renders as an empty value,
/// which forms its own pool rather than matching everyone.
///
/// The returned map is ordered by key, and each pool preserves the input
/// order of `eligible`, so iteration is deterministic.
pub fn partition(
    participants: &[Participant],
    policy: &Policy,
    eligible: &[usize],
) -> BTreeMap<String, Vec<usize>> {
    let mut pools: BTreeMap<String, Vec<usize>> = BTreeMap::new();

    for &index in eligible {
        let key = subspace_key(&participants[index], policy);
        pools.entry(key).or_default().push(index);
    }

    debug!(
        pools = pools.len(),
        eligible = eligible.len(),
        "population partitioned"
    );
    pools
}

/// The subspace key for one participant.
pub fn subspace_key(participant: &Participant, policy: &Policy) -> String {
    if policy.subspace_fields.is_empty() {
        return GLOBAL_SUBSPACE.to_string();
    }

    policy
        .subspace_fields
        .iter()
        .map(|field| format!("{field}={}", render_value(participant.answer(field))))
        .collect::<Vec<_>>()
        .join("|")
}

/// Renders any answer variant into its key fragment.
///
/// Numeric and multi-choice answers must keep their identity in the key;
/// collapsing them to an empty value would merge distinct pools.
fn render_value(value: &AnswerValue) -> String {
    match value {
        AnswerValue::Text(s) => s.trim().to_lowercase(),
        AnswerValue::Many(vs) => vs
            .iter()
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(","),
        AnswerValue::Number(n) => n.to_string(),
        AnswerValue::Absent => String::new(),
    }
}
