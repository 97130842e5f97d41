//! Run result models.
//!
//! The final immutable output of a run: locked groups, unassigned
//! records with reason codes, and an aggregate summary. Constructed once
//! per run and never mutated after return.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::LockedGroup;
use crate::diagnostics::RunDiagnostics;

/// Why a participant ended up unassigned. Closed enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnassignedReason {
    /// Failed the kosher eligibility filter in a kosher-only run.
    NonKosherInKosherOnlyRun,
    /// No feasible partners remained in the participant's subspace.
    NoCompatiblePartners,
    /// Freed from a candidate that never reached the minimum size.
    GroupTooSmall,
    /// Pairwise diet conflicts isolated the participant.
    DietIncompatible,
    /// Freed from a candidate over the severe-allergy cap.
    AllergyLimitExceeded,
    /// Age outside every band, or age conflicts isolated the participant.
    AgeIncompatible,
    /// The whole subspace was below the minimum group size.
    SubspaceTooSmall,
    /// Freed by the defensive final validation.
    ConstraintsViolated,
}

impl UnassignedReason {
    /// The wire-format reason code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonKosherInKosherOnlyRun => "non-kosher-in-kosher-only-run",
            Self::NoCompatiblePartners => "no-compatible-partners",
            Self::GroupTooSmall => "group-too-small",
            Self::DietIncompatible => "diet-incompatible",
            Self::AllergyLimitExceeded => "allergy-limit-exceeded",
            Self::AgeIncompatible => "age-incompatible",
            Self::SubspaceTooSmall => "subspace-too-small",
            Self::ConstraintsViolated => "constraints-violated",
        }
    }
}

impl std::fmt::Display for UnassignedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant that could not be placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedRecord {
    /// Participant index into the run's input slice.
    pub index: usize,
    /// Reason code.
    pub reason: UnassignedReason,
    /// Optional free-text detail for diagnostics.
    pub detail: Option<String>,
}

impl UnassignedRecord {
    /// Creates a record with no detail text.
    pub fn new(index: usize, reason: UnassignedReason) -> Self {
        Self {
            index,
            reason,
            detail: None,
        }
    }

    /// Creates a record with detail text.
    pub fn with_detail(index: usize, reason: UnassignedReason, detail: impl Into<String>) -> Self {
        Self {
            index,
            reason,
            detail: Some(detail.into()),
        }
    }
}

/// Run-level aggregate summary.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Participants handed to the run.
    pub total_participants: usize,
    /// Participants placed into locked groups.
    pub grouped: usize,
    /// Participants in the unassigned list.
    pub unassigned: usize,
    /// Locked group count.
    pub group_count: usize,
    /// Group size → number of groups of that size.
    pub size_histogram: BTreeMap<usize, usize>,
    /// Mean final score across locked groups (0.0 when none).
    pub average_score: f64,
    /// Wall-clock processing time in milliseconds.
    pub elapsed_ms: u64,
}

/// The final immutable output of a grouping run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Accepted groups.
    pub groups: Vec<LockedGroup>,
    /// Participants that could not be placed, with reasons.
    pub unassigned: Vec<UnassignedRecord>,
    /// Aggregate summary.
    pub summary: RunSummary,
    /// Detailed breakdowns, present only when requested.
    pub diagnostics: Option<RunDiagnostics>,
}

impl RunResult {
    /// The locked group containing the given participant index, if any.
    pub fn group_for(&self, index: usize) -> Option<&LockedGroup> {
        self.groups.iter().find(|g| g.contains(index))
    }

    /// The unassigned record for the given participant index, if any.
    pub fn unassigned_for(&self, index: usize) -> Option<&UnassignedRecord> {
        self.unassigned.iter().find(|u| u.index == index)
    }

    /// Total participants placed into groups.
    pub fn grouped_count(&self) -> usize {
        self.groups.iter().map(LockedGroup::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreBreakdown;

    fn sample_result() -> RunResult {
        RunResult {
            groups: vec![LockedGroup {
                members: vec![0, 2, 4, 6],
                score: 0.8,
                breakdown: ScoreBreakdown::default(),
                subspace: "global".into(),
            }],
            unassigned: vec![UnassignedRecord::new(1, UnassignedReason::NoCompatiblePartners)],
            summary: RunSummary::default(),
            diagnostics: None,
        }
    }

    #[test]
    fn test_reason_codes_are_kebab_case() {
        let json = serde_json::to_string(&UnassignedReason::NonKosherInKosherOnlyRun).unwrap();
        assert_eq!(json, "\"non-kosher-in-kosher-only-run\"");
        let json = serde_json::to_string(&UnassignedReason::SubspaceTooSmall).unwrap();
        assert_eq!(json, "\"subspace-too-small\"");
    }

    #[test]
    fn test_reason_display_matches_serde() {
        for reason in [
            UnassignedReason::NonKosherInKosherOnlyRun,
            UnassignedReason::NoCompatiblePartners,
            UnassignedReason::GroupTooSmall,
            UnassignedReason::DietIncompatible,
            UnassignedReason::AllergyLimitExceeded,
            UnassignedReason::AgeIncompatible,
            UnassignedReason::SubspaceTooSmall,
            UnassignedReason::ConstraintsViolated,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{reason}\""));
        }
    }

    #[test]
    fn test_result_queries() {
        let r = sample_result();
        assert!(r.group_for(4).is_some());
        assert!(r.group_for(1).is_none());
        assert_eq!(
            r.unassigned_for(1).unwrap().reason,
            UnassignedReason::NoCompatiblePartners
        );
        assert_eq!(r.grouped_count(), 4);
    }

    #[test]
    fn test_record_with_detail() {
        let rec = UnassignedRecord::with_detail(3, UnassignedReason::AgeIncompatible, "age 17");
        assert_eq!(rec.detail.as_deref(), Some("age 17"));
    }
}
