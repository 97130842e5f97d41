//! Candidate and locked group models.
//!
//! A `GroupCandidate` is the builder's working unit: seeded with one
//! member, grown while expandable, then either locked (accepted) or
//! dissolved (members returned to the pool). A `LockedGroup` is the
//! immutable accepted form that appears in the run result.

use serde::{Deserialize, Serialize};

/// Per-term decomposition of a group's quality score.
///
/// Retained on locked groups for diagnostics; never used for control
/// flow. `total` is the clamped final value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Starting score (always 1.0).
    pub base: f64,
    /// Subtracted age penalty.
    pub age_penalty: f64,
    /// Subtracted allergy penalty (after the policy ceiling).
    pub allergy_penalty: f64,
    /// Added bonus for hitting the target size exactly.
    pub size_bonus: f64,
    /// Added homogeneity bonus (scaled 3-part average).
    pub homogeneity_bonus: f64,
    /// Final score, clamped to [0, 1].
    pub total: f64,
}

/// A group under construction during the open phase.
///
/// Member order is insertion order (seed first). Never mutated after
/// locking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCandidate {
    /// Participant indices, seed first.
    pub members: Vec<usize>,
    /// Quick score assigned when the open phase finished growing it.
    pub score: f64,
    /// Set by the finalize phase; a locked candidate is immutable.
    pub locked: bool,
}

impl GroupCandidate {
    /// Creates a candidate holding only its seed.
    pub fn seeded(seed: usize) -> Self {
        Self {
            members: vec![seed],
            score: 0.0,
            locked: false,
        }
    }

    /// The seed participant index.
    pub fn seed(&self) -> usize {
        self.members[0]
    }

    /// Current size.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the candidate has no members (never true for a seeded one).
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the candidate may take another member.
    pub fn can_expand(&self, target_size: usize) -> bool {
        !self.locked && self.members.len() < target_size
    }

    /// Appends a member. Panics in debug builds if already locked.
    pub fn push(&mut self, index: usize) {
        debug_assert!(!self.locked, "locked candidates are immutable");
        self.members.push(index);
    }

    /// Locks the candidate with its final quick score.
    pub fn lock(&mut self, score: f64) {
        self.score = score;
        self.locked = true;
    }

    /// Dissolves the candidate, yielding its members back to the pool.
    pub fn dissolve(self) -> Vec<usize> {
        self.members
    }
}

/// A finalized, accepted group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedGroup {
    /// Participant indices in join order (seed first).
    pub members: Vec<usize>,
    /// Final full score, clamped to [0, 1].
    pub score: f64,
    /// Per-term score decomposition.
    pub breakdown: ScoreBreakdown,
    /// Subspace key this group was formed in.
    pub subspace: String,
}

impl LockedGroup {
    /// Group size.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the group is empty (never true for a locked group).
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether the group contains the given participant index.
    pub fn contains(&self, index: usize) -> bool {
        self.members.contains(&index)
    }
}
