//! Group quality scoring.
//!
//! The full score drives the finalize phase and the reported per-group
//! breakdown; `quick_score` is a cheaper consistent-ranking approximation
//! used inside the builder's growth loop, backed by a run-scoped cache.
//!
//! Score shape: base 1.0, minus the age penalty, minus the capped allergy
//! penalty, plus a perfect-size bonus, plus a scaled homogeneity bonus.
//! Always clamped to [0, 1].

use std::collections::HashMap;

use tracing::debug;

use crate::constraints::{age, diet, RunContext};
use crate::models::{Participant, Policy, ScoreBreakdown};

/// Stddev at which age homogeneity bottoms out at zero.
const AGE_HOMOGENEITY_SPAN: f64 = 10.0;

/// Full score with per-term breakdown.
pub fn score_group(
    participants: &[Participant],
    policy: &Policy,
    ctx: &RunContext,
    members: &[usize],
) -> ScoreBreakdown {
    let ages: Vec<Option<f64>> = members.iter().map(|&m| participants[m].age).collect();

    let age_penalty = match &policy.age_rules {
        Some(rules) => age::penalty(rules, &ages),
        None => 0.0,
    };

    let profiles: Vec<&diet::AllergyProfile> =
        members.iter().map(|&m| &ctx.allergies[m]).collect();
    let allergy_penalty =
        diet::allergy_penalty(&profiles, &policy.weights).min(policy.weights.allergy_ceiling);

    let size_bonus = if members.len() == policy.target_group_size {
        policy.weights.perfect_size_bonus
    } else {
        0.0
    };

    let homogeneity_bonus =
        homogeneity(participants, policy, ctx, members, &ages) * policy.weights.homogeneity;

    let base = 1.0;
    let total =
        (base - age_penalty - allergy_penalty + size_bonus + homogeneity_bonus).clamp(0.0, 1.0);

    ScoreBreakdown {
        base,
        age_penalty,
        allergy_penalty,
        size_bonus,
        homogeneity_bonus,
        total,
    }
}

/// Cheap score for the builder's growth loop.
///
/// Same penalties and size bonus as the full score, but the homogeneity
/// bonus consults only the first configured homogeneity field. Ranks
/// candidates consistently with the full score without paying for the
/// full 3-part homogeneity average.
pub fn quick_score(
    participants: &[Participant],
    policy: &Policy,
    ctx: &RunContext,
    members: &[usize],
) -> f64 {
    let ages: Vec<Option<f64>> = members.iter().map(|&m| participants[m].age).collect();

    let age_penalty = match &policy.age_rules {
        Some(rules) => age::penalty(rules, &ages),
        None => 0.0,
    };

    let profiles: Vec<&diet::AllergyProfile> =
        members.iter().map(|&m| &ctx.allergies[m]).collect();
    let allergy_penalty =
        diet::allergy_penalty(&profiles, &policy.weights).min(policy.weights.allergy_ceiling);

    let size_bonus = if members.len() == policy.target_group_size {
        policy.weights.perfect_size_bonus
    } else {
        0.0
    };

    let field_part = match policy.homogeneity_fields.first() {
        Some(field) => field_similarity(participants, policy, ctx, members, field),
        None => 1.0,
    };

    (1.0 - age_penalty - allergy_penalty + size_bonus + field_part * policy.weights.homogeneity)
        .clamp(0.0, 1.0)
}

/// Unweighted average of the defined homogeneity parts.
///
/// Parts: (a) age homogeneity from the group stddev, (b) dietary-flag
/// agreement across pairs, (c) mean per-field answer similarity. Part (c)
/// is skipped when no homogeneity fields are configured.
fn homogeneity(
    participants: &[Participant],
    policy: &Policy,
    ctx: &RunContext,
    members: &[usize],
    ages: &[Option<f64>],
) -> f64 {
    let mut parts = vec![age_homogeneity(ages), diet_homogeneity(ctx, members)];

    if !policy.homogeneity_fields.is_empty() {
        let mean = policy
            .homogeneity_fields
            .iter()
            .map(|field| field_similarity(participants, policy, ctx, members, field))
            .sum::<f64>()
            / policy.homogeneity_fields.len() as f64;
        parts.push(mean);
    }

    parts.iter().sum::<f64>() / parts.len() as f64
}

/// 1.0 at stddev 0, falling linearly to 0.0 at stddev >= 10 years.
fn age_homogeneity(ages: &[Option<f64>]) -> f64 {
    1.0 - (age::group_stddev(ages) / AGE_HOMOGENEITY_SPAN).min(1.0)
}

/// Fraction of agreeing dietary-flag comparisons across all pairs.
fn diet_homogeneity(ctx: &RunContext, members: &[usize]) -> f64 {
    if members.len() < 2 {
        return 1.0;
    }

    let flags: Vec<[bool; 4]> = members
        .iter()
        .map(|&m| {
            let d = &ctx.diet[m];
            [
                d.kosher == diet::KosherStance::Strict,
                d.vegetarian,
                d.vegan,
                d.gluten_free,
            ]
        })
        .collect();

    let mut agree = 0usize;
    let mut total = 0usize;
    for (i, a) in flags.iter().enumerate() {
        for b in flags.iter().skip(i + 1) {
            agree += a.iter().zip(b).filter(|(x, y)| x == y).count();
            total += a.len();
        }
    }
    agree as f64 / total as f64
}

/// Mean pairwise answer similarity for one field.
///
/// Multi-option answers use Jaccard overlap of the normalized sets;
/// single-option answers reduce to 1.0/0.0 equality under the same
/// formula. Two absent answers count as agreeing.
fn field_similarity(
    participants: &[Participant],
    policy: &Policy,
    ctx: &RunContext,
    members: &[usize],
    field: &str,
) -> f64 {
    if members.len() < 2 {
        return 1.0;
    }

    let sets: Vec<_> = members
        .iter()
        .map(|&m| ctx.norms.normalize_answer(policy, field, participants[m].answer(field)))
        .collect();

    let mut total = 0.0;
    let mut pairs = 0usize;
    for (i, a) in sets.iter().enumerate() {
        for b in sets.iter().skip(i + 1) {
            let union = a.union(b).count();
            total += if union == 0 {
                1.0
            } else {
                a.intersection(b).count() as f64 / union as f64
            };
            pairs += 1;
        }
    }
    total / pairs as f64
}

/// Run-scoped quick-score cache keyed by the sorted member set.
///
/// Candidate sets recur heavily while the builder compares growth
/// options; the cache makes those repeats a map lookup. Rebuilt for
/// every run.
#[derive(Debug, Default)]
pub struct ScoreCache {
    entries: HashMap<Vec<usize>, f64>,
    hits: u64,
    misses: u64,
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached `quick_score` for a member set (order-insensitive).
    pub fn quick(
        &mut self,
        participants: &[Participant],
        policy: &Policy,
        ctx: &RunContext,
        members: &[usize],
    ) -> f64 {
        let mut key = members.to_vec();
        key.sort_unstable();

        if let Some(&score) = self.entries.get(&key) {
            self.hits += 1;
            return score;
        }
        self.misses += 1;
        let score = quick_score(participants, policy, ctx, members);
        self.entries.insert(key, score);
        score
    }

    /// (hits, misses) since construction.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Logs cache effectiveness at debug level.
    pub fn log_stats(&self) {
        debug!(hits = self.hits, misses = self.misses, "score cache");
    }
}
