//! Two-phase greedy group builder.
//!
//! Runs per subspace pool. The open phase repeatedly seeds a candidate
//! and grows it greedily toward the target size; the finalize phase
//! sorts candidates by quality and locks or dissolves each one. All tie
//! breaks are first-encountered in pool order, so identical inputs
//! produce identical groups; the `random` seed strategy draws from an
//! explicitly seeded RNG and is reproducible too.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::Rng;
use tracing::debug;

use crate::constraints::{ConstraintEvaluator, RunContext};
use crate::matrix::CompatibilityMatrix;
use crate::models::{
    GroupCandidate, OptimizationLevel, Participant, Policy, SeedStrategy, UnassignedReason,
};
use crate::scoring::ScoreCache;

/// Window size for `OptimizationLevel::Balanced` candidate selection.
const BALANCED_WINDOW: usize = 5;

/// What the builder produced for one subspace pool.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    /// Locked candidates (final member sets with quick scores).
    pub groups: Vec<GroupCandidate>,
    /// Candidates dissolved during finalize: member set plus reason.
    pub dissolved: Vec<(Vec<usize>, UnassignedReason)>,
    /// Pool members never placed into a surviving candidate.
    pub leftovers: Vec<usize>,
}

/// Greedy builder over one subspace pool.
pub struct GroupBuilder<'a> {
    participants: &'a [Participant],
    policy: &'a Policy,
    ctx: &'a RunContext,
    eval: &'a ConstraintEvaluator<'a>,
    matrix: &'a CompatibilityMatrix,
}

impl<'a> GroupBuilder<'a> {
    pub fn new(
        participants: &'a [Participant],
        policy: &'a Policy,
        ctx: &'a RunContext,
        eval: &'a ConstraintEvaluator<'a>,
        matrix: &'a CompatibilityMatrix,
    ) -> Self {
        Self {
            participants,
            policy,
            ctx,
            eval,
            matrix,
        }
    }

    /// Runs both phases over the given pool.
    ///
    /// `rng` is only consulted under `SeedStrategy::Random`; it is shared
    /// across subspaces so one policy seed governs the whole run.
    pub fn build(
        &self,
        pool_input: &[usize],
        rng: &mut StdRng,
        cache: &mut ScoreCache,
    ) -> BuildOutcome {
        let mut pool: Vec<usize> = pool_input.to_vec();
        let mut barred: BTreeSet<usize> = BTreeSet::new();
        let mut candidates: Vec<GroupCandidate> = Vec::new();

        // Open phase: seed and grow while the pool can still form a group.
        while pool.len() >= self.policy.min_group_size {
            let Some(seed) = self.pick_seed(&pool, &barred, rng) else {
                break;
            };
            pool.retain(|&p| p != seed);
            let mut candidate = GroupCandidate::seeded(seed);

            while candidate.can_expand(self.policy.target_group_size) {
                match self.pick_member(&candidate, &pool, cache) {
                    Some(next) => {
                        pool.retain(|&p| p != next);
                        candidate.push(next);
                    }
                    None => break,
                }
            }

            if candidate.len() >= self.policy.min_group_size {
                let score =
                    cache.quick(self.participants, self.policy, self.ctx, &candidate.members);
                debug!(
                    seed = candidate.seed(),
                    size = candidate.len(),
                    score,
                    "candidate opened"
                );
                candidate.score = score;
                candidates.push(candidate);
            } else {
                // Too small to keep: bar the seed from anchoring another
                // attempt, but every member (seed included) stays joinable.
                debug!(seed = candidate.seed(), size = candidate.len(), "candidate abandoned");
                barred.insert(candidate.seed());
                pool.extend(candidate.dissolve());
            }
        }

        self.finalize(candidates, pool)
    }

    /// Finalize phase: best candidates first, lock or dissolve each.
    fn finalize(&self, mut candidates: Vec<GroupCandidate>, pool: Vec<usize>) -> BuildOutcome {
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.len().cmp(&a.len()))
        });

        let mut groups = Vec::new();
        let mut dissolved = Vec::new();

        for mut candidate in candidates {
            if let Some(reason) = self.rejection_reason(&candidate.members) {
                debug!(
                    seed = candidate.seed(),
                    size = candidate.len(),
                    reason = %reason,
                    "candidate dissolved"
                );
                dissolved.push((candidate.dissolve(), reason));
                continue;
            }
            candidate.lock(candidate.score);
            groups.push(candidate);
        }

        BuildOutcome {
            groups,
            dissolved,
            leftovers: pool,
        }
    }

    /// Why a finished candidate must be dissolved, if anything.
    fn rejection_reason(&self, members: &[usize]) -> Option<UnassignedReason> {
        if members.len() < self.policy.min_group_size {
            return Some(UnassignedReason::GroupTooSmall);
        }

        let profiles: Vec<_> = members.iter().map(|&m| &self.ctx.allergies[m]).collect();
        if !crate::constraints::diet::group_allergy_ok(
            &profiles,
            self.policy.diet_rules.max_severe_allergies,
        ) {
            return Some(UnassignedReason::AllergyLimitExceeded);
        }

        if let Some(rules) = &self.policy.age_rules {
            let ages: Vec<Option<f64>> =
                members.iter().map(|&m| self.participants[m].age).collect();
            if !crate::constraints::age::group_ok(rules, &ages) {
                return Some(UnassignedReason::ConstraintsViolated);
            }
        }

        None
    }

    /// Picks the next candidate's seed from the unbarred pool.
    fn pick_seed(
        &self,
        pool: &[usize],
        barred: &BTreeSet<usize>,
        rng: &mut StdRng,
    ) -> Option<usize> {
        let seedable: Vec<usize> = pool.iter().copied().filter(|p| !barred.contains(p)).collect();
        if seedable.is_empty() {
            return None;
        }

        match self.policy.seed_strategy {
            SeedStrategy::Hardest => seedable
                .iter()
                .copied()
                .min_by_key(|&s| self.pool_compatible_count(s, pool)),
            SeedStrategy::Random => Some(seedable[rng.random_range(0..seedable.len())]),
            SeedStrategy::Oldest => seedable.iter().copied().max_by(|&a, &b| {
                let age = |p: usize| self.participants[p].age.unwrap_or(f64::NEG_INFINITY);
                // max_by keeps the later element on ties; reverse the
                // probe order so the first-seen member wins instead.
                age(a).partial_cmp(&age(b)).unwrap_or(std::cmp::Ordering::Equal).then(
                    std::cmp::Ordering::Greater,
                )
            }),
        }
    }

    /// How many current pool members a participant is compatible with.
    fn pool_compatible_count(&self, participant: usize, pool: &[usize]) -> usize {
        pool.iter()
            .filter(|&&other| other != participant && self.matrix.compatible(participant, other))
            .count()
    }

    /// Picks the next member to add to a growing candidate.
    fn pick_member(
        &self,
        candidate: &GroupCandidate,
        pool: &[usize],
        cache: &mut ScoreCache,
    ) -> Option<usize> {
        let feasible = pool
            .iter()
            .copied()
            .filter(|&p| self.joins_cleanly(candidate, p));

        match self.policy.optimization {
            OptimizationLevel::Fast => feasible.take(1).next(),
            OptimizationLevel::Balanced => {
                self.best_by_quick_score(candidate, feasible.take(BALANCED_WINDOW), cache)
            }
            OptimizationLevel::Thorough => self.best_by_quick_score(candidate, feasible, cache),
        }
    }

    /// Whether a pool member may join: pairwise compatible with every
    /// current member, and the grown group still passes the aggregate
    /// age and allergy rules.
    fn joins_cleanly(&self, candidate: &GroupCandidate, newcomer: usize) -> bool {
        if !candidate
            .members
            .iter()
            .all(|&m| self.matrix.compatible(m, newcomer))
        {
            return false;
        }
        let mut grown = candidate.members.clone();
        grown.push(newcomer);
        self.eval.group_rules_ok(&grown)
    }

    /// Highest quick-score option; first-encountered wins ties.
    fn best_by_quick_score(
        &self,
        candidate: &GroupCandidate,
        options: impl Iterator<Item = usize>,
        cache: &mut ScoreCache,
    ) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for option in options {
            let mut grown = candidate.members.clone();
            grown.push(option);
            let score = cache.quick(self.participants, self.policy, self.ctx, &grown);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((option, score));
            }
        }
        best.map(|(option, _)| option)
    }
}
