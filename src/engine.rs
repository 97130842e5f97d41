//! Run orchestration.
//!
//! One `run` call takes the population and a policy through the full
//! pipeline: policy validation, run-context construction, eligibility
//! filtering, compatibility matrix, subspace partitioning, the two-phase
//! builder per subspace, and finally result assembly. Everything is
//! synchronous and deterministic; subspaces are processed in key order
//! and produce disjoint output.

use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{debug, info};

use crate::builder::GroupBuilder;
use crate::constraints::{age, ConstraintEvaluator, RuleKind, RunContext};
use crate::diagnostics::RunDiagnostics;
use crate::matrix::CompatibilityMatrix;
use crate::models::{
    LockedGroup, Participant, Policy, RunResult, RunSummary, UnassignedReason, UnassignedRecord,
};
use crate::scoring::{score_group, ScoreCache};
use crate::subspace;
use crate::validation::{validate_policy, ValidationError};

/// Errors that abort a run before any matching work.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The policy failed structural validation.
    #[error("invalid policy: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    InvalidPolicy(Vec<ValidationError>),
}

/// One grouping request: the policy plus run options.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub policy: Policy,
    /// Collect population breakdowns and a violation log.
    pub diagnostics: bool,
}

impl RunRequest {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            diagnostics: false,
        }
    }

    /// Enables diagnostics collection for this run.
    pub fn with_diagnostics(mut self) -> Self {
        self.diagnostics = true;
        self
    }
}

/// The grouping engine. Stateless; all run state is request-scoped.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupingEngine;

impl GroupingEngine {
    pub fn new() -> Self {
        Self
    }

    /// Runs the full pipeline over an ordered population.
    ///
    /// Failing to place a participant is never an error; they come back
    /// in `unassigned` with a reason code. The only error is a policy
    /// that fails validation.
    pub fn run(
        &self,
        participants: &[Participant],
        request: &RunRequest,
    ) -> Result<RunResult, EngineError> {
        let policy = &request.policy;
        validate_policy(policy).map_err(EngineError::InvalidPolicy)?;

        let started = Instant::now();
        let ctx = RunContext::build(participants, policy);

        let mut unassigned: Vec<UnassignedRecord> = Vec::new();
        let eligible = self.filter_eligible(participants, policy, &ctx, &mut unassigned);

        let eval = ConstraintEvaluator::new(participants, policy, &ctx);
        let matrix = CompatibilityMatrix::build(&eval, &eligible);
        let pools = subspace::partition(participants, policy, &eligible);

        let mut diagnostics = request.diagnostics.then(|| {
            let sizes = pools.iter().map(|(k, v)| (k.clone(), v.len())).collect();
            RunDiagnostics::collect(participants, policy, &ctx, sizes)
        });

        let mut rng = StdRng::seed_from_u64(policy.random_seed);
        let mut cache = ScoreCache::new();
        let builder = GroupBuilder::new(participants, policy, &ctx, &eval, &matrix);
        let mut groups: Vec<LockedGroup> = Vec::new();

        for (key, pool) in &pools {
            if pool.len() < policy.min_group_size {
                debug!(subspace = key.as_str(), size = pool.len(), "subspace below minimum");
                unassigned.extend(pool.iter().map(|&p| {
                    UnassignedRecord::with_detail(
                        p,
                        UnassignedReason::SubspaceTooSmall,
                        format!("subspace '{key}' holds {} participants", pool.len()),
                    )
                }));
                continue;
            }

            let outcome = builder.build(pool, &mut rng, &mut cache);
            debug!(
                subspace = key.as_str(),
                groups = outcome.groups.len(),
                leftovers = outcome.leftovers.len(),
                "subspace built"
            );

            for candidate in outcome.groups {
                let breakdown = score_group(participants, policy, &ctx, &candidate.members);
                groups.push(LockedGroup {
                    members: candidate.members,
                    score: breakdown.total,
                    breakdown,
                    subspace: key.clone(),
                });
            }

            for (members, reason) in outcome.dissolved {
                if let Some(diag) = diagnostics.as_mut() {
                    diag.record_violation(key, members.clone(), reason);
                }
                unassigned.extend(members.into_iter().map(|m| UnassignedRecord::new(m, reason)));
            }

            for p in outcome.leftovers {
                unassigned.push(self.leftover_record(p, pool, &matrix));
            }
        }

        cache.log_stats();
        unassigned.sort_by_key(|r| r.index);

        let summary = self.summarize(participants.len(), &groups, &unassigned, started);
        info!(
            total = summary.total_participants,
            eligible = eligible.len(),
            subspaces = pools.len(),
            groups = summary.group_count,
            unassigned = summary.unassigned,
            elapsed_ms = summary.elapsed_ms,
            "run complete"
        );

        Ok(RunResult {
            groups,
            unassigned,
            summary,
            diagnostics,
        })
    }

    /// Applies the pre-matching eligibility rules.
    ///
    /// Kosher-only runs drop non-kosher participants; when age rules are
    /// active, participants with no age or an unbanded age are marked
    /// age-incompatible up front. These filter-time reasons are final.
    fn filter_eligible(
        &self,
        participants: &[Participant],
        policy: &Policy,
        ctx: &RunContext,
        unassigned: &mut Vec<UnassignedRecord>,
    ) -> Vec<usize> {
        let mut eligible = Vec::with_capacity(participants.len());

        for (i, participant) in participants.iter().enumerate() {
            if policy.kosher_only && !ctx.diet[i].kosher_eligible() {
                unassigned.push(UnassignedRecord::with_detail(
                    i,
                    UnassignedReason::NonKosherInKosherOnlyRun,
                    "kosher answer neither affirmative nor flexible",
                ));
                continue;
            }

            if let Some(rules) = &policy.age_rules {
                match participant.age {
                    None => {
                        unassigned.push(UnassignedRecord::with_detail(
                            i,
                            UnassignedReason::AgeIncompatible,
                            "no reported age",
                        ));
                        continue;
                    }
                    Some(a) if age::band_of(rules, a).is_none() => {
                        unassigned.push(UnassignedRecord::with_detail(
                            i,
                            UnassignedReason::AgeIncompatible,
                            format!("age {a} falls outside every band"),
                        ));
                        continue;
                    }
                    _ => {}
                }
            }

            eligible.push(i);
        }

        eligible
    }

    /// Reason for a pool member the builder never placed.
    ///
    /// A participant compatible with no one in their pool gets the rule
    /// family that caused most of their incompatibilities; anyone else
    /// simply ran out of feasible partners.
    fn leftover_record(
        &self,
        participant: usize,
        pool: &[usize],
        matrix: &CompatibilityMatrix,
    ) -> UnassignedRecord {
        let pool_partners = pool
            .iter()
            .filter(|&&o| o != participant && matrix.compatible(participant, o))
            .count();

        if pool_partners == 0 {
            let reason = match matrix.dominant_cause(participant) {
                Some(RuleKind::Age) => UnassignedReason::AgeIncompatible,
                Some(RuleKind::Diet) => UnassignedReason::DietIncompatible,
                _ => UnassignedReason::NoCompatiblePartners,
            };
            return UnassignedRecord::new(participant, reason);
        }
        UnassignedRecord::new(participant, UnassignedReason::NoCompatiblePartners)
    }

    fn summarize(
        &self,
        total: usize,
        groups: &[LockedGroup],
        unassigned: &[UnassignedRecord],
        started: Instant,
    ) -> RunSummary {
        let mut size_histogram = std::collections::BTreeMap::new();
        for group in groups {
            *size_histogram.entry(group.len()).or_insert(0) += 1;
        }

        let average_score = if groups.is_empty() {
            0.0
        } else {
            groups.iter().map(|g| g.score).sum::<f64>() / groups.len() as f64
        };

        RunSummary {
            total_participants: total,
            grouped: groups.iter().map(LockedGroup::len).sum(),
            unassigned: unassigned.len(),
            group_count: groups.len(),
            size_histogram,
            average_score,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgeBand, AgeRules};

    fn make_participant(id: &str, age: f64, language: &str) -> Participant {
        Participant::new(id).with_age(age).with_text("language", language)
    }

    fn run(participants: &[Participant], policy: Policy) -> RunResult {
        GroupingEngine::new()
            .run(participants, &RunRequest::new(policy))
            .unwrap()
    }

    #[test]
    fn test_invalid_policy_fails_fast() {
        let policy = Policy::default().with_sizes(8, 6, 4);
        let err = GroupingEngine::new()
            .run(&[], &RunRequest::new(policy))
            .unwrap_err();
        let EngineError::InvalidPolicy(errors) = err;
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_empty_population_is_empty_result() {
        let result = run(&[], Policy::default());
        assert!(result.groups.is_empty());
        assert!(result.unassigned.is_empty());
        assert_eq!(result.summary.total_participants, 0);
    }

    #[test]
    fn test_every_participant_accounted_for_exactly_once() {
        let mut people: Vec<Participant> = (0..9)
            .map(|i| make_participant(&i.to_string(), 25.0, "english"))
            .collect();
        people.push(make_participant("9", 25.0, "icelandic"));
        let result = run(&people, Policy::default().with_categorical_field("language"));

        let mut seen = std::collections::BTreeSet::new();
        for group in &result.groups {
            for &m in &group.members {
                assert!(seen.insert(m));
            }
        }
        for record in &result.unassigned {
            assert!(seen.insert(record.index));
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(result.summary.grouped + result.summary.unassigned, 10);
    }

    #[test]
    fn test_twelve_compatible_two_full_groups() {
        let people: Vec<Participant> = (0..12)
            .map(|i| make_participant(&i.to_string(), 25.0, "english"))
            .collect();
        let result = run(&people, Policy::default());

        assert_eq!(result.summary.group_count, 2);
        assert_eq!(result.summary.size_histogram.get(&6), Some(&2));
        assert!(result.unassigned.is_empty());
    }

    #[test]
    fn test_runs_are_deterministic() {
        let people: Vec<Participant> = (0..20)
            .map(|i| {
                make_participant(
                    &i.to_string(),
                    20.0 + (i % 7) as f64,
                    if i % 2 == 0 { "english" } else { "hebrew" },
                )
            })
            .collect();
        let policy = Policy::default().with_categorical_field("language");

        let a = run(&people, policy.clone());
        let b = run(&people, policy);
        assert_eq!(a.groups, b.groups);
        assert_eq!(a.unassigned, b.unassigned);
    }

    #[test]
    fn test_kosher_only_filters_before_matching() {
        let mut people: Vec<Participant> = (0..6)
            .map(|i| make_participant(&i.to_string(), 25.0, "english").with_text("kosher", "yes"))
            .collect();
        people.push(
            make_participant("treif", 25.0, "english").with_text("kosher", "no"),
        );
        let result = run(&people, Policy::default().kosher_only());

        let record = result.unassigned_for(6).unwrap();
        assert_eq!(record.reason, UnassignedReason::NonKosherInKosherOnlyRun);
        assert_eq!(result.summary.group_count, 1);
        assert!(!result.groups[0].contains(6));
    }

    #[test]
    fn test_unbanded_age_premarked() {
        let mut people: Vec<Participant> = (0..6)
            .map(|i| make_participant(&i.to_string(), 25.0, "english"))
            .collect();
        people.push(make_participant("elder", 95.0, "english"));
        people.push(Participant::new("ageless").with_text("language", "english"));
        let policy = Policy::default()
            .with_age_rules(AgeRules::new(vec![AgeBand::new("20s", 18.0, 29.0, 8.0)]));
        let result = run(&people, policy);

        assert_eq!(
            result.unassigned_for(6).unwrap().reason,
            UnassignedReason::AgeIncompatible
        );
        assert_eq!(
            result.unassigned_for(7).unwrap().reason,
            UnassignedReason::AgeIncompatible
        );
        assert_eq!(result.summary.group_count, 1);
    }

    #[test]
    fn test_small_subspace_reason() {
        let mut people: Vec<Participant> = (0..6)
            .map(|i| make_participant(&i.to_string(), 25.0, "english").with_text("city", "haifa"))
            .collect();
        people.push(make_participant("lone", 25.0, "english").with_text("city", "eilat"));
        let result = run(&people, Policy::default().with_subspace_field("city"));

        assert_eq!(
            result.unassigned_for(6).unwrap().reason,
            UnassignedReason::SubspaceTooSmall
        );
        assert_eq!(result.groups[0].subspace, "city=haifa");
    }

    #[test]
    fn test_isolated_participant_gets_specific_cause() {
        let mut people: Vec<Participant> = (0..6)
            .map(|i| make_participant(&i.to_string(), 25.0, "english").with_text("kosher", "yes"))
            .collect();
        people.push(
            make_participant("solo", 25.0, "english").with_text("kosher", "no"),
        );
        let result = run(&people, Policy::default());

        // Pairwise kosher conflict isolates the non-kosher participant.
        assert_eq!(
            result.unassigned_for(6).unwrap().reason,
            UnassignedReason::DietIncompatible
        );
    }

    #[test]
    fn test_scores_bounded_even_for_wide_ages() {
        let ages = [18.0, 65.0, 90.0, 19.0, 66.0, 91.0];
        let people: Vec<Participant> = ages
            .iter()
            .enumerate()
            .map(|(i, &a)| make_participant(&i.to_string(), a, "english"))
            .collect();
        let policy = Policy::default()
            .with_sizes(2, 3, 6)
            .with_age_rules(AgeRules::new(vec![AgeBand::new("all", 18.0, 99.0, 80.0)]));
        let result = run(&people, policy);

        for group in &result.groups {
            assert!((0.0..=1.0).contains(&group.score));
        }
    }

    #[test]
    fn test_diagnostics_collected_on_request() {
        let people: Vec<Participant> = (0..6)
            .map(|i| {
                make_participant(&i.to_string(), 25.0, "english").with_text("kosher", "yes")
            })
            .collect();
        let result = GroupingEngine::new()
            .run(&people, &RunRequest::new(Policy::default()).with_diagnostics())
            .unwrap();

        let diag = result.diagnostics.unwrap();
        assert_eq!(diag.diet.kosher_strict, 6);
        assert_eq!(diag.subspace_sizes.get("global"), Some(&6));

        let bare = run(&people, Policy::default());
        assert!(bare.diagnostics.is_none());
    }

    #[test]
    fn test_average_score_and_histogram() {
        let people: Vec<Participant> = (0..12)
            .map(|i| make_participant(&i.to_string(), 25.0, "english"))
            .collect();
        let result = run(&people, Policy::default());

        let mean = result.groups.iter().map(|g| g.score).sum::<f64>()
            / result.groups.len() as f64;
        assert!((result.summary.average_score - mean).abs() < 1e-12);
        assert_eq!(result.summary.grouped, 12);
    }

    #[test]
    fn test_result_serde_roundtrip() {
        let people: Vec<Participant> = (0..6)
            .map(|i| make_participant(&i.to_string(), 25.0, "english"))
            .collect();
        let result = run(&people, Policy::default());

        let json = serde_json::to_string(&result).unwrap();
        let back: RunResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}
