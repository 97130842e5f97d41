//! Optional run diagnostics.
//!
//! Population-level breakdowns (age bands, diet flags, allergy load) plus
//! a log of candidate groups the finalize phase rejected. Collected only
//! when the caller asks for diagnostics; nothing here feeds back into
//! matching decisions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::constraints::{age, diet::KosherStance, RunContext};
use crate::models::{Participant, Policy, UnassignedReason};

/// Age distribution over the input population.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgeBreakdown {
    /// Band name → participant count.
    pub by_band: BTreeMap<String, usize>,
    /// Participants whose age falls outside every band.
    pub unbanded: usize,
    /// Participants with no reported age.
    pub missing: usize,
}

/// Dietary flag counts over the input population.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DietBreakdown {
    pub kosher_strict: usize,
    pub kosher_flexible: usize,
    pub kosher_no: usize,
    pub kosher_unknown: usize,
    pub vegetarian: usize,
    pub vegan: usize,
    pub gluten_free: usize,
}

/// Allergy load over the input population.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AllergyBreakdown {
    /// Participants reporting at least one allergy.
    pub carriers: usize,
    /// Allergy token → number of participants carrying it.
    pub by_token: BTreeMap<String, usize>,
    /// Distinct tokens whose worst reported severity is severe.
    pub severe_tokens: usize,
}

/// A candidate group the finalize phase refused to lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Subspace the candidate was built in.
    pub subspace: String,
    /// The candidate's member indices.
    pub members: Vec<usize>,
    /// Why it was dissolved.
    pub reason: UnassignedReason,
}

/// Everything the engine can report beyond the run result itself.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub age: AgeBreakdown,
    pub diet: DietBreakdown,
    pub allergies: AllergyBreakdown,
    /// Subspace key → eligible pool size.
    pub subspace_sizes: BTreeMap<String, usize>,
    /// Candidates dissolved during finalize.
    pub violations: Vec<Violation>,
}

impl RunDiagnostics {
    /// Collects the population breakdowns; violations are appended as the
    /// run progresses.
    pub fn collect(
        participants: &[Participant],
        policy: &Policy,
        ctx: &RunContext,
        subspace_sizes: BTreeMap<String, usize>,
    ) -> Self {
        let mut diag = Self {
            subspace_sizes,
            ..Self::default()
        };

        for participant in participants {
            let Some(a) = participant.age else {
                diag.age.missing += 1;
                continue;
            };
            // Band membership only means something when age rules exist;
            // without them no one is "unbanded".
            if let Some(rules) = &policy.age_rules {
                match age::band_of(rules, a) {
                    Some(band) => {
                        *diag
                            .age
                            .by_band
                            .entry(rules.bands[band].name.clone())
                            .or_insert(0) += 1;
                    }
                    None => diag.age.unbanded += 1,
                }
            }
        }

        for profile in &ctx.diet {
            match profile.kosher {
                KosherStance::Strict => diag.diet.kosher_strict += 1,
                KosherStance::Flexible => diag.diet.kosher_flexible += 1,
                KosherStance::No => diag.diet.kosher_no += 1,
                KosherStance::Unknown => diag.diet.kosher_unknown += 1,
            }
            if profile.vegetarian {
                diag.diet.vegetarian += 1;
            }
            if profile.vegan {
                diag.diet.vegan += 1;
            }
            if profile.gluten_free {
                diag.diet.gluten_free += 1;
            }
        }

        let mut severe = std::collections::BTreeSet::new();
        for profile in &ctx.allergies {
            if profile.has_any() {
                diag.allergies.carriers += 1;
            }
            for token in profile.tokens.keys() {
                *diag.allergies.by_token.entry(token.clone()).or_insert(0) += 1;
            }
            severe.extend(profile.severe_tokens().map(str::to_string));
        }
        diag.allergies.severe_tokens = severe.len();

        diag
    }

    /// Records a candidate the finalize phase dissolved.
    pub fn record_violation(
        &mut self,
        subspace: &str,
        members: Vec<usize>,
        reason: UnassignedReason,
    ) {
        self.violations.push(Violation {
            subspace: subspace.to_string(),
            members,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgeBand, AgeRules};

    fn population() -> Vec<Participant> {
        vec![
            Participant::new("a")
                .with_age(25.0)
                .with_text("kosher", "yes")
                .with_text("allergies", "severe peanut"),
            Participant::new("b")
                .with_age(34.0)
                .with_text("kosher", "no")
                .with_text("dietary_restrictions", "vegan"),
            Participant::new("c").with_age(95.0),
            Participant::new("d"),
        ]
    }

    fn policy() -> Policy {
        Policy::default().with_age_rules(AgeRules::new(vec![
            AgeBand::new("20s", 20.0, 29.0, 6.0),
            AgeBand::new("30s", 30.0, 39.0, 7.0),
        ]))
    }

    fn collect() -> RunDiagnostics {
        let people = population();
        let policy = policy();
        let ctx = RunContext::build(&people, &policy);
        RunDiagnostics::collect(&people, &policy, &ctx, BTreeMap::new())
    }

    #[test]
    fn test_age_breakdown() {
        let diag = collect();
        assert_eq!(diag.age.by_band.get("20s"), Some(&1));
        assert_eq!(diag.age.by_band.get("30s"), Some(&1));
        assert_eq!(diag.age.unbanded, 1);
        assert_eq!(diag.age.missing, 1);
    }

    #[test]
    fn test_no_age_rules_counts_nobody_as_unbanded() {
        let people = population();
        let policy = Policy::default();
        let ctx = RunContext::build(&people, &policy);
        let diag = RunDiagnostics::collect(&people, &policy, &ctx, BTreeMap::new());

        assert!(diag.age.by_band.is_empty());
        assert_eq!(diag.age.unbanded, 0);
        assert_eq!(diag.age.missing, 1);
    }

    #[test]
    fn test_diet_breakdown() {
        let diag = collect();
        assert_eq!(diag.diet.kosher_strict, 1);
        assert_eq!(diag.diet.kosher_no, 1);
        assert_eq!(diag.diet.kosher_unknown, 2);
        assert_eq!(diag.diet.vegan, 1);
        assert_eq!(diag.diet.vegetarian, 1); // implied by vegan
    }

    #[test]
    fn test_allergy_breakdown() {
        let diag = collect();
        assert_eq!(diag.allergies.carriers, 1);
        assert_eq!(diag.allergies.by_token.get("peanut"), Some(&1));
        assert_eq!(diag.allergies.severe_tokens, 1);
    }

    #[test]
    fn test_violation_log() {
        let mut diag = collect();
        diag.record_violation("global", vec![1, 2, 3], UnassignedReason::AllergyLimitExceeded);
        assert_eq!(diag.violations.len(), 1);
        assert_eq!(diag.violations[0].reason, UnassignedReason::AllergyLimitExceeded);
    }
}
