//! Dietary and allergy profiles.
//!
//! Extracts a dietary profile (kosher stance, vegetarian/vegan/
//! gluten-free flags, leftover free-text restrictions) and an allergy
//! profile (tokens with mild/moderate/severe classification inferred
//! from language markers) from free-form survey answers.
//!
//! The one hard group rule here: the count of distinct severe allergy
//! tokens across a group must not exceed the policy cap.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{DietRules, Participant, ScoreWeights};

/// Kosher answer classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KosherStance {
    /// Affirmative kosher answer.
    Strict,
    /// "Either way works" answer (matches the flexible-token list).
    Flexible,
    /// Explicit non-kosher answer.
    No,
    /// Question unanswered.
    Unknown,
}

/// Allergy severity, inferred from language markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

/// A participant's dietary profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DietaryProfile {
    pub kosher: KosherStance,
    pub vegetarian: bool,
    pub vegan: bool,
    pub gluten_free: bool,
    /// Restrictions that matched no known flag.
    pub other: Vec<String>,
}

/// A participant's allergy profile: token → severity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AllergyProfile {
    pub tokens: BTreeMap<String, Severity>,
}

const KOSHER_AFFIRMATIVE: [&str; 4] = ["yes", "true", "kosher", "strictly kosher"];
/// Filler words stripped when reducing an allergy mention to its token.
const ALLERGY_FILLER: [&str; 7] = ["allergy", "allergies", "allergic", "to", "a", "the", "of"];

impl DietaryProfile {
    /// Extracts the dietary profile from a participant's answers.
    pub fn extract(participant: &Participant, rules: &DietRules) -> Self {
        let kosher = match participant.text_answer(&rules.kosher_field) {
            None => KosherStance::Unknown,
            Some(answer) => {
                let lower = answer.to_lowercase();
                if KOSHER_AFFIRMATIVE.contains(&lower.as_str()) {
                    KosherStance::Strict
                } else if rules
                    .kosher_flexible_tokens
                    .iter()
                    .any(|t| t.to_lowercase() == lower)
                {
                    KosherStance::Flexible
                } else {
                    KosherStance::No
                }
            }
        };

        let mut profile = Self {
            kosher,
            vegetarian: false,
            vegan: false,
            gluten_free: false,
            other: Vec::new(),
        };

        for entry in participant.answer(&rules.restrictions_field).as_options() {
            let lower = entry.to_lowercase();
            if lower.contains("vegan") {
                profile.vegan = true;
                profile.vegetarian = true;
            } else if lower.contains("vegetarian") {
                profile.vegetarian = true;
            } else if lower.contains("gluten") {
                profile.gluten_free = true;
            } else if !lower.is_empty() && lower != "none" {
                profile.other.push(entry);
            }
        }

        profile
    }

    /// Whether this participant clears the kosher-only eligibility rule.
    pub fn kosher_eligible(&self) -> bool {
        matches!(self.kosher, KosherStance::Strict | KosherStance::Flexible)
    }
}

/// Pairwise diet compatibility.
///
/// A strictly-kosher participant never pairs with an explicitly
/// non-kosher one; flexible and unknown stances pair with anyone.
pub fn pairwise_ok(a: &DietaryProfile, b: &DietaryProfile) -> bool {
    !matches!(
        (a.kosher, b.kosher),
        (KosherStance::Strict, KosherStance::No) | (KosherStance::No, KosherStance::Strict)
    )
}

impl AllergyProfile {
    /// Extracts the allergy profile from a participant's answers.
    ///
    /// Each comma-separated mention is reduced to a token (marker and
    /// filler words stripped) and classified: a severe marker anywhere
    /// in the mention wins, then a mild marker, else moderate.
    pub fn extract(participant: &Participant, rules: &DietRules) -> Self {
        let mut tokens = BTreeMap::new();

        for entry in participant.answer(&rules.allergy_field).as_options() {
            let lower = entry.to_lowercase();
            if lower == "none" || lower == "no" {
                continue;
            }

            let severity = if rules.severe_markers.iter().any(|m| lower.contains(&m.to_lowercase()))
            {
                Severity::Severe
            } else if rules.mild_markers.iter().any(|m| lower.contains(&m.to_lowercase())) {
                Severity::Mild
            } else {
                Severity::Moderate
            };

            let token: String = lower
                .split_whitespace()
                .filter(|word| {
                    !ALLERGY_FILLER.contains(word)
                        && !rules.severe_markers.iter().any(|m| word.contains(&m.to_lowercase()))
                        && !rules.mild_markers.iter().any(|m| word.contains(&m.to_lowercase()))
                })
                .collect::<Vec<_>>()
                .join(" ");
            if token.is_empty() {
                continue;
            }

            // Keep the worst severity seen for a repeated token.
            tokens
                .entry(token)
                .and_modify(|s: &mut Severity| *s = (*s).max(severity))
                .or_insert(severity);
        }

        Self { tokens }
    }

    /// Whether the participant reported any allergy.
    pub fn has_any(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// The participant's severe allergy tokens.
    pub fn severe_tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens
            .iter()
            .filter(|(_, s)| **s == Severity::Severe)
            .map(|(t, _)| t.as_str())
    }
}

/// Hard group rule: distinct severe allergy tokens must not exceed the cap.
pub fn group_allergy_ok(profiles: &[&AllergyProfile], max_severe: usize) -> bool {
    distinct_severe(profiles).len() <= max_severe
}

/// Allergy penalty for the scoring model (uncapped; the scorer applies
/// the policy ceiling).
///
/// Sums per-severity weighted distinct-token counts and adds a flat
/// surcharge when more than half the group carries any allergy.
pub fn allergy_penalty(profiles: &[&AllergyProfile], weights: &ScoreWeights) -> f64 {
    let mut by_token: BTreeMap<&str, Severity> = BTreeMap::new();
    for profile in profiles {
        for (token, severity) in &profile.tokens {
            by_token
                .entry(token)
                .and_modify(|s| *s = (*s).max(*severity))
                .or_insert(*severity);
        }
    }

    let mut penalty = 0.0;
    for severity in by_token.values() {
        penalty += match severity {
            Severity::Severe => weights.severe_allergy,
            Severity::Moderate => weights.moderate_allergy,
            Severity::Mild => weights.mild_allergy,
        };
    }

    let carriers = profiles.iter().filter(|p| p.has_any()).count();
    if carriers * 2 > profiles.len() {
        penalty += weights.allergy_load_surcharge;
    }

    penalty
}

fn distinct_severe<'a>(profiles: &'a [&AllergyProfile]) -> BTreeSet<&'a str> {
    profiles
        .iter()
        .flat_map(|p| p.severe_tokens())
        .collect()
}
