//! Policy: the active configuration for a grouping run.
//!
//! A policy names the hard rule fields (categorical equality, multi-choice
//! overlap, numeric tolerance), the age-band table, diet/allergy rules,
//! soft score weights, size bounds, and the builder's seed strategy and
//! optimization level. It is a read-only input, shared by reference across
//! all engine components within one run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the builder picks the first member of a new candidate group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedStrategy {
    /// The participant with the fewest compatible others in the pool.
    /// Hard-to-place people anchor groups before their options run out.
    #[default]
    Hardest,
    /// A pool member drawn from the policy-seeded RNG (reproducible).
    Random,
    /// The oldest pool member (missing ages sort last).
    Oldest,
}

/// How hard the builder works when picking the next member to add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationLevel {
    /// Take the first feasible candidate.
    Fast,
    /// Best quick-score among the first five feasible candidates.
    #[default]
    Balanced,
    /// Best quick-score among all feasible candidates.
    Thorough,
}

/// A named age interval with an intra-band maximum spread.
///
/// Bands form an ordered, non-overlapping table covering the valid age
/// range. Ages outside every band are incompatible with everyone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeBand {
    /// Band label (e.g., "20s").
    pub name: String,
    /// Inclusive lower age bound.
    pub min: f64,
    /// Inclusive upper age bound.
    pub max: f64,
    /// Maximum age difference allowed between two members of this band.
    pub max_spread: f64,
    /// Flexible bands accept relaxed cross-band pairings.
    pub flexible: bool,
}

impl AgeBand {
    /// Creates a non-flexible band.
    pub fn new(name: impl Into<String>, min: f64, max: f64, max_spread: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            max_spread,
            flexible: false,
        }
    }

    /// Marks the band as flexible.
    pub fn flexible(mut self) -> Self {
        self.flexible = true;
        self
    }

    /// Whether the band contains the given age.
    pub fn contains(&self, age: f64) -> bool {
        self.min <= age && age <= self.max
    }
}

/// Age compatibility rules for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeRules {
    /// Ordered, non-overlapping band table.
    pub bands: Vec<AgeBand>,
    /// Strict mode disables all cross-band compatibility.
    pub strict: bool,
    /// Extra years granted to adjacent-band pairs when either band is
    /// flexible.
    pub flexible_slack_years: f64,
    /// Maximum age difference for non-adjacent flexible-band pairs, and
    /// the group-level ceiling when every member is in a flexible band.
    pub cross_band_spread: f64,
    /// Optional group-level age range ceiling.
    pub max_group_spread: Option<f64>,
    /// Optional group-level age standard deviation ceiling.
    pub max_group_stddev: Option<f64>,
}

impl AgeRules {
    /// Creates rules from a band table with default slack values.
    pub fn new(bands: Vec<AgeBand>) -> Self {
        Self {
            bands,
            strict: false,
            flexible_slack_years: 2.0,
            cross_band_spread: 10.0,
            max_group_spread: None,
            max_group_stddev: None,
        }
    }

    /// Enables strict mode.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Sets the group-level age range ceiling.
    pub fn with_max_group_spread(mut self, spread: f64) -> Self {
        self.max_group_spread = Some(spread);
        self
    }

    /// Sets the group-level age standard deviation ceiling.
    pub fn with_max_group_stddev(mut self, stddev: f64) -> Self {
        self.max_group_stddev = Some(stddev);
        self
    }
}

/// Dietary and allergy rule configuration.
///
/// Field names point into the participant answer map; marker lists drive
/// the language-based severity classification of free-form allergy text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DietRules {
    /// Answer field holding the kosher response.
    pub kosher_field: String,
    /// Answer field holding free-form dietary restrictions.
    pub restrictions_field: String,
    /// Answer field holding free-form allergy text.
    pub allergy_field: String,
    /// Kosher answers treated as "either way works" for eligibility.
    pub kosher_flexible_tokens: Vec<String>,
    /// Substrings marking an allergy mention as severe.
    pub severe_markers: Vec<String>,
    /// Substrings marking an allergy mention as mild.
    pub mild_markers: Vec<String>,
    /// Maximum count of distinct severe allergy tokens per group.
    pub max_severe_allergies: usize,
}

impl Default for DietRules {
    fn default() -> Self {
        Self {
            kosher_field: "kosher".into(),
            restrictions_field: "dietary_restrictions".into(),
            allergy_field: "allergies".into(),
            kosher_flexible_tokens: vec![
                "doesn't matter".into(),
                "flexible".into(),
                "either".into(),
                "either way".into(),
                "any".into(),
            ],
            severe_markers: vec![
                "severe".into(),
                "anaphyla".into(),
                "epipen".into(),
                "life-threatening".into(),
                "hospital".into(),
            ],
            mild_markers: vec![
                "mild".into(),
                "slight".into(),
                "minor".into(),
                "sensitivity".into(),
            ],
            max_severe_allergies: 3,
        }
    }
}

/// Soft score weights and penalty constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Bonus added when a group hits the target size exactly.
    pub perfect_size_bonus: f64,
    /// Scale applied to the 3-part homogeneity average before adding it.
    pub homogeneity: f64,
    /// Ceiling on the total allergy penalty.
    pub allergy_ceiling: f64,
    /// Penalty per distinct severe allergy token.
    pub severe_allergy: f64,
    /// Penalty per distinct moderate allergy token.
    pub moderate_allergy: f64,
    /// Penalty per distinct mild allergy token.
    pub mild_allergy: f64,
    /// Flat surcharge when over half the group carries any allergy.
    pub allergy_load_surcharge: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            perfect_size_bonus: 0.1,
            homogeneity: 0.15,
            allergy_ceiling: 0.3,
            severe_allergy: 0.05,
            moderate_allergy: 0.02,
            mild_allergy: 0.01,
            allergy_load_surcharge: 0.05,
        }
    }
}

/// The active configuration for one grouping run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Preferred group size.
    pub target_group_size: usize,
    /// Smallest acceptable group size.
    pub min_group_size: usize,
    /// Largest acceptable group size.
    pub max_group_size: usize,
    /// Hard categorical fields that cut the population into subspaces.
    pub subspace_fields: Vec<String>,
    /// Hard categorical-equality fields (normalized-set intersection).
    pub categorical_fields: Vec<String>,
    /// Hard multi-choice fields (non-empty set overlap).
    pub multi_choice_fields: Vec<String>,
    /// Hard numeric fields with pairwise tolerance (`|a-b| <= tol`).
    pub numeric_tolerance_fields: BTreeMap<String, f64>,
    /// Fields consulted by the homogeneity bonus (language, area, days).
    pub homogeneity_fields: Vec<String>,
    /// Free-text tokens that expand to every observed concrete option.
    pub flexible_answers: Vec<String>,
    /// Age compatibility rules; `None` disables age checks entirely.
    pub age_rules: Option<AgeRules>,
    /// Diet and allergy rules.
    pub diet_rules: DietRules,
    /// Soft score weights.
    pub weights: ScoreWeights,
    /// When set, non-kosher participants are filtered before matching.
    pub kosher_only: bool,
    /// Seed selection strategy for the builder.
    pub seed_strategy: SeedStrategy,
    /// Candidate selection effort level for the builder.
    pub optimization: OptimizationLevel,
    /// RNG seed used only by `SeedStrategy::Random`.
    pub random_seed: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            target_group_size: 6,
            min_group_size: 4,
            max_group_size: 8,
            subspace_fields: Vec::new(),
            categorical_fields: Vec::new(),
            multi_choice_fields: Vec::new(),
            numeric_tolerance_fields: BTreeMap::new(),
            homogeneity_fields: Vec::new(),
            flexible_answers: vec![
                "doesn't matter".into(),
                "no preference".into(),
                "flexible".into(),
                "either".into(),
                "any".into(),
            ],
            age_rules: None,
            diet_rules: DietRules::default(),
            weights: ScoreWeights::default(),
            kosher_only: false,
            seed_strategy: SeedStrategy::default(),
            optimization: OptimizationLevel::default(),
            random_seed: 0,
        }
    }
}

impl Policy {
    /// Creates a policy with default sizes (target 6, min 4, max 8).
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the size bounds.
    pub fn with_sizes(mut self, min: usize, target: usize, max: usize) -> Self {
        self.min_group_size = min;
        self.target_group_size = target;
        self.max_group_size = max;
        self
    }

    /// Adds a subspace-cutting categorical field.
    pub fn with_subspace_field(mut self, field: impl Into<String>) -> Self {
        self.subspace_fields.push(field.into());
        self
    }

    /// Adds a hard categorical-equality field.
    pub fn with_categorical_field(mut self, field: impl Into<String>) -> Self {
        self.categorical_fields.push(field.into());
        self
    }

    /// Adds a hard multi-choice overlap field.
    pub fn with_multi_choice_field(mut self, field: impl Into<String>) -> Self {
        self.multi_choice_fields.push(field.into());
        self
    }

    /// Adds a hard numeric-tolerance field.
    pub fn with_numeric_tolerance(mut self, field: impl Into<String>, tolerance: f64) -> Self {
        self.numeric_tolerance_fields.insert(field.into(), tolerance);
        self
    }

    /// Adds a homogeneity-bonus field.
    pub fn with_homogeneity_field(mut self, field: impl Into<String>) -> Self {
        self.homogeneity_fields.push(field.into());
        self
    }

    /// Sets the age rules.
    pub fn with_age_rules(mut self, rules: AgeRules) -> Self {
        self.age_rules = Some(rules);
        self
    }

    /// Restricts the run to kosher participants.
    pub fn kosher_only(mut self) -> Self {
        self.kosher_only = true;
        self
    }

    /// Sets the seed strategy.
    pub fn with_seed_strategy(mut self, strategy: SeedStrategy) -> Self {
        self.seed_strategy = strategy;
        self
    }

    /// Sets the optimization level.
    pub fn with_optimization(mut self, level: OptimizationLevel) -> Self {
        self.optimization = level;
        self
    }

    /// Sets the RNG seed for `SeedStrategy::Random`.
    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    /// Whether a token counts as a flexible answer (case-insensitive).
    pub fn is_flexible_answer(&self, token: &str) -> bool {
        let t = token.trim().to_lowercase();
        self.flexible_answers.iter().any(|f| f.to_lowercase() == t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sizes() {
        let p = Policy::default();
        assert_eq!(p.min_group_size, 4);
        assert_eq!(p.target_group_size, 6);
        assert_eq!(p.max_group_size, 8);
        assert_eq!(p.seed_strategy, SeedStrategy::Hardest);
        assert_eq!(p.optimization, OptimizationLevel::Balanced);
    }

    #[test]
    fn test_band_contains() {
        let band = AgeBand::new("20s", 20.0, 29.0, 6.0);
        assert!(band.contains(20.0));
        assert!(band.contains(29.0));
        assert!(!band.contains(19.9));
        assert!(!band.contains(30.0));
    }

    #[test]
    fn test_flexible_band_builder() {
        let band = AgeBand::new("40s", 40.0, 49.0, 8.0).flexible();
        assert!(band.flexible);
    }

    #[test]
    fn test_age_rules_defaults() {
        let rules = AgeRules::new(vec![AgeBand::new("all", 18.0, 120.0, 15.0)]);
        assert!(!rules.strict);
        assert_eq!(rules.flexible_slack_years, 2.0);
        assert_eq!(rules.cross_band_spread, 10.0);
    }

    #[test]
    fn test_is_flexible_answer_case_insensitive() {
        let p = Policy::default();
        assert!(p.is_flexible_answer("Doesn't Matter"));
        assert!(p.is_flexible_answer(" FLEXIBLE "));
        assert!(!p.is_flexible_answer("vegetarian"));
    }

    #[test]
    fn test_policy_builder_chain() {
        let p = Policy::new()
            .with_sizes(3, 5, 7)
            .with_subspace_field("city")
            .with_categorical_field("language")
            .with_multi_choice_field("meeting_days")
            .with_numeric_tolerance("budget", 2.0)
            .with_homogeneity_field("language")
            .kosher_only()
            .with_seed_strategy(SeedStrategy::Oldest)
            .with_optimization(OptimizationLevel::Thorough)
            .with_random_seed(42);

        assert_eq!(p.min_group_size, 3);
        assert_eq!(p.subspace_fields, vec!["city"]);
        assert_eq!(p.numeric_tolerance_fields["budget"], 2.0);
        assert!(p.kosher_only);
        assert_eq!(p.seed_strategy, SeedStrategy::Oldest);
        assert_eq!(p.random_seed, 42);
    }

    #[test]
    fn test_policy_serde_roundtrip() {
        let p = Policy::new()
            .with_age_rules(AgeRules::new(vec![
                AgeBand::new("20s", 20.0, 29.0, 6.0),
                AgeBand::new("30s", 30.0, 39.0, 7.0).flexible(),
            ]))
            .with_categorical_field("language");

        let json = serde_json::to_string(&p).unwrap();
        let back: Policy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
