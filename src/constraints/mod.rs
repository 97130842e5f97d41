//! Pairwise and group-level compatibility predicates.
//!
//! The evaluator AND-s every configured hard rule: categorical equality
//! (normalized-set intersection), multi-choice overlap, numeric
//! tolerance, the age-band rule, and the pairwise diet rule. All rules
//! fail closed on missing or malformed values.
//!
//! Predicates are pure; the explanation path exists for diagnostics
//! only and never drives control flow.

pub mod age;
pub mod diet;

use serde::{Deserialize, Serialize};

use crate::models::{Participant, Policy};
use crate::normalize::NormalizationTable;

use diet::{AllergyProfile, DietaryProfile};

/// Which rule family a check belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Categorical,
    MultiChoice,
    Numeric,
    Age,
    Diet,
}

/// One rule evaluation, for the diagnostics explanation map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleCheck {
    pub kind: RuleKind,
    /// Field the rule ran on ("age"/"diet" for the field-less rules).
    pub field: String,
    pub passed: bool,
    pub detail: String,
}

/// Run-scoped derived state, rebuilt fully at the start of each run.
///
/// Holds the flexible-answer normalization table and the per-participant
/// diet/allergy profiles so rule evaluation never re-parses answers.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub norms: NormalizationTable,
    pub diet: Vec<DietaryProfile>,
    pub allergies: Vec<AllergyProfile>,
}

impl RunContext {
    /// Builds the context by scanning the full population once.
    pub fn build(participants: &[Participant], policy: &Policy) -> Self {
        Self {
            norms: NormalizationTable::build(participants, policy),
            diet: participants
                .iter()
                .map(|p| DietaryProfile::extract(p, &policy.diet_rules))
                .collect(),
            allergies: participants
                .iter()
                .map(|p| AllergyProfile::extract(p, &policy.diet_rules))
                .collect(),
        }
    }
}

/// Evaluates hard compatibility rules over a participant slice.
pub struct ConstraintEvaluator<'a> {
    participants: &'a [Participant],
    policy: &'a Policy,
    ctx: &'a RunContext,
}

impl<'a> ConstraintEvaluator<'a> {
    /// Creates an evaluator over the run's participants and context.
    pub fn new(participants: &'a [Participant], policy: &'a Policy, ctx: &'a RunContext) -> Self {
        Self {
            participants,
            policy,
            ctx,
        }
    }

    /// Whether a pair passes every configured hard rule.
    pub fn pairwise_compatible(&self, i: usize, j: usize) -> bool {
        self.first_failure(i, j).is_none()
    }

    /// The first rule family that fails for a pair, if any.
    ///
    /// Rule order is fixed (categorical, multi-choice, numeric, age,
    /// diet) so cause attribution is deterministic.
    pub fn first_failure(&self, i: usize, j: usize) -> Option<RuleKind> {
        let (a, b) = (&self.participants[i], &self.participants[j]);

        for field in &self.policy.categorical_fields {
            let sa = self.ctx.norms.normalize_answer(self.policy, field, a.answer(field));
            let sb = self.ctx.norms.normalize_answer(self.policy, field, b.answer(field));
            if sa.is_disjoint(&sb) {
                return Some(RuleKind::Categorical);
            }
        }

        for field in &self.policy.multi_choice_fields {
            let sa = self.ctx.norms.normalize_answer(self.policy, field, a.answer(field));
            let sb = self.ctx.norms.normalize_answer(self.policy, field, b.answer(field));
            if sa.is_disjoint(&sb) {
                return Some(RuleKind::MultiChoice);
            }
        }

        for (field, tolerance) in &self.policy.numeric_tolerance_fields {
            match (a.numeric_answer(field), b.numeric_answer(field)) {
                (Some(va), Some(vb)) if (va - vb).abs() <= *tolerance => {}
                _ => return Some(RuleKind::Numeric),
            }
        }

        if let Some(rules) = &self.policy.age_rules {
            if !age::pairwise_ok(rules, a.age, b.age) {
                return Some(RuleKind::Age);
            }
        }

        if !diet::pairwise_ok(&self.ctx.diet[i], &self.ctx.diet[j]) {
            return Some(RuleKind::Diet);
        }

        None
    }

    /// Evaluates every rule for a pair, returning the full check list.
    ///
    /// Diagnostics only — the hot path uses `pairwise_compatible`.
    pub fn pairwise_explain(&self, i: usize, j: usize) -> (bool, Vec<RuleCheck>) {
        let (a, b) = (&self.participants[i], &self.participants[j]);
        let mut checks = Vec::new();

        for field in &self.policy.categorical_fields {
            let sa = self.ctx.norms.normalize_answer(self.policy, field, a.answer(field));
            let sb = self.ctx.norms.normalize_answer(self.policy, field, b.answer(field));
            let passed = !sa.is_disjoint(&sb);
            checks.push(RuleCheck {
                kind: RuleKind::Categorical,
                field: field.clone(),
                passed,
                detail: format!("{sa:?} vs {sb:?}"),
            });
        }

        for field in &self.policy.multi_choice_fields {
            let sa = self.ctx.norms.normalize_answer(self.policy, field, a.answer(field));
            let sb = self.ctx.norms.normalize_answer(self.policy, field, b.answer(field));
            let passed = !sa.is_disjoint(&sb);
            checks.push(RuleCheck {
                kind: RuleKind::MultiChoice,
                field: field.clone(),
                passed,
                detail: format!("{sa:?} vs {sb:?}"),
            });
        }

        for (field, tolerance) in &self.policy.numeric_tolerance_fields {
            let (va, vb) = (a.numeric_answer(field), b.numeric_answer(field));
            let (passed, detail) = match (va, vb) {
                (Some(va), Some(vb)) => (
                    (va - vb).abs() <= *tolerance,
                    format!("|{va} - {vb}| <= {tolerance}"),
                ),
                _ => (false, "missing or non-numeric value".into()),
            };
            checks.push(RuleCheck {
                kind: RuleKind::Numeric,
                field: field.clone(),
                passed,
                detail,
            });
        }

        if let Some(rules) = &self.policy.age_rules {
            let passed = age::pairwise_ok(rules, a.age, b.age);
            checks.push(RuleCheck {
                kind: RuleKind::Age,
                field: "age".into(),
                passed,
                detail: format!("{:?} vs {:?}", a.age, b.age),
            });
        }

        let passed = diet::pairwise_ok(&self.ctx.diet[i], &self.ctx.diet[j]);
        checks.push(RuleCheck {
            kind: RuleKind::Diet,
            field: "diet".into(),
            passed,
            detail: format!("{:?} vs {:?}", self.ctx.diet[i].kosher, self.ctx.diet[j].kosher),
        });

        (checks.iter().all(|c| c.passed), checks)
    }

    /// Group-level rules that apply while a candidate is still growing:
    /// aggregate age checks and the severe-allergy cap.
    pub fn group_rules_ok(&self, members: &[usize]) -> bool {
        if let Some(rules) = &self.policy.age_rules {
            let ages: Vec<Option<f64>> =
                members.iter().map(|&m| self.participants[m].age).collect();
            if !age::group_ok(rules, &ages) {
                return false;
            }
        }

        let profiles: Vec<&AllergyProfile> =
            members.iter().map(|&m| &self.ctx.allergies[m]).collect();
        diet::group_allergy_ok(&profiles, self.policy.diet_rules.max_severe_allergies)
    }

    /// Full group check: size bounds plus the growing-phase rules.
    pub fn group_compatible(&self, members: &[usize]) -> bool {
        members.len() >= self.policy.min_group_size
            && members.len() <= self.policy.max_group_size
            && self.group_rules_ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgeBand, AgeRules, AnswerValue};

    fn make_participant(id: &str, age: f64, language: &str, days: &str) -> Participant {
        Participant::new(id)
            .with_age(age)
            .with_text("language", language)
            .with_answer("days", AnswerValue::text(days))
    }

    fn setup(policy: &Policy, participants: &[Participant]) -> RunContext {
        RunContext::build(participants, policy)
    }

    #[test]
    fn test_categorical_equality_with_flexible() {
        let policy = Policy::default().with_categorical_field("language");
        let people = vec![
            make_participant("a", 25.0, "english", "mon"),
            make_participant("b", 26.0, "hebrew", "mon"),
            make_participant("c", 27.0, "doesn't matter", "mon"),
        ];
        let ctx = setup(&policy, &people);
        let eval = ConstraintEvaluator::new(&people, &policy, &ctx);

        assert!(!eval.pairwise_compatible(0, 1));
        assert!(eval.pairwise_compatible(0, 2)); // flexible matches english
        assert!(eval.pairwise_compatible(1, 2)); // and hebrew
    }

    #[test]
    fn test_multi_choice_overlap() {
        let policy = Policy::default().with_multi_choice_field("days");
        let people = vec![
            make_participant("a", 25.0, "x", "mon, wed"),
            make_participant("b", 26.0, "x", "wed, fri"),
            make_participant("c", 27.0, "x", "tue"),
        ];
        let ctx = setup(&policy, &people);
        let eval = ConstraintEvaluator::new(&people, &policy, &ctx);

        assert!(eval.pairwise_compatible(0, 1)); // share wed
        assert!(!eval.pairwise_compatible(0, 2));
    }

    #[test]
    fn test_numeric_tolerance_fail_closed() {
        let policy = Policy::default().with_numeric_tolerance("budget", 2.0);
        let people = vec![
            Participant::new("a").with_answer("budget", AnswerValue::Number(5.0)),
            Participant::new("b").with_answer("budget", AnswerValue::Number(6.5)),
            Participant::new("c").with_answer("budget", AnswerValue::Number(9.0)),
            Participant::new("d"), // missing → fails unconditionally
            Participant::new("e").with_text("budget", "a lot"),
        ];
        let ctx = setup(&policy, &people);
        let eval = ConstraintEvaluator::new(&people, &policy, &ctx);

        assert!(eval.pairwise_compatible(0, 1));
        assert!(!eval.pairwise_compatible(0, 2));
        assert!(!eval.pairwise_compatible(0, 3));
        assert!(!eval.pairwise_compatible(0, 4));
    }

    #[test]
    fn test_age_rule_delegation() {
        let policy = Policy::default().with_age_rules(
            AgeRules::new(vec![
                AgeBand::new("20s", 18.0, 29.0, 6.0),
                AgeBand::new("40s", 40.0, 49.0, 8.0),
            ])
            .strict(),
        );
        let people = vec![
            make_participant("a", 22.0, "x", "mon"),
            make_participant("b", 48.0, "x", "mon"),
        ];
        let ctx = setup(&policy, &people);
        let eval = ConstraintEvaluator::new(&people, &policy, &ctx);

        assert_eq!(eval.first_failure(0, 1), Some(RuleKind::Age));
    }

    #[test]
    fn test_diet_rule_is_last() {
        let policy = Policy::default();
        let people = vec![
            Participant::new("a").with_text("kosher", "yes"),
            Participant::new("b").with_text("kosher", "no"),
        ];
        let ctx = setup(&policy, &people);
        let eval = ConstraintEvaluator::new(&people, &policy, &ctx);

        assert_eq!(eval.first_failure(0, 1), Some(RuleKind::Diet));
    }

    #[test]
    fn test_explain_lists_every_rule() {
        let policy = Policy::default()
            .with_categorical_field("language")
            .with_numeric_tolerance("budget", 1.0);
        let people = vec![
            make_participant("a", 25.0, "english", "mon"),
            make_participant("b", 26.0, "hebrew", "mon"),
        ];
        let ctx = setup(&policy, &people);
        let eval = ConstraintEvaluator::new(&people, &policy, &ctx);

        let (passed, checks) = eval.pairwise_explain(0, 1);
        assert!(!passed);
        // categorical + numeric + diet (no age rules configured)
        assert_eq!(checks.len(), 3);
        assert!(checks.iter().any(|c| c.kind == RuleKind::Categorical && !c.passed));
        assert!(checks.iter().any(|c| c.kind == RuleKind::Numeric && !c.passed));
    }

    #[test]
    fn test_group_rules_allergy_cap() {
        let policy = Policy::default();
        let people: Vec<Participant> = ["peanut", "shellfish", "egg", "sesame"]
            .iter()
            .enumerate()
            .map(|(i, a)| {
                Participant::new(i.to_string()).with_text("allergies", format!("severe {a}"))
            })
            .collect();
        let ctx = setup(&policy, &people);
        let eval = ConstraintEvaluator::new(&people, &policy, &ctx);

        assert!(eval.group_rules_ok(&[0, 1, 2]));
        assert!(!eval.group_rules_ok(&[0, 1, 2, 3]));
    }

    #[test]
    fn test_group_compatible_size_bounds() {
        let policy = Policy::default().with_sizes(4, 6, 8);
        let people: Vec<Participant> = (0..10)
            .map(|i| Participant::new(i.to_string()))
            .collect();
        let ctx = setup(&policy, &people);
        let eval = ConstraintEvaluator::new(&people, &policy, &ctx);

        assert!(!eval.group_compatible(&[0, 1, 2]));
        assert!(eval.group_compatible(&[0, 1, 2, 3]));
        assert!(!eval.group_compatible(&[0, 1, 2, 3, 4, 5, 6, 7, 8]));
    }
}
