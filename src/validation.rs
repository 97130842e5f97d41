//! Fail-fast policy validation.
//!
//! Checks structural integrity of a policy before any matching work
//! begins. Detects:
//! - Inverted or degenerate size bounds
//! - Empty or malformed age-band tables
//! - Overlapping age bands
//! - Non-positive numeric tolerances
//! - Duplicate rule fields
//! - Negative score weights
//!
//! A malformed policy is a caller error and must fail the whole run with
//! a descriptive error; it must never silently degrade into "everyone
//! unassigned".

use crate::models::Policy;

/// Validation result.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// A validation error.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// min/target/max group sizes are not ordered or are degenerate.
    InvalidSizeBounds,
    /// Age rules were requested with an empty band table.
    EmptyAgeBands,
    /// A band has min > max or a negative spread.
    InvalidAgeBand,
    /// Two bands cover the same age.
    OverlappingAgeBands,
    /// A numeric-tolerance field has a non-positive tolerance.
    InvalidTolerance,
    /// The same field appears twice in one rule list.
    DuplicateField,
    /// A score weight or ceiling is negative.
    InvalidWeight,
    /// Diet rules reference an empty field name.
    InvalidDietRules,
}

impl ValidationError {
    fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Validates a policy.
///
/// Collects all detected issues rather than stopping at the first.
///
/// # Returns
/// `Ok(())` if all checks pass, `Err(errors)` otherwise.
pub fn validate_policy(policy: &Policy) -> ValidationResult {
    let mut errors = Vec::new();

    check_sizes(policy, &mut errors);
    check_age_rules(policy, &mut errors);
    check_tolerances(policy, &mut errors);
    check_duplicates(policy, &mut errors);
    check_weights(policy, &mut errors);
    check_diet_rules(policy, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_sizes(policy: &Policy, errors: &mut Vec<ValidationError>) {
    if policy.min_group_size < 2 {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidSizeBounds,
            format!("min_group_size must be >= 2, got {}", policy.min_group_size),
        ));
    }
    if policy.min_group_size > policy.target_group_size
        || policy.target_group_size > policy.max_group_size
    {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidSizeBounds,
            format!(
                "size bounds must satisfy min <= target <= max, got {} <= {} <= {}",
                policy.min_group_size, policy.target_group_size, policy.max_group_size
            ),
        ));
    }
}

fn check_age_rules(policy: &Policy, errors: &mut Vec<ValidationError>) {
    let Some(rules) = &policy.age_rules else {
        return;
    };

    if rules.bands.is_empty() {
        errors.push(ValidationError::new(
            ValidationErrorKind::EmptyAgeBands,
            "age rules are configured but the band table is empty",
        ));
        return;
    }

    for band in &rules.bands {
        if band.min > band.max {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidAgeBand,
                format!("band '{}' has min {} > max {}", band.name, band.min, band.max),
            ));
        }
        if band.max_spread < 0.0 {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidAgeBand,
                format!("band '{}' has negative max_spread", band.name),
            ));
        }
    }

    for (i, a) in rules.bands.iter().enumerate() {
        for b in rules.bands.iter().skip(i + 1) {
            if a.min <= b.max && b.min <= a.max {
                errors.push(ValidationError::new(
                    ValidationErrorKind::OverlappingAgeBands,
                    format!("bands '{}' and '{}' overlap", a.name, b.name),
                ));
            }
        }
    }

    if rules.flexible_slack_years < 0.0 || rules.cross_band_spread < 0.0 {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidAgeBand,
            "flexible_slack_years and cross_band_spread must be non-negative",
        ));
    }
    if rules.max_group_spread.is_some_and(|v| v < 0.0)
        || rules.max_group_stddev.is_some_and(|v| v < 0.0)
    {
        errors.push(ValidationError::new(
            ValidationErrorKind::InvalidAgeBand,
            "group-level age ceilings must be non-negative",
        ));
    }
}

fn check_tolerances(policy: &Policy, errors: &mut Vec<ValidationError>) {
    for (field, tol) in &policy.numeric_tolerance_fields {
        if *tol <= 0.0 || !tol.is_finite() {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidTolerance,
                format!("tolerance for '{field}' must be positive, got {tol}"),
            ));
        }
    }
}

fn check_duplicates(policy: &Policy, errors: &mut Vec<ValidationError>) {
    for (name, fields) in [
        ("subspace_fields", &policy.subspace_fields),
        ("categorical_fields", &policy.categorical_fields),
        ("multi_choice_fields", &policy.multi_choice_fields),
        ("homogeneity_fields", &policy.homogeneity_fields),
    ] {
        let mut seen = std::collections::HashSet::new();
        for field in fields {
            if !seen.insert(field.as_str()) {
                errors.push(ValidationError::new(
                    ValidationErrorKind::DuplicateField,
                    format!("field '{field}' appears twice in {name}"),
                ));
            }
        }
    }
}

fn check_weights(policy: &Policy, errors: &mut Vec<ValidationError>) {
    let w = &policy.weights;
    for (name, value) in [
        ("perfect_size_bonus", w.perfect_size_bonus),
        ("homogeneity", w.homogeneity),
        ("allergy_ceiling", w.allergy_ceiling),
        ("severe_allergy", w.severe_allergy),
        ("moderate_allergy", w.moderate_allergy),
        ("mild_allergy", w.mild_allergy),
        ("allergy_load_surcharge", w.allergy_load_surcharge),
    ] {
        if value < 0.0 || !value.is_finite() {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidWeight,
                format!("weight '{name}' must be non-negative and finite, got {value}"),
            ));
        }
    }
}

fn check_diet_rules(policy: &Policy, errors: &mut Vec<ValidationError>) {
    let d = &policy.diet_rules;
    for (name, field) in [
        ("kosher_field", &d.kosher_field),
        ("restrictions_field", &d.restrictions_field),
        ("allergy_field", &d.allergy_field),
    ] {
        if field.trim().is_empty() {
            errors.push(ValidationError::new(
                ValidationErrorKind::InvalidDietRules,
                format!("diet rule field '{name}' is empty"),
            ));
        }
    }
}
