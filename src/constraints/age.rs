//! Age-band compatibility rules.
//!
//! Maps each age to exactly one band or "unbanded" (incompatible with
//! everyone). Pairwise compatibility depends on band distance:
//!
//! - Same band: `|a - b| <= band.max_spread`
//! - Adjacent bands (non-strict): `|a - b| <= min(spread_a, spread_b)`,
//!   plus `flexible_slack_years` when either band is flexible
//! - Non-adjacent bands: both flexible, within `cross_band_spread`
//! - Strict mode: no cross-band compatibility at all
//!
//! Missing ages fail every check (fail-closed).

use crate::models::AgeRules;

/// Linear penalty per year a single band's spread is exceeded.
const BAND_STRETCH_PENALTY_PER_YEAR: f64 = 0.01;
/// Penalty range for cross-band groups where every band is flexible.
const CROSS_BAND_FLEX_MIN: f64 = 0.05;
const CROSS_BAND_FLEX_MAX: f64 = 0.15;
/// Flat penalty for any other out-of-shape age mix.
const FLAT_AGE_PENALTY: f64 = 0.25;

/// Index of the first band containing the age, or `None` if unbanded.
pub fn band_of(rules: &AgeRules, age: f64) -> Option<usize> {
    rules.bands.iter().position(|b| b.contains(age))
}

/// Pairwise age compatibility.
pub fn pairwise_ok(rules: &AgeRules, a: Option<f64>, b: Option<f64>) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };
    let (Some(band_a), Some(band_b)) = (band_of(rules, a), band_of(rules, b)) else {
        return false;
    };

    let diff = (a - b).abs();

    if band_a == band_b {
        return diff <= rules.bands[band_a].max_spread;
    }
    if rules.strict {
        return false;
    }

    let ba = &rules.bands[band_a];
    let bb = &rules.bands[band_b];
    if band_a.abs_diff(band_b) == 1 {
        let mut limit = ba.max_spread.min(bb.max_spread);
        if ba.flexible || bb.flexible {
            limit += rules.flexible_slack_years;
        }
        diff <= limit
    } else {
        ba.flexible && bb.flexible && diff <= rules.cross_band_spread
    }
}

/// Group-level age compatibility.
///
/// Single band → simple spread check; cross-band is rejected outright in
/// strict mode, allowed under the combined `cross_band_spread` ceiling
/// when every member sits in a flexible band, and otherwise requires
/// every pair to pass the pairwise rule. Configured aggregate
/// spread/stddev ceilings apply on top.
pub fn group_ok(rules: &AgeRules, ages: &[Option<f64>]) -> bool {
    if ages.len() < 2 {
        return true;
    }
    let Some(resolved) = resolve(rules, ages) else {
        return false;
    };

    let spread = range(&resolved);
    if rules.max_group_spread.is_some_and(|max| spread > max) {
        return false;
    }
    if rules.max_group_stddev.is_some_and(|max| {
        let values: Vec<f64> = resolved.iter().map(|&(a, _)| a).collect();
        stddev(&values) > max
    }) {
        return false;
    }

    let first_band = resolved[0].1;
    if resolved.iter().all(|&(_, band)| band == first_band) {
        return spread <= rules.bands[first_band].max_spread;
    }
    if rules.strict {
        return false;
    }
    if resolved.iter().all(|&(_, band)| rules.bands[band].flexible) {
        return spread <= rules.cross_band_spread;
    }

    // Mixed flexibility: fall back to the pairwise rule for every pair.
    for (i, &(a, _)) in resolved.iter().enumerate() {
        for &(b, _) in resolved.iter().skip(i + 1) {
            if !pairwise_ok(rules, Some(a), Some(b)) {
                return false;
            }
        }
    }
    true
}

/// Age penalty contribution for the scoring model.
///
/// 0 for in-band-within-spread; a small linear penalty for a stretched
/// band; a fixed 0.05–0.15 penalty for cross-band-but-flexible groups;
/// a flat penalty otherwise.
pub fn penalty(rules: &AgeRules, ages: &[Option<f64>]) -> f64 {
    if ages.len() < 2 {
        return 0.0;
    }
    let Some(resolved) = resolve(rules, ages) else {
        return FLAT_AGE_PENALTY;
    };

    let spread = range(&resolved);
    let first_band = resolved[0].1;
    if resolved.iter().all(|&(_, band)| band == first_band) {
        let max_spread = rules.bands[first_band].max_spread;
        if spread <= max_spread {
            return 0.0;
        }
        return ((spread - max_spread) * BAND_STRETCH_PENALTY_PER_YEAR).min(FLAT_AGE_PENALTY);
    }
    if resolved.iter().all(|&(_, band)| rules.bands[band].flexible) {
        let ratio = (spread / rules.cross_band_spread.max(1.0)).min(1.0);
        return CROSS_BAND_FLEX_MIN + (CROSS_BAND_FLEX_MAX - CROSS_BAND_FLEX_MIN) * ratio;
    }
    FLAT_AGE_PENALTY
}

/// Population standard deviation of a group's ages (0 when empty/missing).
pub fn group_stddev(ages: &[Option<f64>]) -> f64 {
    let present: Vec<f64> = ages.iter().flatten().copied().collect();
    if present.len() < 2 {
        return 0.0;
    }
    stddev(&present)
}

fn resolve(rules: &AgeRules, ages: &[Option<f64>]) -> Option<Vec<(f64, usize)>> {
    ages.iter()
        .map(|age| {
            let age = (*age)?;
            let band = band_of(rules, age)?;
            Some((age, band))
        })
        .collect()
}

fn range(resolved: &[(f64, usize)]) -> f64 {
    let min = resolved.iter().map(|&(a, _)| a).fold(f64::INFINITY, f64::min);
    let max = resolved.iter().map(|&(a, _)| a).fold(f64::NEG_INFINITY, f64::max);
    max - min
}

fn stddev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|&a| (a - mean).powi(2)).sum::<f64>() / n;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgeBand;

    fn banded_rules() -> AgeRules {
        AgeRules::new(vec![
            AgeBand::new("20s", 18.0, 29.0, 6.0),
            AgeBand::new("30s", 30.0, 39.0, 7.0),
            AgeBand::new("40s", 40.0, 49.0, 8.0).flexible(),
            AgeBand::new("50s", 50.0, 59.0, 8.0).flexible(),
        ])
    }

    #[test]
    fn test_band_lookup() {
        let rules = banded_rules();
        assert_eq!(band_of(&rules, 25.0), Some(0));
        assert_eq!(band_of(&rules, 30.0), Some(1));
        assert_eq!(band_of(&rules, 90.0), None);
        assert_eq!(band_of(&rules, 17.0), None);
    }

    #[test]
    fn test_same_band_within_spread() {
        let rules = banded_rules();
        assert!(pairwise_ok(&rules, Some(22.0), Some(27.0)));
        assert!(!pairwise_ok(&rules, Some(18.0), Some(29.0))); // spread 11 > 6
    }

    #[test]
    fn test_missing_or_unbanded_age_fails() {
        let rules = banded_rules();
        assert!(!pairwise_ok(&rules, None, Some(25.0)));
        assert!(!pairwise_ok(&rules, Some(25.0), Some(95.0)));
    }

    #[test]
    fn test_strict_mode_blocks_cross_band() {
        let rules = banded_rules().strict();
        // 22 and 48 must never pair under strict banded policy
        assert!(!pairwise_ok(&rules, Some(22.0), Some(48.0)));
        assert!(!pairwise_ok(&rules, Some(29.0), Some(30.0)));
        // Same band still works
        assert!(pairwise_ok(&rules, Some(22.0), Some(26.0)));
    }

    #[test]
    fn test_adjacent_bands_use_tighter_spread() {
        let rules = banded_rules();
        // 20s (spread 6) and 30s (spread 7), neither flexible: limit 6
        assert!(pairwise_ok(&rules, Some(28.0), Some(32.0)));
        assert!(!pairwise_ok(&rules, Some(25.0), Some(32.0)));
    }

    #[test]
    fn test_adjacent_flexible_band_grants_slack() {
        let rules = banded_rules();
        // 30s (7) and flexible 40s (8): limit min(7,8) + 2 = 9
        assert!(pairwise_ok(&rules, Some(33.0), Some(42.0)));
        assert!(!pairwise_ok(&rules, Some(32.0), Some(42.0)));
    }

    #[test]
    fn test_non_adjacent_needs_both_flexible() {
        let rules = banded_rules();
        // 20s and 40s: 20s not flexible
        assert!(!pairwise_ok(&rules, Some(28.0), Some(40.0)));
        // 40s and... no non-adjacent flexible pair in the table within 10y,
        // so widen via a custom table
        let rules = AgeRules::new(vec![
            AgeBand::new("a", 40.0, 44.0, 5.0).flexible(),
            AgeBand::new("b", 45.0, 49.0, 5.0).flexible(),
            AgeBand::new("c", 50.0, 59.0, 8.0).flexible(),
        ]);
        assert!(pairwise_ok(&rules, Some(44.0), Some(52.0))); // bands a,c diff 8 <= 10
        assert!(!pairwise_ok(&rules, Some(40.0), Some(55.0))); // diff 15 > 10
    }

    #[test]
    fn test_group_single_band() {
        let rules = banded_rules();
        assert!(group_ok(&rules, &[Some(20.0), Some(23.0), Some(26.0)]));
        assert!(!group_ok(&rules, &[Some(18.0), Some(23.0), Some(29.0)]));
    }

    #[test]
    fn test_group_all_flexible_bands_combined_ceiling() {
        let rules = banded_rules();
        // 45, 50, 55 all in flexible bands, spread 10 <= cross_band_spread
        assert!(group_ok(&rules, &[Some(45.0), Some(50.0), Some(55.0)]));
        // spread 12 > 10
        assert!(!group_ok(&rules, &[Some(44.0), Some(50.0), Some(56.0)]));
    }

    #[test]
    fn test_group_strict_rejects_cross_band() {
        let rules = banded_rules().strict();
        assert!(!group_ok(&rules, &[Some(45.0), Some(50.0), Some(55.0)]));
    }

    #[test]
    fn test_group_aggregate_ceilings() {
        let rules = banded_rules().with_max_group_spread(4.0);
        assert!(group_ok(&rules, &[Some(20.0), Some(24.0)]));
        assert!(!group_ok(&rules, &[Some(20.0), Some(25.0)]));

        let rules = banded_rules().with_max_group_stddev(1.0);
        assert!(group_ok(&rules, &[Some(24.0), Some(25.0), Some(26.0)]));
        assert!(!group_ok(&rules, &[Some(20.0), Some(25.0)]));
    }

    #[test]
    fn test_group_stddev() {
        assert_eq!(group_stddev(&[Some(25.0), Some(25.0)]), 0.0);
        assert!((group_stddev(&[Some(20.0), Some(30.0)]) - 5.0).abs() < 1e-12);
        assert_eq!(group_stddev(&[Some(25.0), None]), 0.0);
    }

    #[test]
    fn test_group_missing_age_fails() {
        let rules = banded_rules();
        assert!(!group_ok(&rules, &[Some(22.0), None, Some(25.0)]));
    }

    #[test]
    fn test_penalty_zero_in_band() {
        let rules = banded_rules();
        assert_eq!(penalty(&rules, &[Some(22.0), Some(25.0)]), 0.0);
    }

    #[test]
    fn test_penalty_cross_band_flexible_in_range() {
        let rules = banded_rules();
        let p = penalty(&rules, &[Some(45.0), Some(50.0), Some(55.0)]);
        assert!((CROSS_BAND_FLEX_MIN..=CROSS_BAND_FLEX_MAX).contains(&p));
    }

    #[test]
    fn test_penalty_flat_for_mixed_or_unbanded() {
        let rules = banded_rules();
        assert_eq!(penalty(&rules, &[Some(22.0), Some(48.0)]), FLAT_AGE_PENALTY);
        assert_eq!(penalty(&rules, &[Some(22.0), None]), FLAT_AGE_PENALTY);
    }

    #[test]
    fn test_penalty_stretched_band_is_linear() {
        let rules = banded_rules();
        // 20s spread 11 vs max 6 → 5 years over
        let p = penalty(&rules, &[Some(18.0), Some(29.0)]);
        assert!((p - 5.0 * BAND_STRETCH_PENALTY_PER_YEAR).abs() < 1e-12);
    }
}
