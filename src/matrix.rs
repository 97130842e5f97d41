//! Dense pairwise compatibility matrix.
//!
//! Built once per subspace before the group builder runs. The matrix is
//! symmetric with a reflexive-true diagonal, so the builder's hot loop is
//! a plain boolean lookup. Alongside the matrix each participant keeps a
//! tally of which rule family caused each of their incompatibilities,
//! which later turns "no compatible partners" into a specific reason.

use std::collections::BTreeMap;

use tracing::debug;

use crate::constraints::{ConstraintEvaluator, RuleKind};

/// Symmetric pairwise compatibility over a set of participant indices.
#[derive(Debug, Clone)]
pub struct CompatibilityMatrix {
    /// Participant indices covered by this matrix, in input order.
    indices: Vec<usize>,
    /// Participant index → row position.
    rows: BTreeMap<usize, usize>,
    /// Row-major n×n cells.
    cells: Vec<bool>,
    /// Per row: first-failing rule family → count of pairs it failed.
    causes: Vec<BTreeMap<RuleKind, usize>>,
}

impl CompatibilityMatrix {
    /// Evaluates every unordered pair in `indices` once.
    ///
    /// Cost is O(n²) rule evaluations for n participants, which is why
    /// matrices are built per subspace rather than over the whole
    /// population.
    pub fn build(eval: &ConstraintEvaluator<'_>, indices: &[usize]) -> Self {
        let n = indices.len();
        let rows: BTreeMap<usize, usize> =
            indices.iter().enumerate().map(|(row, &p)| (p, row)).collect();
        let mut cells = vec![false; n * n];
        let mut causes = vec![BTreeMap::new(); n];

        for row in 0..n {
            cells[row * n + row] = true;
            for col in row + 1..n {
                match eval.first_failure(indices[row], indices[col]) {
                    None => {
                        cells[row * n + col] = true;
                        cells[col * n + row] = true;
                    }
                    Some(kind) => {
                        *causes[row].entry(kind).or_insert(0) += 1;
                        *causes[col].entry(kind).or_insert(0) += 1;
                    }
                }
            }
        }

        let compatible_pairs = cells.iter().filter(|&&c| c).count().saturating_sub(n) / 2;
        debug!(
            participants = n,
            compatible_pairs,
            "compatibility matrix built"
        );

        Self {
            indices: indices.to_vec(),
            rows,
            cells,
            causes,
        }
    }

    /// Number of participants covered.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the matrix covers no participants.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// The covered participant indices, in input order.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Whether two participants (by input index) are compatible.
    ///
    /// Reflexive: `compatible(a, a)` is true for any covered `a`.
    pub fn compatible(&self, a: usize, b: usize) -> bool {
        match (self.rows.get(&a), self.rows.get(&b)) {
            (Some(&ra), Some(&rb)) => self.cells[ra * self.indices.len() + rb],
            _ => false,
        }
    }

    /// How many *other* covered participants `a` is compatible with.
    pub fn compatible_count(&self, a: usize) -> usize {
        let Some(&row) = self.rows.get(&a) else {
            return 0;
        };
        let n = self.indices.len();
        self.cells[row * n..(row + 1) * n]
            .iter()
            .filter(|&&c| c)
            .count()
            - 1
    }

    /// The other covered participants `a` is compatible with.
    pub fn compatible_with(&self, a: usize) -> Vec<usize> {
        let Some(&row) = self.rows.get(&a) else {
            return Vec::new();
        };
        let n = self.indices.len();
        self.cells[row * n..(row + 1) * n]
            .iter()
            .enumerate()
            .filter(|&(col, &c)| c && col != row)
            .map(|(col, _)| self.indices[col])
            .collect()
    }

    /// The rule family that most often made `a` incompatible, if any.
    ///
    /// Ties break toward the earlier rule in evaluation order, keeping
    /// reason attribution deterministic.
    pub fn dominant_cause(&self, a: usize) -> Option<RuleKind> {
        let &row = self.rows.get(&a)?;
        self.causes[row]
            .iter()
            .max_by(|(ka, ca), (kb, cb)| ca.cmp(cb).then(kb.cmp(ka)))
            .map(|(&kind, _)| kind)
    }

    /// How many incompatibilities of `a` each rule family caused.
    pub fn causes_for(&self, a: usize) -> Option<&BTreeMap<RuleKind, usize>> {
        self.rows.get(&a).map(|&row| &self.causes[row])
    }
}
