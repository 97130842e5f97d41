//! Group-formation domain models.
//!
//! Provides the core data types for representing a grouping problem and
//! its solution: the participant population, the policy configuration
//! that drives a run, candidate and locked groups, and the final
//! immutable run result.
//!
//! # Lifecycle
//!
//! | Type | Created | Mutated | Frozen |
//! |------|---------|---------|--------|
//! | `Participant` | by the caller | never | for the whole run |
//! | `Policy` | by the caller | never | for the whole run |
//! | `GroupCandidate` | open phase | while growing | once locked |
//! | `RunResult` | end of run | never | on return |

mod group;
mod participant;
mod policy;
mod result;

pub use group::{GroupCandidate, LockedGroup, ScoreBreakdown};
pub use participant::{AnswerValue, Participant};
pub use policy::{
    AgeBand, AgeRules, DietRules, OptimizationLevel, Policy, ScoreWeights, SeedStrategy,
};
pub use result::{RunResult, RunSummary, UnassignedReason, UnassignedRecord};
