//! Constraint-based group formation engine.
//!
//! Assigns a population of individually-profiled participants into
//! fixed-size groups subject to hard eligibility rules (dietary
//! compatibility, age compatibility, allergy limits) and a soft quality
//! score (homogeneity, diversity, size fit), then reports which
//! participants could not be placed and why.
//!
//! # Modules
//!
//! - **`models`**: Domain types — `Participant`, `AnswerValue`, `Policy`,
//!   `AgeBand`, `GroupCandidate`, `LockedGroup`, `RunResult`
//! - **`validation`**: Fail-fast policy integrity checks
//! - **`normalize`**: Run-scoped flexible-answer expansion tables
//! - **`constraints`**: Pairwise and group-level compatibility predicates
//! - **`matrix`**: All-pairs compatibility relation over a participant set
//! - **`subspace`**: Partitioning by hard categorical equality fields
//! - **`scoring`**: Bounded [0,1] group quality score
//! - **`builder`**: Two-phase greedy group builder (open + finalize)
//! - **`engine`**: Run orchestration, summary, and unassigned aggregation
//! - **`diagnostics`**: Age/diet/allergy breakdowns and the violation log
//!
//! # Architecture
//!
//! The engine is a single synchronous computation per run: it consumes a
//! flat participant list plus a policy and returns a pure in-memory
//! `RunResult`. Persistence, identifiers, and transport are the caller's
//! responsibility. Inability to place a participant is a normal outcome
//! represented as an `UnassignedRecord`, never an error.

pub mod builder;
pub mod constraints;
pub mod diagnostics;
pub mod engine;
pub mod matrix;
pub mod models;
pub mod normalize;
pub mod scoring;
pub mod subspace;
pub mod validation;

pub use engine::{EngineError, GroupingEngine, RunRequest};
pub use models::{Participant, Policy, RunResult};
