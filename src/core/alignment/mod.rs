//! Core alignment kernels.
//!
//! These modules are agnostic to how candidate windows were found; they only
//! see two encoded base slices and a set of end rules.

pub mod cigar;
pub mod path_aligner;
pub mod types;
pub mod workspace; // Thread-local buffer pools for allocation reuse

pub use cigar::AlignmentOp;
pub use path_aligner::{ClipRule, Cost, EndRules, PENALTY_EPSILON, PathAligner};
pub use types::AlignedBlock;
