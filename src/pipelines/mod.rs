//! Alignment pipelines.
//!
//! - `linear`: hash-block mapping to linear reference sequences

pub mod linear;
