//! Seeding: candidate offsets from hash-block lookups.
//!
//! A query component's pyramid is walked from the coarsest indexed level to
//! the finest. Each anchor found in the database votes for the reference
//! offset it implies; offsets with enough votes become alignment candidates.

mod counting_path;

pub use counting_path::{CandidateOffset, CountingHashBlockPath};
