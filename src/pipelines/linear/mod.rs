//! Linear reference mapping pipeline.
//!
//! Reads are placed on a set of linear reference sequences in three steps:
//! hash-block candidate search against a packed multi-level index, anchored
//! affine-gap extension of each candidate, and ranking of the results.
//!
//! # Module Organization
//!
//! - `index/` - sequences, hash-block pyramids, packed maps, database view
//! - `seeding/` - counting path search for single reads
//! - `paired/` - combining per-mate candidates into fragment candidates
//! - `extension/` - anchored seed-and-extend aligner
//! - `orchestrator/` - aligner worker and thread pool
//!
//! # Entry Point
//!
//! The command-line entry point is `mapper::main_align()`.

pub mod extension; // Anchored seed-and-extend
pub mod index; // Hash-block database
pub mod map_opt; // Alignment and search options
pub mod mapper; // CLI driver
pub mod orchestrator; // Worker and pool
pub mod paired; // Mate-pair candidate combination
pub mod query; // Queries and ranked alignments
pub mod seeding; // Candidate path search
