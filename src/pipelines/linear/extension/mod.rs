//! Extension: turn a candidate offset into a base-level alignment.

pub mod hash_block_aligner;

pub use hash_block_aligner::{ANCHOR_LEVEL, AlignmentWindow, HashBlockAligner, MIN_ANCHOR_LENGTH};
