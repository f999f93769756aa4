//! Reference index: encoded sequences, hash-block pyramids, and the packed
//! position maps built from them.
//!
//! - `sequence` / `sequence_database` - encoded references with optional
//!   reverse complements and a packed position codec
//! - `hash_block` / `rows` / `pyramid` - the per-sequence block hierarchy
//! - `packed_map` / `database` - per-level hash to position maps and the
//!   read-only view shared by aligner workers

pub mod database;
pub mod hash_block;
pub mod packed_map;
pub mod pyramid;
pub mod rows;
pub mod sequence;
pub mod sequence_database;

pub use database::{DatabaseConfig, HashBlockDatabase, HashBlockDatabaseView};
pub use pyramid::HashBlockPyramid;
pub use sequence::{Sequence, SequenceId};
pub use sequence_database::{SequenceDatabase, SequencePosition};
