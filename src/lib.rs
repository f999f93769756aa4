//! Short-read mapper built on a multi-level hash-block index.
//!
//! Reference sequences are cut into a pyramid of hash blocks whose hashes go
//! into packed per-level maps. Reads are hashed the same way, candidate
//! offsets are counted from block hits, and each candidate is extended with
//! an anchored affine-gap aligner that understands IUPAC ambiguity codes.

pub mod core;
pub mod error;
pub mod pipelines;

pub use error::{MapperError, Result};
