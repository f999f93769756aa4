//! Paired-end support.
//!
//! Mates are searched independently and combined here by expected inner
//! distance. The spacing penalty itself is applied by the worker once both
//! mates are aligned.

pub mod paths_counter;

pub use paths_counter::{HashBlockPathsCounter, QueryMatch};
