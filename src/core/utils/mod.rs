pub mod packed_bits;
pub mod utils;

pub use packed_bits::{BitPackedArray, bits_needed};
pub use utils::{hash_64, realtime, xopen, xzopen};
