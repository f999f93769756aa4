//! Base encoding and per-base penalty tables.

pub mod encoding;
