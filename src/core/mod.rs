//! Core reusable components for alignment operations.
//!
//! This module contains components that are agnostic to how reference
//! candidates are found and can be reused by any pipeline.

pub mod alignment;
pub mod compute;
pub mod io;
pub mod utils;
