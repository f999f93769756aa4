//! Library error type.
//!
//! Configuration problems surface here at construction time. Absence of an
//! alignment is never an error; it is an empty result list.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid base '{base}' at offset {offset} of sequence {sequence}")]
    InvalidBase {
        sequence: String,
        offset: usize,
        base: char,
    },

    #[error("packed map capacity {capacity} is too small: {reason}")]
    CapacityTooSmall { capacity: usize, reason: String },

    #[error("reverse-strand insert requested but the sequence database has no reverse complements")]
    MissingReverseComplements,

    #[error("position {offset} is out of range for sequence {sequence} (length {length})")]
    PositionOutOfRange {
        sequence: usize,
        offset: u64,
        length: u64,
    },

    #[error("aligner worker used before setup()")]
    WorkerNotReady,

    #[error("query {0} must have one or two non-empty components")]
    EmptyQuery(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, MapperError>;

impl MapperError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        MapperError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
