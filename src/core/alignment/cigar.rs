//! Alignment operation paths - single authoritative implementation
//!
//! Paths are run-length lists of `(op, count)`. Every producer pushes through
//! [`push_run`] so adjacent runs of the same operation are always merged.

use std::fmt::Write;

/// Alignment operation with zero-cost conversion to/from bytes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlignmentOp {
    Match = b'=',     // Sequence match
    Mismatch = b'X',  // Substitution or ambiguity-code comparison
    Insertion = b'I', // Query base absent from the reference
    Deletion = b'D',  // Reference base absent from the query
    Clip = b'S',      // Unaligned query base
}

impl AlignmentOp {
    /// Convert from byte representation
    #[inline(always)]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'=' => Some(Self::Match),
            b'X' => Some(Self::Mismatch),
            b'I' => Some(Self::Insertion),
            b'D' => Some(Self::Deletion),
            b'S' => Some(Self::Clip),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }

    /// Returns true if this operation consumes query bases
    #[inline(always)]
    pub const fn consumes_query(self) -> bool {
        matches!(self, Self::Match | Self::Mismatch | Self::Insertion | Self::Clip)
    }

    /// Returns true if this operation consumes reference bases
    #[inline(always)]
    pub const fn consumes_ref(self) -> bool {
        matches!(self, Self::Match | Self::Mismatch | Self::Deletion)
    }

    #[inline(always)]
    pub const fn is_clip(self) -> bool {
        matches!(self, Self::Clip)
    }
}

pub type OpRun = (AlignmentOp, u32);

/// Append `count` operations, extending the last run when it matches.
#[inline]
pub fn push_run(path: &mut Vec<OpRun>, op: AlignmentOp, count: u32) {
    if count == 0 {
        return;
    }
    match path.last_mut() {
        Some((last, len)) if *last == op => *len += count,
        _ => path.push((op, count)),
    }
}

/// Merge adjacent identical operations in place.
///
/// E.g., `[(=, 10), (=, 5)]` -> `[(=, 15)]`
#[inline]
pub fn normalize_in_place(path: &mut Vec<OpRun>) {
    path.retain(|&(_, len)| len > 0);
    if path.len() <= 1 {
        return;
    }
    let mut write = 0;
    for read in 1..path.len() {
        if path[read].0 == path[write].0 {
            path[write].1 += path[read].1;
        } else {
            write += 1;
            path[write] = path[read];
        }
    }
    path.truncate(write + 1);
}

/// Query bases covered by a path, clips included.
pub fn query_length(path: &[OpRun]) -> usize {
    path.iter()
        .filter(|(op, _)| op.consumes_query())
        .map(|&(_, len)| len as usize)
        .sum()
}

/// Reference bases covered by a path.
pub fn reference_length(path: &[OpRun]) -> usize {
    path.iter()
        .filter(|(op, _)| op.consumes_ref())
        .map(|&(_, len)| len as usize)
        .sum()
}

/// Render a path as an extended CIGAR string, e.g. `3S10=1X4=2D5=`.
pub fn to_string(path: &[OpRun]) -> String {
    let mut out = String::with_capacity(path.len() * 4);
    for &(op, len) in path {
        let _ = write!(out, "{}{}", len, op.to_byte() as char);
    }
    out
}

/// Parse an extended CIGAR string produced by [`to_string`].
pub fn parse(text: &str) -> Option<Vec<OpRun>> {
    let mut path = Vec::new();
    let mut count: u32 = 0;
    let mut saw_digit = false;
    for b in text.bytes() {
        if b.is_ascii_digit() {
            count = count.checked_mul(10)?.checked_add((b - b'0') as u32)?;
            saw_digit = true;
        } else {
            if !saw_digit {
                return None;
            }
            push_run(&mut path, AlignmentOp::from_byte(b)?, count);
            count = 0;
            saw_digit = false;
        }
    }
    if saw_digit {
        return None;
    }
    Some(path)
}
