//! Encoded DNA sequences.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::compute::encoding::{decode_sequence, encode_sequence, reverse_complement};
use crate::error::Result;

static NEXT_SEQUENCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a sequence.
///
/// Used as a cache key and as the non-owning link from a reverse complement
/// back to the sequence it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId(u64);

impl SequenceId {
    fn next() -> Self {
        SequenceId(NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Immutable run of encoded bases (4-bit masks, see `core::compute::encoding`).
#[derive(Debug, Clone)]
pub struct Sequence {
    id: SequenceId,
    name: String,
    bases: Vec<u8>,
    complemented_from: Option<SequenceId>,
}

impl Sequence {
    /// Wrap already-encoded bases.
    pub fn new(name: impl Into<String>, bases: Vec<u8>) -> Self {
        debug_assert!(bases.iter().all(|&b| (1..16).contains(&b)));
        Self {
            id: SequenceId::next(),
            name: name.into(),
            bases,
            complemented_from: None,
        }
    }

    /// Encode IUPAC text.
    pub fn from_text(name: impl Into<String>, text: &[u8]) -> Result<Self> {
        let name = name.into();
        let bases = encode_sequence(&name, text)?;
        Ok(Self::new(name, bases))
    }

    /// Reverse complement, remembering which sequence it came from.
    pub fn reverse_complement(&self) -> Self {
        Self {
            id: SequenceId::next(),
            name: self.name.clone(),
            bases: reverse_complement(&self.bases),
            complemented_from: Some(self.id),
        }
    }

    /// Copy of `[start, end)` as a new, independent sequence.
    pub fn section(&self, start: usize, end: usize) -> Self {
        Self::new(format!("{}:{}-{}", self.name, start, end), self.bases[start..end].to_vec())
    }

    #[inline]
    pub fn id(&self) -> SequenceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn bases(&self) -> &[u8] {
        &self.bases
    }

    #[inline]
    pub fn base(&self, index: usize) -> u8 {
        self.bases[index]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn complemented_from(&self) -> Option<SequenceId> {
        self.complemented_from
    }

    pub fn is_reverse_complement(&self) -> bool {
        self.complemented_from.is_some()
    }

    pub fn text(&self) -> String {
        decode_sequence(&self.bases)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ">{} ({} bp)", self.name, self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_complement_links_back() {
        let forward = Sequence::from_text("chr1", b"AACGTR").unwrap();
        let reverse = forward.reverse_complement();
        assert_eq!(reverse.text(), "YACGTT");
        assert_eq!(reverse.complemented_from(), Some(forward.id()));
        assert_ne!(reverse.id(), forward.id());
        assert!(!forward.is_reverse_complement());
        assert_eq!(reverse.reverse_complement().text(), forward.text());
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Sequence::from_text("a", b"ACGT").unwrap();
        let b = Sequence::from_text("a", b"ACGT").unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_section() {
        let seq = Sequence::from_text("chr2", b"ACGTACGT").unwrap();
        let section = seq.section(2, 6);
        assert_eq!(section.text(), "GTAC");
        assert_eq!(section.name(), "chr2:2-6");
    }
}
