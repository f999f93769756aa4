//! Reference sequence collection and packed position codec.
//!
//! Sequences are stored forward strands first, followed by their reverse
//! complements in the same order when those are enabled:
//!
//! ```text
//!   index:  0 .. n-1          n .. 2n-1
//!           forward[i]        reverse_complement(forward[i - n])
//! ```
//!
//! A position `(sequence, offset)` packs into one `u64` by adding the offset
//! to the cumulative length of all earlier sequences, so the address space is
//! exactly the total number of bases and needs `bits_needed(total - 1)` bits.

use std::collections::HashMap;
use std::sync::Arc;

use super::sequence::{Sequence, SequenceId};
use crate::core::utils::bits_needed;
use crate::error::{MapperError, Result};

/// A base position in one database sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequencePosition {
    pub sequence: usize,
    pub offset: u64,
}

/// Bijection between `(sequence, offset)` pairs and packed `u64` values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionCodec {
    starts: Vec<u64>,
    lengths: Vec<u64>,
    total: u64,
    bits: u32,
}

impl PositionCodec {
    pub fn from_lengths(lengths: &[u64]) -> Self {
        let mut starts = Vec::with_capacity(lengths.len());
        let mut total = 0u64;
        for &len in lengths {
            starts.push(total);
            total += len;
        }
        Self {
            starts,
            lengths: lengths.to_vec(),
            total,
            bits: bits_needed(total.saturating_sub(1)),
        }
    }

    /// Width of a packed position in bits.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Total number of addressable positions.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn sequence_length(&self, sequence: usize) -> u64 {
        self.lengths[sequence]
    }

    pub fn encode(&self, sequence: usize, offset: u64) -> Result<u64> {
        match self.lengths.get(sequence) {
            Some(&length) if offset < length => Ok(self.starts[sequence] + offset),
            Some(&length) => Err(MapperError::PositionOutOfRange {
                sequence,
                offset,
                length,
            }),
            None => Err(MapperError::PositionOutOfRange {
                sequence,
                offset,
                length: 0,
            }),
        }
    }

    /// Inverse of [`encode`](Self::encode). `packed` must be below [`total`](Self::total).
    pub fn decode(&self, packed: u64) -> SequencePosition {
        debug_assert!(packed < self.total);
        // Last sequence whose start is <= packed; empty sequences share a
        // start with their successor and are skipped by taking the last one.
        let sequence = self.starts.partition_point(|&start| start <= packed) - 1;
        SequencePosition {
            sequence,
            offset: packed - self.starts[sequence],
        }
    }
}

/// Ordered, indexed collection of reference sequences.
#[derive(Debug)]
pub struct SequenceDatabase {
    sequences: Vec<Arc<Sequence>>,
    forward_count: usize,
    has_reverse_complements: bool,
    codec: PositionCodec,
    index_by_id: HashMap<SequenceId, usize>,
}

impl SequenceDatabase {
    pub fn new(forward: Vec<Sequence>, include_reverse_complements: bool) -> Self {
        let forward_count = forward.len();
        let mut sequences: Vec<Arc<Sequence>> = forward.into_iter().map(Arc::new).collect();
        if include_reverse_complements {
            let reverse: Vec<Arc<Sequence>> =
                sequences.iter().map(|s| Arc::new(s.reverse_complement())).collect();
            sequences.extend(reverse);
        }

        let lengths: Vec<u64> = sequences.iter().map(|s| s.len() as u64).collect();
        let index_by_id = sequences.iter().enumerate().map(|(i, s)| (s.id(), i)).collect();

        Self {
            codec: PositionCodec::from_lengths(&lengths),
            sequences,
            forward_count,
            has_reverse_complements: include_reverse_complements,
            index_by_id,
        }
    }

    /// Number of sequences including reverse complements.
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn forward_count(&self) -> usize {
        self.forward_count
    }

    pub fn has_reverse_complements(&self) -> bool {
        self.has_reverse_complements
    }

    pub fn get(&self, index: usize) -> &Arc<Sequence> {
        &self.sequences[index]
    }

    pub fn sequences(&self) -> &[Arc<Sequence>] {
        &self.sequences
    }

    pub fn forward_sequences(&self) -> &[Arc<Sequence>] {
        &self.sequences[..self.forward_count]
    }

    pub fn index_of(&self, id: SequenceId) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }

    pub fn is_reverse(&self, index: usize) -> bool {
        index >= self.forward_count
    }

    /// Index of the opposite strand of `index`, if reverse complements exist.
    pub fn reverse_complement_index(&self, index: usize) -> Option<usize> {
        if !self.has_reverse_complements {
            return None;
        }
        if index < self.forward_count {
            Some(index + self.forward_count)
        } else {
            Some(index - self.forward_count)
        }
    }

    pub fn codec(&self) -> &PositionCodec {
        &self.codec
    }

    pub fn total_length(&self) -> u64 {
        self.codec.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_round_trip_small() {
        let codec = PositionCodec::from_lengths(&[5, 0, 3, 7]);
        assert_eq!(codec.total(), 15);
        assert_eq!(codec.bits(), 4);
        for (sequence, &len) in [5u64, 0, 3, 7].iter().enumerate() {
            for offset in 0..len {
                let packed = codec.encode(sequence, offset).unwrap();
                assert_eq!(codec.decode(packed), SequencePosition { sequence, offset });
            }
        }
        assert!(codec.encode(1, 0).is_err());
        assert!(codec.encode(3, 7).is_err());
        assert!(codec.encode(9, 0).is_err());
    }

    #[test]
    fn test_codec_beyond_31_bits() {
        let lengths = [3_000_000_000u64, 2_000_000_000, 17];
        let codec = PositionCodec::from_lengths(&lengths);
        assert_eq!(codec.bits(), 33);
        let lookups = [
            (0usize, 0u64),
            (0, 2_147_483_647),
            (0, 2_147_483_648),
            (0, 2_999_999_999),
            (1, 0),
            (1, 1_999_999_999),
            (2, 16),
        ];
        for (sequence, offset) in lookups {
            let packed = codec.encode(sequence, offset).unwrap();
            assert!(packed < 1 << 33);
            assert_eq!(codec.decode(packed), SequencePosition { sequence, offset });
        }
    }

    #[test]
    fn test_database_reverse_layout() {
        let forward = vec![
            Sequence::from_text("a", b"ACGTT").unwrap(),
            Sequence::from_text("b", b"GGC").unwrap(),
        ];
        let db = SequenceDatabase::new(forward, true);
        assert_eq!(db.len(), 4);
        assert_eq!(db.forward_count(), 2);
        assert_eq!(db.get(2).text(), "AACGT");
        assert_eq!(db.get(3).complemented_from(), Some(db.get(1).id()));
        assert_eq!(db.reverse_complement_index(0), Some(2));
        assert_eq!(db.reverse_complement_index(3), Some(1));
        assert!(db.is_reverse(3));
        assert_eq!(db.index_of(db.get(2).id()), Some(2));
        assert_eq!(db.total_length(), 16);
    }

    #[test]
    fn test_database_without_reverse() {
        let db = SequenceDatabase::new(vec![Sequence::from_text("a", b"ACGT").unwrap()], false);
        assert_eq!(db.len(), 1);
        assert_eq!(db.reverse_complement_index(0), None);
    }
}
