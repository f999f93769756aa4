//! Bit-packed multimap from block hashes to reference positions.
//!
//! Layout mirrors a CSR matrix: bucket `k` owns the slice
//! `positions[offsets[k]..offsets[k + 1]]`. Both arrays are bit-packed to the
//! narrowest width that fits, so a genome-sized level costs roughly
//! `blocks * bits(total_length)` bits.

use super::hash_block::HashBlock;
use super::sequence_database::{PositionCodec, SequenceDatabase, SequencePosition};
use crate::core::utils::{BitPackedArray, bits_needed, hash_64};
use crate::error::{MapperError, Result};

#[inline]
fn bucket_of(hash: u64, capacity: usize) -> usize {
    (hash_64(hash) % capacity as u64) as usize
}

/// Write-once collector for a [`PackedMap`].
pub struct PackedMapBuilder<'a> {
    database: &'a SequenceDatabase,
    capacity: usize,
    /// `(bucket, packed position)` pairs in insertion order.
    entries: Vec<(usize, u64)>,
}

impl<'a> PackedMapBuilder<'a> {
    pub fn new(capacity: usize, database: &'a SequenceDatabase) -> Result<Self> {
        if capacity == 0 {
            return Err(MapperError::CapacityTooSmall {
                capacity,
                reason: "capacity must be positive".to_string(),
            });
        }
        Ok(Self {
            database,
            capacity,
            entries: Vec::new(),
        })
    }

    /// Insert every block of `sequence`.
    ///
    /// Forward inserts key on the forward hash at `(sequence, start)`. Reverse
    /// inserts key on the reverse hash at the mirrored start within the
    /// reverse complement of `sequence`.
    pub fn add<'b>(
        &mut self,
        sequence: usize,
        blocks: impl IntoIterator<Item = &'b HashBlock>,
        is_reverse: bool,
    ) -> Result<()> {
        let target = if is_reverse {
            self.database
                .reverse_complement_index(sequence)
                .ok_or(MapperError::MissingReverseComplements)?
        } else {
            sequence
        };
        let codec = self.database.codec();
        let length = if sequence < self.database.len() {
            self.database.get(sequence).len()
        } else {
            0
        };

        for block in blocks {
            if block.end > length {
                return Err(MapperError::PositionOutOfRange {
                    sequence,
                    offset: block.end as u64,
                    length: length as u64,
                });
            }
            let (key, offset) = if is_reverse {
                (block.reverse_hash, length - block.end)
            } else {
                (block.forward_hash, block.start)
            };
            let packed = codec.encode(target, offset as u64)?;
            self.entries.push((bucket_of(key, self.capacity), packed));
        }
        Ok(())
    }

    /// Insert one hash at an explicit position.
    pub fn insert(&mut self, hash: u64, position: SequencePosition) -> Result<()> {
        let packed = self.database.codec().encode(position.sequence, position.offset)?;
        self.entries.push((bucket_of(hash, self.capacity), packed));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn finish(mut self) -> PackedMap {
        // Stable: ties within a bucket keep insertion order.
        self.entries.sort_by_key(|&(bucket, _)| bucket);

        let codec = self.database.codec().clone();
        let mut offsets = BitPackedArray::new(self.capacity + 1, bits_needed(self.entries.len() as u64));
        let mut positions = BitPackedArray::new(self.entries.len(), codec.bits());

        let mut cursor = 0;
        for bucket in 0..self.capacity {
            offsets.set(bucket, cursor as u64);
            while cursor < self.entries.len() && self.entries[cursor].0 == bucket {
                positions.set(cursor, self.entries[cursor].1);
                cursor += 1;
            }
        }
        offsets.set(self.capacity, cursor as u64);

        PackedMap {
            capacity: self.capacity,
            offsets,
            positions,
            codec,
        }
    }
}

/// Read-only hash to position multimap.
#[derive(Debug, Clone)]
pub struct PackedMap {
    capacity: usize,
    offsets: BitPackedArray,
    positions: BitPackedArray,
    codec: PositionCodec,
}

impl PackedMap {
    fn range(&self, hash: u64) -> std::ops::Range<usize> {
        let bucket = bucket_of(hash, self.capacity);
        self.offsets.get(bucket) as usize..self.offsets.get(bucket + 1) as usize
    }

    /// Positions stored under `hash`'s bucket, in insertion order.
    ///
    /// Buckets are shared, so callers may see positions of colliding hashes.
    pub fn get(&self, hash: u64) -> Vec<SequencePosition> {
        self.range(hash).map(|i| self.codec.decode(self.positions.get(i))).collect()
    }

    pub fn hit_count(&self, hash: u64) -> usize {
        self.range(hash).len()
    }

    /// Number of stored positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn memory_bytes(&self) -> usize {
        self.offsets.memory_bytes() + self.positions.memory_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::linear::index::sequence::Sequence;

    fn database() -> SequenceDatabase {
        SequenceDatabase::new(
            vec![
                Sequence::from_text("a", b"ACGTACGTAA").unwrap(),
                Sequence::from_text("b", b"GGGCCC").unwrap(),
            ],
            true,
        )
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let db = database();
        assert!(matches!(
            PackedMapBuilder::new(0, &db),
            Err(MapperError::CapacityTooSmall { .. })
        ));
    }

    #[test]
    fn test_forward_and_reverse_inserts() {
        let db = database();
        let block = HashBlock::new(2, 6, 111, 222, 1);
        let mut builder = PackedMapBuilder::new(16, &db).unwrap();
        builder.add(0, [&block], false).unwrap();
        builder.add(0, [&block], true).unwrap();
        let map = builder.finish();

        assert!(map.get(111).contains(&SequencePosition { sequence: 0, offset: 2 }));
        // Mirrored inside the reverse complement of sequence 0 (index 2).
        assert!(map.get(222).contains(&SequencePosition { sequence: 2, offset: 4 }));
        assert_eq!(map.len(), 2);
        assert_eq!(map.capacity(), 16);
    }

    #[test]
    fn test_reverse_without_complements_fails() {
        let db = SequenceDatabase::new(vec![Sequence::from_text("a", b"ACGT").unwrap()], false);
        let mut builder = PackedMapBuilder::new(4, &db).unwrap();
        let block = HashBlock::new(0, 2, 1, 2, 1);
        assert!(matches!(
            builder.add(0, [&block], true),
            Err(MapperError::MissingReverseComplements)
        ));
    }

    #[test]
    fn test_out_of_range_block_fails() {
        let db = database();
        let mut builder = PackedMapBuilder::new(4, &db).unwrap();
        let block = HashBlock::new(4, 7, 1, 2, 1);
        assert!(matches!(
            builder.add(1, [&block], false),
            Err(MapperError::PositionOutOfRange { .. })
        ));
    }

    #[test]
    fn test_lookups_are_stable_in_insertion_order() {
        let db = database();
        let build = || {
            // Capacity 1 forces every hash into one bucket.
            let mut builder = PackedMapBuilder::new(1, &db).unwrap();
            for offset in [5u64, 1, 3, 0] {
                builder.insert(42, SequencePosition { sequence: 0, offset }).unwrap();
            }
            builder.insert(7, SequencePosition { sequence: 1, offset: 2 }).unwrap();
            builder.finish()
        };
        let first = build();
        let second = build();
        let offsets: Vec<u64> = first.get(42).iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![5, 1, 3, 0, 2]);
        assert_eq!(first.get(42), second.get(42));
        assert_eq!(first.hit_count(7), 5);
    }

    #[test]
    fn test_missing_key_is_empty() {
        let db = database();
        let mut builder = PackedMapBuilder::new(1024, &db).unwrap();
        builder.insert(42, SequencePosition { sequence: 0, offset: 1 }).unwrap();
        let map = builder.finish();
        let empty = (0..u64::MAX).find(|&h| bucket_of(h, 1024) != bucket_of(42, 1024)).unwrap();
        assert!(map.get(empty).is_empty());
        assert_eq!(map.hit_count(42), 1);
    }
}
