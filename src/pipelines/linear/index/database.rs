//! Hash-block database: one packed map per indexed pyramid level.
//!
//! Built single-threaded from the caller's point of view (per-sequence
//! pyramids may be grown in parallel with rayon, map insertion is
//! sequential), then frozen into an [`HashBlockDatabaseView`] that workers
//! share through an `Arc`.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};
use rayon::prelude::*;

use super::hash_block::HashBlock;
use super::packed_map::{PackedMap, PackedMapBuilder};
use super::pyramid::{HashBlockPyramid, level_for_size};
use super::sequence::Sequence;
use super::sequence_database::{SequenceDatabase, SequencePosition};
use crate::core::utils::realtime;
use crate::error::{MapperError, Result};

/// Internal build switches. None of them changes lookup results.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Finest level that gets a packed map.
    pub min_indexed_level: usize,
    /// Flatten parent rows after building them.
    pub compile_rows: bool,
    /// Grow per-sequence pyramids on the rayon pool.
    pub parallel_build: bool,
    /// Packed map capacity as a multiple of the number of inserted blocks.
    pub capacity_factor: f64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            min_indexed_level: 1,
            compile_rows: true,
            parallel_build: true,
            capacity_factor: 1.0,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.capacity_factor.is_finite() && self.capacity_factor > 0.0) {
            return Err(MapperError::invalid(
                "capacity_factor",
                format!("must be a positive number, got {}", self.capacity_factor),
            ));
        }
        Ok(())
    }
}

pub struct HashBlockDatabase {
    sequences: Arc<SequenceDatabase>,
    config: DatabaseConfig,
    /// Pyramids of the forward sequences; reverse strands are inserted by mirroring.
    pyramids: Vec<HashBlockPyramid>,
    maps: Vec<Option<Arc<PackedMap>>>,
}

impl HashBlockDatabase {
    pub fn new(sequences: SequenceDatabase, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let pyramids = sequences
            .forward_sequences()
            .iter()
            .map(|s| HashBlockPyramid::with_options(Arc::clone(s), config.compile_rows))
            .collect();
        Ok(Self {
            sequences: Arc::new(sequences),
            config,
            pyramids,
            maps: Vec::new(),
        })
    }

    pub fn sequences(&self) -> &Arc<SequenceDatabase> {
        &self.sequences
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Index every level from `min_indexed_level` up to the one whose blocks
    /// reach `size` bases.
    pub fn require_set_up_through_size(&mut self, size: usize) -> Result<()> {
        let target = level_for_size(size).max(self.config.min_indexed_level);
        for level in self.config.min_indexed_level..=target {
            if self.maps.get(level).is_some_and(Option::is_some) {
                continue;
            }
            self.build_level(level)?;
        }
        Ok(())
    }

    fn build_level(&mut self, level: usize) -> Result<()> {
        let start_time = realtime();

        if self.config.parallel_build {
            self.pyramids.par_iter_mut().for_each(|pyramid| {
                pyramid.row(level);
            });
        }

        // Each distinct (start, hash) per start index is inserted once.
        let mut per_sequence: Vec<Vec<HashBlock>> = Vec::with_capacity(self.pyramids.len());
        for pyramid in &mut self.pyramids {
            let mut blocks = Vec::new();
            if let Some(row) = pyramid.row(level) {
                for entry in row.iter() {
                    let mut seen = HashSet::new();
                    blocks.extend(
                        entry
                            .indexable_blocks()
                            .filter(|b| seen.insert((b.end, b.forward_hash, b.reverse_hash)))
                            .copied(),
                    );
                }
            }
            per_sequence.push(blocks);
        }

        let block_count: usize = per_sequence.iter().map(Vec::len).sum();
        let strands = if self.sequences.has_reverse_complements() { 2 } else { 1 };
        let capacity = ((block_count * strands) as f64 * self.config.capacity_factor).ceil().max(1.0) as usize;

        let mut builder = PackedMapBuilder::new(capacity, &self.sequences)?;
        for (sequence, blocks) in per_sequence.iter().enumerate() {
            builder.add(sequence, blocks, false)?;
            if self.sequences.has_reverse_complements() {
                builder.add(sequence, blocks, true)?;
            }
        }
        let map = builder.finish();

        info!(
            "Indexed level {}: {} blocks, {} positions, {:.1} MB in {:.2}s",
            level,
            block_count,
            map.len(),
            map.memory_bytes() as f64 / 1_048_576.0,
            realtime() - start_time
        );

        if self.maps.len() <= level {
            self.maps.resize(level + 1, None);
        }
        self.maps[level] = Some(Arc::new(map));
        Ok(())
    }

    /// Immutable snapshot of the levels indexed so far.
    pub fn view(&self) -> Arc<HashBlockDatabaseView> {
        let min_level = self.config.min_indexed_level;
        let max_level = (min_level..self.maps.len())
            .take_while(|&level| self.maps[level].is_some())
            .last();
        Arc::new(HashBlockDatabaseView {
            sequences: Arc::clone(&self.sequences),
            maps: self.maps.clone(),
            min_level,
            max_level,
        })
    }

    /// Compare lookups of every block of `sequence` against `other`.
    pub fn verify_matches(&self, other: &HashBlockDatabase, sequence: &Arc<Sequence>) -> std::result::Result<usize, LookupMismatch> {
        self.view().verify_matches(&other.view(), sequence)
    }
}

/// A lookup whose results differ between two databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupMismatch {
    pub level: usize,
    pub hash: u64,
    pub left: Vec<SequencePosition>,
    pub right: Vec<SequencePosition>,
}

/// Read-only, shareable database snapshot.
#[derive(Debug)]
pub struct HashBlockDatabaseView {
    sequences: Arc<SequenceDatabase>,
    maps: Vec<Option<Arc<PackedMap>>>,
    min_level: usize,
    max_level: Option<usize>,
}

impl HashBlockDatabaseView {
    pub fn sequences(&self) -> &SequenceDatabase {
        &self.sequences
    }

    pub fn min_indexed_level(&self) -> usize {
        self.min_level
    }

    /// Coarsest indexed level, `None` if nothing was indexed.
    pub fn max_indexed_level(&self) -> Option<usize> {
        self.max_level
    }

    pub fn has_level(&self, level: usize) -> bool {
        self.maps.get(level).is_some_and(Option::is_some)
    }

    pub fn lookup(&self, level: usize, hash: u64) -> Vec<SequencePosition> {
        match self.maps.get(level) {
            Some(Some(map)) => map.get(hash),
            _ => Vec::new(),
        }
    }

    pub fn hit_count(&self, level: usize, hash: u64) -> usize {
        match self.maps.get(level) {
            Some(Some(map)) => map.hit_count(hash),
            _ => 0,
        }
    }

    /// Returns the number of lookups compared, or the first mismatch.
    pub fn verify_matches(&self, other: &HashBlockDatabaseView, sequence: &Arc<Sequence>) -> std::result::Result<usize, LookupMismatch> {
        let mut pyramid = HashBlockPyramid::new(Arc::clone(sequence));
        let mut compared = 0;
        let Some(max_level) = self.max_level.max(other.max_level) else {
            return Ok(0);
        };
        for level in self.min_level.min(other.min_level)..=max_level {
            let Some(row) = pyramid.row(level) else {
                break;
            };
            for entry in row.iter() {
                for block in entry.indexable_blocks() {
                    let left = self.lookup(level, block.forward_hash);
                    let right = other.lookup(level, block.forward_hash);
                    compared += 1;
                    if left != right {
                        debug!("lookup mismatch at level {} start {}", level, block.start);
                        return Err(LookupMismatch {
                            level,
                            hash: block.forward_hash,
                            left,
                            right,
                        });
                    }
                }
            }
        }
        Ok(compared)
    }
}
