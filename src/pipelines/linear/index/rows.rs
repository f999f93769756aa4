//! Pyramid rows.
//!
//! A row holds every block of one level, addressed by start index. Three
//! storage strategies answer the same queries:
//!
//! - [`BaseRow`]: level 0, computed on demand from the sequence text
//! - [`ParentRow`]: arena of merged blocks built from the row below
//! - [`CompiledRow`]: the same content flattened into parallel arrays
//!
//! Without ambiguity codes every row is a partition of the sequence. With
//! them, a start index may carry several conditioned possibilities. A run of
//! more than [`MAX_AMBIGUOUS_RUN`] ambiguous bases is one opaque block at
//! every level instead.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use super::hash_block::{
    Condition, ConditionalHashBlock, HashBlock, MAX_POSSIBILITIES, MergeFlags, MultiHashBlock, combine_hashes,
    merge_conditions,
};
use super::sequence::Sequence;
use crate::core::compute::encoding::{admitted_bases, is_ambiguous};

/// Longest run of ambiguous bases expanded base by base.
pub const MAX_AMBIGUOUS_RUN: usize = 3;

/// Chain states plus emitted possibilities allowed for one start index.
const MAX_EXPANSIONS: usize = MAX_POSSIBILITIES * 16;

/// Possibilities assuming more ambiguous positions than this are dropped.
const MAX_CONDITIONS: usize = 8;

pub enum HashBlockRow {
    Base(BaseRow),
    Parent(ParentRow),
    Compiled(CompiledRow),
}

impl HashBlockRow {
    pub fn level(&self) -> usize {
        match self {
            HashBlockRow::Base(_) => 0,
            HashBlockRow::Parent(row) => row.level,
            HashBlockRow::Compiled(row) => row.level,
        }
    }

    pub fn sequence_len(&self) -> usize {
        match self {
            HashBlockRow::Base(row) => row.sequence.len(),
            HashBlockRow::Parent(row) => row.sequence_len,
            HashBlockRow::Compiled(row) => row.sequence_len,
        }
    }

    /// Number of start indices carrying at least one block.
    pub fn block_count(&self) -> usize {
        match self {
            HashBlockRow::Base(row) => row.block_count(),
            HashBlockRow::Parent(row) => row.starts.len(),
            HashBlockRow::Compiled(row) => row.starts.len(),
        }
    }

    /// Blocks starting exactly at `start`.
    pub fn get(&self, start: usize) -> Option<MultiHashBlock> {
        match self {
            HashBlockRow::Base(row) => row.get(start),
            HashBlockRow::Parent(row) => row.starts.binary_search(&start).ok().map(|i| row.blocks[i].clone()),
            HashBlockRow::Compiled(row) => row.starts.binary_search(&start).ok().map(|i| row.entry(i)),
        }
    }

    /// First blocks starting after `start`, or at the beginning for `None`.
    pub fn get_after(&self, start: Option<usize>) -> Option<MultiHashBlock> {
        match self {
            HashBlockRow::Base(row) => row.first_from(start.map_or(0, |s| s + 1)),
            HashBlockRow::Parent(row) => row.blocks.get(index_after(&row.starts, start)).cloned(),
            HashBlockRow::Compiled(row) => {
                let index = index_after(&row.starts, start);
                (index < row.starts.len()).then(|| row.entry(index))
            }
        }
    }

    pub fn iter(&self) -> RowIter<'_> {
        RowIter { row: self, index: 0 }
    }
}

fn index_after(starts: &[usize], start: Option<usize>) -> usize {
    match start {
        None => 0,
        Some(s) => starts.partition_point(|&x| x <= s),
    }
}

/// Iterates a row in start order.
pub struct RowIter<'a> {
    row: &'a HashBlockRow,
    /// Sequence index for base rows, arena index otherwise.
    index: usize,
}

impl Iterator for RowIter<'_> {
    type Item = MultiHashBlock;

    fn next(&mut self) -> Option<MultiHashBlock> {
        let entry = match self.row {
            HashBlockRow::Base(row) => {
                let entry = row.first_from(self.index)?;
                self.index = entry.start();
                entry
            }
            HashBlockRow::Parent(row) => row.blocks.get(self.index).cloned()?,
            HashBlockRow::Compiled(row) => (self.index < row.starts.len()).then(|| row.entry(self.index))?,
        };
        self.index += 1;
        Some(entry)
    }
}

/// Level 0: one block per base, or per long ambiguous run.
pub struct BaseRow {
    sequence: Arc<Sequence>,
    /// Maximal ambiguous runs longer than [`MAX_AMBIGUOUS_RUN`], in order.
    opaque_runs: Vec<Range<usize>>,
}

impl BaseRow {
    pub fn new(sequence: Arc<Sequence>) -> Self {
        let opaque_runs = ambiguous_runs(sequence.bases())
            .into_iter()
            .filter(|run| run.len() > MAX_AMBIGUOUS_RUN)
            .collect();
        Self { sequence, opaque_runs }
    }

    fn block_count(&self) -> usize {
        self.sequence.len() - self.opaque_runs.iter().map(|run| run.len() - 1).sum::<usize>()
    }

    fn run_containing(&self, index: usize) -> Option<&Range<usize>> {
        let after = self.opaque_runs.partition_point(|run| run.start <= index);
        self.opaque_runs[..after].last().filter(|run| index < run.end)
    }

    /// First block starting at or after `index`.
    fn first_from(&self, index: usize) -> Option<MultiHashBlock> {
        match self.run_containing(index) {
            Some(run) if run.start < index => self.get(run.end),
            _ => self.get(index),
        }
    }

    fn get(&self, start: usize) -> Option<MultiHashBlock> {
        if let Some(run) = self.run_containing(start) {
            return (run.start == start).then(|| MultiHashBlock::Single(HashBlock::opaque(run.start, run.end)));
        }
        let mask = *self.sequence.bases().get(start)?;
        if !is_ambiguous(mask) {
            return Some(MultiHashBlock::Single(HashBlock::single_base(start, mask)));
        }
        let possibilities = admitted_bases(mask)
            .map(|base| ConditionalHashBlock {
                block: HashBlock::single_base(start, base),
                conditions: vec![Condition { position: start, base }],
            })
            .collect();
        MultiHashBlock::from_possibilities(possibilities)
    }
}

/// Maximal runs of ambiguous bases.
fn ambiguous_runs(bases: &[u8]) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut run_start = None;
    for (i, &mask) in bases.iter().enumerate() {
        match (is_ambiguous(mask), run_start) {
            (true, None) => run_start = Some(i),
            (false, Some(start)) => {
                runs.push(start..i);
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        runs.push(start..bases.len());
    }
    runs
}

/// Merged blocks of one level, stored as an arena sorted by start.
pub struct ParentRow {
    level: usize,
    sequence_len: usize,
    starts: Vec<usize>,
    blocks: Vec<MultiHashBlock>,
}

/// A run of child blocks being merged into one parent block.
struct Chain {
    start: usize,
    end: usize,
    forward_hash: u64,
    reverse_hash: u64,
    last: HashBlock,
    conditions: Vec<Condition>,
}

impl Chain {
    fn new(block: HashBlock, conditions: Vec<Condition>) -> Self {
        Self {
            start: block.start,
            end: block.end,
            forward_hash: block.forward_hash,
            reverse_hash: block.reverse_hash,
            last: block,
            conditions,
        }
    }

    fn extended(&self, right: HashBlock, conditions: Vec<Condition>) -> Self {
        Self {
            start: self.start,
            end: right.end,
            forward_hash: combine_hashes(self.forward_hash, right.forward_hash, right.len()),
            reverse_hash: combine_hashes(right.reverse_hash, self.reverse_hash, self.end - self.start),
            last: right,
            conditions,
        }
    }

    fn finish(&self, conditions: Vec<Condition>, level: usize) -> ConditionalHashBlock {
        ConditionalHashBlock {
            block: HashBlock::new(self.start, self.end, self.forward_hash, self.reverse_hash, level),
            conditions,
        }
    }
}

impl ParentRow {
    /// Merge the blocks of `child` across every boundary it does not keep.
    pub fn build(child: &HashBlockRow) -> Self {
        let level = child.level() + 1;
        let sequence_len = child.sequence_len();
        let mut starts = Vec::new();
        let mut blocks = Vec::new();
        // Possibilities of already visited children, keyed by end index.
        let mut ending_at: BTreeMap<usize, Vec<ConditionalHashBlock>> = BTreeMap::new();

        for entry in child.iter() {
            let start = entry.start();
            while let Some(first) = ending_at.first_entry() {
                if *first.key() >= start {
                    break;
                }
                first.remove();
            }

            let lefts = ending_at.get(&start).map(Vec::as_slice).unwrap_or(&[]);
            let mut seeds: Vec<(HashBlock, Vec<Condition>)> = Vec::new();
            for (block, conditions) in entry.possibilities() {
                for context in left_contexts(start, block, conditions, lefts) {
                    if let Some(merged) = merge_conditions(&context, conditions) {
                        if merged.len() <= MAX_CONDITIONS {
                            seeds.push((*block, merged));
                        }
                    }
                }
            }
            seeds.sort_unstable();
            seeds.dedup();

            let mut budget = MAX_EXPANSIONS;
            let mut possibilities = Vec::new();
            for (block, conditions) in seeds {
                extend_right(child, block, conditions, level, sequence_len, &mut budget, &mut possibilities);
            }

            for (block, conditions) in entry.possibilities() {
                ending_at.entry(block.end).or_default().push(ConditionalHashBlock {
                    block: *block,
                    conditions: conditions.to_vec(),
                });
            }

            if let Some(parent) = MultiHashBlock::from_possibilities(possibilities) {
                starts.push(start);
                blocks.push(parent);
            }
        }

        Self {
            level,
            sequence_len,
            starts,
            blocks,
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }
}

/// Condition sets under which `block` begins a parent block.
///
/// An empty result means it never does. A single empty set means it always
/// does, whichever left neighbour is present.
fn left_contexts(
    start: usize,
    block: &HashBlock,
    conditions: &[Condition],
    lefts: &[ConditionalHashBlock],
) -> Vec<Vec<Condition>> {
    if start == 0 {
        return vec![Vec::new()];
    }
    let compatible: Vec<&ConditionalHashBlock> = lefts.iter().filter(|q| q.compatible_with(conditions)).collect();
    let kept: Vec<&ConditionalHashBlock> = compatible
        .iter()
        .copied()
        .filter(|q| q.block.keeps_boundary_with(block))
        .collect();
    if kept.is_empty() {
        Vec::new()
    } else if kept.len() == compatible.len() {
        vec![Vec::new()]
    } else {
        let mut contexts: Vec<Vec<Condition>> = kept.into_iter().map(|q| q.conditions.clone()).collect();
        contexts.sort_unstable();
        contexts.dedup();
        contexts
    }
}

/// Grow `first` to the right across merged boundaries, emitting every
/// consistent parent block into `out` until `budget` runs out.
fn extend_right(
    child: &HashBlockRow,
    first: HashBlock,
    conditions: Vec<Condition>,
    level: usize,
    sequence_len: usize,
    budget: &mut usize,
    out: &mut Vec<ConditionalHashBlock>,
) {
    if first.is_opaque() {
        out.push(ConditionalHashBlock { block: first, conditions });
        return;
    }
    let mut stack = vec![Chain::new(first, conditions)];

    while let Some(chain) = stack.pop() {
        if *budget == 0 {
            log::trace!("possibility budget exhausted at level {} start {}", level, chain.start);
            return;
        }
        *budget -= 1;
        let rights: Vec<(HashBlock, Vec<Condition>)> = if chain.end < sequence_len {
            child
                .get(chain.end)
                .map(|entry| {
                    entry
                        .possibilities()
                        .filter_map(|(block, conds)| merge_conditions(&chain.conditions, conds).map(|c| (*block, c)))
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let (stops, merges): (Vec<_>, Vec<_>) =
            rights.into_iter().partition(|(right, _)| chain.last.keeps_boundary_with(right));

        if merges.is_empty() {
            out.push(chain.finish(chain.conditions.clone(), level));
            continue;
        }
        for (_, merged) in stops {
            if merged.len() <= MAX_CONDITIONS && *budget > 0 {
                *budget -= 1;
                out.push(chain.finish(merged, level));
            }
        }
        for (right, merged) in merges {
            if merged.len() <= MAX_CONDITIONS {
                stack.push(chain.extended(right, merged));
            }
        }
    }
}

/// Flattened row: parallel arrays instead of per-start allocations.
pub struct CompiledRow {
    level: usize,
    sequence_len: usize,
    starts: Vec<usize>,
    /// `possibility_offsets[i]..possibility_offsets[i + 1]` indexes the block arrays.
    possibility_offsets: Vec<usize>,
    ends: Vec<usize>,
    forward_hashes: Vec<u64>,
    reverse_hashes: Vec<u64>,
    flags: Vec<u8>,
    /// Empty condition ranges mark the single unconditioned case.
    condition_offsets: Vec<usize>,
    conditions: Vec<Condition>,
}

impl CompiledRow {
    pub fn compile(row: &HashBlockRow) -> Self {
        let mut compiled = CompiledRow {
            level: row.level(),
            sequence_len: row.sequence_len(),
            starts: Vec::with_capacity(row.block_count()),
            possibility_offsets: vec![0],
            ends: Vec::new(),
            forward_hashes: Vec::new(),
            reverse_hashes: Vec::new(),
            flags: Vec::new(),
            condition_offsets: vec![0],
            conditions: Vec::new(),
        };
        for entry in row.iter() {
            compiled.starts.push(entry.start());
            for (block, conditions) in entry.possibilities() {
                compiled.ends.push(block.end);
                compiled.forward_hashes.push(block.forward_hash);
                compiled.reverse_hashes.push(block.reverse_hash);
                compiled.flags.push(block.flags.bits());
                compiled.conditions.extend_from_slice(conditions);
                compiled.condition_offsets.push(compiled.conditions.len());
            }
            compiled.possibility_offsets.push(compiled.ends.len());
        }
        compiled
    }

    fn entry(&self, index: usize) -> MultiHashBlock {
        let start = self.starts[index];
        let range = self.possibility_offsets[index]..self.possibility_offsets[index + 1];
        let block_at = |p: usize| HashBlock {
            start,
            end: self.ends[p],
            forward_hash: self.forward_hashes[p],
            reverse_hash: self.reverse_hashes[p],
            flags: MergeFlags::from_bits(self.flags[p]),
        };
        let conditions_at = |p: usize| &self.conditions[self.condition_offsets[p]..self.condition_offsets[p + 1]];

        if range.len() == 1 && conditions_at(range.start).is_empty() {
            return MultiHashBlock::Single(block_at(range.start));
        }
        MultiHashBlock::Alternatives(
            range
                .map(|p| ConditionalHashBlock {
                    block: block_at(p),
                    conditions: conditions_at(p).to_vec(),
                })
                .collect(),
        )
    }

    /// Heap footprint of the flattened arrays.
    pub fn memory_bytes(&self) -> usize {
        self.starts.len() * std::mem::size_of::<usize>()
            + self.possibility_offsets.len() * std::mem::size_of::<usize>()
            + self.ends.len() * (std::mem::size_of::<usize>() + 2 * std::mem::size_of::<u64>() + 1)
            + self.condition_offsets.len() * std::mem::size_of::<usize>()
            + self.conditions.len() * std::mem::size_of::<Condition>()
    }
}

/// Compare two rows entry by entry.
///
/// Returns the first start index at which they disagree.
pub fn verify_equivalent(a: &HashBlockRow, b: &HashBlockRow) -> Result<(), usize> {
    if a.level() != b.level() || a.sequence_len() != b.sequence_len() {
        return Err(0);
    }
    let mut left = a.iter();
    let mut right = b.iter();
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ok(()),
            (Some(x), Some(y)) if x == y => {
                if b.get(x.start()).as_ref() != Some(&x) {
                    return Err(x.start());
                }
            }
            (Some(x), Some(y)) => return Err(x.start().min(y.start())),
            (Some(x), None) | (None, Some(x)) => return Err(x.start()),
        }
    }
}

#[cfg(test)]
#[path = "rows_test.rs"]
mod rows_test;
