//! Lazily built stack of hash-block rows over one sequence.

use std::sync::Arc;

use super::rows::{BaseRow, CompiledRow, HashBlockRow, ParentRow};
use super::sequence::Sequence;

/// Hard stop for pathological inputs whose rows never collapse.
const MAX_LEVELS: usize = 64;

pub struct HashBlockPyramid {
    sequence: Arc<Sequence>,
    rows: Vec<HashBlockRow>,
    compile_rows: bool,
    complete: bool,
}

impl HashBlockPyramid {
    pub fn new(sequence: Arc<Sequence>) -> Self {
        Self::with_options(sequence, false)
    }

    /// With `compile_rows`, every parent row is flattened once built.
    pub fn with_options(sequence: Arc<Sequence>, compile_rows: bool) -> Self {
        let rows = vec![HashBlockRow::Base(BaseRow::new(Arc::clone(&sequence)))];
        Self {
            sequence,
            rows,
            compile_rows,
            complete: false,
        }
    }

    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    /// Row at `level`, building missing levels on the way.
    ///
    /// `None` once the pyramid has collapsed into a single block below `level`.
    pub fn row(&mut self, level: usize) -> Option<&HashBlockRow> {
        while self.rows.len() <= level && !self.complete {
            self.build_next_level();
        }
        self.rows.get(level)
    }

    /// Highest level, building everything.
    pub fn top_level(&mut self) -> usize {
        while !self.complete {
            self.build_next_level();
        }
        self.rows.len() - 1
    }

    /// Number of levels built so far.
    pub fn built_levels(&self) -> usize {
        self.rows.len()
    }

    fn build_next_level(&mut self) {
        let top = match self.rows.last() {
            Some(top) if top.block_count() > 1 && self.rows.len() < MAX_LEVELS => top,
            _ => {
                self.complete = true;
                return;
            }
        };
        let parent = ParentRow::build(top);
        let row = if self.compile_rows {
            HashBlockRow::Compiled(CompiledRow::compile(&HashBlockRow::Parent(parent)))
        } else {
            HashBlockRow::Parent(parent)
        };
        self.rows.push(row);
    }
}

/// Nominal block length at `level`; each level roughly doubles it.
pub fn approximate_block_size(level: usize) -> usize {
    1usize << level.min(usize::BITS as usize - 1)
}

/// Smallest level whose nominal block length reaches `size`.
pub fn level_for_size(size: usize) -> usize {
    size.max(1).next_power_of_two().trailing_zeros() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_size() {
        assert_eq!(level_for_size(0), 0);
        assert_eq!(level_for_size(1), 0);
        assert_eq!(level_for_size(2), 1);
        assert_eq!(level_for_size(3), 2);
        assert_eq!(level_for_size(100), 7);
        for size in 1..300 {
            assert!(approximate_block_size(level_for_size(size)) >= size);
        }
    }

    #[test]
    fn test_pyramid_stops_at_single_block() {
        let sequence = Arc::new(Sequence::from_text("s", b"ACGTTGCAAGGCTTACCGATAGGATC").unwrap());
        let mut pyramid = HashBlockPyramid::new(sequence);
        assert_eq!(pyramid.built_levels(), 1);
        assert!(pyramid.row(2).is_some());
        assert_eq!(pyramid.built_levels(), 3);

        let top = pyramid.top_level();
        assert_eq!(pyramid.row(top).unwrap().block_count(), 1);
        assert!(pyramid.row(top + 1).is_none());
        for level in 0..top {
            assert!(pyramid.row(level).unwrap().block_count() > 1);
        }
    }

    #[test]
    fn test_compiled_pyramid_matches_plain() {
        let sequence = Arc::new(Sequence::from_text("s", b"ACGTTGCAAGGCTTACCGATAGGATCNNACGTRYAGT").unwrap());
        let mut plain = HashBlockPyramid::new(Arc::clone(&sequence));
        let mut compiled = HashBlockPyramid::with_options(sequence, true);
        assert_eq!(plain.top_level(), compiled.top_level());
        for level in 0..=plain.top_level() {
            let a: Vec<_> = plain.row(level).unwrap().iter().collect();
            let b: Vec<_> = compiled.row(level).unwrap().iter().collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_empty_sequence() {
        let mut pyramid = HashBlockPyramid::new(Arc::new(Sequence::new("e", Vec::new())));
        assert_eq!(pyramid.row(0).unwrap().block_count(), 0);
        assert!(pyramid.row(1).is_none());
        assert_eq!(pyramid.top_level(), 0);
    }
}
