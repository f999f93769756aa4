//! Shared alignment types used across core and pipelines.

use super::cigar::{self, AlignmentOp, OpRun, push_run};
use crate::core::compute::encoding::GAP_CHAR;

/// Result of aligning one query section against one reference section.
///
/// Ranges are half-open. `query_start..query_end` excludes clipped bases.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedBlock {
    pub query_start: usize,
    pub query_end: usize,
    pub reference_start: usize,
    pub reference_end: usize,
    /// Run-length path including leading and trailing clips.
    pub operations: Vec<OpRun>,
    /// Query text with `-` where the reference has extra bases.
    pub aligned_query: String,
    /// Reference text with `-` where the query has extra bases.
    pub aligned_reference: String,
    pub penalty: f64,
}

impl AlignedBlock {
    /// Empty alignment anchored at the given coordinates.
    pub fn empty(query_start: usize, reference_start: usize) -> Self {
        Self {
            query_start,
            query_end: query_start,
            reference_start,
            reference_end: reference_start,
            operations: Vec::new(),
            aligned_query: String::new(),
            aligned_reference: String::new(),
            penalty: 0.0,
        }
    }

    /// Shift both coordinate systems.
    pub fn offset_by(mut self, query_offset: usize, reference_offset: usize) -> Self {
        self.query_start += query_offset;
        self.query_end += query_offset;
        self.reference_start += reference_offset;
        self.reference_end += reference_offset;
        self
    }

    /// Append an alignment that starts where this one ends.
    pub fn append(&mut self, other: AlignedBlock) {
        debug_assert!(self.operations.is_empty() || other.query_start == self.query_end);
        if self.operations.is_empty() && self.aligned_query.is_empty() {
            self.query_start = other.query_start;
            self.reference_start = other.reference_start;
        }
        self.query_end = other.query_end;
        self.reference_end = other.reference_end;
        for (op, count) in other.operations {
            push_run(&mut self.operations, op, count);
        }
        self.aligned_query.push_str(&other.aligned_query);
        self.aligned_reference.push_str(&other.aligned_reference);
        self.penalty += other.penalty;
    }

    /// Exact match of `text`, with no penalty.
    pub fn exact(query_start: usize, reference_start: usize, text: &str) -> Self {
        let len = text.len();
        let mut operations = Vec::new();
        push_run(&mut operations, AlignmentOp::Match, len as u32);
        Self {
            query_start,
            query_end: query_start + len,
            reference_start,
            reference_end: reference_start + len,
            operations,
            aligned_query: text.to_string(),
            aligned_reference: text.to_string(),
            penalty: 0.0,
        }
    }

    pub fn cigar(&self) -> String {
        cigar::to_string(&self.operations)
    }

    /// Number of substitutions, gap opens and clips.
    pub fn edit_count(&self) -> usize {
        self.operations
            .iter()
            .map(|&(op, count)| match op {
                AlignmentOp::Match => 0,
                AlignmentOp::Mismatch => count as usize,
                AlignmentOp::Insertion | AlignmentOp::Deletion | AlignmentOp::Clip => 1,
            })
            .sum()
    }

    pub fn clipped_bases(&self) -> usize {
        self.operations
            .iter()
            .filter(|(op, _)| op.is_clip())
            .map(|&(_, count)| count as usize)
            .sum()
    }

    /// Column count of the aligned text.
    pub fn aligned_columns(&self) -> usize {
        self.aligned_query.len()
    }

    pub fn gap_columns(&self) -> usize {
        self.aligned_query.bytes().filter(|&b| b == GAP_CHAR).count()
            + self.aligned_reference.bytes().filter(|&b| b == GAP_CHAR).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_merges_runs() {
        let mut block = AlignedBlock::exact(0, 10, "ACG");
        block.append(AlignedBlock::exact(3, 13, "TT"));
        assert_eq!(block.operations, vec![(AlignmentOp::Match, 5)]);
        assert_eq!((block.query_end, block.reference_end), (5, 15));
        assert_eq!(block.aligned_query, "ACGTT");
    }

    #[test]
    fn test_append_to_empty_takes_coordinates() {
        let mut block = AlignedBlock::empty(0, 0);
        block.append(AlignedBlock::exact(2, 7, "AC"));
        assert_eq!((block.query_start, block.reference_start), (2, 7));
        assert_eq!(block.cigar(), "2=");
    }

    #[test]
    fn test_edit_count() {
        let block = AlignedBlock {
            operations: vec![
                (AlignmentOp::Clip, 2),
                (AlignmentOp::Match, 4),
                (AlignmentOp::Mismatch, 2),
                (AlignmentOp::Deletion, 3),
                (AlignmentOp::Match, 1),
            ],
            ..AlignedBlock::empty(0, 0)
        };
        assert_eq!(block.edit_count(), 4);
        assert_eq!(block.clipped_bases(), 2);
    }
}
