//! Queries and their ranked alignments.

use std::ops::Range;
use std::sync::Arc;

use crate::core::alignment::AlignedBlock;
use crate::error::{MapperError, Result};
use crate::pipelines::linear::index::sequence::Sequence;

/// One read, or a mate pair in reference orientation.
#[derive(Debug, Clone)]
pub struct Query {
    components: Vec<Arc<Sequence>>,
    expected_inner_distance: i64,
    spacing_deviation_per_unit_penalty: f64,
}

impl Query {
    pub fn single(sequence: Sequence) -> Result<Self> {
        Self::new(vec![sequence], 0, 1.0)
    }

    /// Mate pair. `second` must already be in the orientation of `first`.
    pub fn paired(
        first: Sequence,
        second: Sequence,
        expected_inner_distance: i64,
        spacing_deviation_per_unit_penalty: f64,
    ) -> Result<Self> {
        Self::new(vec![first, second], expected_inner_distance, spacing_deviation_per_unit_penalty)
    }

    pub fn new(
        components: Vec<Sequence>,
        expected_inner_distance: i64,
        spacing_deviation_per_unit_penalty: f64,
    ) -> Result<Self> {
        let name = components.first().map_or_else(String::new, |c| c.name().to_string());
        if components.is_empty() || components.len() > 2 || components.iter().any(Sequence::is_empty) {
            return Err(MapperError::EmptyQuery(name));
        }
        if !(spacing_deviation_per_unit_penalty.is_finite() && spacing_deviation_per_unit_penalty > 0.0) {
            return Err(MapperError::invalid(
                "spacing_deviation_per_unit_penalty",
                format!("must be positive, got {spacing_deviation_per_unit_penalty}"),
            ));
        }
        Ok(Self {
            components: components.into_iter().map(Arc::new).collect(),
            expected_inner_distance,
            spacing_deviation_per_unit_penalty,
        })
    }

    pub fn name(&self) -> &str {
        self.components[0].name()
    }

    pub fn components(&self) -> &[Arc<Sequence>] {
        &self.components
    }

    pub fn is_paired(&self) -> bool {
        self.components.len() == 2
    }

    pub fn total_length(&self) -> usize {
        self.components.iter().map(|c| c.len()).sum()
    }

    pub fn expected_inner_distance(&self) -> i64 {
        self.expected_inner_distance
    }

    pub fn spacing_deviation_per_unit_penalty(&self) -> f64 {
        self.spacing_deviation_per_unit_penalty
    }
}

/// One component placed on one reference sequence.
#[derive(Debug, Clone)]
pub struct SequenceAlignment {
    pub query: Arc<Sequence>,
    pub reference: Arc<Sequence>,
    /// Index in the sequence database; reverse complements have their own index.
    pub reference_index: usize,
    pub is_reverse: bool,
    pub block: AlignedBlock,
}

impl SequenceAlignment {
    pub fn penalty(&self) -> f64 {
        self.block.penalty
    }

    pub fn query_range(&self) -> Range<usize> {
        self.block.query_start..self.block.query_end
    }

    /// Range within `reference` (the reverse complement for reverse hits).
    pub fn reference_range(&self) -> Range<usize> {
        self.block.reference_start..self.block.reference_end
    }

    /// Range on the forward strand of the reference.
    pub fn forward_reference_range(&self) -> Range<usize> {
        if self.is_reverse {
            let len = self.reference.len();
            len - self.block.reference_end..len - self.block.reference_start
        } else {
            self.reference_range()
        }
    }

    /// Reference position the first query base maps to, clips included.
    pub fn implied_start(&self) -> i64 {
        self.block.reference_start as i64 - self.block.query_start as i64
    }

    /// Reference position just past the last query base, clips included.
    pub fn implied_end(&self) -> i64 {
        self.block.reference_end as i64 + (self.query.len() - self.block.query_end) as i64
    }
}

/// All components of a query placed together.
#[derive(Debug, Clone)]
pub struct QueryAlignment {
    pub components: Vec<SequenceAlignment>,
    /// Paired-end distance penalty, zero for single reads.
    pub spacing_penalty: f64,
    /// Component penalties plus the spacing penalty.
    pub penalty: f64,
}

impl QueryAlignment {
    pub fn new(components: Vec<SequenceAlignment>, spacing_penalty: f64) -> Self {
        let penalty = components.iter().map(SequenceAlignment::penalty).sum::<f64>() + spacing_penalty;
        Self {
            components,
            spacing_penalty,
            penalty,
        }
    }

    pub fn reference_index(&self) -> usize {
        self.components[0].reference_index
    }

    /// Identity used for deduplication: where every component ended up.
    pub fn span_key(&self) -> (usize, Vec<(usize, usize, usize, usize)>) {
        (
            self.reference_index(),
            self.components
                .iter()
                .map(|c| {
                    (
                        c.block.reference_start,
                        c.block.reference_end,
                        c.block.query_start,
                        c.block.query_end,
                    )
                })
                .collect(),
        )
    }
}

/// Ranked result list for one query, best first.
#[derive(Debug, Clone)]
pub struct QueryAlignments {
    pub query: Arc<Query>,
    pub alignments: Vec<QueryAlignment>,
}

impl QueryAlignments {
    pub fn best(&self) -> Option<&QueryAlignment> {
        self.alignments.first()
    }

    pub fn len(&self) -> usize {
        self.alignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alignments.is_empty()
    }
}
