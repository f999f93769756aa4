//! Per-query orchestration: candidates, alignment, filtering, ranking.
//!
//! # Lifecycle
//!
//! ```text
//! setup(view) → before_batch() → align(query)* → after_batch() → before_batch() ...
//! ```
//!
//! The alignment cache lives for one batch. It is keyed by the query
//! component and the exact window and end allowances, so two candidates that
//! lead to the same window share one DP run.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use log::{debug, trace};

use crate::core::alignment::{AlignedBlock, PENALTY_EPSILON};
use crate::error::{MapperError, Result};
use crate::pipelines::linear::extension::{AlignmentWindow, HashBlockAligner};
use crate::pipelines::linear::index::database::HashBlockDatabaseView;
use crate::pipelines::linear::index::pyramid::HashBlockPyramid;
use crate::pipelines::linear::index::sequence::{Sequence, SequenceId};
use crate::pipelines::linear::map_opt::{AlignmentParameters, SearchParameters};
use crate::pipelines::linear::paired::{HashBlockPathsCounter, QueryMatch};
use crate::pipelines::linear::query::{Query, QueryAlignment, QueryAlignments, SequenceAlignment};
use crate::pipelines::linear::seeding::CountingHashBlockPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    component: SequenceId,
    window: AlignmentWindow,
}

/// Counters for one batch, or accumulated over all batches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub batches: usize,
    pub queries: usize,
    /// Query matches examined.
    pub candidates: usize,
    /// DP runs actually performed.
    pub alignments_computed: usize,
    pub cache_hits: usize,
    /// Alignments returned after filtering.
    pub alignments_reported: usize,
}

impl WorkerStats {
    pub fn merge(&mut self, other: &WorkerStats) {
        self.batches += other.batches;
        self.queries += other.queries;
        self.candidates += other.candidates;
        self.alignments_computed += other.alignments_computed;
        self.cache_hits += other.cache_hits;
        self.alignments_reported += other.alignments_reported;
    }
}

pub struct AlignerWorker {
    params: AlignmentParameters,
    search: SearchParameters,
    aligner: HashBlockAligner,
    view: Option<Arc<HashBlockDatabaseView>>,
    cache: HashMap<CacheKey, Option<AlignedBlock>>,
    batch_stats: WorkerStats,
    total_stats: WorkerStats,
}

impl AlignerWorker {
    pub fn new(params: AlignmentParameters, search: SearchParameters) -> Result<Self> {
        params.validate()?;
        search.validate()?;
        Ok(Self {
            aligner: HashBlockAligner::new(&params),
            params,
            search,
            view: None,
            cache: HashMap::new(),
            batch_stats: WorkerStats::default(),
            total_stats: WorkerStats::default(),
        })
    }

    pub fn setup(&mut self, view: Arc<HashBlockDatabaseView>) {
        self.view = Some(view);
        self.cache.clear();
    }

    pub fn is_ready(&self) -> bool {
        self.view.is_some()
    }

    pub fn before_batch(&mut self) {
        self.cache.clear();
        self.batch_stats = WorkerStats::default();
    }

    /// Close the batch and return its statistics.
    pub fn after_batch(&mut self) -> WorkerStats {
        let mut stats = self.batch_stats;
        stats.batches = 1;
        debug!(
            "Worker batch: {} queries, {} candidates, {} alignments computed, {} cache hits, {} reported",
            stats.queries, stats.candidates, stats.alignments_computed, stats.cache_hits, stats.alignments_reported
        );
        self.total_stats.merge(&stats);
        self.batch_stats = WorkerStats::default();
        self.cache.clear();
        stats
    }

    /// Statistics of the current batch.
    pub fn stats(&self) -> &WorkerStats {
        &self.batch_stats
    }

    /// Statistics of all closed batches.
    pub fn total_stats(&self) -> &WorkerStats {
        &self.total_stats
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn align(&mut self, query: &Arc<Query>) -> Result<QueryAlignments> {
        let view = Arc::clone(self.view.as_ref().ok_or(MapperError::WorkerNotReady)?);
        self.batch_stats.queries += 1;

        let matches = self.find_matches(&view, query);
        self.batch_stats.candidates += matches.len();
        trace!("{}: {} candidate matches", query.name(), matches.len());

        let mut unique: HashMap<_, QueryAlignment> = HashMap::new();
        for query_match in &matches {
            let Some(alignment) = self.align_match(&view, query, query_match) else {
                continue;
            };
            match unique.entry(alignment.span_key()) {
                Entry::Vacant(slot) => {
                    slot.insert(alignment);
                }
                Entry::Occupied(mut slot) => {
                    if alignment.penalty < slot.get().penalty - PENALTY_EPSILON {
                        slot.insert(alignment);
                    }
                }
            }
        }

        let mut alignments: Vec<QueryAlignment> = unique.into_values().collect();
        alignments.sort_by(|a, b| a.penalty.total_cmp(&b.penalty).then_with(|| a.span_key().cmp(&b.span_key())));
        if let Some(best) = alignments.first().map(|a| a.penalty) {
            let limit = best + self.params.max_penalty_span + PENALTY_EPSILON;
            alignments.retain(|a| a.penalty <= limit);
        }
        alignments.truncate(self.params.max_num_matches);
        self.batch_stats.alignments_reported += alignments.len();

        Ok(QueryAlignments {
            query: Arc::clone(query),
            alignments,
        })
    }

    fn find_matches(&self, view: &HashBlockDatabaseView, query: &Query) -> Vec<QueryMatch> {
        let components = query.components();
        let candidates = components
            .iter()
            .map(|component| {
                let mut pyramid = HashBlockPyramid::new(Arc::clone(component));
                CountingHashBlockPath::new(view, &mut pyramid, &self.search)
                    .find_good_positions_having_priority_up_to(self.search.max_candidates)
            })
            .collect();
        let lengths = components.iter().map(|c| c.len()).collect();
        let max_deviation =
            (self.params.max_penalty(query.total_length()) * query.spacing_deviation_per_unit_penalty()).ceil() as i64;
        HashBlockPathsCounter::new(candidates, lengths, query.expected_inner_distance(), max_deviation)
            .find_good_positions_having_priority(self.search.max_candidates)
    }

    fn align_match(&mut self, view: &HashBlockDatabaseView, query: &Query, query_match: &QueryMatch) -> Option<QueryAlignment> {
        let sequences = view.sequences();
        let reference = Arc::clone(sequences.get(query_match.sequence));
        let is_reverse = sequences.is_reverse(query_match.sequence);

        let mut components = Vec::with_capacity(query.components().len());
        let mut aligned_length = 0;
        for (component, &offset) in query.components().iter().zip(&query_match.offsets) {
            let window = self.window_for(query_match.sequence, reference.len(), component.len(), offset);
            let block = self.cached_align(component, &reference, window)?;
            aligned_length += component.len().saturating_sub(window.free_left + window.free_right);
            components.push(SequenceAlignment {
                query: Arc::clone(component),
                reference: Arc::clone(&reference),
                reference_index: query_match.sequence,
                is_reverse,
                block,
            });
        }

        let spacing_penalty = match components.as_slice() {
            [first, second] => {
                let observed = second.implied_start() - first.implied_end();
                (observed - query.expected_inner_distance()).abs() as f64 / query.spacing_deviation_per_unit_penalty()
            }
            _ => 0.0,
        };
        let alignment = QueryAlignment::new(components, spacing_penalty);
        if alignment.penalty > self.params.max_penalty(aligned_length.max(1)) + PENALTY_EPSILON {
            trace!(
                "{}: rejected placement on {} at penalty {:.3}",
                query.name(),
                reference.name(),
                alignment.penalty
            );
            return None;
        }
        Some(alignment)
    }

    /// Window around `offset`, padded by the longest affordable gap and
    /// clamped to the reference.
    fn window_for(&self, reference_index: usize, reference_len: usize, query_len: usize, offset: i64) -> AlignmentWindow {
        let pad = self.params.max_gap_length(query_len) as i64 + 1;
        let q = query_len as i64;
        let len = reference_len as i64;
        AlignmentWindow {
            reference_index,
            start: (offset - pad).clamp(0, len) as usize,
            end: (offset + q + pad).clamp(0, len) as usize,
            free_left: (-offset).clamp(0, q) as usize,
            free_right: (offset + q - len).clamp(0, q) as usize,
        }
    }

    fn cached_align(&mut self, component: &Sequence, reference: &Sequence, window: AlignmentWindow) -> Option<AlignedBlock> {
        let key = CacheKey {
            component: component.id(),
            window,
        };
        if let Some(hit) = self.cache.get(&key) {
            self.batch_stats.cache_hits += 1;
            return hit.clone();
        }
        let result = self.aligner.align(component, 0..component.len(), reference, &window);
        self.batch_stats.alignments_computed += 1;
        self.cache.insert(key, result.clone());
        result
    }
}
