//! Candidate offset discovery for one query component.
//!
//! Every block of the query pyramid, at every indexed level, votes for the
//! reference offsets `position - query_start` it was found at. A vote is
//! worth the block length, so an offset covered by long anchors at several
//! levels dominates offsets hit by a few short ones.

use std::collections::HashMap;

use log::trace;

use crate::pipelines::linear::index::database::HashBlockDatabaseView;
use crate::pipelines::linear::index::hash_block::HashBlock;
use crate::pipelines::linear::index::pyramid::HashBlockPyramid;
use crate::pipelines::linear::index::sequence_database::SequencePosition;
use crate::pipelines::linear::map_opt::SearchParameters;

/// Query placement `offset` within reference `sequence`.
///
/// Offsets may be negative or run past the reference end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateOffset {
    pub sequence: usize,
    pub offset: i64,
    pub priority: u64,
}

#[derive(Debug)]
pub struct CountingHashBlockPath {
    priorities: HashMap<(usize, i64), u64>,
    best_priority: u64,
    good_priority_fraction: f64,
    anchors_looked_up: usize,
    anchors_skipped: usize,
}

impl CountingHashBlockPath {
    pub fn new(view: &HashBlockDatabaseView, pyramid: &mut HashBlockPyramid, search: &SearchParameters) -> Self {
        let mut path = Self {
            priorities: HashMap::new(),
            best_priority: 0,
            good_priority_fraction: search.good_priority_fraction,
            anchors_looked_up: 0,
            anchors_skipped: 0,
        };
        let Some(max_level) = view.max_indexed_level() else {
            return path;
        };
        let query = pyramid.sequence().clone();

        for level in (view.min_indexed_level()..=max_level).rev() {
            let Some(row) = pyramid.row(level) else {
                continue;
            };
            for entry in row.iter() {
                // Alternatives at one start share offsets; each offset
                // counts once, with its longest supporting block.
                let mut votes: HashMap<(usize, i64), u64> = HashMap::new();
                for block in entry.indexable_blocks() {
                    path.anchors_looked_up += 1;
                    let hits = view.hit_count(level, block.forward_hash);
                    if hits == 0 {
                        continue;
                    }
                    if hits > search.max_anchor_hits {
                        path.anchors_skipped += 1;
                        trace!(
                            "{}: skipping anchor {}..{} at level {} ({} hits)",
                            query.name(),
                            block.start,
                            block.end,
                            level,
                            hits
                        );
                        continue;
                    }
                    for position in view.lookup(level, block.forward_hash) {
                        if !confirms(view, &position, query.bases(), block) {
                            continue;
                        }
                        let offset = position.offset as i64 - block.start as i64;
                        let vote = votes.entry((position.sequence, offset)).or_insert(0);
                        *vote = (*vote).max(block.len() as u64);
                    }
                }
                for (key, vote) in votes {
                    let priority = path.priorities.entry(key).or_insert(0);
                    *priority += vote;
                    path.best_priority = path.best_priority.max(*priority);
                }
            }
        }
        path
    }

    /// Offsets worth aligning, best first.
    ///
    /// An offset qualifies when its priority reaches
    /// `best * good_priority_fraction`. Ties are broken by `(sequence, offset)`.
    pub fn find_good_positions_having_priority_up_to(&self, limit: usize) -> Vec<CandidateOffset> {
        if self.best_priority == 0 {
            return Vec::new();
        }
        let threshold = ((self.best_priority as f64 * self.good_priority_fraction).ceil() as u64).max(1);
        let mut candidates: Vec<CandidateOffset> = self
            .priorities
            .iter()
            .filter(|&(_, &priority)| priority >= threshold)
            .map(|(&(sequence, offset), &priority)| CandidateOffset {
                sequence,
                offset,
                priority,
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.sequence.cmp(&b.sequence))
                .then(a.offset.cmp(&b.offset))
        });
        candidates.truncate(limit);
        candidates
    }

    pub fn best_priority(&self) -> u64 {
        self.best_priority
    }

    /// Distinct `(sequence, offset)` pairs that received a vote.
    pub fn offset_count(&self) -> usize {
        self.priorities.len()
    }

    pub fn anchors_looked_up(&self) -> usize {
        self.anchors_looked_up
    }

    /// Anchors ignored for having too many hits.
    pub fn anchors_skipped(&self) -> usize {
        self.anchors_skipped
    }
}

/// Buckets are shared between hashes; keep a hit only if the reference
/// bases there can spell the query block.
fn confirms(view: &HashBlockDatabaseView, position: &SequencePosition, query: &[u8], block: &HashBlock) -> bool {
    let sequences = view.sequences();
    if position.sequence >= sequences.len() {
        return false;
    }
    let reference = sequences.get(position.sequence).bases();
    let start = position.offset as usize;
    let Some(window) = reference.get(start..start + block.len()) else {
        return false;
    };
    window
        .iter()
        .zip(&query[block.start..block.end])
        .all(|(&r, &q)| r & q != 0)
}
