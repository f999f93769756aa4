//! Seed-and-extend alignment of a query against a reference window.
//!
//! Anchors are hash blocks that occur exactly once on each side with equal
//! text. The longest co-linear chain of anchors is taken as-is and the path
//! aligner only fills the gaps: the prefix before the first anchor, the
//! stretches between anchors and the suffix after the last one. DP work is
//! therefore bounded by the unanchored part of the window.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::ops::Range;
use std::sync::Arc;

use crate::core::alignment::{AlignedBlock, ClipRule, EndRules, PathAligner};
use crate::core::compute::encoding::{decode_sequence, is_ambiguous};
use crate::pipelines::linear::index::hash_block::HashBlock;
use crate::pipelines::linear::index::pyramid::HashBlockPyramid;
use crate::pipelines::linear::index::sequence::Sequence;
use crate::pipelines::linear::map_opt::AlignmentParameters;

/// Pyramid level anchors are taken from.
pub const ANCHOR_LEVEL: usize = 3;
/// Shorter blocks are too likely to match by chance.
pub const MIN_ANCHOR_LENGTH: usize = 6;

/// Reference section to align against, with the number of query bases at
/// each end that fall outside the reference and may be clipped for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlignmentWindow {
    pub reference_index: usize,
    pub start: usize,
    pub end: usize,
    pub free_left: usize,
    pub free_right: usize,
}

/// Exact match shared by both sections, in section-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub query_start: usize,
    pub query_end: usize,
    pub reference_start: usize,
    pub reference_end: usize,
}

impl Anchor {
    fn len(&self) -> usize {
        self.query_end - self.query_start
    }

    fn precedes(&self, other: &Anchor) -> bool {
        self.query_end <= other.query_start && self.reference_end <= other.reference_start
    }
}

#[derive(Debug, Clone)]
pub struct HashBlockAligner {
    aligner: PathAligner,
}

impl HashBlockAligner {
    pub fn new(params: &AlignmentParameters) -> Self {
        Self {
            aligner: PathAligner::new(params),
        }
    }

    pub fn path_aligner(&self) -> &PathAligner {
        &self.aligner
    }

    /// Align `query[query_section]` inside `window` of `reference`.
    ///
    /// Coordinates of the result are absolute: query positions within
    /// `query`, reference positions within `reference`.
    pub fn align(
        &self,
        query: &Sequence,
        query_section: Range<usize>,
        reference: &Sequence,
        window: &AlignmentWindow,
    ) -> Option<AlignedBlock> {
        if query_section.is_empty() || query_section.end > query.len() {
            return None;
        }
        let window_end = window.end.min(reference.len());
        if window.start >= window_end {
            return None;
        }
        let q = &query.bases()[query_section.clone()];
        let r = &reference.bases()[window.start..window_end];
        let prefix_clip = ClipRule::Allowed { free: window.free_left };
        let suffix_clip = ClipRule::Allowed { free: window.free_right };

        let chain = best_chain(&find_anchors(q, r));
        let (Some(first), Some(last)) = (chain.first(), chain.last()) else {
            let rules = EndRules {
                free_reference_prefix: true,
                free_reference_suffix: true,
                query_prefix_clip: prefix_clip,
                query_suffix_clip: suffix_clip,
            };
            return self
                .aligner
                .align(q, r, &rules)
                .map(|block| block.offset_by(query_section.start, window.start));
        };

        let mut block = AlignedBlock::empty(0, 0);
        let prefix_rules = EndRules {
            free_reference_prefix: true,
            free_reference_suffix: false,
            query_prefix_clip: prefix_clip,
            query_suffix_clip: ClipRule::Forbidden,
        };
        block.append(
            self.aligner
                .align(&q[..first.query_start], &r[..first.reference_start], &prefix_rules)?,
        );

        let mut previous: Option<&Anchor> = None;
        for anchor in &chain {
            if let Some(prev) = previous {
                let gap = self.aligner.align(
                    &q[prev.query_end..anchor.query_start],
                    &r[prev.reference_end..anchor.reference_start],
                    &EndRules::GLOBAL,
                )?;
                block.append(gap.offset_by(prev.query_end, prev.reference_end));
            }
            let text = decode_sequence(&q[anchor.query_start..anchor.query_end]);
            block.append(AlignedBlock::exact(anchor.query_start, anchor.reference_start, &text));
            previous = Some(anchor);
        }

        let suffix_rules = EndRules {
            free_reference_prefix: false,
            free_reference_suffix: true,
            query_prefix_clip: ClipRule::Forbidden,
            query_suffix_clip: suffix_clip,
        };
        let suffix = self
            .aligner
            .align(&q[last.query_end..], &r[last.reference_end..], &suffix_rules)?;
        block.append(suffix.offset_by(last.query_end, last.reference_end));

        Some(block.offset_by(query_section.start, window.start))
    }
}

/// Unconditioned anchor-level blocks by hash; `None` marks repeated hashes.
fn anchor_blocks(bases: &[u8]) -> HashMap<u64, Option<HashBlock>> {
    let mut blocks = HashMap::new();
    let mut pyramid = HashBlockPyramid::new(Arc::new(Sequence::new("section", bases.to_vec())));
    let level = if pyramid.row(ANCHOR_LEVEL).is_some() {
        ANCHOR_LEVEL
    } else {
        pyramid.top_level()
    };
    let Some(row) = pyramid.row(level) else {
        return blocks;
    };
    for entry in row.iter() {
        let Some(block) = entry.single() else {
            continue;
        };
        if block.len() < MIN_ANCHOR_LENGTH || bases[block.start..block.end].iter().any(|&b| is_ambiguous(b)) {
            continue;
        }
        match blocks.entry(block.forward_hash) {
            Entry::Vacant(slot) => {
                slot.insert(Some(*block));
            }
            Entry::Occupied(mut slot) => {
                slot.insert(None);
            }
        }
    }
    blocks
}

/// Anchors unique on both sides, ordered by query start.
pub fn find_anchors(query: &[u8], reference: &[u8]) -> Vec<Anchor> {
    let reference_blocks = anchor_blocks(reference);
    let mut anchors: Vec<Anchor> = anchor_blocks(query)
        .into_iter()
        .filter_map(|(hash, block)| {
            let q = block?;
            let r = (*reference_blocks.get(&hash)?)?;
            (query[q.start..q.end] == reference[r.start..r.end]).then_some(Anchor {
                query_start: q.start,
                query_end: q.end,
                reference_start: r.start,
                reference_end: r.end,
            })
        })
        .collect();
    anchors.sort_by_key(|a| (a.query_start, a.reference_start));
    anchors
}

/// Co-linear subset of `anchors` covering the most query bases.
pub fn best_chain(anchors: &[Anchor]) -> Vec<Anchor> {
    if anchors.is_empty() {
        return Vec::new();
    }
    let mut score: Vec<usize> = anchors.iter().map(Anchor::len).collect();
    let mut previous: Vec<Option<usize>> = vec![None; anchors.len()];
    for k in 0..anchors.len() {
        for l in 0..k {
            if anchors[l].precedes(&anchors[k]) && score[l] + anchors[k].len() > score[k] {
                score[k] = score[l] + anchors[k].len();
                previous[k] = Some(l);
            }
        }
    }
    let mut best = 0;
    for k in 1..anchors.len() {
        if score[k] > score[best] {
            best = k;
        }
    }
    let mut chain = Vec::new();
    let mut cursor = Some(best);
    while let Some(k) = cursor {
        chain.push(anchors[k]);
        cursor = previous[k];
    }
    chain.reverse();
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alignment::AlignmentOp;
    use crate::core::compute::encoding::SINGLE_BASES;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_sequence(seed: u64, len: usize) -> Sequence {
        let mut rng = StdRng::seed_from_u64(seed);
        Sequence::new("ref", (0..len).map(|_| SINGLE_BASES[rng.gen_range(0..4)]).collect())
    }

    fn window(start: usize, end: usize, free_left: usize, free_right: usize) -> AlignmentWindow {
        AlignmentWindow {
            reference_index: 0,
            start,
            end,
            free_left,
            free_right,
        }
    }

    #[test]
    fn test_exact_placement_in_window() {
        let reference = random_sequence(1, 300);
        let query = reference.section(100, 180);
        let aligner = HashBlockAligner::new(&AlignmentParameters::default());
        let block = aligner.align(&query, 0..80, &reference, &window(80, 200, 0, 0)).unwrap();
        assert_eq!((block.reference_start, block.reference_end), (100, 180));
        assert_eq!(block.cigar(), "80=");
        assert_eq!(block.penalty, 0.0);
    }

    #[test]
    fn test_anchors_found_for_long_match() {
        let reference = random_sequence(2, 400);
        let anchors = find_anchors(&reference.bases()[50..250], reference.bases());
        assert!(!anchors.is_empty());
        for anchor in &anchors {
            assert_eq!(anchor.reference_start, anchor.query_start + 50);
            assert!(anchor.query_end - anchor.query_start >= MIN_ANCHOR_LENGTH);
        }
        let chain = best_chain(&anchors);
        assert!(chain.windows(2).all(|w| w[0].precedes(&w[1])));
    }

    #[test]
    fn test_best_chain_drops_crossing_anchor() {
        let a = Anchor {
            query_start: 0,
            query_end: 10,
            reference_start: 0,
            reference_end: 10,
        };
        let crossing = Anchor {
            query_start: 12,
            query_end: 18,
            reference_start: 2,
            reference_end: 8,
        };
        let b = Anchor {
            query_start: 20,
            query_end: 30,
            reference_start: 22,
            reference_end: 32,
        };
        assert_eq!(best_chain(&[a, crossing, b]), vec![a, b]);
        assert!(best_chain(&[]).is_empty());
    }

    #[test]
    fn test_deletion_between_anchors() {
        let reference = random_sequence(3, 240);
        let mut bases = reference.bases()[50..100].to_vec();
        bases.extend_from_slice(&reference.bases()[103..150]);
        let query = Sequence::new("q", bases);
        let aligner = HashBlockAligner::new(&AlignmentParameters::default());
        let block = aligner.align(&query, 0..97, &reference, &window(30, 170, 0, 0)).unwrap();

        let deletions: Vec<_> = block
            .operations
            .iter()
            .filter(|(op, _)| *op == AlignmentOp::Deletion)
            .collect();
        assert_eq!(deletions, vec![&(AlignmentOp::Deletion, 3)]);
        assert!((block.penalty - 1.8).abs() < 1e-9);
        assert_eq!((block.query_start, block.query_end), (0, 97));
        assert_eq!((block.reference_start, block.reference_end), (50, 150));
    }

    #[test]
    fn test_overhang_clipped_for_free() {
        let reference = random_sequence(4, 200);
        let mut bases = random_sequence(5, 10).bases().to_vec();
        bases.extend_from_slice(&reference.bases()[..60]);
        let query = Sequence::new("q", bases);
        let aligner = HashBlockAligner::new(&AlignmentParameters::default());
        let block = aligner.align(&query, 0..70, &reference, &window(0, 72, 10, 0)).unwrap();
        assert_eq!(block.query_start, 10);
        assert_eq!(block.reference_start, 0);
        assert_eq!(block.penalty, 0.0);
        assert_eq!(block.operations.first(), Some(&(AlignmentOp::Clip, 10)));
    }

    #[test]
    fn test_window_outside_reference() {
        let reference = random_sequence(6, 50);
        let query = reference.section(0, 20);
        let aligner = HashBlockAligner::new(&AlignmentParameters::default());
        assert!(aligner.align(&query, 0..20, &reference, &window(60, 90, 0, 20)).is_none());
        assert!(aligner.align(&query, 5..5, &reference, &window(0, 50, 0, 0)).is_none());
    }
}
