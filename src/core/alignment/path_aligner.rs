//! Affine-gap path aligner.
//!
//! Three-state Gotoh DP over encoded base masks:
//! - best: any state, including the start of the alignment
//! - insertion: a run of query bases with no reference counterpart
//! - deletion: a run of reference bases with no query counterpart
//!
//! A gap of length `k` costs `start + k * extension`. Substitutions use the
//! precomputed [`PenaltyTable`], so ambiguity codes are scored without
//! branching. Costs carry an edit count used as the first tie-breaker; the
//! remaining ties are resolved by state order (substitution, deletion,
//! insertion, start) and by always preferring to extend an open gap, so a gap
//! run is never reported as two adjacent runs.
//!
//! Scores are plain `f64` because penalties are configured as real numbers.
//! Two costs within [`PENALTY_EPSILON`] compare equal.

use super::cigar::{AlignmentOp, push_run};
use super::types::AlignedBlock;
use super::workspace::{AlignmentWorkspace, with_workspace};
use crate::core::compute::encoding::{GAP_CHAR, PenaltyTable, decode_base, is_ambiguous};
use crate::pipelines::linear::map_opt::AlignmentParameters;

pub const PENALTY_EPSILON: f64 = 1e-9;

// Traceback byte layout: bits 0-1 best-state source, bit 2 insertion
// extended, bit 3 deletion extended.
const FROM_SUBSTITUTION: u8 = 0;
const FROM_INSERTION: u8 = 1;
const FROM_DELETION: u8 = 2;
const FROM_START: u8 = 3;
const SOURCE_MASK: u8 = 0b11;
const INSERTION_EXTENDS: u8 = 0b100;
const DELETION_EXTENDS: u8 = 0b1000;

/// Penalty plus the number of edit operations that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cost {
    pub penalty: f64,
    pub edits: u32,
}

impl Cost {
    pub const ZERO: Cost = Cost { penalty: 0.0, edits: 0 };
    pub const INFINITE: Cost = Cost {
        penalty: f64::INFINITY,
        edits: u32::MAX,
    };

    #[inline(always)]
    pub fn plus(self, penalty: f64, edits: u32) -> Cost {
        Cost {
            penalty: self.penalty + penalty,
            edits: self.edits.saturating_add(edits),
        }
    }

    #[inline(always)]
    pub fn is_finite(&self) -> bool {
        self.penalty.is_finite()
    }

    /// Strictly lower penalty, or equal penalty with fewer edits.
    #[inline(always)]
    pub fn better_than(&self, other: &Cost) -> bool {
        if self.penalty < other.penalty - PENALTY_EPSILON {
            return true;
        }
        if self.penalty > other.penalty + PENALTY_EPSILON {
            return false;
        }
        self.edits < other.edits
    }
}

/// Treatment of unaligned query bases at one end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClipRule {
    Forbidden,
    /// The first `free` clipped bases cost nothing; the rest cost
    /// `unaligned_penalty` each.
    Allowed { free: usize },
}

impl ClipRule {
    fn cost(&self, clipped: usize, unaligned_penalty: f64) -> Option<Cost> {
        match *self {
            _ if clipped == 0 => Some(Cost::ZERO),
            ClipRule::Forbidden => None,
            ClipRule::Allowed { free } => {
                let paid = clipped.saturating_sub(free);
                Some(Cost {
                    penalty: paid as f64 * unaligned_penalty,
                    edits: u32::from(paid > 0),
                })
            }
        }
    }
}

/// Which ends of the DP are anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndRules {
    /// Reference bases before the alignment are skipped at no cost.
    pub free_reference_prefix: bool,
    /// Reference bases after the alignment are skipped at no cost.
    pub free_reference_suffix: bool,
    pub query_prefix_clip: ClipRule,
    pub query_suffix_clip: ClipRule,
}

impl EndRules {
    /// Both sequences aligned end to end.
    pub const GLOBAL: EndRules = EndRules {
        free_reference_prefix: false,
        free_reference_suffix: false,
        query_prefix_clip: ClipRule::Forbidden,
        query_suffix_clip: ClipRule::Forbidden,
    };

    /// Whole query placed anywhere inside the reference.
    pub const FREE_REFERENCE: EndRules = EndRules {
        free_reference_prefix: true,
        free_reference_suffix: true,
        query_prefix_clip: ClipRule::Forbidden,
        query_suffix_clip: ClipRule::Forbidden,
    };
}

impl Default for EndRules {
    fn default() -> Self {
        EndRules::GLOBAL
    }
}

#[derive(Debug, Clone, Copy)]
enum Trace {
    Best,
    Insertion,
    Deletion,
}

#[derive(Debug, Clone)]
pub struct PathAligner {
    penalties: PenaltyTable,
    insertion_open: f64,
    insertion_extend: f64,
    deletion_open: f64,
    deletion_extend: f64,
    unaligned_penalty: f64,
}

impl PathAligner {
    pub fn new(params: &AlignmentParameters) -> Self {
        Self {
            penalties: PenaltyTable::new(params),
            insertion_open: params.insertion_start_penalty + params.insertion_extension_penalty,
            insertion_extend: params.insertion_extension_penalty,
            deletion_open: params.deletion_start_penalty + params.deletion_extension_penalty,
            deletion_extend: params.deletion_extension_penalty,
            unaligned_penalty: params.unaligned_penalty,
        }
    }

    /// Minimum-penalty alignment of `query` against `reference` using this
    /// thread's workspace.
    pub fn align(&self, query: &[u8], reference: &[u8], rules: &EndRules) -> Option<AlignedBlock> {
        with_workspace(|ws| self.align_with(query, reference, rules, ws))
    }

    pub fn align_with(
        &self,
        query: &[u8],
        reference: &[u8],
        rules: &EndRules,
        ws: &mut AlignmentWorkspace,
    ) -> Option<AlignedBlock> {
        let n = query.len();
        let m = reference.len();
        let cols = m + 1;
        ws.prepare(n, m);

        // (cost, query end, reference end)
        let mut best_end: Option<(Cost, usize, usize)> = None;

        for i in 0..=n {
            let prefix_clip = rules.query_prefix_clip.cost(i, self.unaligned_penalty);
            let suffix_clip = rules.query_suffix_clip.cost(n - i, self.unaligned_penalty);
            let mut deletion = Cost::INFINITE;

            for j in 0..=m {
                let mut flags = 0u8;

                let insertion = if i > 0 {
                    let open = ws.best_prev[j].plus(self.insertion_open, 1);
                    let extend = ws.insertion_prev[j].plus(self.insertion_extend, 0);
                    if open.better_than(&extend) {
                        open
                    } else {
                        flags |= INSERTION_EXTENDS;
                        extend
                    }
                } else {
                    Cost::INFINITE
                };

                if j > 0 {
                    let open = ws.best_curr[j - 1].plus(self.deletion_open, 1);
                    let extend = deletion.plus(self.deletion_extend, 0);
                    deletion = if open.better_than(&extend) {
                        open
                    } else {
                        flags |= DELETION_EXTENDS;
                        extend
                    };
                }

                let mut best = Cost::INFINITE;
                let mut source = FROM_START;
                if i > 0 && j > 0 {
                    let (q, r) = (query[i - 1], reference[j - 1]);
                    let exact = q == r && !is_ambiguous(q);
                    best = ws.best_prev[j - 1].plus(self.penalties.get(q, r), u32::from(!exact));
                    source = FROM_SUBSTITUTION;
                }
                if deletion.better_than(&best) {
                    best = deletion;
                    source = FROM_DELETION;
                }
                if insertion.better_than(&best) {
                    best = insertion;
                    source = FROM_INSERTION;
                }
                if j == 0 || rules.free_reference_prefix {
                    if let Some(start) = prefix_clip {
                        if start.better_than(&best) {
                            best = start;
                            source = FROM_START;
                        }
                    }
                }

                ws.best_curr[j] = best;
                ws.insertion_curr[j] = insertion;
                ws.pointers[i * cols + j] = source | flags;

                if j == m || rules.free_reference_suffix {
                    if let Some(clip) = suffix_clip {
                        let total = best.plus(clip.penalty, clip.edits);
                        let replace = match &best_end {
                            None => total.is_finite(),
                            Some((current, current_i, _)) => {
                                total.better_than(current) || (i > *current_i && !current.better_than(&total))
                            }
                        };
                        if replace {
                            best_end = Some((total, i, j));
                        }
                    }
                }
            }
            ws.advance_row();
        }

        let (total, end_i, end_j) = best_end?;
        if !total.is_finite() {
            return None;
        }
        Some(self.trace_back(query, reference, ws, end_i, end_j, total.penalty))
    }

    fn trace_back(
        &self,
        query: &[u8],
        reference: &[u8],
        ws: &AlignmentWorkspace,
        end_i: usize,
        end_j: usize,
        penalty: f64,
    ) -> AlignedBlock {
        let cols = reference.len() + 1;
        let (mut i, mut j) = (end_i, end_j);
        let mut reversed_ops = Vec::with_capacity(end_i + end_j);
        let mut query_text = Vec::with_capacity(end_i + end_j);
        let mut reference_text = Vec::with_capacity(end_i + end_j);
        let mut trace = Trace::Best;

        loop {
            let pointer = ws.pointers[i * cols + j];
            match trace {
                Trace::Best => match pointer & SOURCE_MASK {
                    FROM_SUBSTITUTION => {
                        let (q, r) = (query[i - 1], reference[j - 1]);
                        let op = if q == r && !is_ambiguous(q) {
                            AlignmentOp::Match
                        } else {
                            AlignmentOp::Mismatch
                        };
                        reversed_ops.push(op);
                        query_text.push(decode_base(q));
                        reference_text.push(decode_base(r));
                        i -= 1;
                        j -= 1;
                    }
                    FROM_INSERTION => trace = Trace::Insertion,
                    FROM_DELETION => trace = Trace::Deletion,
                    _ => break,
                },
                Trace::Insertion => {
                    reversed_ops.push(AlignmentOp::Insertion);
                    query_text.push(decode_base(query[i - 1]));
                    reference_text.push(GAP_CHAR);
                    if pointer & INSERTION_EXTENDS == 0 {
                        trace = Trace::Best;
                    }
                    i -= 1;
                }
                Trace::Deletion => {
                    reversed_ops.push(AlignmentOp::Deletion);
                    query_text.push(GAP_CHAR);
                    reference_text.push(decode_base(reference[j - 1]));
                    if pointer & DELETION_EXTENDS == 0 {
                        trace = Trace::Best;
                    }
                    j -= 1;
                }
            }
        }

        let mut operations = Vec::new();
        push_run(&mut operations, AlignmentOp::Clip, i as u32);
        for op in reversed_ops.into_iter().rev() {
            push_run(&mut operations, op, 1);
        }
        push_run(&mut operations, AlignmentOp::Clip, (query.len() - end_i) as u32);
        query_text.reverse();
        reference_text.reverse();

        AlignedBlock {
            query_start: i,
            query_end: end_i,
            reference_start: j,
            reference_end: end_j,
            operations,
            aligned_query: String::from_utf8_lossy(&query_text).into_owned(),
            aligned_reference: String::from_utf8_lossy(&reference_text).into_owned(),
            penalty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compute::encoding::encode_sequence;

    fn enc(text: &str) -> Vec<u8> {
        encode_sequence("test", text.as_bytes()).unwrap()
    }

    fn align(query: &str, reference: &str, rules: EndRules) -> AlignedBlock {
        let aligner = PathAligner::new(&AlignmentParameters::default());
        aligner.align(&enc(query), &enc(reference), &rules).unwrap()
    }

    #[test]
    fn test_exact_match() {
        let block = align("ACGTACGT", "ACGTACGT", EndRules::GLOBAL);
        assert_eq!(block.cigar(), "8=");
        assert_eq!(block.penalty, 0.0);
        assert_eq!(block.aligned_query, "ACGTACGT");
    }

    #[test]
    fn test_single_mismatch() {
        let block = align("ACGTACGT", "ACGAACGT", EndRules::GLOBAL);
        assert_eq!(block.cigar(), "3=1X4=");
        assert!((block.penalty - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_deletion_reported_once() {
        let block = align(
            "TTAAACAGATCACCCGCTGAGCGGGT",
            "TTAAACAGATCACCTCGCTGAGCGGGT",
            EndRules::GLOBAL,
        );
        assert_eq!(block.cigar(), "14=1D12=");
        assert!((block.penalty - 1.6).abs() < 1e-9);
        assert_eq!(block.aligned_query, "TTAAACAGATCACC-CGCTGAGCGGGT");
    }

    #[test]
    fn test_deletion_run_is_not_split() {
        let block = align("ACGTCAGGCATGCGTA", "ACGTCAGGTTTTCATGCGTA", EndRules::GLOBAL);
        assert_eq!(block.cigar(), "8=4D8=");
        assert!((block.penalty - 1.9).abs() < 1e-9);
        let deletion_runs = block
            .operations
            .iter()
            .filter(|(op, _)| *op == AlignmentOp::Deletion)
            .count();
        assert_eq!(deletion_runs, 1);
    }

    #[test]
    fn test_insertion_run() {
        let block = align("ACGTCAGGAACATGCGTA", "ACGTCAGGCATGCGTA", EndRules::GLOBAL);
        assert_eq!(block.cigar(), "8=2I8=");
        assert!((block.penalty - 2.7).abs() < 1e-9);
        assert_eq!(block.aligned_reference, "ACGTCAGG--CATGCGTA");
    }

    #[test]
    fn test_homopolymer_deletion_placed_leftmost() {
        let block = align("CAAAG", "CAAAAG", EndRules::GLOBAL);
        assert_eq!(block.cigar(), "1=1D4=");
    }

    #[test]
    fn test_free_reference_ends() {
        let block = align("CAGGCATG", "ACGTCAGGCATGCGTA", EndRules::FREE_REFERENCE);
        assert_eq!(block.cigar(), "8=");
        assert_eq!((block.reference_start, block.reference_end), (4, 12));
        assert_eq!(block.penalty, 0.0);
    }

    #[test]
    fn test_free_clip_costs_nothing() {
        let rules = EndRules {
            query_prefix_clip: ClipRule::Allowed { free: 3 },
            ..EndRules::GLOBAL
        };
        let block = align("TTTCAGGCATG", "CAGGCATG", rules);
        assert_eq!(block.cigar(), "3S8=");
        assert_eq!(block.query_start, 3);
        assert_eq!(block.penalty, 0.0);
        assert_eq!(block.clipped_bases(), 3);
    }

    #[test]
    fn test_paid_clip_beats_long_insertion() {
        let rules = EndRules {
            query_prefix_clip: ClipRule::Allowed { free: 1 },
            ..EndRules::GLOBAL
        };
        let block = align("TTTCAGGCATG", "CAGGCATG", rules);
        assert_eq!(block.cigar(), "3S8=");
        assert!((block.penalty - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_suffix_clip() {
        let rules = EndRules {
            query_suffix_clip: ClipRule::Allowed { free: 2 },
            ..EndRules::GLOBAL
        };
        let block = align("CAGGCATGAA", "CAGGCATG", rules);
        assert_eq!(block.cigar(), "8=2S");
        assert_eq!(block.query_end, 8);
        assert_eq!(block.penalty, 0.0);
    }

    #[test]
    fn test_partial_ambiguity_costs_a_third() {
        let block = align("ACGTACGT", "ACRTACGT", EndRules::GLOBAL);
        assert_eq!(block.cigar(), "2=1X5=");
        assert!((block.penalty - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(block.aligned_reference, "ACRTACGT");
    }

    #[test]
    fn test_empty_inputs() {
        let block = align("", "", EndRules::GLOBAL);
        assert!(block.operations.is_empty());
        let block = align("", "ACG", EndRules::GLOBAL);
        assert_eq!(block.cigar(), "3D");
        let block = align("", "ACG", EndRules::FREE_REFERENCE);
        assert!(block.operations.is_empty());
        assert_eq!(block.penalty, 0.0);
    }

    #[test]
    fn test_cost_ordering() {
        let a = Cost { penalty: 1.0, edits: 2 };
        let b = Cost { penalty: 1.0 + 1e-12, edits: 1 };
        assert!(b.better_than(&a));
        assert!(!a.better_than(&b));
        assert!(a.better_than(&Cost::INFINITE));
        assert!(!Cost::INFINITE.better_than(&a));
        assert!(!Cost::INFINITE.better_than(&Cost::INFINITE));
    }
}
