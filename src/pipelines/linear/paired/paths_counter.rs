// Paired-end candidate combination
//
// Each mate is searched on its own; this module joins the two candidate lists:
// - mates must land on the same reference sequence (strands are separate sequences)
// - the inner distance must lie within `expected ± max_deviation`
// - equal combinations reached through different anchors are reported once
//
// Mate 2 is expected in reference orientation, after mate 1. The inner
// distance is `offset2 - (offset1 + len1)` and may be negative when mates
// overlap.

use std::collections::HashSet;

use crate::pipelines::linear::seeding::CandidateOffset;

/// One placement of every component of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryMatch {
    pub sequence: usize,
    /// Offset of each component within `sequence`.
    pub offsets: Vec<i64>,
    /// Sum of the inner distances between consecutive components.
    pub total_distance: i64,
    /// First base of the first component to last base of the last one.
    pub total_span: i64,
    pub priority: u64,
}

pub struct HashBlockPathsCounter {
    components: Vec<Vec<CandidateOffset>>,
    component_lengths: Vec<usize>,
    expected_inner_distance: i64,
    max_deviation: i64,
}

impl HashBlockPathsCounter {
    pub fn new(
        components: Vec<Vec<CandidateOffset>>,
        component_lengths: Vec<usize>,
        expected_inner_distance: i64,
        max_deviation: i64,
    ) -> Self {
        debug_assert_eq!(components.len(), component_lengths.len());
        Self {
            components,
            component_lengths,
            expected_inner_distance,
            max_deviation: max_deviation.max(0),
        }
    }

    /// Accepted combinations, highest combined priority first.
    pub fn find_good_positions_having_priority(&self, limit: usize) -> Vec<QueryMatch> {
        let mut matches = match self.components.as_slice() {
            [single] => single
                .iter()
                .map(|c| QueryMatch {
                    sequence: c.sequence,
                    offsets: vec![c.offset],
                    total_distance: 0,
                    total_span: self.component_lengths[0] as i64,
                    priority: c.priority,
                })
                .collect(),
            [first, second] => self.pair(first, second),
            _ => Vec::new(),
        };

        let mut seen = HashSet::new();
        matches.retain(|m| seen.insert((m.sequence, m.offsets.clone())));
        matches.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.sequence.cmp(&b.sequence))
                .then_with(|| a.offsets.cmp(&b.offsets))
        });
        matches.truncate(limit);
        matches
    }

    fn pair(&self, first: &[CandidateOffset], second: &[CandidateOffset]) -> Vec<QueryMatch> {
        let first_len = self.component_lengths[0] as i64;
        let second_len = self.component_lengths[1] as i64;

        // Sorted by (sequence, offset) so the mates of one candidate form a
        // contiguous range.
        let mut mates: Vec<&CandidateOffset> = second.iter().collect();
        mates.sort_by_key(|c| (c.sequence, c.offset));

        let mut matches = Vec::new();
        for anchor in first {
            let target = anchor.offset + first_len + self.expected_inner_distance;
            let low = (anchor.sequence, target - self.max_deviation);
            let high = (anchor.sequence, target + self.max_deviation);
            let begin = mates.partition_point(|c| (c.sequence, c.offset) < low);
            for mate in mates[begin..].iter().take_while(|c| (c.sequence, c.offset) <= high) {
                let inner = mate.offset - (anchor.offset + first_len);
                let end = (mate.offset + second_len).max(anchor.offset + first_len);
                matches.push(QueryMatch {
                    sequence: anchor.sequence,
                    offsets: vec![anchor.offset, mate.offset],
                    total_distance: inner,
                    total_span: end - anchor.offset.min(mate.offset),
                    priority: anchor.priority + mate.priority,
                });
            }
        }
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(sequence: usize, offset: i64, priority: u64) -> CandidateOffset {
        CandidateOffset {
            sequence,
            offset,
            priority,
        }
    }

    #[test]
    fn test_single_component_passthrough() {
        let counter = HashBlockPathsCounter::new(vec![vec![candidate(0, 5, 3), candidate(1, 9, 7)]], vec![40], 0, 0);
        let matches = counter.find_good_positions_having_priority(10);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].offsets, vec![9]);
        assert_eq!(matches[0].total_span, 40);
    }

    #[test]
    fn test_pairs_within_window() {
        let first = vec![candidate(0, 0, 10), candidate(0, 250, 10)];
        let second = vec![candidate(0, 40, 10), candidate(0, 290, 10), candidate(1, 40, 10)];
        let counter = HashBlockPathsCounter::new(vec![first, second], vec![40, 40], 0, 10);
        let matches = counter.find_good_positions_having_priority(10);
        let offsets: Vec<_> = matches.iter().map(|m| m.offsets.clone()).collect();
        assert_eq!(offsets, vec![vec![0, 40], vec![250, 290]]);
        assert!(matches.iter().all(|m| m.total_distance == 0 && m.total_span == 80));
    }

    #[test]
    fn test_distance_outside_window_rejected() {
        let counter = HashBlockPathsCounter::new(
            vec![vec![candidate(0, 0, 5)], vec![candidate(0, 100, 5)]],
            vec![30, 30],
            20,
            25,
        );
        // inner distance 70, window 20 ± 25
        assert!(counter.find_good_positions_having_priority(10).is_empty());
    }

    #[test]
    fn test_overlapping_mates_and_duplicates() {
        let counter = HashBlockPathsCounter::new(
            vec![
                vec![candidate(2, 10, 4), candidate(2, 10, 4)],
                vec![candidate(2, 30, 6)],
            ],
            vec![40, 40],
            0,
            30,
        );
        let matches = counter.find_good_positions_having_priority(10);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].total_distance, -20);
        assert_eq!(matches[0].total_span, 60);
        assert_eq!(matches[0].priority, 10);
    }

    #[test]
    fn test_limit_keeps_highest_priority() {
        let counter = HashBlockPathsCounter::new(
            vec![
                vec![candidate(0, 0, 1), candidate(0, 500, 9)],
                vec![candidate(0, 50, 1), candidate(0, 550, 9)],
            ],
            vec![50, 50],
            0,
            0,
        );
        let matches = counter.find_good_positions_having_priority(1);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].offsets, vec![500, 550]);
        assert_eq!(matches[0].priority, 18);
    }
}
