//! Hash blocks: content-defined anchors over encoded sequences.
//!
//! A block `[start, end)` carries a polynomial hash of its text read forward
//! and of its reverse complement. Hashes combine without revisiting the text:
//!
//! ```text
//!   fwd(A ++ B) = fwd(A) * P^|B| + fwd(B)
//!   rev(A ++ B) = rev(B) * P^|A| + rev(A)
//! ```
//!
//! so identical text always yields identical hashes regardless of how it was
//! assembled, and the reverse complement of a block has its hashes swapped.
//!
//! Each block also carries merge flags. A boundary between two neighbouring
//! blocks at level `L` survives into level `L+1` only if neither side asks to
//! merge across it. The right-hand request depends only on the forward hash
//! and the left-hand request only on the reverse hash, which makes the whole
//! pyramid symmetric under reverse complementation.

use std::cmp::Ordering;

use crate::core::compute::encoding::{BASE_T, complement};
use crate::core::utils::hash_64;

/// Odd multiplier for the polynomial hash.
pub const HASH_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

/// Upper bound on possibilities kept for one start index.
pub const MAX_POSSIBILITIES: usize = 64;

/// Out of 1024, how often one side of a boundary lets it survive (~1/sqrt(2)).
const KEEP_THRESHOLD: u64 = 724;

/// Polynomial code of an unambiguous base: A=1, C=2, G=3, T=4.
#[inline(always)]
pub fn base_code(mask: u8) -> u64 {
    debug_assert_eq!(mask.count_ones(), 1);
    mask.trailing_zeros() as u64 + 1
}

/// `HASH_MULTIPLIER^exponent` with wrapping arithmetic.
#[inline]
pub fn multiplier_pow(mut exponent: u64) -> u64 {
    let mut base = HASH_MULTIPLIER;
    let mut result = 1u64;
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
        exponent >>= 1;
    }
    result
}

/// Hash of `left ++ right` given the hashes of both parts.
#[inline]
pub fn combine_hashes(left: u64, right: u64, right_len: usize) -> u64 {
    left.wrapping_mul(multiplier_pow(right_len as u64)).wrapping_add(right)
}

/// Forward hash of unambiguous text, computed directly.
pub fn hash_text(bases: &[u8]) -> u64 {
    bases
        .iter()
        .fold(0u64, |h, &b| h.wrapping_mul(HASH_MULTIPLIER).wrapping_add(base_code(b)))
}

/// Whether a block with this hash asks to merge across one of its sides.
fn requests_merge(hash: u64, len: usize, level: usize) -> bool {
    if level == 0 && len == 1 {
        return hash == base_code(BASE_T);
    }
    let salt = hash_64((level as u64 + 1).wrapping_mul(0xD6E8_FEB8_6659_FD93));
    hash_64(hash ^ salt) % 1024 >= KEEP_THRESHOLD
}

/// Merge requests of a block at its own level and at the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MergeFlags(u8);

impl MergeFlags {
    const LEFT: u8 = 1;
    const RIGHT: u8 = 2;
    const LEFT_UP: u8 = 4;
    const RIGHT_UP: u8 = 8;
    const OPAQUE: u8 = 16;

    pub fn compute(forward_hash: u64, reverse_hash: u64, len: usize, level: usize) -> Self {
        let mut bits = 0;
        if requests_merge(reverse_hash, len, level) {
            bits |= Self::LEFT;
        }
        if requests_merge(forward_hash, len, level) {
            bits |= Self::RIGHT;
        }
        if requests_merge(reverse_hash, len, level + 1) {
            bits |= Self::LEFT_UP;
        }
        if requests_merge(forward_hash, len, level + 1) {
            bits |= Self::RIGHT_UP;
        }
        MergeFlags(bits)
    }

    #[inline]
    pub fn merge_left(self) -> bool {
        self.0 & Self::LEFT != 0
    }

    #[inline]
    pub fn merge_right(self) -> bool {
        self.0 & Self::RIGHT != 0
    }

    #[inline]
    pub fn merge_left_up(self) -> bool {
        self.0 & Self::LEFT_UP != 0
    }

    #[inline]
    pub fn merge_right_up(self) -> bool {
        self.0 & Self::RIGHT_UP != 0
    }

    /// Flags of a block that stands for a long ambiguous run.
    pub fn opaque() -> Self {
        MergeFlags(Self::OPAQUE)
    }

    #[inline]
    pub fn is_opaque(self) -> bool {
        self.0 & Self::OPAQUE != 0
    }

    /// Flags as seen from the opposite strand (left and right swapped).
    pub fn mirrored(self) -> Self {
        let b = self.0;
        MergeFlags(
            ((b & Self::LEFT) << 1)
                | ((b & Self::RIGHT) >> 1)
                | ((b & Self::LEFT_UP) << 1)
                | ((b & Self::RIGHT_UP) >> 1)
                | (b & Self::OPAQUE),
        )
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> Self {
        MergeFlags(bits & 0x1f)
    }
}

/// An anchor `[start, end)` in one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashBlock {
    pub start: usize,
    pub end: usize,
    pub forward_hash: u64,
    pub reverse_hash: u64,
    pub flags: MergeFlags,
}

impl HashBlock {
    pub fn new(start: usize, end: usize, forward_hash: u64, reverse_hash: u64, level: usize) -> Self {
        Self {
            start,
            end,
            forward_hash,
            reverse_hash,
            flags: MergeFlags::compute(forward_hash, reverse_hash, end - start, level),
        }
    }

    /// Level-0 block for one unambiguous base.
    pub fn single_base(position: usize, base: u8) -> Self {
        Self::new(position, position + 1, base_code(base), base_code(complement(base)), 0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Placeholder for a run of ambiguous bases too long to expand.
    ///
    /// It never merges with a neighbour and is never indexed.
    pub fn opaque(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            forward_hash: 0,
            reverse_hash: 0,
            flags: MergeFlags::opaque(),
        }
    }

    #[inline]
    pub fn is_opaque(&self) -> bool {
        self.flags.is_opaque()
    }

    /// Whether the boundary between `self` and the block to its right survives.
    #[inline]
    pub fn keeps_boundary_with(&self, right: &HashBlock) -> bool {
        self.is_opaque() || right.is_opaque() || (!self.flags.merge_right() && !right.flags.merge_left())
    }

    /// This block as seen on the reverse complement of a sequence of `sequence_len`.
    pub fn mirrored(&self, sequence_len: usize) -> Self {
        Self {
            start: sequence_len - self.end,
            end: sequence_len - self.start,
            forward_hash: self.reverse_hash,
            reverse_hash: self.forward_hash,
            flags: self.flags.mirrored(),
        }
    }
}

/// Assumption that an ambiguous position holds a particular base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Condition {
    pub position: usize,
    pub base: u8,
}

/// Union of two sorted condition lists, or `None` when they contradict.
pub fn merge_conditions(a: &[Condition], b: &[Condition]) -> Option<Vec<Condition>> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].position.cmp(&b[j].position) {
            Ordering::Less => {
                merged.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                merged.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                if a[i].base != b[j].base {
                    return None;
                }
                merged.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    merged.extend_from_slice(&a[i..]);
    merged.extend_from_slice(&b[j..]);
    Some(merged)
}

fn conditions_compatible(a: &[Condition], b: &[Condition]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].position.cmp(&b[j].position) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                if a[i].base != b[j].base {
                    return false;
                }
                i += 1;
                j += 1;
            }
        }
    }
    true
}

/// `a` is a subset of `b` (both sorted).
fn is_subset(a: &[Condition], b: &[Condition]) -> bool {
    a.len() <= b.len() && a.iter().all(|c| b.binary_search(c).is_ok())
}

/// A block that exists only if its conditions hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConditionalHashBlock {
    pub block: HashBlock,
    pub conditions: Vec<Condition>,
}

impl ConditionalHashBlock {
    pub fn unconditioned(block: HashBlock) -> Self {
        Self {
            block,
            conditions: Vec::new(),
        }
    }

    pub fn compatible_with(&self, conditions: &[Condition]) -> bool {
        conditions_compatible(&self.conditions, conditions)
    }
}

/// Every possible block starting at one index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MultiHashBlock {
    /// Exactly one block, valid under every resolution of ambiguity.
    Single(HashBlock),
    /// Conditioned alternatives, sorted and free of duplicates.
    Alternatives(Vec<ConditionalHashBlock>),
}

impl MultiHashBlock {
    /// Canonical form of a set of possibilities sharing one start.
    ///
    /// Exact duplicates and possibilities whose conditions are a strict
    /// superset of another possibility with the same block are dropped.
    /// Past [`MAX_POSSIBILITIES`] the least-conditioned ones are kept.
    pub fn from_possibilities(mut possibilities: Vec<ConditionalHashBlock>) -> Option<Self> {
        possibilities.sort_unstable();
        possibilities.dedup();
        if possibilities.len() > 1 {
            // Subsumption only happens between equal blocks, which sort together.
            let mut canonical: Vec<ConditionalHashBlock> = Vec::with_capacity(possibilities.len());
            let mut rest = possibilities.as_slice();
            while let Some(first) = rest.first() {
                let group_len = rest.iter().take_while(|p| p.block == first.block).count();
                let (group, tail) = rest.split_at(group_len);
                let mut by_size: Vec<&ConditionalHashBlock> = group.iter().collect();
                by_size.sort_by_key(|p| p.conditions.len());
                let group_start = canonical.len();
                for possibility in by_size {
                    if !canonical[group_start..]
                        .iter()
                        .any(|kept| is_subset(&kept.conditions, &possibility.conditions))
                    {
                        canonical.push(possibility.clone());
                    }
                }
                rest = tail;
            }
            canonical.sort_unstable();
            possibilities = canonical;
        }
        if possibilities.len() > MAX_POSSIBILITIES {
            possibilities.sort_by(|a, b| a.conditions.len().cmp(&b.conditions.len()).then_with(|| a.cmp(b)));
            possibilities.truncate(MAX_POSSIBILITIES);
            possibilities.sort_unstable();
        }
        match possibilities.len() {
            0 => None,
            1 if possibilities[0].conditions.is_empty() => Some(MultiHashBlock::Single(possibilities[0].block)),
            _ => Some(MultiHashBlock::Alternatives(possibilities)),
        }
    }

    pub fn start(&self) -> usize {
        match self {
            MultiHashBlock::Single(block) => block.start,
            MultiHashBlock::Alternatives(alternatives) => alternatives.first().map_or(0, |a| a.block.start),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MultiHashBlock::Single(_) => 1,
            MultiHashBlock::Alternatives(alternatives) => alternatives.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, MultiHashBlock::Alternatives(_))
    }

    /// The unconditioned block, if this is not ambiguous.
    pub fn single(&self) -> Option<&HashBlock> {
        match self {
            MultiHashBlock::Single(block) => Some(block),
            MultiHashBlock::Alternatives(_) => None,
        }
    }

    pub fn possibilities(&self) -> Possibilities<'_> {
        match self {
            MultiHashBlock::Single(block) => Possibilities::Single(Some(block)),
            MultiHashBlock::Alternatives(alternatives) => Possibilities::Alternatives(alternatives.iter()),
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = &HashBlock> + '_ {
        self.possibilities().map(|(block, _)| block)
    }

    /// Blocks that may be stored in or looked up from an index.
    pub fn indexable_blocks(&self) -> impl Iterator<Item = &HashBlock> + '_ {
        self.blocks().filter(|block| !block.is_opaque())
    }
}

/// Iterator over `(block, conditions)` of a [`MultiHashBlock`].
pub enum Possibilities<'a> {
    Single(Option<&'a HashBlock>),
    Alternatives(std::slice::Iter<'a, ConditionalHashBlock>),
}

impl<'a> Iterator for Possibilities<'a> {
    type Item = (&'a HashBlock, &'a [Condition]);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Possibilities::Single(block) => block.take().map(|b| (b, &[][..])),
            Possibilities::Alternatives(iter) => iter.next().map(|a| (&a.block, a.conditions.as_slice())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::compute::encoding::{BASE_A, BASE_C, BASE_G, encode_sequence, reverse_complement};

    #[test]
    fn test_combined_hash_equals_direct_hash() {
        let bases = encode_sequence("s", b"ACGTTGCAAC").unwrap();
        let direct = hash_text(&bases);
        for split in 0..=bases.len() {
            let (left, right) = bases.split_at(split);
            assert_eq!(combine_hashes(hash_text(left), hash_text(right), right.len()), direct);
        }
    }

    #[test]
    fn test_reverse_hash_combination() {
        let a = encode_sequence("a", b"ACG").unwrap();
        let b = encode_sequence("b", b"TTGA").unwrap();
        let ab: Vec<u8> = a.iter().chain(b.iter()).copied().collect();
        let rev = |s: &[u8]| hash_text(&reverse_complement(s));
        assert_eq!(combine_hashes(rev(&b), rev(&a), a.len()), rev(&ab));
    }

    #[test]
    fn test_level_zero_boundaries() {
        for left in [BASE_A, BASE_C, BASE_G, BASE_T] {
            for right in [BASE_A, BASE_C, BASE_G, BASE_T] {
                let l = HashBlock::single_base(0, left);
                let r = HashBlock::single_base(1, right);
                assert_eq!(l.keeps_boundary_with(&r), left != BASE_T && right != BASE_A);
            }
        }
    }

    #[test]
    fn test_mirrored_flags_swap_sides() {
        for hash in 0..200u64 {
            let block = HashBlock::new(3, 10, hash, hash.wrapping_mul(31), 2);
            let mirrored = block.mirrored(20);
            assert_eq!((mirrored.start, mirrored.end), (10, 17));
            assert_eq!(mirrored.flags.merge_left(), block.flags.merge_right());
            assert_eq!(mirrored.flags.merge_right_up(), block.flags.merge_left_up());
            assert_eq!(mirrored.mirrored(20), block);
            assert_eq!(HashBlock::new(10, 17, block.reverse_hash, block.forward_hash, 2), mirrored);
        }
    }

    #[test]
    fn test_opaque_block_keeps_boundaries() {
        let opaque = HashBlock::opaque(4, 40);
        let mirrored = opaque.mirrored(50);
        assert!(mirrored.is_opaque());
        assert_eq!(mirrored, HashBlock::opaque(10, 46));
        assert_eq!(MergeFlags::from_bits(opaque.flags.bits()), opaque.flags);

        // T asks to merge right and A asks to merge left; neither crosses.
        let t = HashBlock::single_base(3, BASE_T);
        let a = HashBlock::single_base(40, BASE_A);
        assert!(t.keeps_boundary_with(&opaque));
        assert!(opaque.keeps_boundary_with(&a));

        let entry = MultiHashBlock::Single(opaque);
        assert_eq!(entry.blocks().count(), 1);
        assert_eq!(entry.indexable_blocks().count(), 0);
    }

    #[test]
    fn test_keep_rate_is_roughly_half() {
        let kept = (0..4000u64)
            .filter(|&i| {
                let left = HashBlock::new(0, 5, i, i ^ 0xABCD, 3);
                let right = HashBlock::new(5, 9, i.wrapping_mul(7919), i.wrapping_add(17), 3);
                left.keeps_boundary_with(&right)
            })
            .count();
        assert!((1500..2500).contains(&kept), "kept {kept}");
    }

    #[test]
    fn test_merge_conditions() {
        let a = [Condition { position: 1, base: BASE_A }, Condition { position: 5, base: BASE_G }];
        let b = [Condition { position: 3, base: BASE_C }, Condition { position: 5, base: BASE_G }];
        let c = [Condition { position: 5, base: BASE_T }];
        assert_eq!(merge_conditions(&a, &b).unwrap().len(), 3);
        assert!(merge_conditions(&a, &c).is_none());
        assert!(merge_conditions(&[], &c).is_some());
    }

    #[test]
    fn test_from_possibilities_canonical() {
        let block = HashBlock::single_base(4, BASE_A);
        let cond = |base| vec![Condition { position: 4, base }];

        // A lone unconditioned possibility collapses to Single.
        let single = MultiHashBlock::from_possibilities(vec![ConditionalHashBlock::unconditioned(block)]).unwrap();
        assert_eq!(single, MultiHashBlock::Single(block));

        // A conditioned duplicate of an unconditioned block is subsumed.
        let merged = MultiHashBlock::from_possibilities(vec![
            ConditionalHashBlock { block, conditions: cond(BASE_A) },
            ConditionalHashBlock::unconditioned(block),
            ConditionalHashBlock::unconditioned(block),
        ])
        .unwrap();
        assert_eq!(merged, MultiHashBlock::Single(block));

        let other = HashBlock::single_base(4, BASE_G);
        let alternatives = MultiHashBlock::from_possibilities(vec![
            ConditionalHashBlock { block: other, conditions: cond(BASE_G) },
            ConditionalHashBlock { block, conditions: cond(BASE_A) },
        ])
        .unwrap();
        assert_eq!(alternatives.len(), 2);
        assert_eq!(alternatives.start(), 4);
        assert!(MultiHashBlock::from_possibilities(Vec::new()).is_none());
    }
}
