//! # Basepair Encoding
//!
//! Every base is stored as a 4-bit set over {A, C, G, T}:
//!
//! ```text
//!   A = 0b0001   C = 0b0010   G = 0b0100   T = 0b1000
//!   R = A|G  Y = C|T  S = C|G  W = A|T  K = G|T  M = A|C
//!   B = C|G|T  D = A|G|T  H = A|C|T  V = A|C|G  N = A|C|G|T
//! ```
//!
//! Ambiguity codes are plain unions, so "could these two bases be equal" is a
//! bitwise AND and complementing is a bit permutation.

use crate::error::{MapperError, Result};
use crate::pipelines::linear::map_opt::AlignmentParameters;

pub const BASE_A: u8 = 0b0001;
pub const BASE_C: u8 = 0b0010;
pub const BASE_G: u8 = 0b0100;
pub const BASE_T: u8 = 0b1000;
pub const BASE_N: u8 = 0b1111;

/// Character used for gaps in aligned text.
pub const GAP_CHAR: u8 = b'-';

/// The four unambiguous bases in mask order.
pub const SINGLE_BASES: [u8; 4] = [BASE_A, BASE_C, BASE_G, BASE_T];

const DECODE_TABLE: [u8; 16] = *b"-ACMGRSVTWYHKDBN";

static ENCODE_TABLE: [u8; 256] = build_encode_table();

const fn build_encode_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut mask = 1;
    while mask < 16 {
        let upper = DECODE_TABLE[mask];
        table[upper as usize] = mask as u8;
        table[upper.to_ascii_lowercase() as usize] = mask as u8;
        mask += 1;
    }
    table[b'U' as usize] = BASE_T;
    table[b'u' as usize] = BASE_T;
    table
}

/// Encode one IUPAC character. Returns `None` for anything that is not a base.
#[inline(always)]
pub fn encode_base(base: u8) -> Option<u8> {
    match ENCODE_TABLE[base as usize] {
        0 => None,
        mask => Some(mask),
    }
}

/// Encode a text sequence, failing on the first invalid character.
pub fn encode_sequence(name: &str, text: &[u8]) -> Result<Vec<u8>> {
    text.iter()
        .enumerate()
        .map(|(offset, &base)| {
            encode_base(base).ok_or_else(|| MapperError::InvalidBase {
                sequence: name.to_string(),
                offset,
                base: base as char,
            })
        })
        .collect()
}

/// Upper-case IUPAC character for a mask; `-` for the empty set.
#[inline(always)]
pub const fn decode_base(mask: u8) -> u8 {
    DECODE_TABLE[(mask & 0x0f) as usize]
}

pub fn decode_sequence(masks: &[u8]) -> String {
    masks.iter().map(|&m| decode_base(m) as char).collect()
}

/// Watson-Crick complement of a base set (A<->T, C<->G).
#[inline(always)]
pub const fn complement(mask: u8) -> u8 {
    ((mask & BASE_A) << 3) | ((mask & BASE_T) >> 3) | ((mask & BASE_C) << 1) | ((mask & BASE_G) >> 1)
}

pub fn reverse_complement(masks: &[u8]) -> Vec<u8> {
    masks.iter().rev().map(|&m| complement(m)).collect()
}

#[inline(always)]
pub const fn is_ambiguous(mask: u8) -> bool {
    mask.count_ones() > 1
}

/// Iterate the unambiguous bases admitted by a mask, in A, C, G, T order.
pub fn admitted_bases(mask: u8) -> impl Iterator<Item = u8> {
    SINGLE_BASES.into_iter().filter(move |b| mask & b != 0)
}

/// Substitution penalties for every pair of base sets.
#[derive(Debug, Clone)]
pub struct PenaltyTable {
    table: [f64; 256],
}

impl PenaltyTable {
    pub fn new(params: &AlignmentParameters) -> Self {
        let mut table = [0.0; 256];
        for x in 1..16u8 {
            for y in 1..16u8 {
                table[((x as usize) << 4) | y as usize] = Self::pair_penalty(x, y, params);
            }
        }
        Self { table }
    }

    fn pair_penalty(x: u8, y: u8, params: &AlignmentParameters) -> f64 {
        if x == y && !is_ambiguous(x) {
            return 0.0;
        }
        if x & y == 0 {
            return params.mutation_penalty;
        }
        let union = (x | y).count_ones() as f64;
        params.ambiguity_penalty * (union - 1.0) / 3.0
    }

    #[inline(always)]
    pub fn get(&self, x: u8, y: u8) -> f64 {
        self.table[(((x & 0x0f) as usize) << 4) | (y & 0x0f) as usize]
    }
}
