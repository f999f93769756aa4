//! Fixed-width bit-packed integer array.
//!
//! Values are laid out little-endian across a byte vector, so an element of
//! width `w` at index `i` occupies bits `[i*w, (i+1)*w)`.

/// Minimum width that can represent `max_value` (never less than 1).
#[inline]
pub fn bits_needed(max_value: u64) -> u32 {
    (u64::BITS - max_value.leading_zeros()).max(1)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitPackedArray {
    data: Vec<u8>,
    width: u32,
    len: usize,
}

impl BitPackedArray {
    /// Zero-filled array of `len` elements, each `width` bits wide.
    pub fn new(len: usize, width: u32) -> Self {
        assert!((1..=64).contains(&width), "bit width must be in 1..=64, got {width}");
        let total_bits = len as u64 * width as u64;
        let bytes = total_bits.div_ceil(8) as usize;
        Self {
            data: vec![0; bytes],
            width,
            len,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Heap footprint of the packed payload.
    pub fn memory_bytes(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn get(&self, index: usize) -> u64 {
        debug_assert!(index < self.len);
        let bit = index as u64 * self.width as u64;
        let mut byte = (bit / 8) as usize;
        let mut shift = (bit % 8) as u32;
        let mut value = 0u64;
        let mut filled = 0u32;
        while filled < self.width {
            let take = (8 - shift).min(self.width - filled);
            let chunk = (self.data[byte] >> shift) as u64 & ((1u64 << take) - 1);
            value |= chunk << filled;
            filled += take;
            shift = 0;
            byte += 1;
        }
        value
    }

    #[inline]
    pub fn set(&mut self, index: usize, value: u64) {
        debug_assert!(index < self.len);
        debug_assert!(self.width == 64 || value >> self.width == 0);
        let bit = index as u64 * self.width as u64;
        let mut byte = (bit / 8) as usize;
        let mut shift = (bit % 8) as u32;
        let mut written = 0u32;
        while written < self.width {
            let take = (8 - shift).min(self.width - written);
            let mask = (((1u16 << take) - 1) << shift) as u8;
            let chunk = ((value >> written) & ((1u64 << take) - 1)) as u8;
            self.data[byte] = (self.data[byte] & !mask) | (chunk << shift);
            written += take;
            shift = 0;
            byte += 1;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_needed() {
        assert_eq!(bits_needed(0), 1);
        assert_eq!(bits_needed(1), 1);
        assert_eq!(bits_needed(2), 2);
        assert_eq!(bits_needed(255), 8);
        assert_eq!(bits_needed(256), 9);
        assert_eq!(bits_needed(u64::MAX), 64);
        assert_eq!(bits_needed(1 << 32), 33);
    }

    #[test]
    fn test_round_trip_odd_widths() {
        for width in [1u32, 3, 7, 8, 13, 31, 33, 63, 64] {
            let mut array = BitPackedArray::new(37, width);
            let max = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
            for i in 0..37 {
                array.set(i, (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) & max);
            }
            for i in 0..37 {
                assert_eq!(
                    array.get(i),
                    (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) & max,
                    "width {width} index {i}"
                );
            }
        }
    }

    #[test]
    fn test_overwrite_preserves_neighbours() {
        let mut array = BitPackedArray::new(4, 5);
        array.set(0, 31);
        array.set(1, 31);
        array.set(2, 31);
        array.set(1, 0);
        assert_eq!(array.iter().collect::<Vec<_>>(), vec![31, 0, 31, 0]);
        assert_eq!(array.memory_bytes(), 3);
    }

    #[test]
    fn test_values_beyond_32_bits() {
        let mut array = BitPackedArray::new(3, 33);
        array.set(0, (1 << 32) + 5);
        array.set(1, (1 << 31) + 7);
        array.set(2, 1);
        assert_eq!(array.get(0), (1 << 32) + 5);
        assert_eq!(array.get(1), (1 << 31) + 7);
        assert_eq!(array.get(2), 1);
    }
}
