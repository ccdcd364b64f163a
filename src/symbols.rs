//! Mappings between lengths/distances and their DEFLATE symbols, extra bit
//! counts and extra bit values. See RFC 1951 section 3.2.5.

/// Length symbol indexed by match length. Lengths 0..3 are unused.
const LENGTH_SYMBOL: [u16; 259] = [
    0, 0, 0, 257, 258, 259, 260, 261, 262, 263,
    264, 265, 265, 266, 266, 267, 267, 268, 268, 269,
    269, 269, 269, 270, 270, 270, 270, 271, 271, 271,
    271, 272, 272, 272, 272, 273, 273, 273, 273, 273,
    273, 273, 273, 274, 274, 274, 274, 274, 274, 274,
    274, 275, 275, 275, 275, 275, 275, 275, 275, 276,
    276, 276, 276, 276, 276, 276, 276, 277, 277, 277,
    277, 277, 277, 277, 277, 277, 277, 277, 277, 277,
    277, 277, 277, 278, 278, 278, 278, 278, 278, 278,
    278, 278, 278, 278, 278, 278, 278, 278, 278, 279,
    279, 279, 279, 279, 279, 279, 279, 279, 279, 279,
    279, 279, 279, 279, 279, 280, 280, 280, 280, 280,
    280, 280, 280, 280, 280, 280, 280, 280, 280, 280,
    280, 281, 281, 281, 281, 281, 281, 281, 281, 281,
    281, 281, 281, 281, 281, 281, 281, 281, 281, 281,
    281, 281, 281, 281, 281, 281, 281, 281, 281, 281,
    281, 281, 281, 282, 282, 282, 282, 282, 282, 282,
    282, 282, 282, 282, 282, 282, 282, 282, 282, 282,
    282, 282, 282, 282, 282, 282, 282, 282, 282, 282,
    282, 282, 282, 282, 282, 283, 283, 283, 283, 283,
    283, 283, 283, 283, 283, 283, 283, 283, 283, 283,
    283, 283, 283, 283, 283, 283, 283, 283, 283, 283,
    283, 283, 283, 283, 283, 283, 283, 284, 284, 284,
    284, 284, 284, 284, 284, 284, 284, 284, 284, 284,
    284, 284, 284, 284, 284, 284, 284, 284, 284, 284,
    284, 284, 284, 284, 284, 284, 284, 284, 285,
];

/// Extra bit count indexed by match length.
const LENGTH_EXTRA_BITS: [u8; 259] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 1,
    1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2,
    2, 2, 2, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4,
    4, 4, 4, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5, 5,
    5, 5, 0,
];

/// Extra bit value indexed by match length.
const LENGTH_EXTRA_BITS_VALUE: [u8; 259] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0,
    1, 0, 1, 0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3, 0,
    1, 2, 3, 0, 1, 2, 3, 4, 5, 6, 7, 0, 1, 2, 3, 4,
    5, 6, 7, 0, 1, 2, 3, 4, 5, 6, 7, 0, 1, 2, 3, 4,
    5, 6, 7, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28,
    29, 30, 31, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28,
    29, 30, 31, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28,
    29, 30, 31, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28,
    29, 30, 0,
];

/// Extra bit count per distance symbol. Only the first 30 entries carry
/// meaning; the last two symbols are unused by the format.
const DIST_SYMBOL_EXTRA_BITS: [u8; 32] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6,
    7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13, 13, 0, 0,
];

/// Extra bit count per length symbol, indexed from symbol 257.
const LENGTH_SYMBOL_EXTRA_BITS: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2,
    3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

pub fn get_length_symbol(length: usize) -> usize {
    LENGTH_SYMBOL[length] as usize
}

pub fn get_length_extra_bits(length: usize) -> usize {
    LENGTH_EXTRA_BITS[length] as usize
}

pub fn get_length_extra_bits_value(length: usize) -> u32 {
    u32::from(LENGTH_EXTRA_BITS_VALUE[length])
}

pub fn get_length_symbol_extra_bits(symbol: usize) -> usize {
    LENGTH_SYMBOL_EXTRA_BITS[symbol - 257] as usize
}

pub fn get_dist_symbol_extra_bits(symbol: usize) -> usize {
    DIST_SYMBOL_EXTRA_BITS[symbol] as usize
}

pub fn get_dist_symbol(dist: u16) -> usize {
    if dist < 5 {
        (dist as usize).saturating_sub(1)
    } else {
        let l = (dist as u32 - 1).ilog2();
        let r = ((u32::from(dist) - 1) >> (l - 1)) & 1;
        (l * 2 + r) as usize
    }
}

pub fn get_dist_extra_bits(dist: u16) -> usize {
    if dist < 5 {
        0
    } else {
        ((dist as u32 - 1).ilog2() - 1) as usize
    }
}

pub fn get_dist_extra_bits_value(dist: u16) -> u32 {
    if dist < 5 {
        0
    } else {
        let l = (dist as u32 - 1).ilog2();
        (u32::from(dist) - (1 + (1 << l))) & ((1 << (l - 1)) - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_symbol_ranges() {
        assert_eq!(get_length_symbol(3), 257);
        assert_eq!(get_length_symbol(10), 264);
        assert_eq!(get_length_symbol(11), 265);
        assert_eq!(get_length_symbol(12), 265);
        assert_eq!(get_length_symbol(131), 281);
        assert_eq!(get_length_symbol(257), 284);
        assert_eq!(get_length_symbol(258), 285);
    }

    #[test]
    fn length_extra_bits_consistent_with_symbol() {
        for length in 3..=258 {
            assert_eq!(
                get_length_extra_bits(length),
                get_length_symbol_extra_bits(get_length_symbol(length)),
                "mismatch at length {length}"
            );
            let max = (1u32 << get_length_extra_bits(length)) - 1;
            assert!(get_length_extra_bits_value(length) <= max);
        }
    }

    #[test]
    fn dist_symbol_against_range_table() {
        // First distance of every distance symbol, RFC 1951 section 3.2.5.
        let firsts = [
            1u16, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769,
            1025, 1537, 2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
        ];
        for (sym, &first) in firsts.iter().enumerate() {
            assert_eq!(get_dist_symbol(first), sym);
            let last = if sym + 1 < firsts.len() {
                firsts[sym + 1] - 1
            } else {
                32768
            };
            assert_eq!(get_dist_symbol(last), sym);
        }
    }

    #[test]
    fn dist_extra_bits_roundtrip() {
        for dist in 1..=32768u32 {
            let dist = dist as u16;
            let sym = get_dist_symbol(dist);
            let bits = get_dist_extra_bits(dist);
            assert_eq!(bits, get_dist_symbol_extra_bits(sym));
            assert!(get_dist_extra_bits_value(dist) < (1 << bits.max(1)));
        }
    }
}
