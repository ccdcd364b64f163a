/// Converts a series of Huffman tree bitlengths to the bit values of the symbols.
pub fn lengths_to_symbols(lengths: &[u32], maxbits: u32) -> Vec<u32> {
    let mut bl_count = vec![0; (maxbits + 1) as usize];
    let mut next_code = vec![0; (maxbits + 1) as usize];
    let mut symbols = vec![0; lengths.len()];

    /* 1) Count the number of codes for each code length. Let bl_count[N] be the
    number of codes of length N, N >= 1. */
    for &length in lengths {
        debug_assert!(length <= maxbits);
        bl_count[length as usize] += 1;
    }

    /* 2) Find the numerical value of the smallest code for each code length. */
    let mut code = 0;
    bl_count[0] = 0;
    for bits in 1..=maxbits as usize {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }

    /* 3) Assign numerical values to all codes, using consecutive values for all
    codes of the same length with the base values determined at step 2. */
    for (symbol, &length) in symbols.iter_mut().zip(lengths.iter()) {
        if length != 0 {
            *symbol = next_code[length as usize];
            next_code[length as usize] += 1;
        }
    }

    symbols
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc1951_worked_example() {
        // Section 3.2.2 of RFC 1951, alphabet ABCDEFGH.
        let lengths = [3, 3, 3, 3, 3, 2, 4, 4];
        let symbols = lengths_to_symbols(&lengths, 4);
        assert_eq!(
            symbols,
            [0b010, 0b011, 0b100, 0b101, 0b110, 0b00, 0b1110, 0b1111]
        );
    }

    #[test]
    fn zero_lengths_get_no_code() {
        let lengths = [0, 1, 0, 1];
        let symbols = lengths_to_symbols(&lengths, 15);
        assert_eq!(symbols, [0, 0b0, 0, 0b1]);
    }
}
