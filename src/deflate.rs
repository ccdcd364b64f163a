use std::cmp;

use log::debug;

use crate::blocksplitter::{blocksplit, blocksplit_lz77};
use crate::iter::ToFlagLastIterator;
use crate::katajainen::length_limited_code_lengths;
use crate::lz77::{BlockState, LitLen, Lz77Store};
use crate::squeeze::{lz77_optimal, lz77_optimal_fixed};
use crate::symbols::{
    get_dist_extra_bits, get_dist_extra_bits_value, get_dist_symbol, get_dist_symbol_extra_bits,
    get_length_extra_bits, get_length_extra_bits_value, get_length_symbol,
    get_length_symbol_extra_bits,
};
use crate::tree::lengths_to_symbols;
use crate::util::{MASTER_BLOCK_SIZE, NUM_D, NUM_LL};
use crate::Options;

/// Compresses according to the deflate specification and appends the compressed
/// result to the output.
///
/// `options`: global program options
/// `btype`: the deflate block type. Use `Dynamic` for best compression.
///   - `Uncompressed`: non compressed blocks (00)
///   - `Fixed`: blocks with fixed tree (01)
///   - `Dynamic`: blocks with dynamic tree (10)
/// `in_data`: the input bytes
/// `out`: dynamic output array to which the result is appended
pub fn deflate(options: &Options, btype: BlockType, in_data: &[u8], out: &mut Vec<u8>) {
    let mut bitwriter = BitWriter::new(out);
    let insize = in_data.len();
    let mut i = 0;
    /* Runs at least once so that empty input still produces a (final) block. */
    loop {
        let final_block = i + MASTER_BLOCK_SIZE >= insize;
        let size = if final_block {
            insize - i
        } else {
            MASTER_BLOCK_SIZE
        };
        deflate_part(
            options,
            btype,
            final_block,
            in_data,
            i,
            i + size,
            &mut bitwriter,
        );
        i += size;
        if final_block {
            break;
        }
    }
    bitwriter.finish_partial_bits();
}

/// Deflates a part, to allow `deflate` to use multiple master blocks if needed.
/// It is possible to call this function multiple times in a row, shifting
/// `instart` and `inend` to next bytes of the data. If `instart` is larger than 0,
/// then previous bytes are used as the initial dictionary for LZ77.
/// This function will usually output multiple deflate blocks. If `final_block` is
/// true, then the final bit will be set on the last block.
fn deflate_part(
    options: &Options,
    btype: BlockType,
    final_block: bool,
    in_data: &[u8],
    instart: usize,
    inend: usize,
    bitwriter: &mut BitWriter,
) {
    /* If btype=Dynamic is specified, it tries all block types. If a lesser btype is
    given, then however it forces that one. Neither of the lesser types needs
    block splitting as they have no dynamic huffman trees. */
    match btype {
        BlockType::Uncompressed => {
            add_non_compressed_block(final_block, in_data, instart, inend, bitwriter);
        }
        BlockType::Fixed => {
            let mut store = Lz77Store::new();
            let mut s = BlockState::new(options, instart, inend);

            lz77_optimal_fixed(&mut s, in_data, &mut store);
            let size = store.size();
            add_lz77_block(btype, final_block, in_data, &store, 0, size, 0, bitwriter);
        }
        BlockType::Dynamic => {
            blocksplit_attempt(options, final_block, in_data, instart, inend, bitwriter);
        }
    }
}

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum BlockType {
    Uncompressed,
    Fixed,
    Dynamic,
}

fn fixed_tree() -> (Vec<u32>, Vec<u32>) {
    let mut ll = Vec::with_capacity(NUM_LL);
    ll.resize(144, 8);
    ll.resize(256, 9);
    ll.resize(280, 7);
    ll.resize(288, 8);
    let d = vec![5; NUM_D];
    (ll, d)
}

/// Changes the population counts in a way that the consequent Huffman tree
/// compression, especially its rle-part, will be more likely to compress this data
/// more efficiently.
fn optimize_huffman_for_rle(counts: &mut [usize]) {
    let mut length = counts.len();
    // 1) We don't want to touch the trailing zeros. We may break the
    // rules of the format by adding more data in the distance codes.
    loop {
        if length == 0 {
            return;
        }
        if counts[length - 1] != 0 {
            // Now counts[0..length - 1] does not have trailing zeros.
            break;
        }
        length -= 1;
    }

    // 2) Let's mark all population counts that already can be encoded
    // with an rle code.
    let mut good_for_rle = vec![false; length];

    // Let's not spoil any of the existing good rle codes.
    // Mark any seq of 0's that is longer than 5 as a good_for_rle.
    // Mark any seq of non-0's that is longer than 7 as a good_for_rle.
    let mut symbol = counts[0];
    let mut stride = 0;
    for (i, &count) in counts.iter().enumerate().take(length) {
        if count != symbol {
            if (symbol == 0 && stride >= 5) || (symbol != 0 && stride >= 7) {
                for k in 0..stride {
                    good_for_rle[i - k - 1] = true;
                }
            }
            stride = 1;
            symbol = count;
        } else {
            stride += 1;
        }
    }

    // 3) Let's replace those population counts that lead to more rle codes.
    stride = 0;
    let mut limit = counts[0];
    let mut sum = 0;
    for i in 0..(length + 1) {
        // Heuristic for selecting the stride ranges to collapse.
        if i == length || good_for_rle[i] || (counts[i] as i32 - limit as i32).abs() >= 4 {
            if stride >= 4 || (stride >= 3 && sum == 0) {
                // The stride must end, collapse what we have, if we have enough (4).
                let count = if sum == 0 {
                    // Don't upgrade an all zeros stride to ones.
                    0
                } else {
                    cmp::max((sum + stride / 2) / stride, 1)
                };
                for k in 0..stride {
                    // We don't want to change value at counts[i],
                    // that is already belonging to the next stride. Thus - 1.
                    counts[i - k - 1] = count;
                }
            }
            stride = 0;
            sum = 0;
            if length > 2 && i < length - 3 {
                // All interesting strides have a count of at least 4,
                // at least when non-zeros.
                limit = (counts[i] + counts[i + 1] + counts[i + 2] + counts[i + 3] + 2) / 4;
            } else if i < length {
                limit = counts[i];
            } else {
                limit = 0;
            }
        }
        stride += 1;
        if i != length {
            sum += counts[i];
        }
    }
}

// Ensures there are at least 2 distance codes to support buggy decoders.
// Zlib 1.2.1 and below have a bug where it fails if there isn't at least 1
// distance code (with length > 0), even though it's valid according to the
// deflate spec to have 0 distance codes. On top of that, some mobile phones
// require at least two distance codes. To support these decoders too (but
// potentially at the cost of a few bytes), add dummy code lengths of 1.
// References to this bug can be found in the changelog of
// Zlib 1.2.2 and here: http://www.jonof.id.au/forum/index.php?topic=515.0.
//
// d_lengths: the 32 lengths of the distance codes.
fn patch_distance_codes_for_buggy_decoders(d_lengths: &mut [u32]) {
    // Ignore the two unused codes from the spec.
    let num_dist_codes = d_lengths
        .iter()
        .take(30)
        .filter(|&&d_length| d_length != 0)
        .count();

    match num_dist_codes {
        0 => {
            d_lengths[0] = 1;
            d_lengths[1] = 1;
        }
        1 => {
            let index = if d_lengths[0] == 0 { 0 } else { 1 };
            d_lengths[index] = 1;
        }
        _ => {} // Two or more codes is fine.
    }
}

/// Same as `calculate_block_symbol_size`, but for block size smaller than histogram
/// size.
fn calculate_block_symbol_size_small(
    ll_lengths: &[u32],
    d_lengths: &[u32],
    lz77: &Lz77Store,
    lstart: usize,
    lend: usize,
) -> usize {
    let mut result = 0;

    for &item in &lz77.litlens[lstart..lend] {
        match item {
            LitLen::Literal(lit) => {
                debug_assert!(lit < 259);
                result += ll_lengths[lit as usize] as usize;
            }
            LitLen::LengthDist(len, dist) => {
                debug_assert!(len < 259);
                let ll_symbol = get_length_symbol(len as usize);
                let d_symbol = get_dist_symbol(dist);
                result += ll_lengths[ll_symbol] as usize;
                result += d_lengths[d_symbol] as usize;
                result += get_length_symbol_extra_bits(ll_symbol);
                result += get_dist_symbol_extra_bits(d_symbol);
            }
        }
    }
    result += ll_lengths[256] as usize; // end symbol
    result
}

/// Same as `calculate_block_symbol_size`, but with the histogram provided by the
/// caller.
fn calculate_block_symbol_size_given_counts(
    ll_counts: &[usize],
    d_counts: &[usize],
    ll_lengths: &[u32],
    d_lengths: &[u32],
    lz77: &Lz77Store,
    lstart: usize,
    lend: usize,
) -> usize {
    if lstart + NUM_LL * 3 > lend {
        calculate_block_symbol_size_small(ll_lengths, d_lengths, lz77, lstart, lend)
    } else {
        let mut result = 0;
        for i in 0..256 {
            result += ll_lengths[i] as usize * ll_counts[i];
        }
        for i in 257..286 {
            result += ll_lengths[i] as usize * ll_counts[i];
            result += get_length_symbol_extra_bits(i) * ll_counts[i];
        }
        for i in 0..30 {
            result += d_lengths[i] as usize * d_counts[i];
            result += get_dist_symbol_extra_bits(i) * d_counts[i];
        }
        result += ll_lengths[256] as usize; // end symbol
        result
    }
}

/// Calculates size of the part after the header and tree of an LZ77 block, in bits.
fn calculate_block_symbol_size(
    ll_lengths: &[u32],
    d_lengths: &[u32],
    lz77: &Lz77Store,
    lstart: usize,
    lend: usize,
) -> usize {
    if lstart + NUM_LL * 3 > lend {
        calculate_block_symbol_size_small(ll_lengths, d_lengths, lz77, lstart, lend)
    } else {
        let (ll_counts, d_counts) = lz77.get_histogram(lstart, lend);
        calculate_block_symbol_size_given_counts(
            &ll_counts, &d_counts, ll_lengths, d_lengths, lz77, lstart, lend,
        )
    }
}

/* The order in which code length code lengths are encoded as per deflate. */
const CLCL_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Calculates how many bits the encoding of the Huffman tree takes with the given
/// combination of repeat codes; only returns the size and runs faster than
/// actually encoding.
fn encode_tree_no_output(
    ll_lengths: &[u32],
    d_lengths: &[u32],
    use_16: bool,
    use_17: bool,
    use_18: bool,
) -> usize {
    let mut hlit = 29; /* 286 - 257 */
    let mut hdist = 29; /* 32 - 1, but gzip does not like hdist > 29. */

    let mut clcounts = [0; 19];
    let mut result_size = 0;

    /* Trim zeros. */
    while hlit > 0 && ll_lengths[257 + hlit - 1] == 0 {
        hlit -= 1;
    }
    while hdist > 0 && d_lengths[1 + hdist - 1] == 0 {
        hdist -= 1;
    }
    let hlit2 = hlit + 257;

    let lld_total = hlit2 + hdist + 1; /* Total amount of literal, length, distance codes. */

    let mut i = 0;

    while i < lld_total {
        /* This is an encoding of a huffman tree, so now the length is a symbol */
        let symbol = if i < hlit2 {
            ll_lengths[i]
        } else {
            d_lengths[i - hlit2]
        } as u8;

        let mut count = 1;
        if use_16 || (symbol == 0 && (use_17 || use_18)) {
            let mut j = i + 1;
            let mut symbol_calc = if j < hlit2 {
                ll_lengths[j]
            } else {
                d_lengths[j - hlit2]
            } as u8;

            while j < lld_total && symbol == symbol_calc {
                count += 1;
                j += 1;
                symbol_calc = if j < hlit2 {
                    ll_lengths[j]
                } else {
                    d_lengths[j - hlit2]
                } as u8;
            }
        }

        i += count - 1;

        /* Repetitions of zeroes */
        if symbol == 0 && count >= 3 {
            if use_18 {
                while count >= 11 {
                    let count2 = if count > 138 { 138 } else { count };
                    clcounts[18] += 1;
                    count -= count2;
                }
            }
            if use_17 {
                while count >= 3 {
                    let count2 = if count > 10 { 10 } else { count };
                    clcounts[17] += 1;
                    count -= count2;
                }
            }
        }

        /* Repetitions of any symbol */
        if use_16 && count >= 4 {
            count -= 1; /* Since the first one is hardcoded. */
            clcounts[symbol as usize] += 1;
            while count >= 3 {
                let count2 = if count > 6 { 6 } else { count };
                clcounts[16] += 1;
                count -= count2;
            }
        }

        /* No or insufficient repetition */
        clcounts[symbol as usize] += count;
        i += 1;
    }

    let clcl = length_limited_code_lengths(&clcounts, 7);

    let mut hclen = 15;
    /* Trim zeros. */
    while hclen > 0 && clcounts[CLCL_ORDER[hclen + 4 - 1]] == 0 {
        hclen -= 1;
    }

    result_size += 14; /* hlit, hdist, hclen bits */
    result_size += (hclen + 4) * 3; /* clcl bits */
    for i in 0..19 {
        result_size += clcl[i] as usize * clcounts[i];
    }
    /* Extra bits. */
    result_size += clcounts[16] * 2;
    result_size += clcounts[17] * 3;
    result_size += clcounts[18] * 7;

    result_size
}

/// Gives the exact size of the tree, in bits, as it will be encoded in DEFLATE.
fn calculate_tree_size(ll_lengths: &[u32], d_lengths: &[u32]) -> usize {
    let mut result = 0;
    for i in 0..8 {
        let size = encode_tree_no_output(ll_lengths, d_lengths, i & 1 > 0, i & 2 > 0, i & 4 > 0);
        if result == 0 || size < result {
            result = size;
        }
    }
    result
}

/// Encodes the Huffman tree with the given combination of repeat codes and writes
/// it to the output.
fn encode_tree(
    ll_lengths: &[u32],
    d_lengths: &[u32],
    use_16: bool,
    use_17: bool,
    use_18: bool,
    bitwriter: &mut BitWriter,
) {
    let mut hlit = 29; /* 286 - 257 */
    let mut hdist = 29; /* 32 - 1, but gzip does not like hdist > 29. */

    let mut clcounts = [0; 19];

    let mut rle = vec![];
    let mut rle_bits = vec![];

    /* Trim zeros. */
    while hlit > 0 && ll_lengths[257 + hlit - 1] == 0 {
        hlit -= 1;
    }
    while hdist > 0 && d_lengths[1 + hdist - 1] == 0 {
        hdist -= 1;
    }
    let hlit2 = hlit + 257;

    let lld_total = hlit2 + hdist + 1; /* Total amount of literal, length, distance codes. */

    let mut i = 0;

    while i < lld_total {
        /* This is an encoding of a huffman tree, so now the length is a symbol */
        let symbol = if i < hlit2 {
            ll_lengths[i]
        } else {
            d_lengths[i - hlit2]
        } as u8;

        let mut count = 1;
        if use_16 || (symbol == 0 && (use_17 || use_18)) {
            let mut j = i + 1;
            let mut symbol_calc = if j < hlit2 {
                ll_lengths[j]
            } else {
                d_lengths[j - hlit2]
            } as u8;

            while j < lld_total && symbol == symbol_calc {
                count += 1;
                j += 1;
                symbol_calc = if j < hlit2 {
                    ll_lengths[j]
                } else {
                    d_lengths[j - hlit2]
                } as u8;
            }
        }

        i += count - 1;

        /* Repetitions of zeroes */
        if symbol == 0 && count >= 3 {
            if use_18 {
                while count >= 11 {
                    let count2 = if count > 138 { 138 } else { count };
                    rle.push(18);
                    rle_bits.push(count2 - 11);
                    clcounts[18] += 1;
                    count -= count2;
                }
            }
            if use_17 {
                while count >= 3 {
                    let count2 = if count > 10 { 10 } else { count };
                    rle.push(17);
                    rle_bits.push(count2 - 3);
                    clcounts[17] += 1;
                    count -= count2;
                }
            }
        }

        /* Repetitions of any symbol */
        if use_16 && count >= 4 {
            count -= 1; /* Since the first one is hardcoded. */
            clcounts[symbol as usize] += 1;
            rle.push(symbol as usize);
            rle_bits.push(0);

            while count >= 3 {
                let count2 = if count > 6 { 6 } else { count };
                rle.push(16);
                rle_bits.push(count2 - 3);
                clcounts[16] += 1;
                count -= count2;
            }
        }

        /* No or insufficient repetition */
        clcounts[symbol as usize] += count;
        while count > 0 {
            rle.push(symbol as usize);
            rle_bits.push(0);
            count -= 1;
        }
        i += 1;
    }

    let clcl = length_limited_code_lengths(&clcounts, 7);
    let clsymbols = lengths_to_symbols(&clcl, 7);

    let mut hclen = 15;
    /* Trim zeros. */
    while hclen > 0 && clcounts[CLCL_ORDER[hclen + 4 - 1]] == 0 {
        hclen -= 1;
    }

    bitwriter.add_bits(hlit as u32, 5);
    bitwriter.add_bits(hdist as u32, 5);
    bitwriter.add_bits(hclen as u32, 4);

    for &item in CLCL_ORDER.iter().take(hclen + 4) {
        bitwriter.add_bits(clcl[item], 3);
    }

    for (&rle_i, &rle_bits_i) in rle.iter().zip(rle_bits.iter()) {
        let sym = clsymbols[rle_i];
        bitwriter.add_huffman_bits(sym, clcl[rle_i]);
        /* Extra bits. */
        if rle_i == 16 {
            bitwriter.add_bits(rle_bits_i as u32, 2);
        } else if rle_i == 17 {
            bitwriter.add_bits(rle_bits_i as u32, 3);
        } else if rle_i == 18 {
            bitwriter.add_bits(rle_bits_i as u32, 7);
        }
    }
}

fn add_dynamic_tree(ll_lengths: &[u32], d_lengths: &[u32], bitwriter: &mut BitWriter) {
    let mut best = 0;
    let mut bestsize = 0;

    for i in 0..8 {
        let size = encode_tree_no_output(ll_lengths, d_lengths, i & 1 > 0, i & 2 > 0, i & 4 > 0);
        if bestsize == 0 || size < bestsize {
            bestsize = size;
            best = i;
        }
    }

    encode_tree(
        ll_lengths,
        d_lengths,
        best & 1 > 0,
        best & 2 > 0,
        best & 4 > 0,
        bitwriter,
    );
}

/// Adds a deflate block with the given LZ77 data to the output.
/// `btype`: the block type
/// `final_block`: whether to set the "final" bit on this block, must be the last block
/// `lz77`: the LZ77 data
/// `lstart`: where to start in the LZ77 data
/// `lend`: where to end in the LZ77 data (not inclusive)
/// `expected_data_size`: the uncompressed block size, used for assertion, but you
///   can set it to `0` to not do the assertion.
#[allow(clippy::too_many_arguments)]
fn add_lz77_block(
    btype: BlockType,
    final_block: bool,
    in_data: &[u8],
    lz77: &Lz77Store,
    lstart: usize,
    lend: usize,
    expected_data_size: usize,
    bitwriter: &mut BitWriter,
) {
    if btype == BlockType::Uncompressed {
        let length = lz77.get_byte_range(lstart, lend);
        let pos = if lstart == lend { 0 } else { lz77.pos[lstart] };
        let end = pos + length;
        add_non_compressed_block(final_block, in_data, pos, end, bitwriter);
        return;
    }

    bitwriter.add_bit(final_block as u8);

    let (ll_lengths, d_lengths) = match btype {
        BlockType::Uncompressed => unreachable!(),
        BlockType::Fixed => {
            bitwriter.add_bit(1);
            bitwriter.add_bit(0);
            fixed_tree()
        }
        BlockType::Dynamic => {
            bitwriter.add_bit(0);
            bitwriter.add_bit(1);
            let (_, ll_lengths, d_lengths) = get_dynamic_lengths(lz77, lstart, lend);

            let detect_tree_size = bitwriter.bytes_written();
            add_dynamic_tree(&ll_lengths, &d_lengths, bitwriter);
            debug!(
                "tree size: {} bytes",
                bitwriter.bytes_written() - detect_tree_size
            );
            (ll_lengths, d_lengths)
        }
    };

    let ll_symbols = lengths_to_symbols(&ll_lengths, 15);
    let d_symbols = lengths_to_symbols(&d_lengths, 15);

    let detect_block_size = bitwriter.bytes_written();
    add_lz77_data(
        lz77,
        lstart,
        lend,
        expected_data_size,
        &ll_symbols,
        &ll_lengths,
        &d_symbols,
        &d_lengths,
        bitwriter,
    );

    /* End symbol. */
    bitwriter.add_huffman_bits(ll_symbols[256], ll_lengths[256]);

    let uncompressed_size: usize = lz77.litlens[lstart..lend].iter().map(LitLen::size).sum();
    let compressed_size = bitwriter.bytes_written() - detect_block_size;
    debug!(
        "compressed block size: {} ({}k) (unc: {})",
        compressed_size,
        compressed_size / 1024,
        uncompressed_size
    );
}

/// Calculates block size in bits.
/// `lz77`: lz77 data
/// `lstart`: start of block
/// `lend`: end of block (not inclusive)
pub fn calculate_block_size(lz77: &Lz77Store, lstart: usize, lend: usize, btype: BlockType) -> f64 {
    match btype {
        BlockType::Uncompressed => {
            let length = lz77.get_byte_range(lstart, lend);
            let rem = length % 65535;
            let blocks = length / 65535 + usize::from(rem > 0);
            /* An uncompressed block must actually be split into multiple blocks if it's
            larger than 65535 bytes long. Each block header is 5 bytes: 3 bits,
            padding, LEN and NLEN (potential less padding for first one ignored). */
            (blocks * 5 * 8 + length * 8) as f64
        }
        BlockType::Fixed => {
            let (ll_lengths, d_lengths) = fixed_tree();

            /* bfinal and btype bits */
            3.0 + calculate_block_symbol_size(&ll_lengths, &d_lengths, lz77, lstart, lend) as f64
        }
        BlockType::Dynamic => get_dynamic_lengths(lz77, lstart, lend).0 + 3.0,
    }
}

/// Tries out `optimize_huffman_for_rle` for this block, if the result is smaller,
/// uses it, otherwise keeps the original. Returns size of encoded tree and data in
/// bits, not including the 3-bit block header.
fn try_optimize_huffman_for_rle(
    lz77: &Lz77Store,
    lstart: usize,
    lend: usize,
    ll_counts: Vec<usize>,
    d_counts: Vec<usize>,
    ll_lengths: Vec<u32>,
    d_lengths: Vec<u32>,
) -> (f64, Vec<u32>, Vec<u32>) {
    let mut ll_counts2 = ll_counts.clone();
    let mut d_counts2 = d_counts.clone();

    let treesize = calculate_tree_size(&ll_lengths, &d_lengths);
    let datasize = calculate_block_symbol_size_given_counts(
        &ll_counts,
        &d_counts,
        &ll_lengths,
        &d_lengths,
        lz77,
        lstart,
        lend,
    );

    optimize_huffman_for_rle(&mut ll_counts2);
    optimize_huffman_for_rle(&mut d_counts2);

    let ll_lengths2 = length_limited_code_lengths(&ll_counts2, 15);
    let mut d_lengths2 = length_limited_code_lengths(&d_counts2, 15);
    patch_distance_codes_for_buggy_decoders(&mut d_lengths2[..]);

    let treesize2 = calculate_tree_size(&ll_lengths2, &d_lengths2);
    /* The symbol size is still computed with the real counts: the doctored
    counts only shape the tree, the data keeps its actual symbols. */
    let datasize2 = calculate_block_symbol_size_given_counts(
        &ll_counts,
        &d_counts,
        &ll_lengths2,
        &d_lengths2,
        lz77,
        lstart,
        lend,
    );

    if treesize2 + datasize2 < treesize + datasize {
        ((treesize2 + datasize2) as f64, ll_lengths2, d_lengths2)
    } else {
        ((treesize + datasize) as f64, ll_lengths, d_lengths)
    }
}

/// Calculates the bit lengths for the symbols for dynamic blocks. Chooses bit
/// lengths that give the smallest size of tree encoding + encoding of all the
/// symbols to have smallest output size. These are not necessarily the ideal
/// Huffman bit lengths. Returns size of encoded tree and data in bits, not
/// including the 3-bit block header.
fn get_dynamic_lengths(lz77: &Lz77Store, lstart: usize, lend: usize) -> (f64, Vec<u32>, Vec<u32>) {
    let (mut ll_counts, d_counts) = lz77.get_histogram(lstart, lend);
    ll_counts[256] = 1; /* End symbol. */

    let ll_lengths = length_limited_code_lengths(&ll_counts, 15);
    let mut d_lengths = length_limited_code_lengths(&d_counts, 15);

    patch_distance_codes_for_buggy_decoders(&mut d_lengths[..]);

    try_optimize_huffman_for_rle(lz77, lstart, lend, ll_counts, d_counts, ll_lengths, d_lengths)
}

/// Adds all lit/len and dist codes from the lists as huffman symbols. Does not add
/// end code 256. `expected_data_size` is the uncompressed block size, used for
/// assertion, but you can set it to `0` to not do the assertion.
#[allow(clippy::too_many_arguments)]
fn add_lz77_data(
    lz77: &Lz77Store,
    lstart: usize,
    lend: usize,
    expected_data_size: usize,
    ll_symbols: &[u32],
    ll_lengths: &[u32],
    d_symbols: &[u32],
    d_lengths: &[u32],
    bitwriter: &mut BitWriter,
) {
    let mut testlength = 0;

    for &item in &lz77.litlens[lstart..lend] {
        match item {
            LitLen::Literal(lit) => {
                let litlen = lit as usize;
                debug_assert!(litlen < 256);
                debug_assert!(ll_lengths[litlen] > 0);
                bitwriter.add_huffman_bits(ll_symbols[litlen], ll_lengths[litlen]);
                testlength += 1;
            }
            LitLen::LengthDist(len, dist) => {
                let litlen = len as usize;
                let lls = get_length_symbol(litlen);
                let ds = get_dist_symbol(dist);
                debug_assert!((3..=288).contains(&litlen));
                debug_assert!(ll_lengths[lls] > 0);
                debug_assert!(d_lengths[ds] > 0);
                bitwriter.add_huffman_bits(ll_symbols[lls], ll_lengths[lls]);
                bitwriter.add_bits(
                    get_length_extra_bits_value(litlen),
                    get_length_extra_bits(litlen) as u32,
                );
                bitwriter.add_huffman_bits(d_symbols[ds], d_lengths[ds]);
                bitwriter.add_bits(
                    get_dist_extra_bits_value(dist),
                    get_dist_extra_bits(dist) as u32,
                );
                testlength += litlen;
            }
        }
    }
    debug_assert!(expected_data_size == 0 || testlength == expected_data_size);
}

#[allow(clippy::too_many_arguments)]
fn add_lz77_block_auto_type(
    options: &Options,
    final_block: bool,
    in_data: &[u8],
    lz77: &Lz77Store,
    lstart: usize,
    lend: usize,
    expected_data_size: usize,
    bitwriter: &mut BitWriter,
) {
    let uncompressedcost = calculate_block_size(lz77, lstart, lend, BlockType::Uncompressed);
    let mut fixedcost = calculate_block_size(lz77, lstart, lend, BlockType::Fixed);
    let dyncost = calculate_block_size(lz77, lstart, lend, BlockType::Dynamic);

    /* Whether to perform the expensive calculation of creating an optimal block
    with fixed huffman tree to check if smaller. Only do this for small blocks or
    blocks which already are pretty good with fixed huffman tree. */
    let expensivefixed = (lz77.size() < 1000) || fixedcost <= dyncost * 1.1;

    let mut fixedstore = Lz77Store::new();
    if lstart == lend {
        /* Smallest empty block is represented by fixed block */
        bitwriter.add_bits(final_block as u32, 1);
        bitwriter.add_bits(1, 2); /* btype 01 */
        bitwriter.add_bits(0, 7); /* end symbol has code 0000000 */
        return;
    }
    if expensivefixed {
        /* Recalculate the LZ77 with lz77_optimal_fixed */
        let instart = lz77.pos[lstart];
        let inend = instart + lz77.get_byte_range(lstart, lend);

        let mut s = BlockState::new(options, instart, inend);
        lz77_optimal_fixed(&mut s, in_data, &mut fixedstore);
        fixedcost = calculate_block_size(&fixedstore, 0, fixedstore.size(), BlockType::Fixed);
    }

    if uncompressedcost < fixedcost && uncompressedcost < dyncost {
        add_lz77_block(
            BlockType::Uncompressed,
            final_block,
            in_data,
            lz77,
            lstart,
            lend,
            expected_data_size,
            bitwriter,
        );
    } else if fixedcost < dyncost {
        if expensivefixed {
            let size = fixedstore.size();
            add_lz77_block(
                BlockType::Fixed,
                final_block,
                in_data,
                &fixedstore,
                0,
                size,
                expected_data_size,
                bitwriter,
            );
        } else {
            add_lz77_block(
                BlockType::Fixed,
                final_block,
                in_data,
                lz77,
                lstart,
                lend,
                expected_data_size,
                bitwriter,
            );
        }
    } else {
        add_lz77_block(
            BlockType::Dynamic,
            final_block,
            in_data,
            lz77,
            lstart,
            lend,
            expected_data_size,
            bitwriter,
        );
    }
}

/// Calculates block size in bits, automatically using the best btype.
pub fn calculate_block_size_auto_type(lz77: &Lz77Store, lstart: usize, lend: usize) -> f64 {
    let uncompressedcost = calculate_block_size(lz77, lstart, lend, BlockType::Uncompressed);
    /* Don't do the expensive fixed cost calculation for larger blocks that are
    unlikely to use it. */
    let fixedcost = if lz77.size() > 1000 {
        uncompressedcost
    } else {
        calculate_block_size(lz77, lstart, lend, BlockType::Fixed)
    };
    let dyncost = calculate_block_size(lz77, lstart, lend, BlockType::Dynamic);
    uncompressedcost.min(fixedcost).min(dyncost)
}

fn add_all_blocks(
    splitpoints: &[usize],
    lz77: &Lz77Store,
    options: &Options,
    final_block: bool,
    in_data: &[u8],
    bitwriter: &mut BitWriter,
) {
    let mut last = 0;
    for &item in splitpoints {
        add_lz77_block_auto_type(options, false, in_data, lz77, last, item, 0, bitwriter);
        last = item;
    }
    add_lz77_block_auto_type(
        options,
        final_block,
        in_data,
        lz77,
        last,
        lz77.size(),
        0,
        bitwriter,
    );
}

fn blocksplit_attempt(
    options: &Options,
    final_block: bool,
    in_data: &[u8],
    instart: usize,
    inend: usize,
    bitwriter: &mut BitWriter,
) {
    let mut totalcost = 0.0;
    let mut lz77 = Lz77Store::new();

    /* Byte coordinates rather than lz77 index. */
    let splitpoints_uncompressed = if options.block_splitting {
        blocksplit(
            options,
            in_data,
            instart,
            inend,
            options.maximum_block_splits as usize,
        )
    } else {
        Vec::new()
    };
    let npoints = splitpoints_uncompressed.len();
    let mut splitpoints = Vec::with_capacity(npoints);

    let numiterations = options.iteration_count.get();
    let mut last = instart;
    for &item in splitpoints_uncompressed.iter().chain(Some(&inend)) {
        let mut s = BlockState::new(options, last, item);

        let store = lz77_optimal(&mut s, in_data, numiterations);
        totalcost += calculate_block_size_auto_type(&store, 0, store.size());

        for (&litlens, &pos) in store.litlens.iter().zip(store.pos.iter()) {
            lz77.append_store_item(litlens, pos);
        }

        if item != inend {
            splitpoints.push(lz77.size());
        }

        last = item;
    }

    /* Second block splitting attempt on the LZ77 data. */
    if npoints > 1 {
        let splitpoints2 = blocksplit_lz77(&lz77, options.maximum_block_splits as usize);
        let mut totalcost2 = 0.0;

        let mut last = 0;
        for &item in &splitpoints2 {
            totalcost2 += calculate_block_size_auto_type(&lz77, last, item);
            last = item;
        }
        totalcost2 += calculate_block_size_auto_type(&lz77, last, lz77.size());

        if totalcost2 < totalcost {
            splitpoints = splitpoints2;
        }
    }

    add_all_blocks(&splitpoints, &lz77, options, final_block, in_data, bitwriter);
}

/// Since an uncompressed block can be max 65535 in size, it actually adds
/// multiple blocks if needed.
fn add_non_compressed_block(
    final_block: bool,
    in_data: &[u8],
    instart: usize,
    inend: usize,
    bitwriter: &mut BitWriter,
) {
    let in_data = &in_data[instart..inend];

    if in_data.is_empty() {
        /* `chunks` yields nothing for an empty slice, but an empty stored
        block must still be written. */
        bitwriter.add_bit(final_block as u8);
        bitwriter.add_bit(0);
        bitwriter.add_bit(0);
        bitwriter.finish_partial_bits();
        bitwriter.add_bytes(&[0, 0, 0xff, 0xff]);
        return;
    }

    for (chunk, is_last) in in_data.chunks(65535).flag_last() {
        let blocksize = chunk.len();
        let nlen = !blocksize;

        bitwriter.add_bit((final_block && is_last) as u8);
        /* BTYPE 00 */
        bitwriter.add_bit(0);
        bitwriter.add_bit(0);

        /* Any bits of input up to the next byte boundary are ignored. */
        bitwriter.finish_partial_bits();

        bitwriter.add_byte((blocksize % 256) as u8);
        bitwriter.add_byte(((blocksize / 256) % 256) as u8);
        bitwriter.add_byte((nlen % 256) as u8);
        bitwriter.add_byte(((nlen / 256) % 256) as u8);

        bitwriter.add_bytes(chunk);
    }
}

pub struct BitWriter<'a> {
    bit: u8,
    bp: u8,
    out: &'a mut Vec<u8>,
}

impl<'a> BitWriter<'a> {
    pub fn new(out: &'a mut Vec<u8>) -> BitWriter<'a> {
        BitWriter { bit: 0, bp: 0, out }
    }

    fn bytes_written(&self) -> usize {
        self.out.len() + usize::from(self.bp > 0)
    }

    /// For when you want to add a full byte.
    fn add_byte(&mut self, byte: u8) {
        debug_assert_eq!(self.bp, 0);
        self.out.push(byte);
    }

    /// For adding a slice of bytes.
    fn add_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.bp, 0);
        self.out.extend_from_slice(bytes);
    }

    fn add_bit(&mut self, bit: u8) {
        self.bit |= bit << self.bp;
        self.bp += 1;
        if self.bp == 8 {
            self.finish_partial_bits();
        }
    }

    /// Adds the `length` least significant bits of `symbol`, least significant
    /// bit first.
    fn add_bits(&mut self, symbol: u32, length: u32) {
        for i in 0..length {
            let bit = ((symbol >> i) & 1) as u8;
            self.add_bit(bit);
        }
    }

    /// Adds bits, like `add_bits`, but the order is inverted. The deflate
    /// specification uses both orders in one standard.
    fn add_huffman_bits(&mut self, symbol: u32, length: u32) {
        for i in 0..length {
            let bit = ((symbol >> (length - i - 1)) & 1) as u8;
            self.add_bit(bit);
        }
    }

    pub fn finish_partial_bits(&mut self) {
        if self.bp != 0 {
            self.out.push(self.bit);
            self.bit = 0;
            self.bp = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniz_oxide::inflate::decompress_to_vec;

    #[test]
    fn fixed_tree_matches_the_specification() {
        let (ll, d) = fixed_tree();
        assert_eq!(ll.iter().filter(|&&l| l == 8).count(), 144 + 8);
        assert_eq!(ll.iter().filter(|&&l| l == 9).count(), 112);
        assert_eq!(ll.iter().filter(|&&l| l == 7).count(), 24);
        assert!(d.iter().all(|&l| l == 5));
    }

    #[test]
    fn distance_codes_are_patched_for_buggy_decoders() {
        let mut none = vec![0u32; 32];
        patch_distance_codes_for_buggy_decoders(&mut none);
        assert_eq!((none[0], none[1]), (1, 1));

        let mut one = vec![0u32; 32];
        one[0] = 4;
        patch_distance_codes_for_buggy_decoders(&mut one);
        assert_eq!((one[0], one[1]), (4, 1));

        let mut two = vec![0u32; 32];
        two[3] = 2;
        two[7] = 6;
        patch_distance_codes_for_buggy_decoders(&mut two);
        assert_eq!((two[3], two[7]), (2, 6));
    }

    #[test]
    fn rle_optimization_keeps_trailing_zeros() {
        let mut counts = vec![5, 5, 6, 5, 5, 4, 6, 5, 0, 0, 0, 0];
        optimize_huffman_for_rle(&mut counts);
        assert_eq!(&counts[8..], &[0, 0, 0, 0]);
        // No count of a used symbol may drop to zero.
        assert!(counts[..8].iter().all(|&c| c > 0));
    }

    #[test]
    fn empty_input_produces_single_fixed_block() {
        let options = Options::default();
        let mut out = Vec::new();
        deflate(&options, BlockType::Dynamic, &[], &mut out);
        // Final bit, btype 01, seven zero bits of the end symbol.
        assert_eq!(out, [0b0000_0011]);
        assert_eq!(decompress_to_vec(&out).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn stored_blocks_roundtrip() {
        let options = Options::default();
        let data = b"hello, stored world";
        let mut out = Vec::new();
        deflate(&options, BlockType::Uncompressed, data, &mut out);
        // Header byte, LEN, NLEN, then the raw bytes.
        assert_eq!(out[0], 1);
        assert_eq!(&out[1..3], &[data.len() as u8, 0]);
        assert_eq!(decompress_to_vec(&out).unwrap(), data);
    }

    #[test]
    fn each_block_type_roundtrips() {
        let options = Options::default();
        let data: Vec<u8> = b"the quick brown fox jumps over the lazy dog. "
            .iter()
            .copied()
            .cycle()
            .take(3000)
            .collect();
        for btype in [
            BlockType::Uncompressed,
            BlockType::Fixed,
            BlockType::Dynamic,
        ] {
            let mut out = Vec::new();
            deflate(&options, btype, &data, &mut out);
            assert_eq!(decompress_to_vec(&out).unwrap(), data, "{btype:?}");
        }
    }

    #[test]
    fn block_size_estimate_matches_actual_fixed_output() {
        let options = Options::default();
        let data = b"abcabcabcabcabc";
        let mut store = Lz77Store::new();
        let mut s = BlockState::new(&options, 0, data.len());
        lz77_optimal_fixed(&mut s, data, &mut store);

        let estimate = calculate_block_size(&store, 0, store.size(), BlockType::Fixed);

        let mut out = Vec::new();
        let mut bitwriter = BitWriter::new(&mut out);
        add_lz77_block(
            BlockType::Fixed,
            true,
            data,
            &store,
            0,
            store.size(),
            0,
            &mut bitwriter,
        );
        bitwriter.finish_partial_bits();
        let actual_bits = out.len() * 8;
        // The estimate is exact up to the padding of the last byte.
        assert!(estimate as usize <= actual_bits);
        assert!(actual_bits - (estimate as usize) < 8);
        assert_eq!(decompress_to_vec(&out).unwrap(), data);
    }

    #[test]
    fn uncompressed_size_includes_per_chunk_headers() {
        let mut store = Lz77Store::new();
        for i in 0..3 {
            store.append_store_item(LitLen::Literal(b'x' as u16), i);
        }
        let size = calculate_block_size(&store, 0, store.size(), BlockType::Uncompressed);
        assert_eq!(size, (5 * 8 + 3 * 8) as f64);
    }
}
