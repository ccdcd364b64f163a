//! The squeeze functions do enhanced LZ77 compression by optimal parsing with a
//! cost model, rather than greedily choosing the longest length or using a single
//! step of lazy matching like regular implementations.
//!
//! Since the cost model is based on the Huffman tree that can only be calculated
//! after the LZ77 data is generated, there is a chicken and egg problem, and
//! multiple runs are done with updated cost models to converge to a better
//! solution.

use std::cmp;
use std::iter;

use log::debug;

use crate::cache::Cache;
use crate::deflate::{calculate_block_size, BlockType};
use crate::hash::WindowHash;
use crate::lz77::{find_longest_match, BlockState, LitLen, Lz77Store};
use crate::symbols::{
    get_dist_extra_bits, get_dist_symbol, get_length_extra_bits, get_length_symbol,
};
use crate::util::{LARGE_FLOAT, MAX_MATCH, NUM_D, NUM_LL, WINDOW_MASK, WINDOW_SIZE};

const K_INV_LOG2: f64 = std::f64::consts::LOG2_E; // 1.0 / log(2.0)

/// Cost model which should exactly match fixed tree.
fn get_cost_fixed(litlen: usize, dist: u16) -> f64 {
    let result = if dist == 0 {
        if litlen <= 143 {
            8
        } else {
            9
        }
    } else {
        let dbits = get_dist_extra_bits(dist);
        let lbits = get_length_extra_bits(litlen);
        let lsym = get_length_symbol(litlen);
        // Every dist symbol has length 5.
        7 + (lsym > 279) as usize + 5 + dbits + lbits
    };
    result as f64
}

/// Cost model based on symbol statistics.
fn get_cost_stat(litlen: usize, dist: u16, stats: &SymbolStats) -> f64 {
    if dist == 0 {
        stats.ll_symbols[litlen]
    } else {
        let lsym = get_length_symbol(litlen);
        let lbits = get_length_extra_bits(litlen) as f64;
        let dsym = get_dist_symbol(dist);
        let dbits = get_dist_extra_bits(dist) as f64;
        lbits + dbits + stats.ll_symbols[lsym] + stats.d_symbols[dsym]
    }
}

#[derive(Copy, Clone)]
struct SymbolStats {
    /* The literal and length symbols. */
    litlens: [usize; NUM_LL],
    /* The 32 unique dist symbols, not the 32768 possible dists. */
    dists: [usize; NUM_D],
    /* Length of each lit/len symbol in bits. */
    ll_symbols: [f64; NUM_LL],
    /* Length of each dist symbol in bits. */
    d_symbols: [f64; NUM_D],
}

impl Default for SymbolStats {
    fn default() -> SymbolStats {
        SymbolStats {
            litlens: [0; NUM_LL],
            dists: [0; NUM_D],
            ll_symbols: [0.0; NUM_LL],
            d_symbols: [0.0; NUM_D],
        }
    }
}

impl SymbolStats {
    /// Calculates the entropy of each symbol, based on the counts of each symbol. The
    /// result is similar to the result of length_limited_code_lengths, but with the
    /// actual theoretical bit lengths according to the entropy. Since the resulting
    /// values are fractional, they cannot be used to encode the tree specified by
    /// DEFLATE.
    fn calculate_entropy(&mut self) {
        fn calculate_and_store_entropy(count: &[usize], bitlengths: &mut [f64]) {
            let n = count.len();

            let sum: usize = count.iter().sum();

            let log2sum = (if sum == 0 { n } else { sum } as f64).ln() * K_INV_LOG2;

            for i in 0..n {
                // When the count of the symbol is 0, but its cost is requested anyway, it
                // means the symbol will appear at least once anyway, so give it the cost as if
                // its count is 1.
                if count[i] == 0 {
                    bitlengths[i] = log2sum;
                } else {
                    bitlengths[i] = log2sum - (count[i] as f64).ln() * K_INV_LOG2;
                }

                // Depending on compiler and architecture, the above subtraction of two
                // floating point numbers may give a negative result very close to zero
                // instead of zero. Clamp it to zero. These floating point imprecisions do
                // not affect the cost model significantly so this is ok.
                if bitlengths[i] < 0.0 && bitlengths[i] > -1E-5 {
                    bitlengths[i] = 0.0;
                }
                debug_assert!(bitlengths[i] >= 0.0);
            }
        }

        calculate_and_store_entropy(&self.litlens, &mut self.ll_symbols);
        calculate_and_store_entropy(&self.dists, &mut self.d_symbols);
    }

    /// Appends the symbol statistics from the store.
    fn get_statistics(&mut self, store: &Lz77Store) {
        for &litlen in &store.litlens {
            match litlen {
                LitLen::Literal(lit) => self.litlens[lit as usize] += 1,
                LitLen::LengthDist(len, dist) => {
                    self.litlens[get_length_symbol(len as usize)] += 1;
                    self.dists[get_dist_symbol(dist)] += 1;
                }
            }
        }
        self.litlens[256] = 1; /* End symbol. */

        self.calculate_entropy();
    }

    /// Adds the frequencies of two stat tables, weighed, into a fresh table. Used
    /// to smooth out the statistics between iterations.
    fn add_weighed_freqs(
        stats1: &SymbolStats,
        w1: f64,
        stats2: &SymbolStats,
        w2: f64,
    ) -> SymbolStats {
        let mut result = SymbolStats::default();
        for i in 0..NUM_LL {
            result.litlens[i] =
                (stats1.litlens[i] as f64 * w1 + stats2.litlens[i] as f64 * w2) as usize;
        }
        for i in 0..NUM_D {
            result.dists[i] = (stats1.dists[i] as f64 * w1 + stats2.dists[i] as f64 * w2) as usize;
        }
        result.litlens[256] = 1; /* End symbol. */
        result
    }

    fn randomize_freqs(&mut self, state: &mut RanState) {
        fn randomize(freqs: &mut [usize], state: &mut RanState) {
            let n = freqs.len();
            for i in 0..n {
                if (state.ran() >> 4) % 3 == 0 {
                    freqs[i] = freqs[state.ran() as usize % n];
                }
            }
        }

        randomize(&mut self.litlens, state);
        randomize(&mut self.dists, state);
        self.litlens[256] = 1; /* End symbol. */
    }
}

/// Deterministic pseudo random number generator (multiply-with-carry), so that
/// the perturbation of the statistics is reproducible.
struct RanState {
    m_w: u32,
    m_z: u32,
}

impl RanState {
    fn new() -> RanState {
        RanState { m_w: 1, m_z: 2 }
    }

    fn ran(&mut self) -> u32 {
        self.m_z = 36969u32
            .wrapping_mul(self.m_z & 65535)
            .wrapping_add(self.m_z >> 16);
        self.m_w = 18000u32
            .wrapping_mul(self.m_w & 65535)
            .wrapping_add(self.m_w >> 16);
        (self.m_z << 16).wrapping_add(self.m_w) /* 32-bit result. */
    }
}

/// Finds the minimum possible cost this cost model can return for valid length and
/// distance symbols.
fn get_cost_model_min_cost<F: Fn(usize, u16) -> f64>(costmodel: F) -> f64 {
    let mut bestlength = 0; // length that has lowest cost in the cost model
    let mut bestdist = 0; // distance that has lowest cost in the cost model

    // Table of distances that have a different distance symbol in the deflate
    // specification. Each value is the first distance that has a new symbol. Only
    // different symbols affect the cost model so only these need to be checked.
    // See RFC 1951 section 3.2.5. Compressed blocks (length and distance codes).

    const DSYMBOLS: [u16; 30] = [
        1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
        2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
    ];

    let mut mincost = f64::INFINITY;
    for i in 3..259 {
        let c = costmodel(i, 1);
        if c < mincost {
            bestlength = i;
            mincost = c;
        }
    }

    mincost = f64::INFINITY;
    for dsym in DSYMBOLS {
        let c = costmodel(3, dsym);
        if c < mincost {
            bestdist = dsym;
            mincost = c;
        }
    }
    costmodel(bestlength, bestdist)
}

/// Performs the forward pass for "squeeze". Gets the most optimal length to reach
/// every byte from a previous byte, using cost calculations.
/// `s`: the `BlockState`
/// `costmodel`: function to calculate the cost of some lit/len/dist pair.
/// Returns the cost that was, according to the `costmodel`, needed to get to the
/// end, plus an array holding the best length to reach each byte from a previous
/// byte.
fn get_best_lengths<F: Fn(usize, u16) -> f64, C: Cache>(
    s: &mut BlockState<C>,
    in_data: &[u8],
    costmodel: F,
    h: &mut WindowHash,
) -> (f64, Vec<u16>) {
    let instart = s.blockstart;
    let inend = s.blockend;
    // Best cost to get here so far.
    let blocksize = inend - instart;
    let mut length_array = vec![0; blocksize + 1];
    if instart == inend {
        return (0.0, length_array);
    }
    let windowstart = instart.saturating_sub(WINDOW_SIZE);

    h.reset();
    let arr = &in_data[..inend];
    h.warmup(arr, windowstart, inend);
    for i in windowstart..instart {
        h.update(arr, i);
    }
    let mut costs: Vec<f32> = iter::repeat(f32::INFINITY).take(blocksize + 1).collect();
    costs[0] = 0.0; /* Because it's the start. */

    let mut i = instart;
    let mut leng;
    let mut longest_match;
    let mut sublen = vec![0; MAX_MATCH + 1];
    let mincost = get_cost_model_min_cost(&costmodel);
    while i < inend {
        let mut j = i - instart; // Index in the costs array and length_array.
        h.update(arr, i);

        // If we're in a long repetition of the same character and have more than
        // MAX_MATCH characters before and after our position.
        if h.same[i & WINDOW_MASK] > MAX_MATCH as u16 * 2
            && i > instart + MAX_MATCH + 1
            && i + MAX_MATCH * 2 + 1 < inend
            && h.same[(i - MAX_MATCH) & WINDOW_MASK] > MAX_MATCH as u16
        {
            let symbolcost = costmodel(MAX_MATCH, 1);
            // Set the length to reach each one to MAX_MATCH, and the cost to the cost
            // corresponding to that length. Doing this, we skip MAX_MATCH values to
            // avoid calling find_longest_match.

            for _ in 0..MAX_MATCH {
                costs[j + MAX_MATCH] = costs[j] + symbolcost as f32;
                length_array[j + MAX_MATCH] = MAX_MATCH as u16;
                i += 1;
                j += 1;
                h.update(arr, i);
            }
        }

        longest_match = find_longest_match(s, h, arr, i, inend, MAX_MATCH, &mut Some(&mut sublen));
        leng = longest_match.length;

        // Literal.
        if i < inend {
            let new_cost = costmodel(arr[i] as usize, 0) + costs[j] as f64;
            debug_assert!(new_cost >= 0.0);
            if new_cost < costs[j + 1] as f64 {
                costs[j + 1] = new_cost as f32;
                length_array[j + 1] = 1;
            }
        }
        // Lengths.
        let kend = cmp::min(leng as usize, inend - i);
        let mincostaddcostj = mincost + costs[j] as f64;

        for (k, &sublength) in sublen.iter().enumerate().take(kend + 1).skip(3) {
            // Calling the cost model is expensive, avoid this if we are already at
            // the minimum possible cost that it can return.
            if costs[j + k] as f64 <= mincostaddcostj {
                continue;
            }

            let new_cost = costmodel(k, sublength) + costs[j] as f64;
            debug_assert!(new_cost >= 0.0);
            if new_cost < costs[j + k] as f64 {
                debug_assert!(k <= MAX_MATCH);
                costs[j + k] = new_cost as f32;
                length_array[j + k] = k as u16;
            }
        }
        i += 1;
    }

    debug_assert!(costs[blocksize] >= 0.0);
    (costs[blocksize] as f64, length_array)
}

/// Calculates the optimal path of lz77 lengths to use, from the calculated
/// `length_array`. The `length_array` must contain the optimal length to reach that
/// byte. The returned path is in forward order; its data size will be the amount
/// of lz77 symbols.
fn trace(size: usize, length_array: &[u16]) -> Vec<u16> {
    let mut index = size;
    if size == 0 {
        return vec![];
    }
    let mut path = Vec::with_capacity(index);

    while index > 0 {
        let lai = length_array[index];
        let laiu = lai as usize;
        path.push(lai);
        debug_assert!(laiu <= index);
        debug_assert!(laiu <= MAX_MATCH);
        debug_assert_ne!(lai, 0);
        index -= laiu;
    }
    path.reverse();

    path
}

/// Does a single run for `lz77_optimal`. For good compression, repeated runs
/// with updated statistics should be performed.
/// `s`: the block state
/// `costmodel`: function to use as the cost model for this squeeze run
/// `store`: place to output the LZ77 data
fn lz77_optimal_run<F: Fn(usize, u16) -> f64, C: Cache>(
    s: &mut BlockState<C>,
    in_data: &[u8],
    costmodel: F,
    store: &mut Lz77Store,
    h: &mut WindowHash,
) {
    let instart = s.blockstart;
    let inend = s.blockend;
    let (cost, length_array) = get_best_lengths(s, in_data, costmodel, h);
    let path = trace(inend - instart, &length_array);
    store.follow_path(in_data, instart, inend, &path, s);
    debug_assert!(cost < f64::INFINITY);
}

/// Does the same as `lz77_optimal`, but optimized for the fixed tree of the
/// deflate standard.
/// The fixed tree never gives the best compression. But this gives the best
/// possible LZ77 encoding possible with the fixed tree.
/// This does not create or output any fixed tree, only LZ77 data optimized for
/// using with a fixed tree.
/// If `instart` is larger than `0`, it uses values before `instart` as starting
/// dictionary.
pub fn lz77_optimal_fixed<C: Cache>(s: &mut BlockState<C>, in_data: &[u8], store: &mut Lz77Store) {
    let mut h = WindowHash::new();
    lz77_optimal_run(s, in_data, get_cost_fixed, store, &mut h);
}

/// Calculates lit/len and dist pairs for given data.
/// If `instart` is larger than 0, it uses values before `instart` as starting
/// dictionary.
pub fn lz77_optimal<C: Cache>(
    s: &mut BlockState<C>,
    in_data: &[u8],
    numiterations: u16,
) -> Lz77Store {
    let instart = s.blockstart;
    let inend = s.blockend;
    let mut currentstore = Lz77Store::new();
    let mut outputstore = Lz77Store::new();
    let mut h = WindowHash::new();

    let mut stats = SymbolStats::default();
    let mut beststats = SymbolStats::default();

    let mut bestcost = LARGE_FLOAT;
    let mut lastcost = 0.0;
    /* Try randomizing the costs a bit once the size stabilizes. */
    let mut ran_state = RanState::new();
    let mut lastrandomstep = -1;

    /* Do regular deflate, then loop multiple shortest path runs, each time using
    the statistics of the previous run. */
    /* Initial run. */
    currentstore.greedy(s, in_data, instart, inend);
    stats.get_statistics(&currentstore);

    /* Repeat statistics with each time the cost model from the previous stat run. */
    for i in 0..i32::from(numiterations) {
        currentstore.reset();
        lz77_optimal_run(
            s,
            in_data,
            |a, b| get_cost_stat(a, b, &stats),
            &mut currentstore,
            &mut h,
        );
        let cost = calculate_block_size(&currentstore, 0, currentstore.size(), BlockType::Dynamic);
        debug!("iteration {}: {} bit", i, cost as u64);
        if cost < bestcost {
            /* Copy to the output store. */
            outputstore = currentstore.clone();
            beststats = stats;
            bestcost = cost;
        }
        let laststats = stats;
        stats = SymbolStats::default();
        stats.get_statistics(&currentstore);
        if lastrandomstep != -1 {
            /* This makes it converge slower but better. Do it only once the
            randomness kicks in so that if the user does few iterations, it gives a
            better result sooner. */
            stats = SymbolStats::add_weighed_freqs(&stats, 1.0, &laststats, 0.5);
            stats.calculate_entropy();
        }
        if i > 5 && cost == lastcost {
            stats = beststats;
            stats.randomize_freqs(&mut ran_state);
            stats.calculate_entropy();
            lastrandomstep = i;
        }
        lastcost = cost;
    }

    outputstore
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Options;

    #[test]
    fn fixed_cost_model_matches_fixed_tree() {
        assert_eq!(get_cost_fixed(0, 0), 8.0);
        assert_eq!(get_cost_fixed(143, 0), 8.0);
        assert_eq!(get_cost_fixed(144, 0), 9.0);
        assert_eq!(get_cost_fixed(255, 0), 9.0);
        // Length 3 symbol (257) takes 7 bits, a distance symbol 5 bits, no extra.
        assert_eq!(get_cost_fixed(3, 1), 12.0);
        // Length 258 symbol (285) takes 8 bits plus 13 distance extra bits.
        assert_eq!(get_cost_fixed(258, 32768), 8.0 + 5.0 + 13.0);
    }

    #[test]
    fn entropy_of_uniform_counts() {
        let mut stats = SymbolStats::default();
        stats.litlens[0] = 1;
        stats.litlens[1] = 1;
        stats.calculate_entropy();
        assert!((stats.ll_symbols[0] - 1.0).abs() < 1e-9);
        assert!((stats.ll_symbols[1] - 1.0).abs() < 1e-9);
        // Unused symbols get the cost of a single occurrence.
        assert!((stats.ll_symbols[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn trace_walks_the_length_array_forward() {
        let mut length_array = vec![0u16; 6];
        length_array[1] = 1;
        length_array[2] = 1;
        length_array[5] = 3;
        assert_eq!(trace(5, &length_array), vec![1, 1, 3]);
        assert_eq!(trace(0, &length_array), Vec::<u16>::new());
    }

    #[test]
    fn random_perturbation_is_deterministic() {
        let mut a = RanState::new();
        let mut b = RanState::new();
        let seq_a: Vec<u32> = (0..8).map(|_| a.ran()).collect();
        let seq_b: Vec<u32> = (0..8).map(|_| b.ran()).collect();
        assert_eq!(seq_a, seq_b);
        assert!(seq_a.iter().any(|&v| v != seq_a[0]));
    }

    #[test]
    fn optimal_parse_is_no_worse_than_greedy() {
        let data: Vec<u8> = b"this is a test. this is a test. this is a test. and more tests."
            .iter()
            .copied()
            .cycle()
            .take(2048)
            .collect();
        let options = Options::default();

        let mut greedy_state = BlockState::new_without_cache(&options, 0, data.len());
        let mut greedy_store = Lz77Store::new();
        greedy_store.greedy(&mut greedy_state, &data, 0, data.len());
        let greedy_cost =
            calculate_block_size(&greedy_store, 0, greedy_store.size(), BlockType::Dynamic);

        let mut state = BlockState::new(&options, 0, data.len());
        let optimal_store = lz77_optimal(&mut state, &data, 5);
        let optimal_cost =
            calculate_block_size(&optimal_store, 0, optimal_store.size(), BlockType::Dynamic);

        assert!(optimal_cost <= greedy_cost);
        let total: usize = optimal_store.litlens.iter().map(LitLen::size).sum();
        assert_eq!(total, data.len());
    }
}
