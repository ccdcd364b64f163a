use log::debug;

use crate::deflate::calculate_block_size_auto_type;
use crate::lz77::{BlockState, Lz77Store};
use crate::util::LARGE_FLOAT;
use crate::Options;

/// Finds minimum of function `f(i)` where `i` is in range `start..end` (excluding
/// end). Returns the index of the minimum and the minimum value itself.
fn find_minimum<F: Fn(usize) -> f64>(f: F, start: usize, end: usize) -> (usize, f64) {
    let mut start = start;
    let mut end = end;
    if end - start < 1024 {
        let mut best = LARGE_FLOAT;
        let mut result = start;
        for i in start..end {
            let v = f(i);
            if v < best {
                best = v;
                result = i;
            }
        }
        (result, best)
    } else {
        /* Try to find minimum faster by recursively checking multiple points. */
        const NUM: usize = 9; /* Good value: 9. */
        let mut p = [0; NUM];
        let mut vp = [0.0; NUM];
        let mut lastbest = LARGE_FLOAT;
        let mut pos = start;

        loop {
            if end - start <= NUM {
                break;
            }

            for (i, (pi, vpi)) in p.iter_mut().zip(vp.iter_mut()).enumerate() {
                *pi = start + (i + 1) * ((end - start) / (NUM + 1));
                *vpi = f(*pi);
            }

            let mut besti = 0;
            let mut best = vp[0];

            for (i, &v) in vp.iter().enumerate().skip(1) {
                if v < best {
                    best = v;
                    besti = i;
                }
            }
            if best > lastbest {
                break;
            }

            start = if besti == 0 { start } else { p[besti - 1] };
            end = if besti == NUM - 1 { end } else { p[besti + 1] };

            pos = p[besti];
            lastbest = best;
        }
        (pos, lastbest)
    }
}

/// Returns estimated cost of a block in bits. It includes the size to encode the
/// tree and the size to encode all literal, length and distance symbols and their
/// extra bits.
fn estimate_cost(lz77: &Lz77Store, lstart: usize, lend: usize) -> f64 {
    calculate_block_size_auto_type(lz77, lstart, lend)
}

/// Finds next block to try to split, the largest of the available ones.
/// The largest is chosen to make sure that if only a limited amount of blocks is
/// requested, their sizes are spread evenly.
/// `lz77size`: the size of the LZ77 data, which is the size of the done array here.
/// `done`: array indicating which blocks starting at that position are no longer
///     splittable (splitting them increases rather than decreases cost).
/// `splitpoints`: the splitpoints found so far.
fn find_largest_splittable_block(
    lz77size: usize,
    done: &[bool],
    splitpoints: &[usize],
) -> Option<(usize, usize)> {
    let mut longest = 0;
    let mut found = None;
    let npoints = splitpoints.len();

    for i in 0..=npoints {
        let start = if i == 0 { 0 } else { splitpoints[i - 1] };
        let end = if i == npoints {
            lz77size - 1
        } else {
            splitpoints[i]
        };
        if !done[start] && end - start > longest {
            found = Some((start, end));
            longest = end - start;
        }
    }

    found
}

/// Converts LZ77 splitpoint indices to positions in the uncompressed input.
fn lz77_positions_to_input_positions(
    lz77: &Lz77Store,
    lz77splitpoints: &[usize],
    pos_offset: usize,
) -> Vec<usize> {
    let nlz77points = lz77splitpoints.len();
    let mut splitpoints = Vec::with_capacity(nlz77points);

    let mut pos = pos_offset;
    if nlz77points > 0 {
        for (i, litlen) in lz77.litlens.iter().enumerate() {
            if lz77splitpoints[splitpoints.len()] == i {
                splitpoints.push(pos);
                if splitpoints.len() == nlz77points {
                    break;
                }
            }
            pos += litlen.size();
        }
    }
    debug_assert_eq!(splitpoints.len(), nlz77points);
    splitpoints
}

/// Does blocksplitting on LZ77 data.
/// The output splitpoints are indices in the LZ77 data.
/// `maxblocks`: set a limit to the amount of blocks. Set to 0 to mean no limit.
pub fn blocksplit_lz77(lz77: &Lz77Store, maxblocks: usize) -> Vec<usize> {
    let mut splitpoints = Vec::new();

    if lz77.size() < 10 {
        return splitpoints; /* This code fails on tiny files. */
    }

    let mut numblocks = 1;
    let mut done = vec![false; lz77.size()];
    let mut lstart = 0;
    let mut lend = lz77.size();

    loop {
        if maxblocks > 0 && numblocks >= maxblocks {
            break;
        }

        debug_assert!(lstart < lend);
        let (llpos, splitcost) =
            find_minimum(|i| estimate_cost(lz77, lstart, i) + estimate_cost(lz77, i, lend), lstart + 1, lend);

        debug_assert!(llpos > lstart);
        debug_assert!(llpos < lend);

        let origcost = estimate_cost(lz77, lstart, lend);

        if splitcost > origcost || llpos == lstart + 1 || llpos == lend {
            done[lstart] = true;
        } else {
            splitpoints.push(llpos);
            splitpoints.sort_unstable();
            numblocks += 1;
        }

        match find_largest_splittable_block(lz77.size(), &done, &splitpoints) {
            None => break, /* No further split will probably reduce compression. */
            Some((start, end)) => {
                lstart = start;
                lend = end;
                if lend - lstart < 10 {
                    break;
                }
            }
        }
    }

    if log::log_enabled!(log::Level::Debug) && !splitpoints.is_empty() {
        let positions = lz77_positions_to_input_positions(lz77, &splitpoints, 0);
        debug!("block split points: {:?}", positions);
    }

    splitpoints
}

/// Does blocksplitting on uncompressed data.
/// The output splitpoints are indices in the uncompressed bytes.
///
/// `in_data`: uncompressed input data
/// `instart`: where to start splitting
/// `inend`: where to end splitting (not inclusive)
/// `maxblocks`: maximum amount of blocks to split into, or 0 for no limit
pub fn blocksplit(
    options: &Options,
    in_data: &[u8],
    instart: usize,
    inend: usize,
    maxblocks: usize,
) -> Vec<usize> {
    let mut s = BlockState::new_without_cache(options, instart, inend);
    let mut store = Lz77Store::new();

    /* Unintuitively, using a simple LZ77 method here instead of lz77_optimal
    results in better blocks. */
    store.greedy(&mut s, in_data, instart, inend);

    let lz77splitpoints = blocksplit_lz77(&store, maxblocks);

    /* Convert LZ77 positions to positions in the uncompressed input. */
    lz77_positions_to_input_positions(&store, &lz77splitpoints, instart)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_minimum_exhaustive_on_small_ranges() {
        let f = |i: usize| ((i as f64) - 37.0).abs() + 2.0;
        let (pos, value) = find_minimum(f, 0, 100);
        assert_eq!(pos, 37);
        assert_eq!(value, 2.0);
    }

    #[test]
    fn find_minimum_narrows_large_ranges() {
        let f = |i: usize| ((i as f64) - 20_000.0).powi(2);
        let (pos, value) = find_minimum(f, 0, 100_000);
        // The adaptive search is approximate but must get close on a convex
        // function.
        assert!((19_000..=21_000).contains(&pos));
        assert!(value <= f(19_000).min(f(21_000)));
    }

    #[test]
    fn tiny_stores_are_never_split() {
        let mut store = Lz77Store::new();
        for i in 0..9 {
            store.append_store_item(crate::lz77::LitLen::Literal(i as u16), i);
        }
        assert!(blocksplit_lz77(&store, 0).is_empty());
    }

    #[test]
    fn heterogeneous_data_gets_split() {
        // First half text-like, second half a single byte run: distinct
        // statistics on each side of the boundary.
        let mut data = Vec::new();
        for i in 0..10_000 {
            data.push((i % 251) as u8);
        }
        data.extend(std::iter::repeat(b'z').take(10_000));

        let options = Options::default();
        let splitpoints = blocksplit(&options, &data, 0, data.len(), 15);
        assert!(!splitpoints.is_empty());
        assert!(splitpoints.iter().all(|&p| p > 0 && p < data.len()));
        // Points come out sorted and unique.
        assert!(splitpoints.windows(2).all(|w| w[0] < w[1]));
    }
}
