use std::cmp;

use crate::cache::{Cache, LongestMatchCache, NoCache};
use crate::hash::{Which, WindowHash};
use crate::symbols::{get_dist_symbol, get_length_symbol};
use crate::util::{MAX_CHAIN_HITS, MAX_MATCH, MIN_MATCH, NUM_D, NUM_LL, WINDOW_MASK, WINDOW_SIZE};
use crate::Options;

#[derive(Clone, Debug, Copy)]
pub enum LitLen {
    Literal(u16),
    LengthDist(u16, u16),
}

impl LitLen {
    pub fn size(&self) -> usize {
        match *self {
            LitLen::Literal(_) => 1,
            LitLen::LengthDist(len, _) => len as usize,
        }
    }
}

/// Stores lit/length and dist pairs for LZ77.
/// A `LitLen::Literal` entry is a literal byte, a `LitLen::LengthDist` is a
/// back-reference. Alongside the symbols, cumulative histograms are kept per
/// chunk of entries so a histogram over a range can be computed by subtraction
/// instead of a full scan.
#[derive(Debug, Clone, Default)]
pub struct Lz77Store {
    pub litlens: Vec<LitLen>,

    pub pos: Vec<usize>,

    ll_symbol: Vec<u16>,
    d_symbol: Vec<u16>,

    ll_counts: Vec<usize>,
    d_counts: Vec<usize>,
}

impl Lz77Store {
    pub fn new() -> Lz77Store {
        Lz77Store::default()
    }

    pub fn reset(&mut self) {
        self.litlens.clear();
        self.pos.clear();
        self.ll_symbol.clear();
        self.d_symbol.clear();
        self.ll_counts.clear();
        self.d_counts.clear();
    }

    pub fn size(&self) -> usize {
        self.litlens.len()
    }

    pub fn append_store_item(&mut self, litlen: LitLen, pos: usize) {
        let origsize = self.litlens.len();
        let llstart = NUM_LL * (origsize / NUM_LL);
        let dstart = NUM_D * (origsize / NUM_D);

        // Start a new cumulative histogram chunk by repeating the last one.
        if origsize % NUM_LL == 0 {
            if origsize == 0 {
                self.ll_counts.resize(NUM_LL, 0);
            } else {
                let mut last_histogram = self.ll_counts[(origsize - NUM_LL)..origsize].to_vec();
                self.ll_counts.append(&mut last_histogram);
            }
        }
        if origsize % NUM_D == 0 {
            if origsize == 0 {
                self.d_counts.resize(NUM_D, 0);
            } else {
                let mut last_histogram = self.d_counts[(origsize - NUM_D)..origsize].to_vec();
                self.d_counts.append(&mut last_histogram);
            }
        }

        self.pos.push(pos);
        self.litlens.push(litlen);
        match litlen {
            LitLen::Literal(lit) => {
                self.ll_symbol.push(lit);
                self.d_symbol.push(0);
                self.ll_counts[llstart + lit as usize] += 1;
            }
            LitLen::LengthDist(length, dist) => {
                debug_assert!((length as usize) < 259);
                let len_sym = get_length_symbol(length as usize);
                let d_sym = get_dist_symbol(dist);
                self.ll_symbol.push(len_sym as u16);
                self.d_symbol.push(d_sym as u16);
                self.ll_counts[llstart + len_sym] += 1;
                self.d_counts[dstart + d_sym] += 1;
            }
        }
    }

    pub fn lit_len_dist(&mut self, length: u16, dist: u16, pos: usize) {
        let litlen = if dist == 0 {
            LitLen::Literal(length)
        } else {
            LitLen::LengthDist(length, dist)
        };

        self.append_store_item(litlen, pos);
    }

    /// Does LZ77 using an algorithm similar to gzip, with lazy matching, rather than
    /// with the slow but better "squeeze" implementation.
    /// The result is placed in the store.
    /// If instart is larger than 0, it uses values before instart as starting
    /// dictionary.
    pub fn greedy<C>(&mut self, s: &mut BlockState<C>, in_data: &[u8], instart: usize, inend: usize)
    where
        C: Cache,
    {
        if instart == inend {
            return;
        }
        let windowstart = instart.saturating_sub(WINDOW_SIZE);
        let mut h = WindowHash::new();

        let arr = &in_data[..inend];
        h.warmup(arr, windowstart, inend);

        for i in windowstart..instart {
            h.update(arr, i);
        }

        let mut i = instart;
        let mut leng;
        let mut dist;
        let mut lengthscore;

        /* Lazy matching. */
        let mut prev_length = 0;
        let mut prev_match = 0;
        let mut prevlengthscore;
        let mut match_available = false;
        while i < inend {
            h.update(arr, i);

            let longest_match = find_longest_match(s, &mut h, arr, i, inend, MAX_MATCH, &mut None);
            dist = longest_match.distance;
            leng = longest_match.length;
            lengthscore = get_length_score(i32::from(leng), i32::from(dist));

            /* Lazy matching. */
            prevlengthscore = get_length_score(prev_length, prev_match);
            if match_available {
                match_available = false;
                if lengthscore > prevlengthscore + 1 {
                    self.lit_len_dist(u16::from(arr[i - 1]), 0, i - 1);
                    if lengthscore >= MIN_MATCH as i32 && (leng as usize) < MAX_MATCH {
                        match_available = true;
                        prev_length = i32::from(leng);
                        prev_match = i32::from(dist);
                        i += 1;
                        continue;
                    }
                } else {
                    /* Add previous to output. */
                    leng = prev_length as u16;
                    dist = prev_match as u16;
                    verify_len_dist(arr, i - 1, dist, leng);
                    self.lit_len_dist(leng, dist, i - 1);
                    for _ in 2..leng {
                        debug_assert!(i < inend);
                        i += 1;
                        h.update(arr, i);
                    }
                    i += 1;
                    continue;
                }
            } else if lengthscore >= MIN_MATCH as i32 && (leng as usize) < MAX_MATCH {
                match_available = true;
                prev_length = i32::from(leng);
                prev_match = i32::from(dist);
                i += 1;
                continue;
            }
            /* End of lazy matching. */

            /* Add to output. */
            if lengthscore >= MIN_MATCH as i32 {
                verify_len_dist(arr, i, dist, leng);
                self.lit_len_dist(leng, dist, i);
            } else {
                leng = 1;
                self.lit_len_dist(u16::from(arr[i]), 0, i);
            }
            for _ in 1..leng {
                debug_assert!(i < inend);
                i += 1;
                h.update(arr, i);
            }
            i += 1;
        }
    }

    /// Replays a path of lengths produced by the shortest-path parser,
    /// re-querying the matcher for the distance at every back-reference.
    pub fn follow_path<C>(
        &mut self,
        in_data: &[u8],
        instart: usize,
        inend: usize,
        path: &[u16],
        s: &mut BlockState<C>,
    ) where
        C: Cache,
    {
        if instart == inend {
            return;
        }

        let windowstart = instart.saturating_sub(WINDOW_SIZE);
        let mut h = WindowHash::new();

        let arr = &in_data[..inend];
        h.warmup(arr, windowstart, inend);

        for i in windowstart..instart {
            h.update(arr, i);
        }

        let mut pos = instart;
        for &item in path {
            let mut length = item;
            debug_assert!(pos < inend);

            h.update(arr, pos);

            // Add to output.
            if length >= MIN_MATCH as u16 {
                // Get the distance by recalculating longest match. The found length
                // should match the length from the path.
                let longest_match =
                    find_longest_match(s, &mut h, arr, pos, inend, length as usize, &mut None);
                let found_length = longest_match.length;
                let dist = longest_match.distance;
                debug_assert!(!(found_length != length && length > 2 && found_length > 2));
                verify_len_dist(arr, pos, dist, length);
                self.lit_len_dist(length, dist, pos);
            } else {
                length = 1;
                self.lit_len_dist(u16::from(arr[pos]), 0, pos);
            }

            debug_assert!(pos + length as usize <= inend);
            for j in 1..length as usize {
                h.update(arr, pos + j);
            }

            pos += length as usize;
        }
    }

    fn get_histogram_at(&self, lpos: usize) -> (Vec<usize>, Vec<usize>) {
        let mut ll = vec![0; NUM_LL];
        let mut d = vec![0; NUM_D];

        /* The real histogram is created by using the histogram for this chunk, but
        all superfluous values of this chunk subtracted. */
        let llpos = NUM_LL * (lpos / NUM_LL);
        let dpos = NUM_D * (lpos / NUM_D);

        for (i, item) in ll.iter_mut().enumerate() {
            *item = self.ll_counts[llpos + i];
        }
        let end = cmp::min(llpos + NUM_LL, self.size());
        for i in (lpos + 1)..end {
            ll[self.ll_symbol[i] as usize] -= 1;
        }

        for (i, item) in d.iter_mut().enumerate() {
            *item = self.d_counts[dpos + i];
        }
        let end = cmp::min(dpos + NUM_D, self.size());
        for i in (lpos + 1)..end {
            if let LitLen::LengthDist(_, _) = self.litlens[i] {
                d[self.d_symbol[i] as usize] -= 1;
            }
        }

        (ll, d)
    }

    /// Gets the histogram of lit/len and dist symbols in the given range, using the
    /// cumulative histograms, so faster than adding one by one for large range. Does
    /// not add the one end symbol of value 256.
    pub fn get_histogram(&self, lstart: usize, lend: usize) -> (Vec<usize>, Vec<usize>) {
        if lstart + NUM_LL * 3 > lend {
            let mut ll_counts = vec![0; NUM_LL];
            let mut d_counts = vec![0; NUM_D];
            for i in lstart..lend {
                ll_counts[self.ll_symbol[i] as usize] += 1;
                if let LitLen::LengthDist(_, _) = self.litlens[i] {
                    d_counts[self.d_symbol[i] as usize] += 1;
                }
            }
            (ll_counts, d_counts)
        } else {
            /* Subtract the cumulative histograms at the end and the start to get the
            histogram for this range. */
            let (ll, d) = self.get_histogram_at(lend - 1);

            if lstart > 0 {
                let (ll2, d2) = self.get_histogram_at(lstart - 1);

                (
                    ll.iter().zip(ll2.iter()).map(|(&a, &b)| a - b).collect(),
                    d.iter().zip(d2.iter()).map(|(&a, &b)| a - b).collect(),
                )
            } else {
                (ll, d)
            }
        }
    }

    /// Byte count of the input covered by the range [lstart, lend).
    pub fn get_byte_range(&self, lstart: usize, lend: usize) -> usize {
        if lstart == lend {
            return 0;
        }

        let l = lend - 1;
        self.pos[l] + self.litlens[l].size() - self.pos[lstart]
    }
}

/// Some state information for compressing a block.
/// This is currently a bit under-used (with mainly only the longest match cache),
/// but is kept for easy future expansion.
pub struct BlockState<'a, C> {
    pub options: &'a Options,
    /* Cache for length/distance pairs found so far. */
    lmc: C,
    /* The start (inclusive) and end (not inclusive) of the current block. */
    pub blockstart: usize,
    pub blockend: usize,
}

impl<'a> BlockState<'a, LongestMatchCache> {
    pub fn new(options: &'a Options, blockstart: usize, blockend: usize) -> Self {
        BlockState {
            options,
            blockstart,
            blockend,
            lmc: LongestMatchCache::new(blockend - blockstart),
        }
    }
}

impl<'a> BlockState<'a, NoCache> {
    pub fn new_without_cache(options: &'a Options, blockstart: usize, blockend: usize) -> Self {
        BlockState {
            options,
            blockstart,
            blockend,
            lmc: NoCache,
        }
    }
}

pub struct LongestMatch {
    pub distance: u16,
    pub length: u16,
    pub from_cache: bool,
    pub limit: usize,
}

impl LongestMatch {
    pub fn new(limit: usize) -> Self {
        LongestMatch {
            distance: 0,
            length: 0,
            from_cache: false,
            limit,
        }
    }
}

/// Finds how many bytes starting from `scan_offset`, and from `match_offset`, are
/// equal. Returns the first offset after `scan_offset` whose byte no longer equals
/// the corresponding byte after `match_offset`. `end` is the last possible byte,
/// beyond which to stop looking.
fn get_match(array: &[u8], scan_offset: usize, match_offset: usize, end: usize) -> usize {
    let mut scan_offset = scan_offset;
    let mut match_offset = match_offset;

    /* 8 checks at once per slice comparison. */
    while scan_offset + 8 <= end
        && array[scan_offset..scan_offset + 8] == array[match_offset..match_offset + 8]
    {
        scan_offset += 8;
        match_offset += 8;
    }

    /* The remaining few bytes. */
    while scan_offset != end && array[scan_offset] == array[match_offset] {
        scan_offset += 1;
        match_offset += 1;
    }

    scan_offset
}

/// Finds the longest match (length and corresponding distance) for LZ77
/// compression. If `sublen` is provided, it is filled with the distance that
/// belongs to every shorter-than-the-best length as well.
pub fn find_longest_match<C>(
    s: &mut BlockState<C>,
    h: &mut WindowHash,
    array: &[u8],
    pos: usize,
    size: usize,
    limit: usize,
    sublen: &mut Option<&mut [u16]>,
) -> LongestMatch
where
    C: Cache,
{
    let mut longest_match = s.lmc.try_get(pos, limit, sublen, s.blockstart);

    if longest_match.from_cache {
        debug_assert!(pos + longest_match.length as usize <= size);
        return longest_match;
    }

    let mut limit = longest_match.limit;

    debug_assert!(limit <= MAX_MATCH);
    debug_assert!(limit >= MIN_MATCH);
    debug_assert!(pos < size);

    if size - pos < MIN_MATCH {
        /* The rest of the code assumes there are at least MIN_MATCH bytes to try. */
        longest_match.distance = 0;
        longest_match.length = 0;
        longest_match.from_cache = false;
        longest_match.limit = 0;
        return longest_match;
    }

    if pos + limit > size {
        limit = size - pos;
    }

    let (bestdist, bestlength) = find_longest_match_loop(h, array, pos, size, limit, sublen);

    s.lmc.store(
        pos,
        limit,
        &*sublen,
        bestdist as u16,
        bestlength as u16,
        s.blockstart,
    );

    debug_assert!(bestlength <= limit);
    debug_assert!(pos + bestlength <= size);
    longest_match.distance = bestdist as u16;
    longest_match.length = bestlength as u16;
    longest_match.from_cache = false;
    longest_match.limit = limit;
    longest_match
}

fn find_longest_match_loop(
    h: &mut WindowHash,
    array: &[u8],
    pos: usize,
    size: usize,
    limit: usize,
    sublen: &mut Option<&mut [u16]>,
) -> (i32, usize) {
    let mut which_hash = Which::Hash1;
    debug_assert!(h.val(which_hash) < 65536);
    /* During the whole loop, p == hprev[pp]. */
    let mut pp = h.head_at(h.val(which_hash) as usize, which_hash);
    let mut p = h.prev_at(pp as usize, which_hash);

    let hpos = pos & WINDOW_MASK;
    debug_assert_eq!(pp as usize, hpos);

    let mut dist = if i32::from(p) < pp {
        pp - i32::from(p)
    } else {
        (WINDOW_SIZE - p as usize) as i32 + pp
    };

    let mut bestlength = 1;
    let mut bestdist = 0;
    let mut chain_counter = MAX_CHAIN_HITS; /* For quitting early. */
    let arrayend = pos + limit;

    /* Go through all distances. */
    while (dist as usize) < WINDOW_SIZE {
        let mut currentlength = 0;

        debug_assert!((p as usize) < WINDOW_SIZE);
        debug_assert_eq!(p, h.prev_at(pp as usize, which_hash));
        debug_assert_eq!(h.hash_val_at(p as usize, which_hash), h.val(which_hash));

        if dist > 0 {
            debug_assert!(pos < size);
            debug_assert!(dist as usize <= pos);
            let mut scan_offset = pos;
            let mut match_offset = pos - dist as usize;

            /* Testing the byte at position bestlength first, goes slightly faster. */
            if pos + bestlength >= size
                || array[scan_offset + bestlength] == array[match_offset + bestlength]
            {
                let same0 = h.same[pos & WINDOW_MASK];
                if same0 > 2 && array[scan_offset] == array[match_offset] {
                    let same1 = h.same[(pos - dist as usize) & WINDOW_MASK];
                    let same = cmp::min(cmp::min(same0, same1) as usize, limit);
                    scan_offset += same;
                    match_offset += same;
                }
                scan_offset = get_match(array, scan_offset, match_offset, arrayend);
                currentlength = scan_offset - pos; /* The found length. */
            }

            if currentlength > bestlength {
                if let Some(ref mut subl) = sublen {
                    for item in subl.iter_mut().take(currentlength + 1).skip(bestlength + 1) {
                        *item = dist as u16;
                    }
                }
                bestdist = dist;
                bestlength = currentlength;
                if currentlength >= limit {
                    break;
                }
            }
        }

        /* Switch to the other hash once this will be more efficient. */
        if which_hash == Which::Hash1
            && bestlength >= h.same[hpos] as usize
            && h.val(Which::Hash2) == h.hash_val_at(p as usize, Which::Hash2)
        {
            /* Now use the hash that encodes the length and first byte. */
            which_hash = Which::Hash2;
        }

        pp = i32::from(p);
        p = h.prev_at(p as usize, which_hash);
        if i32::from(p) == pp {
            break; /* Uninited prev value. */
        }

        dist += if i32::from(p) < pp {
            pp - i32::from(p)
        } else {
            (WINDOW_SIZE - p as usize) as i32 + pp
        };

        chain_counter -= 1;
        if chain_counter == 0 {
            break;
        }
    }
    (bestdist, bestlength)
}

/// Gets a score of the length given the distance. Typically, the score of the
/// length is the length itself, but if the distance is very long, decrease the
/// score of the length a bit to make up for the fact that long distances use large
/// amounts of extra bits.
///
/// This is not an accurate score, it is a heuristic only for the greedy LZ77
/// implementation. More accurate cost models are employed later.
fn get_length_score(length: i32, distance: i32) -> i32 {
    // At 1024, the distance uses 9+ extra bits and this seems to be the sweet spot
    // on tested files.
    if distance > 1024 {
        length - 1
    } else {
        length
    }
}

fn verify_len_dist(data: &[u8], pos: usize, dist: u16, length: u16) {
    if cfg!(debug_assertions) {
        for i in 0..length as usize {
            debug_assert_eq!(data[pos - dist as usize + i], data[pos + i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(data: &[u8], pos: usize) -> (u16, u16) {
        let options = Options::default();
        let mut s = BlockState::new_without_cache(&options, 0, data.len());
        let mut h = WindowHash::new();
        h.warmup(data, 0, data.len());
        for i in 0..=pos {
            h.update(data, i);
        }
        let m = find_longest_match(&mut s, &mut h, data, pos, data.len(), MAX_MATCH, &mut None);
        (m.length, m.distance)
    }

    #[test]
    fn finds_nearest_longest_match() {
        // "abcde" repeats at distance 5.
        let data = b"abcdeabcde";
        assert_eq!(find(data, 5), (5, 5));
    }

    #[test]
    fn no_match_on_unique_data() {
        let data = b"abcdefgh";
        let (len, dist) = find(data, 4);
        assert!(len < MIN_MATCH as u16);
        assert_eq!(dist, 0);
    }

    #[test]
    fn sublen_has_distance_for_every_length() {
        let data = b"xyzw_xyz_xyzw";
        let options = Options::default();
        let mut s = BlockState::new_without_cache(&options, 0, data.len());
        let mut h = WindowHash::new();
        h.warmup(data, 0, data.len());
        for i in 0..=9 {
            h.update(data, i);
        }
        let mut sublen = vec![0u16; MAX_MATCH + 1];
        let m = find_longest_match(
            &mut s,
            &mut h,
            data,
            9,
            data.len(),
            MAX_MATCH,
            &mut Some(&mut sublen),
        );
        // Longest match is "xyzw" at distance 9, but "xyz" is also available
        // closer by at distance 4.
        assert_eq!((m.length, m.distance), (4, 9));
        assert_eq!(sublen[3], 4);
        assert_eq!(sublen[4], 9);
    }

    #[test]
    fn greedy_parses_repetitive_input_with_matches() {
        let data = b"blah blah blah blah blah!";
        let options = Options::default();
        let mut s = BlockState::new_without_cache(&options, 0, data.len());
        let mut store = Lz77Store::new();
        store.greedy(&mut s, data, 0, data.len());
        assert!(store.size() < data.len());
        assert!(store
            .litlens
            .iter()
            .any(|l| matches!(l, LitLen::LengthDist(_, _))));
        // The parse must cover the input exactly.
        let total: usize = store.litlens.iter().map(LitLen::size).sum();
        assert_eq!(total, data.len());
    }

    #[test]
    fn histograms_match_between_small_and_cumulative_paths() {
        let mut store = Lz77Store::new();
        // More than three histogram chunks of entries.
        for i in 0..NUM_LL * 4 {
            if i % 7 == 3 {
                store.append_store_item(LitLen::LengthDist(3 + (i % 250) as u16, 1), i);
            } else {
                store.append_store_item(LitLen::Literal((i % 256) as u16), i);
            }
        }
        let lstart = 5;
        let lend = store.size() - 3;
        let (ll_fast, d_fast) = store.get_histogram(lstart, lend);
        let mut ll_slow = vec![0usize; NUM_LL];
        let mut d_slow = vec![0usize; NUM_D];
        for i in lstart..lend {
            ll_slow[store.ll_symbol[i] as usize] += 1;
            if let LitLen::LengthDist(_, _) = store.litlens[i] {
                d_slow[store.d_symbol[i] as usize] += 1;
            }
        }
        assert_eq!(ll_fast, ll_slow);
        assert_eq!(d_fast, d_slow);
    }

    #[test]
    fn byte_range_spans_literals_and_matches() {
        let mut store = Lz77Store::new();
        store.append_store_item(LitLen::Literal(65), 0);
        store.append_store_item(LitLen::LengthDist(10, 1), 1);
        store.append_store_item(LitLen::Literal(66), 11);
        assert_eq!(store.get_byte_range(0, 3), 12);
        assert_eq!(store.get_byte_range(1, 2), 10);
        assert_eq!(store.get_byte_range(1, 1), 0);
    }
}
