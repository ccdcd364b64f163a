use crate::lz77::LongestMatch;
use crate::util::{CACHE_LENGTH, MAX_MATCH, MIN_MATCH};

/// Cache used by the longest match finder to remember previously found
/// length/dist values.
/// This is needed because the squeeze runs will ask these values multiple times for
/// the same position.
/// Uses large amounts of memory, since it has to remember the distance belonging
/// to every possible shorter-than-the-best length (the so called "sublen" array).
pub trait Cache {
    fn try_get(
        &self,
        pos: usize,
        limit: usize,
        sublen: &mut Option<&mut [u16]>,
        blockstart: usize,
    ) -> LongestMatch;

    fn store(
        &mut self,
        pos: usize,
        limit: usize,
        sublen: &Option<&mut [u16]>,
        distance: u16,
        length: u16,
        blockstart: usize,
    );
}

/// No-op cache for passes that query each position only once, such as the
/// greedy pre-pass.
pub struct NoCache;

impl Cache for NoCache {
    fn try_get(
        &self,
        _pos: usize,
        limit: usize,
        _sublen: &mut Option<&mut [u16]>,
        _blockstart: usize,
    ) -> LongestMatch {
        LongestMatch::new(limit)
    }

    fn store(
        &mut self,
        _pos: usize,
        _limit: usize,
        _sublen: &Option<&mut [u16]>,
        _distance: u16,
        _length: u16,
        _blockstart: usize,
    ) {
    }
}

pub struct LongestMatchCache {
    length: Vec<u16>,
    dist: Vec<u16>,
    sublen: Vec<u8>,
}

impl LongestMatchCache {
    pub fn new(blocksize: usize) -> LongestMatchCache {
        LongestMatchCache {
            /* Zero length and zero dist marks a position that has not been
            filled in yet. A stored "no match here" gets length 1, dist 0. */
            length: vec![0; blocksize],
            dist: vec![0; blocksize],
            /* Rather large amount of memory. */
            sublen: vec![0; CACHE_LENGTH * blocksize * 3],
        }
    }

    fn is_filled(&self, pos: usize) -> bool {
        self.length[pos] != 0 || self.dist[pos] != 0
    }

    /// Returns the length up to which could be stored in the cache.
    fn max_sublen(&self, pos: usize) -> u32 {
        let start = CACHE_LENGTH * pos * 3;
        if self.sublen[start + 1] == 0 && self.sublen[start + 2] == 0 {
            return 0; // No sublen cached.
        }
        u32::from(self.sublen[start + (CACHE_LENGTH - 1) * 3]) + 3
    }

    /// Stores sublen array in the cache as runs of equal distance.
    fn store_sublen(&mut self, sublen: &[u16], pos: usize, length: usize) {
        if length < MIN_MATCH {
            return;
        }

        let start = CACHE_LENGTH * pos * 3;
        let mut j = 0;
        let mut bestlength = 0;
        for i in MIN_MATCH..=length {
            if i == length || sublen[i] != sublen[i + 1] {
                self.sublen[start + j * 3] = (i - 3) as u8;
                self.sublen[start + j * 3 + 1] = (sublen[i] & 0xff) as u8;
                self.sublen[start + j * 3 + 2] = (sublen[i] >> 8) as u8;
                bestlength = i as u32;
                j += 1;
                if j >= CACHE_LENGTH {
                    break;
                }
            }
        }

        if j < CACHE_LENGTH {
            debug_assert_eq!(bestlength, length as u32);
            self.sublen[start + (CACHE_LENGTH - 1) * 3] = (bestlength - 3) as u8;
        } else {
            debug_assert!(bestlength <= length as u32);
        }
        debug_assert_eq!(bestlength, self.max_sublen(pos));
    }

    /// Expands the cached runs back into a sublen array.
    fn fetch_sublen(&self, pos: usize, length: usize, sublen: &mut [u16]) {
        if length < MIN_MATCH {
            return;
        }

        let start = CACHE_LENGTH * pos * 3;
        let maxlength = self.max_sublen(pos) as usize;
        let mut prevlength = 0;

        for j in 0..CACHE_LENGTH {
            let length = self.sublen[start + j * 3] as usize + 3;
            let dist =
                u16::from(self.sublen[start + j * 3 + 1]) | u16::from(self.sublen[start + j * 3 + 2]) << 8;

            for item in sublen.iter_mut().take(length + 1).skip(prevlength) {
                *item = dist;
            }
            if length == maxlength {
                break;
            }
            prevlength = length + 1;
        }
    }
}

impl Cache for LongestMatchCache {
    /// Gets distance, length and sublen values from the cache if possible.
    /// Updates the limit value to a smaller one if possible with more limited
    /// information from the cache.
    fn try_get(
        &self,
        pos: usize,
        limit: usize,
        sublen: &mut Option<&mut [u16]>,
        blockstart: usize,
    ) -> LongestMatch {
        let mut longest_match = LongestMatch::new(limit);
        let lmcpos = pos - blockstart;

        if !self.is_filled(lmcpos) {
            return longest_match;
        }

        let cached_length = self.length[lmcpos];
        let limit_ok_for_cache = limit == MAX_MATCH
            || cached_length as usize <= limit
            || (sublen.is_some() && self.max_sublen(lmcpos) >= limit as u32);

        if limit_ok_for_cache {
            /* A cached "no match here" (length 1) is usable regardless of the
            sublen request, since there are no per-length distances to fetch. */
            if sublen.is_none()
                || (cached_length as usize) < MIN_MATCH
                || u32::from(cached_length) <= self.max_sublen(lmcpos)
            {
                let mut length = cached_length;
                if length as usize > limit {
                    length = limit as u16;
                }
                let distance;
                if let Some(subl) = sublen {
                    self.fetch_sublen(lmcpos, length as usize, subl);
                    distance = if length as usize >= MIN_MATCH {
                        subl[length as usize]
                    } else {
                        0
                    };
                    if limit == MAX_MATCH && length as usize >= MIN_MATCH {
                        debug_assert_eq!(distance, self.dist[lmcpos]);
                    }
                } else {
                    distance = self.dist[lmcpos];
                }
                longest_match.distance = distance;
                longest_match.length = length;
                longest_match.from_cache = true;
                return longest_match;
            }
            /* Can't use much of the cache, since the "sublens" need to be calculated,
            but at least we already know when to stop. */
            longest_match.limit = cached_length as usize;
        }

        longest_match
    }

    /// Stores the found sublen, distance and length in the longest match cache, if
    /// possible.
    fn store(
        &mut self,
        pos: usize,
        limit: usize,
        sublen: &Option<&mut [u16]>,
        distance: u16,
        length: u16,
        blockstart: usize,
    ) {
        if limit != MAX_MATCH || sublen.is_none() {
            return;
        }
        let lmcpos = pos - blockstart;
        if self.is_filled(lmcpos) {
            return;
        }

        debug_assert_eq!(self.length[lmcpos], 0);
        debug_assert_eq!(self.dist[lmcpos], 0);
        if (length as usize) < MIN_MATCH {
            // Remember that no match of at least MIN_MATCH exists here.
            self.dist[lmcpos] = 0;
            self.length[lmcpos] = 1;
        } else {
            self.dist[lmcpos] = distance;
            self.length[lmcpos] = length;
        }
        debug_assert!(self.is_filled(lmcpos));
        if let Some(subl) = sublen {
            self.store_sublen(subl, lmcpos, length as usize);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sublen() -> Vec<u16> {
        // Distances per length: irregular enough to need several runs.
        let mut sublen = vec![0u16; MAX_MATCH + 1];
        for (len, item) in sublen.iter_mut().enumerate().skip(3) {
            *item = match len {
                3..=4 => 100,
                5..=9 => 1,
                10 => 820,
                _ => 0,
            };
        }
        sublen.truncate(11);
        sublen
    }

    #[test]
    fn sublen_survives_cache_roundtrip() {
        let mut c = LongestMatchCache::new(16);
        let sublen = sample_sublen();
        c.store_sublen(&sublen, 5, 10);
        assert_eq!(c.max_sublen(5), 10);

        let mut fetched = vec![0u16; MAX_MATCH + 1];
        c.fetch_sublen(5, 10, &mut fetched);
        assert_eq!(&fetched[3..=10], &sublen[3..=10]);
    }

    #[test]
    fn unfilled_and_no_match_sentinels() {
        let mut c = LongestMatchCache::new(4);
        assert!(!c.is_filled(0));

        // A result below the minimum match length is stored as "no match".
        let mut subl = vec![0u16; MAX_MATCH + 1];
        let sublen = Some(&mut subl[..]);
        c.store(0, MAX_MATCH, &sublen, 0, 1, 0);
        assert!(c.is_filled(0));

        let got = c.try_get(0, MAX_MATCH, &mut None, 0);
        assert!(got.from_cache);
        assert_eq!(got.length, 1);
        assert_eq!(got.distance, 0);

        // The same hit must be served when sublens are requested too.
        let mut fetched = vec![0u16; MAX_MATCH + 1];
        let got = c.try_get(0, MAX_MATCH, &mut Some(&mut fetched[..]), 0);
        assert!(got.from_cache);
        assert_eq!((got.length, got.distance), (1, 0));
    }

    #[test]
    fn stores_only_full_limit_queries() {
        let mut c = LongestMatchCache::new(4);
        let mut subl = vec![0u16; MAX_MATCH + 1];
        subl[3] = 7;
        let sublen = Some(&mut subl[..]);

        // Short limit: must not pollute the cache.
        c.store(1, 10, &sublen, 7, 3, 0);
        assert!(!c.is_filled(1));

        c.store(1, MAX_MATCH, &sublen, 7, 3, 0);
        assert!(c.is_filled(1));
        let got = c.try_get(1, MAX_MATCH, &mut None, 0);
        assert!(got.from_cache);
        assert_eq!((got.length, got.distance), (3, 7));
    }
}
