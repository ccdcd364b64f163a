use crate::util::{MIN_MATCH, WINDOW_MASK, WINDOW_SIZE};

const HASH_SHIFT: i32 = 5;
const HASH_MASK: i32 = 32767;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Which {
    Hash1,
    Hash2,
}

struct HashChain {
    head: Vec<i32>,    /* Hash value to index of its most recent occurrence. */
    prev: Vec<u16>,    /* Index to index of prev. occurrence of same hash. */
    hashval: Vec<i32>, /* Index to hash value at this index. */
    val: i32,          /* Current hash value. */
}

impl HashChain {
    fn new() -> HashChain {
        HashChain {
            head: vec![-1; 65536],
            prev: (0..WINDOW_SIZE as u16).collect(),
            hashval: vec![-1; WINDOW_SIZE],
            val: 0,
        }
    }

    fn reset(&mut self) {
        self.val = 0;
        self.head.fill(-1);
        for (i, p) in self.prev.iter_mut().enumerate() {
            *p = i as u16;
        }
        self.hashval.fill(-1);
    }

    fn link(&mut self, hpos: usize) {
        self.hashval[hpos] = self.val;

        let index = self.val as usize;
        if self.head[index] != -1 && self.hashval[self.head[index] as usize] == self.val {
            self.prev[hpos] = self.head[index] as u16;
        } else {
            self.prev[hpos] = hpos as u16;
        }
        self.head[index] = hpos as i32;
    }
}

/// Sliding window matcher state: two hash chains over the last 32 KiB of
/// input, plus a per-position run length ("same") counter.
pub struct WindowHash {
    hash1: HashChain,
    hash2: HashChain,
    pub same: Vec<u16>, /* Amount of repetitions of same byte after this. */
}

impl WindowHash {
    pub fn new() -> WindowHash {
        WindowHash {
            hash1: HashChain::new(),
            hash2: HashChain::new(),
            same: vec![0; WINDOW_SIZE],
        }
    }

    pub fn reset(&mut self) {
        self.hash1.reset();
        self.hash2.reset();
        self.same.fill(0);
    }

    pub fn warmup(&mut self, arr: &[u8], pos: usize, end: usize) {
        let c = arr[pos];
        self.update_val(c);

        if pos + 1 < end {
            let c = arr[pos + 1];
            self.update_val(c);
        }
    }

    /// Update the sliding hash value with the given byte. All calls to this function
    /// must be made on consecutive input characters. Since the hash value exists out
    /// of multiple input bytes, a few warmups with this function are needed initially.
    fn update_val(&mut self, c: u8) {
        self.hash1.val = ((self.hash1.val << HASH_SHIFT) ^ i32::from(c)) & HASH_MASK;
    }

    pub fn update(&mut self, array: &[u8], pos: usize) {
        // Beyond the end of the input the rolling hash is fed zero bytes.
        let hash_value = array.get(pos + MIN_MATCH - 1).copied().unwrap_or(0);
        self.update_val(hash_value);

        let hpos = pos & WINDOW_MASK;
        self.hash1.link(hpos);

        // Update the run length counter.
        let mut amount: usize = 0;
        let same = self.same[pos.wrapping_sub(1) & WINDOW_MASK];
        if same > 1 {
            amount = same as usize - 1;
        }
        while pos + amount + 1 < array.len()
            && array[pos] == array[pos + amount + 1]
            && amount < u16::MAX as usize
        {
            amount += 1;
        }
        self.same[hpos] = amount as u16;

        self.hash2.val =
            i32::from(((self.same[hpos].wrapping_sub(MIN_MATCH as u16)) & 255) ^ self.hash1.val as u16);
        self.hash2.link(hpos);
    }

    pub fn head_at(&self, index: usize, which: Which) -> i32 {
        match which {
            Which::Hash1 => self.hash1.head[index],
            Which::Hash2 => self.hash2.head[index],
        }
    }

    pub fn prev_at(&self, index: usize, which: Which) -> u16 {
        match which {
            Which::Hash1 => self.hash1.prev[index],
            Which::Hash2 => self.hash2.prev[index],
        }
    }

    pub fn hash_val_at(&self, index: usize, which: Which) -> i32 {
        match which {
            Which::Hash1 => self.hash1.hashval[index],
            Which::Hash2 => self.hash2.hashval[index],
        }
    }

    pub fn val(&self, which: Which) -> i32 {
        match which {
            Which::Hash1 => self.hash1.val,
            Which::Hash2 => self.hash2.val,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_counts_byte_runs() {
        let data = b"aaaaaabcd";
        let mut h = WindowHash::new();
        h.warmup(data, 0, data.len());
        for i in 0..data.len() {
            h.update(data, i);
        }
        // At position 0 there are five more 'a' bytes following.
        assert_eq!(h.same[0], 5);
        assert_eq!(h.same[1], 4);
        assert_eq!(h.same[5], 0);
        assert_eq!(h.same[6], 0);
    }

    #[test]
    fn chains_link_repeated_trigrams() {
        let data = b"abcxxxabc";
        let mut h = WindowHash::new();
        h.warmup(data, 0, data.len());
        for i in 0..data.len() {
            h.update(data, i);
        }
        // The second "abc" at position 6 must chain back to position 0.
        assert_eq!(h.prev_at(6, Which::Hash1), 0);
        assert_eq!(h.hash_val_at(6, Which::Hash1), h.hash_val_at(0, Which::Hash1));
    }
}
