//! Bounded package merge algorithm, based on the paper
//! "A Fast and Space-Economical Algorithm for Length-Limited Coding
//! Jyrki Katajainen, Alistair Moffat, Andrew Turpin".

/// Nodes forming chains. Also used to represent leaves.
#[derive(Clone, Copy, Debug)]
struct Node {
    weight: usize,
    count: usize,
    tail: Option<usize>,
}

/// All chain nodes live in a single arena and refer to each other by index,
/// so no garbage collection pass is needed while the lists evolve.
struct Arena {
    nodes: Vec<Node>,
}

impl Arena {
    fn with_capacity(capacity: usize) -> Arena {
        Arena {
            nodes: Vec::with_capacity(capacity),
        }
    }

    fn alloc(&mut self, weight: usize, count: usize, tail: Option<usize>) -> usize {
        self.nodes.push(Node {
            weight,
            count,
            tail,
        });
        self.nodes.len() - 1
    }
}

/// Performs a Boundary Package-Merge step. Puts a new chain in the given list.
/// The new chain is, depending on the weights, a leaf or a combination of two
/// chains from the previous list.
fn boundary_pm(arena: &mut Arena, lists: &mut [[usize; 2]], leaves: &[Node], index: usize) {
    let lastcount = arena.nodes[lists[index][1]].count; /* Count of last chain of list. */

    if index == 0 && lastcount >= leaves.len() {
        return;
    }

    let oldchain = lists[index][1];

    if index == 0 {
        /* New leaf node in list 0. */
        let newchain = arena.alloc(leaves[lastcount].weight, lastcount + 1, None);
        lists[index][0] = oldchain;
        lists[index][1] = newchain;
    } else {
        let sum =
            arena.nodes[lists[index - 1][0]].weight + arena.nodes[lists[index - 1][1]].weight;
        if lastcount < leaves.len() && sum > leaves[lastcount].weight {
            /* New leaf inserted in list, so count is incremented. */
            let tail = arena.nodes[oldchain].tail;
            let newchain = arena.alloc(leaves[lastcount].weight, lastcount + 1, tail);
            lists[index][0] = oldchain;
            lists[index][1] = newchain;
        } else {
            let newchain = arena.alloc(sum, lastcount, Some(lists[index - 1][1]));
            lists[index][0] = oldchain;
            lists[index][1] = newchain;
            /* Two lookahead chains of previous list used up, create new ones. */
            boundary_pm(arena, lists, leaves, index - 1);
            boundary_pm(arena, lists, leaves, index - 1);
        }
    }
}

/// Like `boundary_pm`, but the last run: the lookahead chains of the previous
/// list will not be needed again, so no recursion.
fn boundary_pm_final(arena: &mut Arena, lists: &mut [[usize; 2]], leaves: &[Node], index: usize) {
    let lastcount = arena.nodes[lists[index][1]].count;
    let sum = arena.nodes[lists[index - 1][0]].weight + arena.nodes[lists[index - 1][1]].weight;

    if lastcount < leaves.len() && sum > leaves[lastcount].weight {
        let tail = arena.nodes[lists[index][1]].tail;
        let newchain = arena.alloc(leaves[lastcount].weight, lastcount + 1, tail);
        lists[index][1] = newchain;
    } else {
        let prev = lists[index - 1][1];
        arena.nodes[lists[index][1]].tail = Some(prev);
    }
}

/// Initializes each list with two chains pointing at the two lightest leaves.
fn init_lists(arena: &mut Arena, leaves: &[Node], maxbits: usize) -> Vec<[usize; 2]> {
    let node0 = arena.alloc(leaves[0].weight, 1, None);
    let node1 = arena.alloc(leaves[1].weight, 2, None);
    vec![[node0, node1]; maxbits]
}

/// Converts the final chain of the last list into bit lengths per symbol.
fn extract_bit_lengths(
    arena: &Arena,
    chain: usize,
    leaves: &[Node],
    bitlengths: &mut [u32],
) {
    let mut counts = [0usize; 16];
    let mut end = 16;

    let mut node = Some(chain);
    while let Some(n) = node {
        end -= 1;
        counts[end] = arena.nodes[n].count;
        node = arena.nodes[n].tail;
    }

    let mut value = 1;
    let mut ptr = 15;
    let mut val = counts[15];
    while ptr >= end {
        let next = if ptr > 0 { counts[ptr - 1] } else { 0 };
        while val > next {
            bitlengths[leaves[val - 1].count] = value;
            val -= 1;
        }
        if ptr == 0 {
            break;
        }
        ptr -= 1;
        value += 1;
    }
}

/// Calculates the bit lengths for the symbols of a Huffman tree, limited to
/// `maxbits` bits per code, given the symbol frequencies. Symbols with a zero
/// frequency get length zero.
pub fn length_limited_code_lengths(frequencies: &[usize], maxbits: usize) -> Vec<u32> {
    let mut bitlengths = vec![0u32; frequencies.len()];

    /* Count used symbols and place them in the leaves. */
    let mut leaves: Vec<Node> = frequencies
        .iter()
        .enumerate()
        .filter(|&(_, &freq)| freq != 0)
        .map(|(i, &freq)| Node {
            weight: freq,
            count: i,
            tail: None,
        })
        .collect();

    let numsymbols = leaves.len();
    /* Check special cases and error conditions. */
    debug_assert!((1 << maxbits) >= numsymbols);
    match numsymbols {
        0 => return bitlengths,
        1 => {
            bitlengths[leaves[0].count] = 1;
            return bitlengths;
        }
        2 => {
            bitlengths[leaves[0].count] = 1;
            bitlengths[leaves[1].count] = 1;
            return bitlengths;
        }
        _ => {}
    }

    /* Sort the leaves from lightest to heaviest. Add the symbol index to the
    weight so that the sort is stable. */
    for leaf in &mut leaves {
        debug_assert!(leaf.weight < 1 << (usize::BITS - 9));
        leaf.weight = (leaf.weight << 9) | leaf.count;
    }
    leaves.sort_unstable_by_key(|leaf| leaf.weight);
    for leaf in &mut leaves {
        leaf.weight >>= 9;
    }

    let maxbits = maxbits.min(numsymbols - 1);

    let mut arena = Arena::with_capacity(maxbits * 2 * numsymbols);
    let mut lists = init_lists(&mut arena, &leaves, maxbits);

    /* In the last list, 2 * numsymbols - 2 active chains need to be created. Two
    are already created in the initialization. Each boundary_pm run creates one. */
    let num_boundary_pm_runs = 2 * numsymbols - 4;
    for _ in 0..num_boundary_pm_runs - 1 {
        boundary_pm(&mut arena, &mut lists, &leaves, maxbits - 1);
    }
    boundary_pm_final(&mut arena, &mut lists, &leaves, maxbits - 1);

    extract_bit_lengths(&arena, lists[maxbits - 1][1], &leaves, &mut bitlengths);
    bitlengths
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kraft_sum(lengths: &[u32]) -> f64 {
        lengths
            .iter()
            .filter(|&&l| l != 0)
            .map(|&l| (0.5f64).powi(l as i32))
            .sum()
    }

    #[test]
    fn limited_to_seven_bits() {
        let freqs = [
            252usize, 0, 1, 6, 9, 10, 6, 3, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let lengths = length_limited_code_lengths(&freqs, 7);
        let expected = [1u32, 0, 6, 4, 3, 3, 3, 5, 6, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(lengths, expected);
        assert_eq!(kraft_sum(&lengths), 1.0);
    }

    #[test]
    fn unconstrained_maxbits_gives_huffman_lengths() {
        let freqs = [
            0usize, 0, 0, 0, 0, 0, 18, 0, 6, 0, 12, 2, 14, 9, 27, 15, 23, 15, 17, 8, 1, 0, 0, 0,
            0, 0, 0, 0, 0, 0, 0, 0,
        ];
        let lengths = length_limited_code_lengths(&freqs, 15);
        let expected = [
            0u32, 0, 0, 0, 0, 0, 3, 0, 5, 0, 4, 6, 4, 4, 3, 4, 3, 3, 3, 4, 6, 0, 0, 0, 0, 0, 0,
            0, 0, 0, 0, 0,
        ];
        assert_eq!(lengths, expected);
        assert_eq!(kraft_sum(&lengths), 1.0);
    }

    #[test]
    fn trivial_symbol_counts() {
        assert_eq!(length_limited_code_lengths(&[0, 0, 0, 0], 15), [0, 0, 0, 0]);
        assert_eq!(length_limited_code_lengths(&[0, 5, 0, 0], 15), [0, 1, 0, 0]);
        assert_eq!(length_limited_code_lengths(&[9, 0, 0, 2], 15), [1, 0, 0, 1]);
    }

    #[test]
    fn lengths_never_exceed_the_limit() {
        // A Fibonacci-like distribution would want very deep codes.
        let freqs = [1usize, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233, 377];
        for maxbits in 4..=15 {
            let lengths = length_limited_code_lengths(&freqs, maxbits);
            assert!(lengths.iter().all(|&l| l as usize <= maxbits));
            assert_eq!(kraft_sum(&lengths), 1.0);
        }
    }
}
