//! Canonical Huffman code construction.

use std::{cmp::Ordering, collections::BinaryHeap};

use crate::tables::MAX_CODE_LENGTH;

/// Number of low bits of a table cell that hold the code word.
pub(crate) const CODE_BITS: u32 = 15;
const CODE_MASK: u32 = (1 << CODE_BITS) - 1;
const LENGTH_MASK: u32 = 0xf;

/// A code word together with its length in bits.
///
/// Unless stated otherwise the code bits are in canonical (most significant bit first) order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HuffmanCode {
    pub code: u16,
    pub length: u8,
}

impl HuffmanCode {
    pub fn new(code: u16, length: u8) -> Self {
        Self { code, length }
    }

    /// The same code with its bits reversed, as consumed by a least-significant-bit-first reader.
    pub fn reversed(self) -> Self {
        Self {
            code: reverse_bits(self.code, self.length),
            length: self.length,
        }
    }

    pub(crate) fn from_cell(cell: u32) -> Self {
        Self {
            code: (cell & CODE_MASK) as u16,
            length: ((cell >> CODE_BITS) & LENGTH_MASK) as u8,
        }
    }

    pub(crate) fn to_cell(self) -> u32 {
        u32::from(self.code) | (u32::from(self.length) << CODE_BITS)
    }
}

pub(crate) fn reverse_bits(code: u16, length: u8) -> u16 {
    if length == 0 {
        return 0;
    }
    code.reverse_bits() >> (16 - u32::from(length))
}

/// Assign length-limited code lengths to every symbol with a non-zero frequency.
///
/// Symbols with a zero frequency get length zero. The most frequent symbols receive the
/// shortest codes; among equal frequencies the lower symbol index wins.
pub(crate) fn build_code_lengths(frequencies: &[u32], lengths: &mut [u8], length_limit: u8) {
    assert_eq!(frequencies.len(), lengths.len());
    debug_assert!((1..=MAX_CODE_LENGTH).contains(&length_limit));

    lengths.fill(0);
    let used = frequencies.iter().filter(|&&f| f > 0).count();
    if used <= 1 {
        if let Some(i) = frequencies.iter().position(|&f| f > 0) {
            lengths[i] = 1;
        }
        return;
    }

    #[derive(Eq, PartialEq, Copy, Clone, Debug)]
    struct Item(u64, u16);
    impl Ord for Item {
        fn cmp(&self, other: &Self) -> Ordering {
            other.0.cmp(&self.0).then_with(|| other.1.cmp(&self.1))
        }
    }
    impl PartialOrd for Item {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    // Build a huffman tree
    let num_symbols = frequencies.len();
    let mut internal_nodes = Vec::with_capacity(used);
    let mut nodes: BinaryHeap<Item> = frequencies
        .iter()
        .enumerate()
        .filter(|(_, &frequency)| frequency > 0)
        .map(|(i, &frequency)| Item(u64::from(frequency), i as u16))
        .collect();
    while nodes.len() > 1 {
        let (Some(Item(frequency1, index1)), Some(Item(frequency2, index2))) =
            (nodes.pop(), nodes.pop())
        else {
            break;
        };
        internal_nodes.push((index1, index2));
        nodes.push(Item(
            frequency1 + frequency2,
            (num_symbols + internal_nodes.len() - 1) as u16,
        ));
    }
    let Some(Item(_, root)) = nodes.pop() else {
        return;
    };

    // Walk the tree, counting leaves per depth. Depths past the limit are clamped and repaired
    // below.
    let limit = length_limit as usize;
    let mut counts = [0u32; 16];
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        let node = node as usize;
        if node < num_symbols {
            counts[depth.min(limit)] += 1;
        } else {
            let (left, right) = internal_nodes[node - num_symbols];
            stack.push((left, depth + 1));
            stack.push((right, depth + 1));
        }
    }

    let mut total: u32 = (1..=limit).map(|i| counts[i] << (limit - i)).sum();
    while total > 1u32 << limit {
        let mut i = limit - 1;
        while counts[i] == 0 {
            i -= 1;
        }
        counts[i] -= 1;
        counts[limit] -= 1;
        counts[i + 1] += 2;
        total -= 1;
    }

    // Hand out the lengths, shortest first, in order of decreasing frequency.
    let mut order: Vec<usize> = (0..num_symbols).filter(|&i| frequencies[i] > 0).collect();
    order.sort_by(|&a, &b| frequencies[b].cmp(&frequencies[a]).then(a.cmp(&b)));
    let mut symbols = order.into_iter();
    for (len, &count) in counts.iter().enumerate().take(limit + 1).skip(1) {
        for _ in 0..count {
            if let Some(symbol) = symbols.next() {
                lengths[symbol] = len as u8;
            }
        }
    }
}

/// Assign canonical codes (RFC1951 section 3.2.2) for the given lengths.
pub(crate) fn assign_canonical_codes(lengths: &[u8], codes: &mut [HuffmanCode]) {
    assert_eq!(lengths.len(), codes.len());

    let mut bl_count = [0u32; 16];
    for &length in lengths {
        bl_count[length as usize] += 1;
    }
    bl_count[0] = 0;

    let mut next_code = [0u32; 16];
    let mut code = 0u32;
    for bits in 1..16 {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }

    for (slot, &length) in codes.iter_mut().zip(lengths) {
        *slot = if length == 0 {
            HuffmanCode::default()
        } else {
            let code = next_code[length as usize];
            next_code[length as usize] += 1;
            HuffmanCode::new((code & ((1 << length) - 1)) as u16, length)
        };
    }
}

/// Sum of `2^(15 - length)` over all used codes. A valid code never exceeds `1 << 15`.
pub fn kraft_sum(lengths: impl IntoIterator<Item = u8>) -> u32 {
    lengths
        .into_iter()
        .filter(|&l| l > 0)
        .map(|l| 1u32 << (u32::from(MAX_CODE_LENGTH) - u32::from(l)))
        .sum()
}

/// Returns whether every code word fits in its length.
pub(crate) fn codes_fit(codes: &[HuffmanCode]) -> bool {
    codes
        .iter()
        .all(|c| c.length <= MAX_CODE_LENGTH && u32::from(c.code) >> c.length == 0)
}

/// Returns whether no used code is a prefix of (or equal to) another.
pub(crate) fn is_prefix_free(codes: &[HuffmanCode]) -> bool {
    let max = u32::from(MAX_CODE_LENGTH);
    let mut spans: Vec<(u32, u32)> = codes
        .iter()
        .filter(|c| c.length > 0)
        .map(|c| {
            let start = u32::from(c.code) << (max - u32::from(c.length));
            (start, start + (1 << (max - u32::from(c.length))))
        })
        .collect();
    spans.sort_unstable();
    spans.windows(2).all(|w| w[0].1 <= w[1].0)
}

/// Fill a least-significant-bit-first lookup table of `table.len()` entries (a power of two).
///
/// Every slot reached by a code holds `symbol << 4 | length`; unreachable slots stay zero.
/// Returns `false` if a code is too long for the table or two codes overlap.
pub(crate) fn fill_lookup(table: &mut [u16], codes: &[HuffmanCode]) -> bool {
    debug_assert!(table.len().is_power_of_two());
    table.fill(0);
    for (symbol, code) in codes.iter().enumerate() {
        if code.length == 0 {
            continue;
        }
        if 1usize << code.length > table.len() {
            return false;
        }
        let entry = ((symbol as u16) << 4) | u16::from(code.length);
        let mut index = reverse_bits(code.code, code.length) as usize;
        while index < table.len() {
            if table[index] != 0 {
                return false;
            }
            table[index] = entry;
            index += 1 << code.length;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn canonical(lengths: &[u8]) -> Vec<HuffmanCode> {
        let mut codes = vec![HuffmanCode::default(); lengths.len()];
        assign_canonical_codes(lengths, &mut codes);
        codes
    }

    #[test]
    fn rfc1951_example() {
        let codes = canonical(&[3, 3, 3, 3, 3, 2, 4, 4]);
        let expected = [
            (0b010, 3),
            (0b011, 3),
            (0b100, 3),
            (0b101, 3),
            (0b110, 3),
            (0b00, 2),
            (0b1110, 4),
            (0b1111, 4),
        ];
        for (code, (bits, len)) in codes.iter().zip(expected) {
            assert_eq!(*code, HuffmanCode::new(bits, len));
        }
    }

    #[test]
    fn reverse() {
        assert_eq!(reverse_bits(0b1, 1), 0b1);
        assert_eq!(reverse_bits(0b110, 3), 0b011);
        assert_eq!(reverse_bits(0b1000_0000_0000_000, 15), 1);
        assert_eq!(reverse_bits(0, 0), 0);
    }

    #[test]
    fn cells() {
        let code = HuffmanCode::new(0x5a5a & 0x7fff, 15);
        assert_eq!(HuffmanCode::from_cell(code.to_cell()), code);
    }

    #[test]
    fn lengths_are_limited_and_complete() {
        // Fibonacci frequencies produce a maximally skewed tree.
        let mut frequencies = vec![1u32; 40];
        for i in 2..frequencies.len() {
            frequencies[i] = frequencies[i - 1].saturating_add(frequencies[i - 2]);
        }
        for limit in [7u8, 12, 15] {
            let mut lengths = vec![0; frequencies.len()];
            build_code_lengths(&frequencies, &mut lengths, limit);
            assert!(lengths.iter().all(|&l| (1..=limit).contains(&l)));
            assert_eq!(kraft_sum(lengths.iter().copied()), 1 << 15);
        }
    }

    #[test]
    fn frequent_symbols_get_short_codes() {
        let mut frequencies = [1u32; 286];
        frequencies[b'A' as usize] = 100;
        let mut lengths = [0u8; 286];
        build_code_lengths(&frequencies, &mut lengths, 15);
        let a = lengths[b'A' as usize];
        assert!(lengths.iter().all(|&l| l >= a));
        // Equal frequencies: lower index is never longer.
        assert!(lengths[0] <= lengths[285]);
    }

    #[test]
    fn single_and_empty() {
        let mut lengths = [9u8; 4];
        build_code_lengths(&[0, 0, 0, 0], &mut lengths, 15);
        assert_eq!(lengths, [0; 4]);
        build_code_lengths(&[0, 5, 0, 0], &mut lengths, 15);
        assert_eq!(lengths, [0, 1, 0, 0]);
    }

    #[test]
    fn random_codes_are_prefix_free() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let frequencies: Vec<u32> = (0..286).map(|_| rng.gen_range(0..5000)).collect();
            let mut lengths = vec![0; 286];
            build_code_lengths(&frequencies, &mut lengths, 15);
            assert!(kraft_sum(lengths.iter().copied()) <= 1 << 15);
            assert!(is_prefix_free(&canonical(&lengths)));
        }
    }

    #[test]
    fn lookup_tables() {
        let codes = canonical(&[2, 1, 3, 3]);
        let mut table = [0u16; 8];
        assert!(fill_lookup(&mut table, &codes));
        // Symbol 1 has code `0`, so every even index decodes to it.
        for i in (0..8).step_by(2) {
            assert_eq!(table[i], (1 << 4) | 1);
        }
        // Symbol 0 has code `10`, read as bit 1 then bit 0.
        assert_eq!(table[0b001], 2);
        assert_eq!(table[0b101], 2);
        assert_eq!(table[0b011], (2 << 4) | 3);
        assert_eq!(table[0b111], (3 << 4) | 3);

        let overlapping = [HuffmanCode::new(0, 1), HuffmanCode::new(0b01, 2)];
        assert!(!fill_lookup(&mut table, &overlapping));
        let too_long = [HuffmanCode::new(0, 4)];
        assert!(!fill_lookup(&mut table, &too_long));
    }

    #[test]
    fn overlapping_codes_are_detected() {
        let codes = [HuffmanCode::new(0b0, 1), HuffmanCode::new(0b01, 2)];
        assert!(!is_prefix_free(&codes));
        let codes = [HuffmanCode::new(0b0, 1), HuffmanCode::new(0b10, 2)];
        assert!(is_prefix_free(&codes));
    }
}
