//! Greedy LZ77 match search over tables that live in a job's compression region.
//!
//! The high table is keyed on 4 bytes and threads a hash chain through `chain`. The low table
//! is keyed on 3 bytes and only finds short matches at near distances. Both tables store
//! `position + 1`, so zero marks an empty slot.

use crate::{
    options::CompressionLevel,
    tables::{MAX_MATCH, MIN_MATCH, WINDOW_SIZE},
};

pub(crate) const HIGH_TABLE_SIZE: usize = 1 << 15;
pub(crate) const LOW_TABLE_SIZE: usize = 1 << 12;
pub(crate) const CHAIN_SIZE: usize = WINDOW_SIZE;
const LOW_MAX_DISTANCE: usize = 4096;

fn compute_hash3(v: u32) -> u32 {
    (0x330698ecu64.wrapping_mul(((v & 0xff_ffff) ^ 0x2722_0a95) as u64) >> 32) as u32
}
fn compute_hash4(v: u32) -> u32 {
    (0x27220a95u64.wrapping_mul((v ^ 0x3306_98ec) as u64) >> 32) as u32
}

fn match_length(data: &[u8], index: usize, prev_index: usize) -> usize {
    debug_assert!(prev_index < index);

    let mut length = 0;
    while length < MAX_MATCH
        && index + length < data.len()
        && data[index + length] == data[prev_index + length]
    {
        length += 1;
    }
    length
}

/// One step of a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token {
    Literal(u8),
    Match { length: u16, distance: u16 },
}

const MATCH_FLAG: u32 = 1 << 31;

impl Token {
    /// Pack into a single word for the job's token buffer.
    pub fn pack(self) -> u32 {
        match self {
            Token::Literal(byte) => u32::from(byte),
            Token::Match { length, distance } => {
                MATCH_FLAG
                    | ((u32::from(length) - MIN_MATCH as u32) << 16)
                    | (u32::from(distance) - 1)
            }
        }
    }

    pub fn unpack(word: u32) -> Self {
        if word & MATCH_FLAG == 0 {
            Token::Literal(word as u8)
        } else {
            Token::Match {
                length: ((word >> 16) & 0xff) as u16 + MIN_MATCH as u16,
                distance: (word & 0xffff) as u16 + 1,
            }
        }
    }
}

pub(crate) struct MatchFinder<'a> {
    high: &'a mut [u32],
    low: &'a mut [u32],
    chain: &'a mut [u32],
    max_chain: usize,
}

impl<'a> MatchFinder<'a> {
    /// Take over the given tables, clearing them.
    pub fn new(
        high: &'a mut [u32],
        low: &'a mut [u32],
        chain: &'a mut [u32],
        level: CompressionLevel,
    ) -> Self {
        debug_assert_eq!(high.len(), HIGH_TABLE_SIZE);
        debug_assert_eq!(low.len(), LOW_TABLE_SIZE);
        debug_assert_eq!(chain.len(), CHAIN_SIZE);
        high.fill(0);
        low.fill(0);
        chain.fill(0);
        Self {
            high,
            low,
            chain,
            max_chain: match level {
                CompressionLevel::Default => 1,
                CompressionLevel::High => 32,
            },
        }
    }

    /// Record `ip` and return the previous high and low table entries for it.
    fn insert(&mut self, data: &[u8], ip: usize) -> (u32, u32) {
        let Some(bytes) = data.get(ip..ip + 4) else {
            return (0, 0);
        };
        let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

        let high_index = compute_hash4(value) as usize % HIGH_TABLE_SIZE;
        let low_index = compute_hash3(value) as usize % LOW_TABLE_SIZE;
        let high = std::mem::replace(&mut self.high[high_index], ip as u32 + 1);
        let low = std::mem::replace(&mut self.low[low_index], ip as u32 + 1);
        self.chain[ip % CHAIN_SIZE] = high;
        (high, low)
    }

    /// Longest match for the bytes at `ip`, as `(length, distance)`.
    pub fn find(&mut self, data: &[u8], ip: usize) -> Option<(usize, usize)> {
        let (mut candidate, low) = self.insert(data, ip);
        let min_index = ip.saturating_sub(WINDOW_SIZE);

        let mut best = (0, 0);
        let mut depth = 0;
        while candidate != 0 && depth < self.max_chain {
            let prev = candidate as usize - 1;
            if prev >= ip || prev < min_index {
                break;
            }
            let length = match_length(data, ip, prev);
            if length > best.0 {
                best = (length, ip - prev);
                if length == MAX_MATCH {
                    break;
                }
            }
            let next = self.chain[prev % CHAIN_SIZE];
            if next >= candidate {
                break;
            }
            candidate = next;
            depth += 1;
        }

        if best.0 < 4 && low != 0 {
            let prev = low as usize - 1;
            if prev < ip && ip - prev <= LOW_MAX_DISTANCE {
                let length = match_length(data, ip, prev);
                if length > best.0 {
                    best = (length, ip - prev);
                }
            }
        }

        (best.0 >= MIN_MATCH).then_some(best)
    }

    /// Record positions skipped over by a match.
    pub fn skip(&mut self, data: &[u8], start: usize, end: usize) {
        for ip in start..end {
            self.insert(data, ip);
        }
    }
}

/// Greedy parse: take the longest match at each position, else emit a literal.
pub(crate) struct GreedyParser {
    ip: usize,
}

impl GreedyParser {
    pub fn new() -> Self {
        Self { ip: 0 }
    }

    /// Index of the next unparsed byte.
    pub fn position(&self) -> usize {
        self.ip
    }

    pub fn next(&mut self, finder: &mut MatchFinder<'_>, data: &[u8]) -> Option<Token> {
        let ip = self.ip;
        let &byte = data.get(ip)?;
        match finder.find(data, ip) {
            Some((length, distance)) => {
                finder.skip(data, ip + 1, ip + length);
                self.ip += length;
                Some(Token::Match {
                    length: length as u16,
                    distance: distance as u16,
                })
            }
            None => {
                self.ip += 1;
                Some(Token::Literal(byte))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    struct Tables {
        high: Vec<u32>,
        low: Vec<u32>,
        chain: Vec<u32>,
    }

    impl Tables {
        fn new() -> Self {
            Self {
                high: vec![0; HIGH_TABLE_SIZE],
                low: vec![0; LOW_TABLE_SIZE],
                chain: vec![0; CHAIN_SIZE],
            }
        }

        fn finder(&mut self, level: CompressionLevel) -> MatchFinder<'_> {
            MatchFinder::new(&mut self.high, &mut self.low, &mut self.chain, level)
        }
    }

    fn parse(data: &[u8], level: CompressionLevel) -> Vec<Token> {
        let mut tables = Tables::new();
        let mut finder = tables.finder(level);
        let mut parser = GreedyParser::new();
        let mut tokens = Vec::new();
        while let Some(token) = parser.next(&mut finder, data) {
            tokens.push(token);
        }
        tokens
    }

    fn replay(tokens: &[Token]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        for token in tokens {
            match *token {
                Token::Literal(byte) => out.push(byte),
                Token::Match { length, distance } => {
                    for _ in 0..length {
                        out.push(out[out.len() - distance as usize]);
                    }
                }
            }
        }
        out
    }

    #[test]
    fn token_packing() {
        for token in [
            Token::Literal(0),
            Token::Literal(255),
            Token::Match {
                length: 3,
                distance: 1,
            },
            Token::Match {
                length: 258,
                distance: 32768,
            },
        ] {
            assert_eq!(Token::unpack(token.pack()), token);
        }
    }

    #[test]
    fn finds_repeats() {
        let data = b"abcdefgh abcdefgh abcdefgh";
        let tokens = parse(data, CompressionLevel::High);
        assert!(tokens.len() < data.len());
        assert!(tokens.contains(&Token::Match {
            length: 17,
            distance: 9
        }));
        assert_eq!(replay(&tokens), data);
    }

    #[test]
    fn short_near_matches() {
        // Three-byte repeats are only found through the low table.
        let data = b"xyzQxyzR";
        let tokens = parse(data, CompressionLevel::Default);
        assert_eq!(
            tokens[4],
            Token::Match {
                length: 3,
                distance: 4
            }
        );
        assert_eq!(replay(&tokens), data);
    }

    #[test]
    fn random_parses_replay() {
        let mut rng = rand::thread_rng();
        for level in [CompressionLevel::Default, CompressionLevel::High] {
            let data: Vec<u8> = (0..100_000).map(|_| rng.gen_range(0..4) + b'a').collect();
            let tokens = parse(&data, level);
            for token in &tokens {
                if let Token::Match { length, distance } = *token {
                    assert!((3..=258).contains(&length));
                    assert!((1..=32768).contains(&distance));
                }
            }
            assert_eq!(replay(&tokens), data);
        }
    }
}
