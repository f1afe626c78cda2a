//! Constant tables derived from RFC1951.

/// Number of literal/length symbols that can appear in a block (0..=285).
pub(crate) const NUM_LIT_LEN: usize = 286;
/// Number of distance symbols (0..=29).
pub(crate) const NUM_DIST: usize = 30;
/// Number of literal byte values.
pub(crate) const NUM_LITERALS: usize = 256;
pub(crate) const END_OF_BLOCK: usize = 256;

pub(crate) const MAX_CODE_LENGTH: u8 = 15;
pub(crate) const MAX_CODE_LENGTH_CODE_LENGTH: u8 = 7;

pub(crate) const MIN_MATCH: usize = 3;
pub(crate) const MAX_MATCH: usize = 258;
pub(crate) const WINDOW_SIZE: usize = 32768;

/// Upper bound on a serialized dynamic block header written by this crate (no run-length codes).
pub(crate) const MAX_HEADER_BYTES: usize = 288;

pub(crate) const CLCL_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

#[rustfmt::skip]
pub(crate) const LEN_SYM_TO_LEN_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

#[rustfmt::skip]
pub(crate) const LEN_SYM_TO_LEN_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

#[rustfmt::skip]
pub(crate) const DIST_SYM_TO_DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

#[rustfmt::skip]
pub(crate) const DIST_SYM_TO_DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Length symbol for each match length, indexed by `length - 3`.
pub(crate) const LENGTH_TO_SYMBOL: [u16; 256] = length_to_symbol();

/// Number of extra bits for each match length, indexed by `length - 3`.
pub(crate) const LENGTH_TO_LEN_EXTRA: [u8; 256] = length_to_len_extra();

const fn length_to_symbol() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut sym = 0;
    while sym < 28 {
        let base = LEN_SYM_TO_LEN_BASE[sym] as usize;
        let count = 1usize << LEN_SYM_TO_LEN_EXTRA[sym];
        let mut j = 0;
        while j < count && base - 3 + j < 256 {
            table[base - 3 + j] = 257 + sym as u16;
            j += 1;
        }
        sym += 1;
    }
    // Length 258 has a dedicated symbol.
    table[255] = 285;
    table
}

const fn length_to_len_extra() -> [u8; 256] {
    let symbols = length_to_symbol();
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = LEN_SYM_TO_LEN_EXTRA[(symbols[i] - 257) as usize];
        i += 1;
    }
    table
}

/// Code lengths of the fixed literal/length code (RFC1951 section 3.2.6).
pub(crate) const fn fixed_lit_len_lengths() -> [u8; NUM_LIT_LEN] {
    let mut lengths = [0u8; NUM_LIT_LEN];
    let mut i = 0;
    while i < NUM_LIT_LEN {
        lengths[i] = if i < 144 {
            8
        } else if i < 256 {
            9
        } else if i < 280 {
            7
        } else {
            8
        };
        i += 1;
    }
    lengths
}

pub(crate) const FIXED_DIST_LENGTHS: [u8; NUM_DIST] = [5; NUM_DIST];

pub(crate) fn distance_to_dist_sym(distance: u16) -> u8 {
    const LOOKUP: [u8; 16] = [0, 1, 2, 3, 4, 4, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7];
    if distance <= 16 {
        return LOOKUP[distance as usize - 1];
    }

    let mut dist_sym = 29;
    while dist_sym > 0 && distance < DIST_SYM_TO_DIST_BASE[dist_sym as usize] {
        dist_sym -= 1;
    }
    dist_sym
}
