//! Conversion between [`CompressionTable`] and the layout of a byte-oriented LZ77/Huffman codec.
//!
//! The external layout keeps one code per literal, pre-packs each match length (3..=258) and
//! each short offset (1..=1024) together with its extra bits, and carries a copy of the block
//! header with BFINAL set.

use crate::{
    error::{Error, Result},
    huffman::HuffmanCode,
    table::{
        compression::{validate_flags, CompressionTable},
        flags::RepresentationFlags,
    },
    tables::{
        DIST_SYM_TO_DIST_BASE, DIST_SYM_TO_DIST_EXTRA, END_OF_BLOCK, MAX_HEADER_BYTES,
        MIN_MATCH, NUM_DIST, NUM_LIT_LEN,
    },
};

/// Number of match lengths, 3..=258.
pub const LEN_TABLE_SIZE: usize = 256;
/// Offsets 1..=1024 are looked up directly.
pub const DIST_TABLE_SIZE: usize = 1024;

/// Low bits of a packed entry that hold the total bit length.
const LENGTH_BITS: u32 = 5;

/// Last symbol of each alphabet without extra bits. The extra bit count grows by one every
/// interval after it.
const LEN_EXTRA_BITS_START: usize = 264;
const LEN_EXTRA_BITS_INTERVAL: usize = 4;
const DIST_EXTRA_BITS_START: usize = 3;
const DIST_EXTRA_BITS_INTERVAL: usize = 2;

/// Bit order of the consuming bit packer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    /// Codes are reversed so they can be OR-ed into a least-significant-bit-first buffer.
    LsbFirst,
    MsbFirst,
}

/// A code word with any extra bits already appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedCode {
    pub bits: u32,
    pub length: u8,
}

#[derive(Clone)]
pub struct ExternalTables {
    pub order: BitOrder,
    /// Codes of the literals and of the end-of-block symbol.
    pub lit_table: [u16; 257],
    pub lit_table_sizes: [u8; 257],
    /// `extra << (length + 5) | code << 5 | (length + extra_bits)`, indexed by `match_length - 3`.
    pub len_table: [u32; LEN_TABLE_SIZE],
    /// Same packing as `len_table`, indexed by `offset - 1`.
    pub dist_table: [u32; DIST_TABLE_SIZE],
    pub dcodes: [u16; NUM_DIST],
    pub dcodes_sizes: [u8; NUM_DIST],
    pub header: [u8; MAX_HEADER_BYTES],
    pub header_bits: u32,
}

fn len_extra_bits(symbol: usize) -> usize {
    if symbol <= LEN_EXTRA_BITS_START {
        0
    } else {
        (symbol - LEN_EXTRA_BITS_START + LEN_EXTRA_BITS_INTERVAL - 1) / LEN_EXTRA_BITS_INTERVAL
    }
}

fn dist_extra_bits(symbol: usize) -> usize {
    if symbol <= DIST_EXTRA_BITS_START {
        0
    } else {
        (symbol - DIST_EXTRA_BITS_START + DIST_EXTRA_BITS_INTERVAL - 1) / DIST_EXTRA_BITS_INTERVAL
    }
}

fn pack(code: HuffmanCode, extra: u32, extra_bits: usize) -> u32 {
    let length = u32::from(code.length);
    (extra << (length + LENGTH_BITS))
        | (u32::from(code.code) << LENGTH_BITS)
        | (length + extra_bits as u32)
}

fn unpack(entry: u32) -> PackedCode {
    PackedCode {
        bits: entry >> LENGTH_BITS,
        length: (entry & ((1 << LENGTH_BITS) - 1)) as u8,
    }
}

/// Render the codes of `table` for a codec reading in `order`.
pub fn internal_to_external(
    table: &CompressionTable,
    order: BitOrder,
) -> Result<Box<ExternalTables>> {
    let (mut lit_len, mut dist) = table.canonical_codes()?;
    if order == BitOrder::LsbFirst {
        for code in lit_len.iter_mut().chain(dist.iter_mut()) {
            *code = code.reversed();
        }
    }

    let mut external = Box::new(ExternalTables {
        order,
        lit_table: [0; 257],
        lit_table_sizes: [0; 257],
        len_table: [0; LEN_TABLE_SIZE],
        dist_table: [0; DIST_TABLE_SIZE],
        dcodes: [0; NUM_DIST],
        dcodes_sizes: [0; NUM_DIST],
        header: [0; MAX_HEADER_BYTES],
        header_bits: 0,
    });

    for (i, code) in lit_len[..=END_OF_BLOCK].iter().enumerate() {
        external.lit_table[i] = code.code;
        external.lit_table_sizes[i] = code.length;
    }

    let mut index = 0;
    for (symbol, &code) in lit_len.iter().enumerate().take(285).skip(257) {
        let extra_bits = len_extra_bits(symbol);
        for extra in 0..1u32 << extra_bits {
            if index < LEN_TABLE_SIZE - 1 {
                external.len_table[index] = pack(code, extra, extra_bits);
                index += 1;
            }
        }
    }
    external.len_table[LEN_TABLE_SIZE - 1] = pack(lit_len[285], 0, 0);

    let mut index = 0;
    for (symbol, &code) in dist.iter().enumerate() {
        let extra_bits = dist_extra_bits(symbol);
        for extra in 0..1u32 << extra_bits {
            if index == DIST_TABLE_SIZE {
                break;
            }
            external.dist_table[index] = pack(code, extra, extra_bits);
            index += 1;
        }
        external.dcodes[symbol] = code.code;
        external.dcodes_sizes[symbol] = code.length;
    }

    let (header, bits) = table.header();
    external.header[..header.len()].copy_from_slice(header);
    external.header_bits = bits;
    if bits > 0 {
        external.header[0] |= 1;
    }
    Ok(external)
}

/// Recover a [`CompressionTable`] from the external layout. The forced BFINAL bit is cleared.
pub fn external_to_internal(
    external: &ExternalTables,
    representation: RepresentationFlags,
    table: &mut CompressionTable,
) -> Result<()> {
    validate_flags(representation)?;
    let mut lit_len = [HuffmanCode::default(); NUM_LIT_LEN];
    let mut dist = [HuffmanCode::default(); NUM_DIST];

    for (i, code) in lit_len[..=END_OF_BLOCK].iter_mut().enumerate() {
        *code = HuffmanCode::new(external.lit_table[i], external.lit_table_sizes[i]);
    }

    // The first length of each symbol has zero extra bits, so its entry is the bare code.
    let mut index = 0;
    for (symbol, code) in lit_len.iter_mut().enumerate().take(285).skip(257) {
        let extra_bits = len_extra_bits(symbol);
        let packed = unpack(external.len_table[index]);
        *code = HuffmanCode::new(packed.bits as u16, packed.length - extra_bits as u8);
        index += 1 << extra_bits;
    }
    let packed = unpack(external.len_table[LEN_TABLE_SIZE - 1]);
    lit_len[285] = HuffmanCode::new(packed.bits as u16, packed.length);

    for (symbol, code) in dist.iter_mut().enumerate() {
        *code = HuffmanCode::new(external.dcodes[symbol], external.dcodes_sizes[symbol]);
    }

    if external.order == BitOrder::LsbFirst {
        for code in lit_len.iter_mut().chain(dist.iter_mut()) {
            *code = code.reversed();
        }
    }

    table.store_codes(&lit_len, &dist, representation);
    let len = (external.header_bits as usize + 7) / 8;
    if len > MAX_HEADER_BYTES {
        return Err(Error::InvalidSize("header does not fit its bit length"));
    }
    let mut header = external.header;
    if external.header_bits > 0 {
        header[0] &= !1;
    }
    table.set_header(&header[..len], external.header_bits)
}

/// Code for a match length in `3..=258`, extra bits included.
pub fn lookup_match_length_code(external: &ExternalTables, match_length: usize) -> PackedCode {
    unpack(external.len_table[match_length - MIN_MATCH])
}

/// Code for an offset in `1..=32768`, extra bits included.
pub fn lookup_offset_code(external: &ExternalTables, offset: usize) -> PackedCode {
    if offset <= DIST_TABLE_SIZE {
        return unpack(external.dist_table[offset - 1]);
    }

    let distance = (offset - 1) as u32;
    let significant_bits = 32 - distance.leading_zeros();
    let extra_bits = significant_bits - 2;
    let symbol = ((distance >> extra_bits) + 2 * extra_bits) as usize;
    debug_assert_eq!(u32::from(DIST_SYM_TO_DIST_EXTRA[symbol]), extra_bits);
    debug_assert_eq!(
        offset - usize::from(DIST_SYM_TO_DIST_BASE[symbol]),
        (distance & ((1 << extra_bits) - 1)) as usize
    );

    let code = u32::from(external.dcodes[symbol]);
    let length = u32::from(external.dcodes_sizes[symbol]);
    let extra = distance & ((1 << extra_bits) - 1);
    PackedCode {
        bits: code | (extra << length),
        length: (length + extra_bits) as u8,
    }
}

pub fn lookup_literal_code(external: &ExternalTables, literal: u8) -> PackedCode {
    PackedCode {
        bits: u32::from(external.lit_table[literal as usize]),
        length: external.lit_table_sizes[literal as usize],
    }
}

impl ExternalTables {
    pub fn end_of_block(&self) -> PackedCode {
        PackedCode {
            bits: u32::from(self.lit_table[END_OF_BLOCK]),
            length: self.lit_table_sizes[END_OF_BLOCK],
        }
    }
}
