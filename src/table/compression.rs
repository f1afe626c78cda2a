use bytemuck::{Pod, Zeroable};
use log::trace;

use crate::{
    error::{Error, Result},
    header::encode_dynamic_header,
    huffman::{assign_canonical_codes, build_code_lengths, codes_fit, HuffmanCode},
    table::{
        flags::{Representation, RepresentationFlags},
        triplet::{validate_triplets, Triplet},
    },
    tables::{
        fixed_lit_len_lengths, FIXED_DIST_LENGTHS, MAX_CODE_LENGTH, MAX_HEADER_BYTES, NUM_DIST,
        NUM_LITERALS, NUM_LIT_LEN,
    },
};

/// Encoder-side codes for every literal/length and distance symbol.
///
/// Each cell packs `code | length << 15`. Software cells hold canonical (most significant bit
/// first) codes, hardware cells hold the same codes bit-reversed for a least-significant-bit
/// first packer. Cells of a representation that is not in [`representation`](Self::representation)
/// are zero.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct CompressionTable {
    sw_lit_len: [u32; NUM_LIT_LEN],
    sw_dist: [u32; NUM_DIST],
    hw_lit_len: [u32; NUM_LIT_LEN],
    hw_dist: [u32; NUM_DIST],
    header: [u8; MAX_HEADER_BYTES],
    header_bits: u32,
    representation: u32,
}

const _: () = assert!(std::mem::size_of::<CompressionTable>() % 8 == 0);

/// Reject flag sets that name no execution path, or both table families.
pub(crate) fn validate_flags(flags: RepresentationFlags) -> Result<()> {
    if flags.paths().is_empty() {
        return Err(Error::InvalidRepresentation(
            "neither software nor hardware representation requested",
        ));
    }
    if flags.contains(RepresentationFlags::DEFLATE | RepresentationFlags::HUFFMAN_ONLY) {
        return Err(Error::InvalidRepresentation(
            "deflate and huffman-only representations are exclusive",
        ));
    }
    Ok(())
}

/// Representation stored inside a loaded sub-table. It must name at least one of the paths in
/// `allowed`, and the same family.
pub(crate) fn stored_flags(bits: u32, allowed: RepresentationFlags) -> Result<RepresentationFlags> {
    RepresentationFlags::from_bits(bits)
        .filter(|flags| {
            !flags.paths().is_empty()
                && allowed.contains(flags.paths())
                && flags.family() == allowed.family()
        })
        .ok_or(Error::MalformedTable("representation does not match the table"))
}

impl CompressionTable {
    pub fn new_boxed() -> Box<Self> {
        bytemuck::zeroed_box()
    }

    /// Table holding the fixed code of RFC1951, software layout only.
    pub(crate) fn fixed() -> Box<Self> {
        let mut lit_len = [HuffmanCode::default(); NUM_LIT_LEN];
        let mut dist = [HuffmanCode::default(); NUM_DIST];
        assign_canonical_codes(&fixed_lit_len_lengths(), &mut lit_len);
        assign_canonical_codes(&FIXED_DIST_LENGTHS, &mut dist);

        let mut table = Self::new_boxed();
        table.store_codes(&lit_len, &dist, RepresentationFlags::SOFTWARE);
        table
    }

    pub fn representation(&self) -> RepresentationFlags {
        RepresentationFlags::from_bits(self.representation).unwrap_or_default()
    }

    /// Assign length-limited canonical codes from symbol frequencies.
    ///
    /// Symbols with zero frequency get no code. Huffman-only tables only code the 256
    /// literals; DEFLATE tables also carry the matching dynamic block header.
    pub fn build(
        &mut self,
        lit_len_frequencies: &[u32; NUM_LIT_LEN],
        dist_frequencies: &[u32; NUM_DIST],
        flags: RepresentationFlags,
    ) -> Result<()> {
        validate_flags(flags)?;

        let mut lit_len_lengths = [0u8; NUM_LIT_LEN];
        let mut dist_lengths = [0u8; NUM_DIST];
        if flags.contains(RepresentationFlags::HUFFMAN_ONLY) {
            build_code_lengths(
                &lit_len_frequencies[..NUM_LITERALS],
                &mut lit_len_lengths[..NUM_LITERALS],
                MAX_CODE_LENGTH,
            );
        } else {
            build_code_lengths(lit_len_frequencies, &mut lit_len_lengths, MAX_CODE_LENGTH);
            build_code_lengths(dist_frequencies, &mut dist_lengths, MAX_CODE_LENGTH);
        }

        let mut lit_len = [HuffmanCode::default(); NUM_LIT_LEN];
        let mut dist = [HuffmanCode::default(); NUM_DIST];
        assign_canonical_codes(&lit_len_lengths, &mut lit_len);
        assign_canonical_codes(&dist_lengths, &mut dist);

        self.store_codes(&lit_len, &dist, flags);
        if flags.contains(RepresentationFlags::DEFLATE) {
            let header = encode_dynamic_header(&lit_len_lengths, &dist_lengths)?;
            self.header = header.bytes;
            self.header_bits = header.bits;
            trace!("built dynamic header of {} bits", header.bits);
        }
        Ok(())
    }

    /// Store caller-assigned literal codes. Only valid for Huffman-only tables.
    pub fn build_from_triplets(
        &mut self,
        triplets: &[Triplet],
        flags: RepresentationFlags,
    ) -> Result<()> {
        validate_flags(flags)?;
        if flags.contains(RepresentationFlags::DEFLATE) {
            return Err(Error::InvalidRepresentation(
                "triplets are only valid for huffman-only tables",
            ));
        }
        let lit_len = validate_triplets(triplets)?;
        self.store_codes(&lit_len, &[HuffmanCode::default(); NUM_DIST], flags);
        Ok(())
    }

    /// Overwrite every cell, the header and the representation.
    pub(crate) fn store_codes(
        &mut self,
        lit_len: &[HuffmanCode],
        dist: &[HuffmanCode],
        flags: RepresentationFlags,
    ) {
        bytemuck::bytes_of_mut(self).fill(0);
        for (i, code) in lit_len.iter().enumerate() {
            if flags.contains(RepresentationFlags::SOFTWARE) {
                self.sw_lit_len[i] = code.to_cell();
            }
            if flags.contains(RepresentationFlags::HARDWARE) {
                self.hw_lit_len[i] = code.reversed().to_cell();
            }
        }
        for (i, code) in dist.iter().enumerate() {
            if flags.contains(RepresentationFlags::SOFTWARE) {
                self.sw_dist[i] = code.to_cell();
            }
            if flags.contains(RepresentationFlags::HARDWARE) {
                self.hw_dist[i] = code.reversed().to_cell();
            }
        }
        self.representation = flags.bits();
    }

    pub(crate) fn set_header(&mut self, bytes: &[u8], bits: u32) -> Result<()> {
        if bytes.len() > MAX_HEADER_BYTES || (bits as usize + 7) / 8 != bytes.len() {
            return Err(Error::InvalidSize("header does not fit its bit length"));
        }
        self.header = [0; MAX_HEADER_BYTES];
        self.header[..bytes.len()].copy_from_slice(bytes);
        self.header_bits = bits;
        Ok(())
    }

    /// The code of a literal/length symbol in the given layout, or `None` if that layout was not
    /// built.
    pub fn lit_len_code(&self, representation: Representation, symbol: usize) -> Option<HuffmanCode> {
        if !self.representation().contains(representation.flag()) {
            return None;
        }
        let cell = match representation {
            Representation::Software => self.sw_lit_len.get(symbol)?,
            Representation::Hardware => self.hw_lit_len.get(symbol)?,
        };
        Some(HuffmanCode::from_cell(*cell))
    }

    pub fn dist_code(&self, representation: Representation, symbol: usize) -> Option<HuffmanCode> {
        if !self.representation().contains(representation.flag()) {
            return None;
        }
        let cell = match representation {
            Representation::Software => self.sw_dist.get(symbol)?,
            Representation::Hardware => self.hw_dist.get(symbol)?,
        };
        Some(HuffmanCode::from_cell(*cell))
    }

    /// Canonical codes of both alphabets, read from whichever layout is present.
    pub(crate) fn canonical_codes(&self) -> Result<([HuffmanCode; NUM_LIT_LEN], [HuffmanCode; NUM_DIST])> {
        let flags = self.representation();
        let mut lit_len = [HuffmanCode::default(); NUM_LIT_LEN];
        let mut dist = [HuffmanCode::default(); NUM_DIST];
        if flags.contains(RepresentationFlags::SOFTWARE) {
            for (code, &cell) in lit_len.iter_mut().zip(&self.sw_lit_len) {
                *code = HuffmanCode::from_cell(cell);
            }
            for (code, &cell) in dist.iter_mut().zip(&self.sw_dist) {
                *code = HuffmanCode::from_cell(cell);
            }
        } else if flags.contains(RepresentationFlags::HARDWARE) {
            for (code, &cell) in lit_len.iter_mut().zip(&self.hw_lit_len) {
                *code = HuffmanCode::from_cell(cell).reversed();
            }
            for (code, &cell) in dist.iter_mut().zip(&self.hw_dist) {
                *code = HuffmanCode::from_cell(cell).reversed();
            }
        } else {
            return Err(Error::NotInitialized);
        }
        Ok((lit_len, dist))
    }

    /// Check a table loaded byte for byte: its cells must be exactly what
    /// [`store_codes`](Self::store_codes) writes for its own codes.
    pub(crate) fn validate_raw(&self, allowed: RepresentationFlags) -> Result<()> {
        let flags = stored_flags(self.representation, allowed)?;
        if self.header_bits as usize > MAX_HEADER_BYTES * 8 {
            return Err(Error::MalformedTable("header bit count is too large"));
        }
        let (lit_len, dist) = self.canonical_codes()?;
        if !codes_fit(&lit_len) || !codes_fit(&dist) {
            return Err(Error::MalformedTable("code word longer than its length"));
        }
        let mut rebuilt = Self::new_boxed();
        rebuilt.store_codes(&lit_len, &dist, flags);
        rebuilt.header = self.header;
        rebuilt.header_bits = self.header_bits;
        if bytemuck::bytes_of(&*rebuilt) != bytemuck::bytes_of(self) {
            return Err(Error::MalformedTable("code cells disagree between layouts"));
        }
        Ok(())
    }

    /// Serialized header bytes, and the exact number of header bits.
    pub fn header(&self) -> (&[u8], u32) {
        let len = (self.header_bits as usize + 7) / 8;
        (&self.header[..len], self.header_bits)
    }
}
