use bytemuck::{Pod, Zeroable};

use crate::{
    error::{Error, Result},
    huffman::{codes_fit, fill_lookup, HuffmanCode},
    table::{
        compression::{stored_flags, validate_flags, CompressionTable},
        flags::RepresentationFlags,
        triplet::{validate_triplets, Triplet},
    },
    tables::{MAX_CODE_LENGTH, MAX_HEADER_BYTES, NUM_DIST, NUM_LIT_LEN},
};

/// Number of stream bits indexing a [`LookupTables`] entry.
pub(crate) const LOOKUP_BITS: u8 = MAX_CODE_LENGTH;

/// Flat decoding tables indexed by the next 15 stream bits.
///
/// Each entry holds `symbol << 4 | code_length`. Zero marks a bit pattern no code starts with.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct LookupTables {
    pub(crate) lit_len: [u16; 1 << LOOKUP_BITS],
    pub(crate) dist: [u16; 1 << LOOKUP_BITS],
}

impl LookupTables {
    pub(crate) fn fill(
        &mut self,
        lit_len: &[HuffmanCode],
        dist: &[HuffmanCode],
    ) -> bool {
        fill_lookup(&mut self.lit_len, lit_len) && fill_lookup(&mut self.dist, dist)
    }
}

/// Canonical index of one alphabet: symbols sorted by `(length, code)`.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct CanonicalIndex {
    first: [u16; 16],
    count: [u16; 16],
    symbols: [u16; NUM_LIT_LEN],
    codes: [u16; NUM_LIT_LEN],
}

impl CanonicalIndex {
    fn build(&mut self, codes: &[HuffmanCode]) {
        *self = Self::zeroed();
        for code in codes {
            self.count[code.length as usize] += 1;
        }
        self.count[0] = 0;
        for length in 1..16 {
            self.first[length] = self.first[length - 1] + self.count[length - 1];
        }

        let mut order: Vec<(u8, u16, u16)> = codes
            .iter()
            .enumerate()
            .filter(|(_, c)| c.length > 0)
            .map(|(symbol, c)| (c.length, c.code, symbol as u16))
            .collect();
        order.sort_unstable();
        for (slot, (_, code, symbol)) in order.into_iter().enumerate() {
            self.codes[slot] = code;
            self.symbols[slot] = symbol;
        }
    }

    /// Symbol whose code is `code` (most significant bit first) of the given length.
    pub fn lookup(&self, code: u16, length: u8) -> Option<u16> {
        let length = length as usize;
        if length == 0 || length > 15 {
            return None;
        }
        let start = self.first[length] as usize;
        let end = start + self.count[length] as usize;
        let slot = self.codes[start..end].binary_search(&code).ok()?;
        Some(self.symbols[start + slot])
    }
}

/// Decoder state used by an accelerator: one canonical index per alphabet.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct HardwareDecodeState {
    pub lit_len: CanonicalIndex,
    pub dist: CanonicalIndex,
}

/// Decoder-side view of a Huffman table.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DecompressionTable {
    lookup: LookupTables,
    hardware: HardwareDecodeState,
    lit_len_codes: [u32; NUM_LIT_LEN],
    dist_codes: [u32; NUM_DIST],
    header: [u8; MAX_HEADER_BYTES],
    header_bits: u32,
    representation: u32,
}

const _: () = assert!(std::mem::size_of::<DecompressionTable>() % 8 == 0);

impl DecompressionTable {
    pub fn new_boxed() -> Box<Self> {
        bytemuck::zeroed_box()
    }

    pub fn representation(&self) -> RepresentationFlags {
        RepresentationFlags::from_bits(self.representation).unwrap_or_default()
    }

    /// Invert the codes of `source` for every requested layout that `source` also has.
    pub fn build_from_compression(
        &mut self,
        source: &CompressionTable,
        flags: RepresentationFlags,
    ) -> Result<()> {
        validate_flags(flags)?;
        let paths = flags.paths() & source.representation().paths();
        if paths.is_empty() {
            return Err(Error::UnsupportedMode(
                "source table lacks every requested representation",
            ));
        }
        let (lit_len, dist) = source.canonical_codes()?;
        self.store_codes(&lit_len, &dist, paths | flags.family())?;
        let (header, bits) = source.header();
        self.header[..header.len()].copy_from_slice(header);
        self.header_bits = bits;
        Ok(())
    }

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
        self.store_codes(&lit_len, &[HuffmanCode::default(); NUM_DIST], flags)
    }

    /// Rebuild every structure from canonical codes. Resets the header.
    pub(crate) fn store_codes(
        &mut self,
        lit_len: &[HuffmanCode; NUM_LIT_LEN],
        dist: &[HuffmanCode; NUM_DIST],
        flags: RepresentationFlags,
    ) -> Result<()> {
        bytemuck::bytes_of_mut(self).fill(0);
        if flags.contains(RepresentationFlags::SOFTWARE) && !self.lookup.fill(lit_len, dist) {
            bytemuck::bytes_of_mut(self).fill(0);
            return Err(Error::MalformedTable("codes are not prefix-free"));
        }
        if flags.contains(RepresentationFlags::HARDWARE) {
            self.hardware.lit_len.build(lit_len);
            self.hardware.dist.build(dist);
        }
        for (cell, code) in self.lit_len_codes.iter_mut().zip(lit_len) {
            *cell = code.to_cell();
        }
        for (cell, code) in self.dist_codes.iter_mut().zip(dist) {
            *cell = code.to_cell();
        }
        self.representation = flags.bits();
        Ok(())
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

    /// Software lookup tables, if that layout was built.
    pub fn lookup_tables(&self) -> Option<&LookupTables> {
        self.representation()
            .contains(RepresentationFlags::SOFTWARE)
            .then_some(&self.lookup)
    }

    /// Hardware decode state, if that layout was built.
    pub fn hardware_state(&self) -> Option<&HardwareDecodeState> {
        self.representation()
            .contains(RepresentationFlags::HARDWARE)
            .then_some(&self.hardware)
    }

    pub(crate) fn canonical_codes(&self) -> ([HuffmanCode; NUM_LIT_LEN], [HuffmanCode; NUM_DIST]) {
        let mut lit_len = [HuffmanCode::default(); NUM_LIT_LEN];
        let mut dist = [HuffmanCode::default(); NUM_DIST];
        for (code, &cell) in lit_len.iter_mut().zip(&self.lit_len_codes) {
            *code = HuffmanCode::from_cell(cell);
        }
        for (code, &cell) in dist.iter_mut().zip(&self.dist_codes) {
            *code = HuffmanCode::from_cell(cell);
        }
        (lit_len, dist)
    }

    /// Check a table loaded byte for byte: the lookup structures must be exactly what
    /// [`store_codes`](Self::store_codes) builds from its code cells.
    pub(crate) fn validate_raw(&self, allowed: RepresentationFlags) -> Result<()> {
        let flags = stored_flags(self.representation, allowed)?;
        if self.header_bits as usize > MAX_HEADER_BYTES * 8 {
            return Err(Error::MalformedTable("header bit count is too large"));
        }
        let (lit_len, dist) = self.canonical_codes();
        if !codes_fit(&lit_len) || !codes_fit(&dist) {
            return Err(Error::MalformedTable("code word longer than its length"));
        }
        let mut rebuilt = Self::new_boxed();
        rebuilt.store_codes(&lit_len, &dist, flags)?;
        rebuilt.header = self.header;
        rebuilt.header_bits = self.header_bits;
        if bytemuck::bytes_of(&*rebuilt) != bytemuck::bytes_of(self) {
            return Err(Error::MalformedTable("lookup structures do not match the code cells"));
        }
        Ok(())
    }

    pub fn header(&self) -> (&[u8], u32) {
        let len = (self.header_bits as usize + 7) / 8;
        (&self.header[..len], self.header_bits)
    }

    /// Decode the symbol that starts a 15-bit window of stream bits (least significant bit
    /// first). Returns the symbol and its code length.
    pub fn decode_lit_len(&self, bits: u16) -> Option<(u16, u8)> {
        let entry = self.lookup_tables()?.lit_len[(bits & 0x7fff) as usize];
        (entry != 0).then_some((entry >> 4, (entry & 0xf) as u8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{huffman::reverse_bits, table::flags::Representation};

    fn scenario_table() -> Box<CompressionTable> {
        let mut lit_len = [1u32; NUM_LIT_LEN];
        lit_len[b'A' as usize] = 100;
        let mut table = CompressionTable::new_boxed();
        table
            .build(
                &lit_len,
                &[1; NUM_DIST],
                RepresentationFlags::SOFTWARE
                    | RepresentationFlags::HARDWARE
                    | RepresentationFlags::DEFLATE,
            )
            .unwrap();
        table
    }

    #[test]
    fn decodes_the_frequent_literal() {
        let source = scenario_table();
        let mut table = DecompressionTable::new_boxed();
        table
            .build_from_compression(&source, RepresentationFlags::SOFTWARE)
            .unwrap();
        let code = source.lit_len_code(Representation::Software, b'A' as usize).unwrap();
        let bits = reverse_bits(code.code, code.length);
        assert_eq!(table.decode_lit_len(bits), Some((u16::from(b'A'), code.length)));
        assert!(table.hardware_state().is_none());
        assert_eq!(table.header(), source.header());
    }

    #[test]
    fn every_symbol_decodes() {
        let source = scenario_table();
        let mut table = DecompressionTable::new_boxed();
        let flags = RepresentationFlags::SOFTWARE | RepresentationFlags::HARDWARE;
        table.build_from_compression(&source, flags).unwrap();
        let hardware = table.hardware_state().unwrap();
        for symbol in 0..NUM_LIT_LEN {
            let code = source.lit_len_code(Representation::Software, symbol).unwrap();
            let bits = reverse_bits(code.code, code.length);
            assert_eq!(table.decode_lit_len(bits).unwrap().0, symbol as u16);
            assert_eq!(hardware.lit_len.lookup(code.code, code.length), Some(symbol as u16));
        }
        for symbol in 0..NUM_DIST {
            let code = source.dist_code(Representation::Software, symbol).unwrap();
            assert_eq!(hardware.dist.lookup(code.code, code.length), Some(symbol as u16));
        }
    }

    #[test]
    fn triplets_decode_to_their_symbols() {
        // Reverse the identity so that codes are not canonical.
        let triplets: Vec<Triplet> = (0..=255u8)
            .map(|s| Triplet::new(s, u16::from(255 - s), 8))
            .collect();
        let mut table = DecompressionTable::new_boxed();
        table
            .build_from_triplets(
                &triplets,
                RepresentationFlags::SOFTWARE
                    | RepresentationFlags::HARDWARE
                    | RepresentationFlags::HUFFMAN_ONLY,
            )
            .unwrap();
        for triplet in &triplets {
            let bits = reverse_bits(triplet.code, triplet.length);
            assert_eq!(
                table.decode_lit_len(bits),
                Some((u16::from(triplet.symbol), 8))
            );
            assert_eq!(
                table.hardware_state().unwrap().lit_len.lookup(triplet.code, 8),
                Some(u16::from(triplet.symbol))
            );
        }
    }

    #[test]
    fn missing_source_representation() {
        let mut source = CompressionTable::new_boxed();
        source
            .build(&[1; NUM_LIT_LEN], &[1; NUM_DIST], RepresentationFlags::HARDWARE)
            .unwrap();
        let mut table = DecompressionTable::new_boxed();
        assert!(matches!(
            table.build_from_compression(&source, RepresentationFlags::SOFTWARE),
            Err(Error::UnsupportedMode(_))
        ));
        table
            .build_from_compression(
                &source,
                RepresentationFlags::SOFTWARE | RepresentationFlags::HARDWARE,
            )
            .unwrap();
        assert_eq!(table.representation(), RepresentationFlags::HARDWARE);
    }
}
