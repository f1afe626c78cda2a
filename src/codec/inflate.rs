//! Software DEFLATE decoder.
//!
//! Every call decodes a complete unit: a whole stream, one canned block, or a run of
//! Huffman-only literals. Back-references may only reach into output produced by the same call.

use bytemuck::{Pod, Zeroable};
use log::{debug, trace};
use simd_adler32::Adler32;

use crate::{
    codec::bitreader::BitReader,
    error::{Error, Result},
    header::parse_dynamic_header,
    huffman::{assign_canonical_codes, HuffmanCode},
    options::{Completion, DecompressMode, DecompressOptions},
    table::{
        decompression::{LookupTables, LOOKUP_BITS},
        flags::RepresentationFlags,
        HuffmanTable,
    },
    tables::{
        fixed_lit_len_lengths, DIST_SYM_TO_DIST_BASE, DIST_SYM_TO_DIST_EXTRA, END_OF_BLOCK,
        FIXED_DIST_LENGTHS, LEN_SYM_TO_LEN_BASE, LEN_SYM_TO_LEN_EXTRA, NUM_DIST, NUM_LITERALS,
        NUM_LIT_LEN,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum BlockState {
    NewHeader = 1,
    InBlock = 2,
    Done = 3,
}

/// Decoder bookkeeping kept in the job's decompression region.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub(crate) struct InflateState {
    pub block_state: u32,
    pub final_block: u32,
    pub blocks_read: u64,
}

impl InflateState {
    pub fn reset(&mut self) {
        *self = Self {
            block_state: BlockState::NewHeader as u32,
            ..Self::default()
        };
    }

    fn set(&mut self, state: BlockState) {
        self.block_state = state as u32;
    }

    pub fn is_done(&self) -> bool {
        self.block_state == BlockState::Done as u32
    }
}

/// How a block body ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockEnd {
    EndOfBlock,
    InputExhausted,
}

/// Decompress `input` in one call, appending the result to `output`.
///
/// `scratch` holds the lookup tables of stream blocks. Canned and Huffman-only modes decode
/// straight from the attached table, or from `scratch` when that table has no software layout.
pub(crate) fn decompress(
    state: &mut InflateState,
    scratch: &mut LookupTables,
    input: &[u8],
    output: &mut Vec<u8>,
    options: &DecompressOptions<'_>,
) -> Result<Completion> {
    options.validate(input.len())?;
    state.reset();
    let start = output.len();

    let reader = match options.mode {
        DecompressMode::Stream => inflate_stream(state, scratch, input, output, options.zlib)?,
        DecompressMode::Canned(table) => {
            let lookup = table_lookup(table, RepresentationFlags::DEFLATE, scratch)?;
            let mut reader =
                BitReader::with_range(input, options.start_bit, options.ignore_end_bits)?;
            state.set(BlockState::InBlock);
            let end = decode_block(&mut reader, lookup, output, start, options.no_buffering)?;
            trace!("canned block ended with {end:?}");
            state.blocks_read += 1;
            reader
        }
        DecompressMode::HuffmanOnly(table) => {
            let lookup = table_lookup(table, RepresentationFlags::HUFFMAN_ONLY, scratch)?;
            let mut reader =
                BitReader::with_range(input, options.start_bit, options.ignore_end_bits)?;
            state.set(BlockState::InBlock);
            decode_literals(&mut reader, lookup, output)?;
            reader
        }
    };
    state.set(BlockState::Done);

    let mut checksum = Adler32::new();
    checksum.write(&output[start..]);
    let checksum = checksum.finish();
    let mut consumed = reader.bytes_consumed();
    let padding_bits = reader.unread_bits_in_byte();

    if options.zlib {
        let mut reader = reader;
        reader.align_to_byte();
        let trailer = reader.read_bytes(4)?;
        let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        if expected != checksum {
            return Err(Error::ChecksumMismatch {
                expected,
                actual: checksum,
            });
        }
        consumed = reader.bytes_consumed();
    }

    Ok(Completion {
        consumed,
        produced: output.len() - start,
        padding_bits,
        checksum,
    })
}

/// Lookup tables of an attached table. A table built only for hardware is expanded into
/// `scratch` from its code cells.
fn table_lookup<'a>(
    table: &'a HuffmanTable,
    family: RepresentationFlags,
    scratch: &'a mut LookupTables,
) -> Result<&'a LookupTables> {
    let decompression = table.initialized_decompression()?;
    if !table.representation().contains(family) {
        return Err(Error::InvalidRepresentation(
            "table family does not match the decompression mode",
        ));
    }
    if let Some(lookup) = decompression.lookup_tables() {
        return Ok(lookup);
    }
    let (lit_len, dist) = decompression.canonical_codes();
    if !scratch.fill(&lit_len, &dist) {
        return Err(Error::MalformedTable("codes are not prefix-free"));
    }
    debug!("expanded hardware-only table into software lookup tables");
    Ok(scratch)
}

fn inflate_stream<'a>(
    state: &mut InflateState,
    scratch: &mut LookupTables,
    input: &'a [u8],
    output: &mut Vec<u8>,
    zlib: bool,
) -> Result<BitReader<'a>> {
    let start = output.len();
    let mut reader = BitReader::new(input);
    if zlib {
        let header = reader.read_bytes(2)?;
        if header[0] & 0x0f != 0x08
            || (header[0] & 0xf0) > 0x70
            || u16::from_be_bytes([header[0], header[1]]) % 31 != 0
        {
            return Err(Error::CorruptData("invalid zlib header"));
        }
        if header[1] & 0x20 != 0 {
            return Err(Error::UnsupportedMode("preset dictionaries are not supported"));
        }
    }

    loop {
        let final_block = reader.read_bits(1)? != 0;
        let block_type = reader.read_bits(2)?;
        state.set(BlockState::InBlock);
        state.final_block = u32::from(final_block);
        match block_type {
            0 => {
                reader.align_to_byte();
                let lengths = reader.read_bytes(4)?;
                let len = u16::from_le_bytes([lengths[0], lengths[1]]);
                let nlen = u16::from_le_bytes([lengths[2], lengths[3]]);
                if len != !nlen {
                    return Err(Error::CorruptData("stored block length mismatch"));
                }
                output.extend_from_slice(reader.read_bytes(len as usize)?);
            }
            1 => {
                let mut lit_len = [HuffmanCode::default(); NUM_LIT_LEN];
                let mut dist = [HuffmanCode::default(); NUM_DIST];
                assign_canonical_codes(&fixed_lit_len_lengths(), &mut lit_len);
                assign_canonical_codes(&FIXED_DIST_LENGTHS, &mut dist);
                if !scratch.fill(&lit_len, &dist) {
                    return Err(Error::CorruptData("invalid fixed code"));
                }
                expect_end_of_block(decode_block(&mut reader, scratch, output, start, false)?)?;
            }
            2 => {
                let (lit_len_lengths, dist_lengths) = parse_dynamic_header(&mut reader)?;
                let mut lit_len = [HuffmanCode::default(); NUM_LIT_LEN];
                let mut dist = [HuffmanCode::default(); NUM_DIST];
                assign_canonical_codes(&lit_len_lengths, &mut lit_len);
                assign_canonical_codes(&dist_lengths, &mut dist);
                if !scratch.fill(&lit_len, &dist) {
                    return Err(Error::CorruptData("oversubscribed huffman code"));
                }
                trace!("parsed dynamic header, body starts at bit {}", reader.position());
                expect_end_of_block(decode_block(&mut reader, scratch, output, start, false)?)?;
            }
            _ => return Err(Error::CorruptData("reserved block type")),
        }
        state.blocks_read += 1;
        state.set(BlockState::NewHeader);
        if final_block {
            return Ok(reader);
        }
    }
}

fn expect_end_of_block(end: BlockEnd) -> Result<()> {
    match end {
        BlockEnd::EndOfBlock => Ok(()),
        BlockEnd::InputExhausted => Err(Error::CorruptData("unexpected end of input")),
    }
}

/// Look up the symbol at the reader position. `None` means the remaining bits cannot hold one.
fn next_symbol(reader: &BitReader<'_>, table: &[u16]) -> Result<Option<(u16, u8)>> {
    let entry = table[reader.peek(LOOKUP_BITS) as usize];
    let length = (entry & 0xf) as u8;
    if entry != 0 && length == 0 {
        return Err(Error::CorruptData("lookup entry without a code length"));
    }
    if entry != 0 && length as usize <= reader.available() {
        return Ok(Some((entry >> 4, length)));
    }
    if reader.available() < LOOKUP_BITS as usize {
        return Ok(None);
    }
    Err(Error::CorruptData("invalid huffman code"))
}

/// Decode one block body. With `stop_at_end`, running out of input ends the block cleanly.
fn decode_block(
    reader: &mut BitReader<'_>,
    lookup: &LookupTables,
    output: &mut Vec<u8>,
    start: usize,
    stop_at_end: bool,
) -> Result<BlockEnd> {
    let exhausted = || {
        if stop_at_end {
            Ok(BlockEnd::InputExhausted)
        } else {
            Err(Error::CorruptData("unexpected end of input"))
        }
    };

    loop {
        if reader.available() == 0 {
            return exhausted();
        }
        let Some((symbol, length)) = next_symbol(reader, &lookup.lit_len)? else {
            return exhausted();
        };
        reader.consume(length);

        let symbol = symbol as usize;
        if symbol < NUM_LITERALS {
            output.push(symbol as u8);
            continue;
        }
        if symbol == END_OF_BLOCK {
            return Ok(BlockEnd::EndOfBlock);
        }
        if symbol >= NUM_LIT_LEN {
            return Err(Error::CorruptData("invalid length symbol"));
        }

        let index = symbol - 257;
        let length = LEN_SYM_TO_LEN_BASE[index] as usize
            + reader.read_bits(LEN_SYM_TO_LEN_EXTRA[index])? as usize;

        let Some((dist_symbol, dist_length)) = next_symbol(reader, &lookup.dist)? else {
            return Err(Error::CorruptData("unexpected end of input"));
        };
        reader.consume(dist_length);
        let dist_symbol = dist_symbol as usize;
        if dist_symbol >= NUM_DIST {
            return Err(Error::CorruptData("invalid distance symbol"));
        }
        let distance = DIST_SYM_TO_DIST_BASE[dist_symbol] as usize
            + reader.read_bits(DIST_SYM_TO_DIST_EXTRA[dist_symbol])? as usize;

        if distance > output.len() - start {
            return Err(Error::CorruptData("distance reaches before the output start"));
        }
        let from = output.len() - distance;
        if distance >= length {
            output.extend_from_within(from..from + length);
        } else {
            for i in 0..length {
                let byte = output[from + i];
                output.push(byte);
            }
        }
    }
}

/// Decode literal codes until the remaining bits cannot hold another code.
fn decode_literals(
    reader: &mut BitReader<'_>,
    lookup: &LookupTables,
    output: &mut Vec<u8>,
) -> Result<()> {
    while reader.available() > 0 {
        let Some((symbol, length)) = next_symbol(reader, &lookup.lit_len)? else {
            break;
        };
        if symbol as usize >= NUM_LITERALS {
            return Err(Error::CorruptData("non-literal symbol in huffman-only data"));
        }
        reader.consume(length);
        output.push(symbol as u8);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        histogram::Histogram,
        options::{ExecutionPath, TableKind},
        table::{flags::Representation, triplet::Triplet, Allocator},
    };
    use rand::Rng;

    fn inflate(input: &[u8], options: &DecompressOptions<'_>) -> Result<Vec<u8>> {
        let mut scratch: Box<LookupTables> = bytemuck::zeroed_box();
        let mut state = InflateState::default();
        let mut output = Vec::new();
        decompress(&mut state, &mut scratch, input, &mut output, options)?;
        assert!(state.is_done());
        Ok(output)
    }

    fn random_text(len: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        (0..len)
            .map(|_| b"the quick brown fox "[rng.gen_range(0..20)])
            .collect()
    }

    #[test]
    fn reference_streams() {
        let data = random_text(50_000);
        for level in [0, 1, 6, 9] {
            let compressed = miniz_oxide::deflate::compress_to_vec(&data, level);
            assert_eq!(inflate(&compressed, &DecompressOptions::default()).unwrap(), data);

            let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&data, level);
            let options = DecompressOptions::default().with_zlib(true);
            assert_eq!(inflate(&compressed, &options).unwrap(), data);
        }
    }

    #[test]
    fn checksum_is_verified() {
        let mut compressed = miniz_oxide::deflate::compress_to_vec_zlib(b"hello hello", 6);
        let last = compressed.len() - 1;
        compressed[last] ^= 1;
        let options = DecompressOptions::default().with_zlib(true);
        assert!(matches!(
            inflate(&compressed, &options),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn truncated_stream() {
        let compressed = miniz_oxide::deflate::compress_to_vec(&random_text(1000), 6);
        let result = inflate(&compressed[..compressed.len() / 2], &DecompressOptions::default());
        assert!(matches!(result, Err(Error::CorruptData(_))));
    }

    #[test]
    fn reserved_block_type() {
        assert!(matches!(
            inflate(&[0b111], &DecompressOptions::default()),
            Err(Error::CorruptData("reserved block type"))
        ));
    }

    #[test]
    fn huffman_only_literals() {
        // Codes 0..=255 of length 8, bit-reversed into the stream.
        let triplets: Vec<Triplet> = (0..=255u8).map(|s| Triplet::new(s, s.into(), 8)).collect();
        let mut table = HuffmanTable::huffman_only(
            TableKind::Decompression,
            ExecutionPath::Software,
            Allocator::default(),
        )
        .unwrap();
        table.init_with_triplets(&triplets).unwrap();

        let input: Vec<u8> = b"abc".iter().map(|b| b.reverse_bits()).collect();
        let options = DecompressOptions::new(DecompressMode::HuffmanOnly(&table));
        assert_eq!(inflate(&input, &options).unwrap(), b"abc");

        let options = options.with_start_bit(8);
        assert_eq!(inflate(&input, &options).unwrap(), b"bc");
    }

    #[test]
    fn canned_requires_deflate_family() {
        let mut table = HuffmanTable::huffman_only(
            TableKind::Decompression,
            ExecutionPath::Software,
            Allocator::default(),
        )
        .unwrap();
        table.init_with_histogram(&Histogram::new()).unwrap();
        let options = DecompressOptions::new(DecompressMode::Canned(&table));
        assert!(matches!(
            inflate(&[0], &options),
            Err(Error::InvalidRepresentation(_))
        ));
    }

    #[test]
    fn corrupt_lookup_entries() {
        let mut lookup: Box<LookupTables> = bytemuck::zeroed_box();
        lookup.lit_len.fill((300 << 4) | 1);
        let mut output = Vec::new();
        let mut reader = BitReader::new(&[0; 4]);
        assert!(matches!(
            decode_block(&mut reader, &lookup, &mut output, 0, false),
            Err(Error::CorruptData("invalid length symbol"))
        ));

        // A symbol without a length would never advance the reader.
        lookup.lit_len.fill(1 << 4);
        let mut reader = BitReader::new(&[0; 4]);
        assert!(matches!(
            decode_block(&mut reader, &lookup, &mut output, 0, true),
            Err(Error::CorruptData(_))
        ));
        assert!(output.is_empty());
    }

    #[test]
    fn hardware_only_table_decodes_on_software() {
        let mut histogram = Histogram::new();
        histogram.literal_lengths[b'x' as usize] = 50;
        let mut table = HuffmanTable::deflate(
            TableKind::Combined,
            ExecutionPath::Hardware,
            Allocator::default(),
        )
        .unwrap();
        table.init_with_histogram(&histogram).unwrap();
        assert!(table
            .decompression_table()
            .unwrap()
            .lookup_tables()
            .is_none());

        // Three 'x' literals, then end-of-block.
        let compression = table.compression_table().unwrap();
        let x = compression
            .lit_len_code(Representation::Hardware, b'x' as usize)
            .unwrap();
        let eob = compression
            .lit_len_code(Representation::Hardware, END_OF_BLOCK)
            .unwrap();
        let mut bits = 0u64;
        let mut len = 0;
        for code in [x, x, x, eob] {
            bits |= u64::from(code.code) << len;
            len += u32::from(code.length);
        }
        let input = bits.to_le_bytes();
        let options = DecompressOptions::new(DecompressMode::Canned(&table));
        assert_eq!(inflate(&input, &options).unwrap(), b"xxx");
    }
}
