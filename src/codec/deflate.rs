//! Software DEFLATE encoder.
//!
//! Input is parsed greedily into tokens staged in the job's middle-layer buffer. Whenever the
//! buffer fills, its tokens are emitted through the [`ExternalTables`] of the block's code.

use bytemuck::{Pod, Zeroable};
use log::trace;
use simd_adler32::Adler32;

use crate::{
    codec::{
        bitwriter::BitWriter,
        matchfinder::{GreedyParser, MatchFinder, Token},
    },
    error::{Error, Result},
    interop::{
        internal_to_external, lookup_literal_code, lookup_match_length_code, lookup_offset_code,
        BitOrder, ExternalTables, PackedCode,
    },
    options::{CompressMode, CompressOptions, Completion},
    table::{
        compression::CompressionTable,
        flags::{Representation, RepresentationFlags},
        HuffmanTable,
    },
    tables::{
        distance_to_dist_sym, END_OF_BLOCK, LENGTH_TO_SYMBOL, MIN_MATCH, NUM_DIST, NUM_LITERALS,
        NUM_LIT_LEN,
    },
};

const ZLIB_HEADER: [u8; 2] = [0x78, 0x01];

/// Encoder bookkeeping kept in the job's compression region.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub(crate) struct DeflateState {
    pub blocks_written: u64,
    pub tokens_written: u64,
}

/// Compress `input` in one call, appending the result to `output`.
pub(crate) fn compress(
    state: &mut DeflateState,
    mut finder: MatchFinder<'_>,
    tokens: &mut [u32],
    input: &[u8],
    output: &mut Vec<u8>,
    options: &CompressOptions<'_>,
) -> Result<Completion> {
    options.validate()?;
    if u32::try_from(input.len()).is_err() {
        return Err(Error::InvalidSize("input must be shorter than 4 GiB"));
    }
    if tokens.is_empty() {
        return Err(Error::InvalidSize("token buffer is empty"));
    }

    let start = output.len();
    if options.zlib {
        output.extend_from_slice(&ZLIB_HEADER);
    }

    let mut writer = BitWriter::new(&mut *output);
    match options.mode {
        CompressMode::HuffmanOnly(table) => {
            let external = huffman_only_tables(table)?;
            for &byte in input {
                write_code(&mut writer, lookup_literal_code(&external, byte))?;
            }
        }
        CompressMode::Canned(table) => {
            let external = canned_tables(table)?;
            let mut parser = GreedyParser::new();
            loop {
                let count = fill_tokens(&mut parser, &mut finder, input, tokens);
                write_tokens(&mut writer, &external, &tokens[..count])?;
                state.tokens_written += count as u64;
                if parser.position() >= input.len() {
                    break;
                }
            }
            write_code(&mut writer, external.end_of_block())?;
            state.blocks_written += 1;
        }
        CompressMode::Dynamic | CompressMode::Fixed => {
            let fixed = match options.mode {
                CompressMode::Fixed => Some(internal_to_external(
                    &CompressionTable::fixed(),
                    BitOrder::LsbFirst,
                )?),
                _ => None,
            };
            let mut parser = GreedyParser::new();
            loop {
                let count = fill_tokens(&mut parser, &mut finder, input, tokens);
                let last = parser.position() >= input.len();
                let block = &tokens[..count];
                match &fixed {
                    Some(external) => {
                        writer.write_bits(u64::from(last) | 0b010, 3)?;
                        write_tokens(&mut writer, external, block)?;
                        write_code(&mut writer, external.end_of_block())?;
                    }
                    None => write_dynamic_block(&mut writer, block, last)?,
                }
                state.blocks_written += 1;
                state.tokens_written += count as u64;
                trace!("emitted block of {count} tokens (final: {last})");
                if last {
                    break;
                }
            }
        }
    }

    let padding_bits = writer.padding_bits();
    writer.flush()?;

    let mut checksum = Adler32::new();
    checksum.write(input);
    let checksum = checksum.finish();
    if options.zlib {
        output.extend_from_slice(&checksum.to_be_bytes());
    }

    Ok(Completion {
        consumed: input.len(),
        produced: output.len() - start,
        padding_bits,
        checksum,
    })
}

fn fill_tokens(
    parser: &mut GreedyParser,
    finder: &mut MatchFinder<'_>,
    input: &[u8],
    tokens: &mut [u32],
) -> usize {
    let mut count = 0;
    while count < tokens.len() {
        match parser.next(finder, input) {
            Some(token) => {
                tokens[count] = token.pack();
                count += 1;
            }
            None => break,
        }
    }
    count
}

fn write_code<W: std::io::Write>(writer: &mut BitWriter<W>, code: PackedCode) -> Result<()> {
    writer.write_bits(u64::from(code.bits), code.length)?;
    Ok(())
}

fn write_tokens<W: std::io::Write>(
    writer: &mut BitWriter<W>,
    external: &ExternalTables,
    tokens: &[u32],
) -> Result<()> {
    for &word in tokens {
        match Token::unpack(word) {
            Token::Literal(byte) => write_code(writer, lookup_literal_code(external, byte))?,
            Token::Match { length, distance } => {
                write_code(writer, lookup_match_length_code(external, length as usize))?;
                write_code(writer, lookup_offset_code(external, distance as usize))?;
            }
        }
    }
    Ok(())
}

/// Build a code from the block's own statistics, then write its header, body and end-of-block.
fn write_dynamic_block<W: std::io::Write>(
    writer: &mut BitWriter<W>,
    tokens: &[u32],
    last: bool,
) -> Result<()> {
    let mut lit_len = [0u32; NUM_LIT_LEN];
    let mut dist = [0u32; NUM_DIST];
    for &word in tokens {
        match Token::unpack(word) {
            Token::Literal(byte) => lit_len[byte as usize] += 1,
            Token::Match { length, distance } => {
                lit_len[LENGTH_TO_SYMBOL[length as usize - MIN_MATCH] as usize] += 1;
                dist[distance_to_dist_sym(distance) as usize] += 1;
            }
        }
    }
    lit_len[END_OF_BLOCK] = 1;

    // Both codes need at least two symbols to be complete.
    if lit_len.iter().filter(|&&f| f > 0).count() < 2 {
        lit_len[0] = 1;
    }
    for slot in 0..NUM_DIST {
        if dist.iter().filter(|&&f| f > 0).count() >= 2 {
            break;
        }
        if dist[slot] == 0 {
            dist[slot] = 1;
        }
    }

    let mut table = CompressionTable::new_boxed();
    table.build(
        &lit_len,
        &dist,
        RepresentationFlags::SOFTWARE | RepresentationFlags::DEFLATE,
    )?;
    let external = internal_to_external(&table, BitOrder::LsbFirst)?;

    let mut header = external.header;
    if !last {
        header[0] &= !1;
    }
    writer.write_packed(&header, external.header_bits as usize)?;
    write_tokens(writer, &external, tokens)?;
    write_code(writer, external.end_of_block())
}

fn representation_of(table: &CompressionTable) -> Representation {
    if table.representation().contains(RepresentationFlags::SOFTWARE) {
        Representation::Software
    } else {
        Representation::Hardware
    }
}

fn canned_tables(table: &HuffmanTable) -> Result<Box<ExternalTables>> {
    let compression = table.initialized_compression()?;
    if !table.representation().contains(RepresentationFlags::DEFLATE) {
        return Err(Error::InvalidRepresentation(
            "canned mode needs a deflate table",
        ));
    }
    let representation = representation_of(compression);
    let complete = (0..NUM_LIT_LEN)
        .filter_map(|symbol| compression.lit_len_code(representation, symbol))
        .chain((0..NUM_DIST).filter_map(|symbol| compression.dist_code(representation, symbol)))
        .filter(|code| code.length > 0)
        .count()
        == NUM_LIT_LEN + NUM_DIST;
    if !complete {
        return Err(Error::InvalidRepresentation(
            "canned tables must code every symbol",
        ));
    }
    internal_to_external(compression, BitOrder::LsbFirst)
}

fn huffman_only_tables(table: &HuffmanTable) -> Result<Box<ExternalTables>> {
    let compression = table.initialized_compression()?;
    if !table
        .representation()
        .contains(RepresentationFlags::HUFFMAN_ONLY)
    {
        return Err(Error::InvalidRepresentation(
            "huffman-only mode needs a huffman-only table",
        ));
    }
    let representation = representation_of(compression);
    let complete = (0..NUM_LITERALS)
        .filter_map(|symbol| compression.lit_len_code(representation, symbol))
        .all(|code| code.length > 0);
    if !complete {
        return Err(Error::InvalidRepresentation(
            "huffman-only tables must code every literal",
        ));
    }
    internal_to_external(compression, BitOrder::LsbFirst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        codec::matchfinder::{CHAIN_SIZE, HIGH_TABLE_SIZE, LOW_TABLE_SIZE},
        histogram::Histogram,
        options::{CompressionLevel, ExecutionPath, TableKind},
        table::Allocator,
    };
    use rand::Rng;

    struct Workspace {
        high: Vec<u32>,
        low: Vec<u32>,
        chain: Vec<u32>,
        tokens: Vec<u32>,
    }

    impl Workspace {
        fn new(tokens: usize) -> Self {
            Self {
                high: vec![0; HIGH_TABLE_SIZE],
                low: vec![0; LOW_TABLE_SIZE],
                chain: vec![0; CHAIN_SIZE],
                tokens: vec![0; tokens],
            }
        }

        fn compress(&mut self, input: &[u8], options: &CompressOptions<'_>) -> Result<Vec<u8>> {
            let finder = MatchFinder::new(
                &mut self.high,
                &mut self.low,
                &mut self.chain,
                options.level,
            );
            let mut output = Vec::new();
            let mut state = DeflateState::default();
            compress(&mut state, finder, &mut self.tokens, input, &mut output, options)?;
            Ok(output)
        }
    }

    fn sample(len: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        let words: [&[u8]; 4] = [b"alpha ", b"beta ", b"gamma ", b"delta\n"];
        let mut data = Vec::with_capacity(len + 8);
        while data.len() < len {
            if rng.gen_bool(0.1) {
                data.push(rng.gen());
            } else {
                data.extend_from_slice(words[rng.gen_range(0..4)]);
            }
        }
        data.truncate(len);
        data
    }

    #[test]
    fn dynamic_blocks_inflate() {
        for len in [0, 1, 2, 100, 70_000] {
            let data = sample(len);
            for level in [CompressionLevel::Default, CompressionLevel::High] {
                // A small token buffer forces several blocks.
                let mut workspace = Workspace::new(1000);
                let options = CompressOptions::default().with_level(level);
                let compressed = workspace.compress(&data, &options).unwrap();
                let decompressed =
                    miniz_oxide::inflate::decompress_to_vec(&compressed).unwrap();
                assert_eq!(decompressed, data);
            }
        }
    }

    #[test]
    fn fixed_zlib_stream() {
        let data = sample(10_000);
        let mut workspace = Workspace::new(4096);
        let options = CompressOptions::new(CompressMode::Fixed).with_zlib(true);
        let compressed = workspace.compress(&data, &options).unwrap();
        assert_eq!(&compressed[..2], &ZLIB_HEADER);
        let decompressed =
            miniz_oxide::inflate::decompress_to_vec_zlib(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn canned_needs_complete_deflate_table() {
        let mut table = HuffmanTable::huffman_only(
            TableKind::Compression,
            ExecutionPath::Software,
            Allocator::default(),
        )
        .unwrap();
        table.init_with_histogram(&Histogram::new()).unwrap();

        let mut workspace = Workspace::new(16);
        let result = workspace.compress(b"abc", &CompressOptions::new(CompressMode::Canned(&table)));
        assert!(matches!(result, Err(Error::InvalidRepresentation(_))));

        let result = workspace.compress(
            b"abc",
            &CompressOptions::new(CompressMode::HuffmanOnly(&table)).with_zlib(true),
        );
        assert!(matches!(result, Err(Error::UnsupportedMode(_))));
    }

    #[test]
    fn uninitialized_table() {
        let table = HuffmanTable::deflate(
            TableKind::Combined,
            ExecutionPath::Software,
            Allocator::default(),
        )
        .unwrap();
        let mut workspace = Workspace::new(16);
        let result = workspace.compress(b"abc", &CompressOptions::new(CompressMode::Canned(&table)));
        assert!(matches!(result, Err(Error::NotInitialized)));
    }

    #[test]
    fn huffman_only_uses_literal_codes() {
        let mut table = HuffmanTable::huffman_only(
            TableKind::Compression,
            ExecutionPath::Software,
            Allocator::default(),
        )
        .unwrap();
        let mut histogram = Histogram::new();
        histogram.literal_lengths[b'A' as usize] = 1000;
        table.init_with_histogram(&histogram).unwrap();
        let length = table
            .compression_table()
            .unwrap()
            .lit_len_code(Representation::Software, b'A' as usize)
            .unwrap()
            .length;

        let mut workspace = Workspace::new(16);
        let output = workspace
            .compress(&[b'A'; 64], &CompressOptions::new(CompressMode::HuffmanOnly(&table)))
            .unwrap();
        assert_eq!(output.len(), (64 * length as usize + 7) / 8);
    }
}
