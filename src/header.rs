//! Dynamic block headers (RFC1951 section 3.2.7).

use crate::{
    codec::{bitreader::BitReader, bitwriter::BitWriter},
    error::{Error, Result},
    huffman::{assign_canonical_codes, build_code_lengths, fill_lookup, HuffmanCode},
    tables::{CLCL_ORDER, MAX_CODE_LENGTH_CODE_LENGTH, MAX_HEADER_BYTES, NUM_DIST, NUM_LIT_LEN},
};

/// A serialized dynamic block header with BFINAL clear.
#[derive(Clone, Copy)]
pub(crate) struct EncodedHeader {
    pub bytes: [u8; MAX_HEADER_BYTES],
    pub bits: u32,
}

/// Serialize the header describing the given code lengths.
///
/// Lengths are sent one code-length symbol each, without the run-length symbols 16..=18.
pub(crate) fn encode_dynamic_header(
    lit_len_lengths: &[u8; NUM_LIT_LEN],
    dist_lengths: &[u8; NUM_DIST],
) -> Result<EncodedHeader> {
    let mut num_lit_len = NUM_LIT_LEN;
    while num_lit_len > 257 && lit_len_lengths[num_lit_len - 1] == 0 {
        num_lit_len -= 1;
    }
    let mut num_dist = NUM_DIST;
    while num_dist > 1 && dist_lengths[num_dist - 1] == 0 {
        num_dist -= 1;
    }

    let mut code_length_frequencies = [0u32; 19];
    for &length in lit_len_lengths[..num_lit_len]
        .iter()
        .chain(&dist_lengths[..num_dist])
    {
        code_length_frequencies[length as usize] += 1;
    }
    // A lone code-length symbol would give an incomplete code, which inflaters reject.
    if code_length_frequencies.iter().filter(|&&f| f > 0).count() < 2 {
        let spare = usize::from(code_length_frequencies[0] > 0);
        code_length_frequencies[spare] += 1;
    }
    let mut code_length_lengths = [0u8; 19];
    build_code_lengths(
        &code_length_frequencies,
        &mut code_length_lengths,
        MAX_CODE_LENGTH_CODE_LENGTH,
    );
    let mut code_length_codes = [HuffmanCode::default(); 19];
    assign_canonical_codes(&code_length_lengths, &mut code_length_codes);

    let mut num_clcl = 19;
    while num_clcl > 4 && code_length_lengths[CLCL_ORDER[num_clcl - 1]] == 0 {
        num_clcl -= 1;
    }

    let mut writer = BitWriter::new(Vec::with_capacity(MAX_HEADER_BYTES));
    writer.write_bits(0b100, 3)?; // non-final dynamic block
    writer.write_bits(num_lit_len as u64 - 257, 5)?;
    writer.write_bits(num_dist as u64 - 1, 5)?;
    writer.write_bits(num_clcl as u64 - 4, 4)?;
    for &symbol in &CLCL_ORDER[..num_clcl] {
        writer.write_bits(u64::from(code_length_lengths[symbol]), 3)?;
    }
    for &length in lit_len_lengths[..num_lit_len]
        .iter()
        .chain(&dist_lengths[..num_dist])
    {
        let code = code_length_codes[length as usize].reversed();
        writer.write_bits(u64::from(code.code), code.length)?;
    }

    let bits = writer.bits_written() as u32;
    writer.flush()?;
    let buffer = writer.take();

    let mut bytes = [0u8; MAX_HEADER_BYTES];
    bytes[..buffer.len()].copy_from_slice(&buffer);
    Ok(EncodedHeader { bytes, bits })
}

/// Read the code lengths of a dynamic block. BFINAL and BTYPE must already be consumed.
pub(crate) fn parse_dynamic_header(
    reader: &mut BitReader<'_>,
) -> Result<([u8; NUM_LIT_LEN], [u8; NUM_DIST])> {
    let num_lit_len = reader.read_bits(5)? as usize + 257;
    let num_dist = reader.read_bits(5)? as usize + 1;
    let num_clcl = reader.read_bits(4)? as usize + 4;
    if num_lit_len > NUM_LIT_LEN || num_dist > NUM_DIST {
        return Err(Error::CorruptData("too many codes in dynamic header"));
    }

    let mut code_length_lengths = [0u8; 19];
    for &symbol in &CLCL_ORDER[..num_clcl] {
        code_length_lengths[symbol] = reader.read_bits(3)? as u8;
    }
    let mut code_length_codes = [HuffmanCode::default(); 19];
    assign_canonical_codes(&code_length_lengths, &mut code_length_codes);
    let mut lookup = [0u16; 1 << MAX_CODE_LENGTH_CODE_LENGTH];
    if !fill_lookup(&mut lookup, &code_length_codes) {
        return Err(Error::CorruptData("invalid code length code"));
    }

    let mut lengths = [0u8; NUM_LIT_LEN + NUM_DIST];
    let total = num_lit_len + num_dist;
    let mut i = 0;
    while i < total {
        let entry = lookup[reader.peek(MAX_CODE_LENGTH_CODE_LENGTH) as usize];
        let length = (entry & 0xf) as u8;
        if entry == 0 || length as usize > reader.available() {
            return Err(Error::CorruptData("invalid code length symbol"));
        }
        reader.consume(length);

        let (value, repeat) = match entry >> 4 {
            symbol @ 0..=15 => (symbol as u8, 1),
            16 => {
                if i == 0 {
                    return Err(Error::CorruptData("repeat with no previous length"));
                }
                (lengths[i - 1], 3 + reader.read_bits(2)? as usize)
            }
            17 => (0, 3 + reader.read_bits(3)? as usize),
            _ => (0, 11 + reader.read_bits(7)? as usize),
        };
        if i + repeat > total {
            return Err(Error::CorruptData("code lengths overflow the header"));
        }
        lengths[i..i + repeat].fill(value);
        i += repeat;
    }

    if lengths[256] == 0 {
        return Err(Error::CorruptData("end-of-block symbol has no code"));
    }

    let mut lit_len_lengths = [0u8; NUM_LIT_LEN];
    let mut dist_lengths = [0u8; NUM_DIST];
    lit_len_lengths[..num_lit_len].copy_from_slice(&lengths[..num_lit_len]);
    dist_lengths[..num_dist].copy_from_slice(&lengths[num_lit_len..total]);
    Ok((lit_len_lengths, dist_lengths))
}
