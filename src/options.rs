use std::convert::TryFrom;

use crate::{error::Error, table::HuffmanTable};

/// Where an operation executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionPath {
    #[default]
    Software,
    Hardware,
    /// Try the hardware accelerator first and fall back to software on any failure.
    Auto,
}

impl TryFrom<u32> for ExecutionPath {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(ExecutionPath::Software),
            1 => Ok(ExecutionPath::Hardware),
            2 => Ok(ExecutionPath::Auto),
            other => Err(Error::BadPath(other)),
        }
    }
}

impl From<ExecutionPath> for u32 {
    fn from(path: ExecutionPath) -> u32 {
        match path {
            ExecutionPath::Software => 0,
            ExecutionPath::Hardware => 1,
            ExecutionPath::Auto => 2,
        }
    }
}

/// Which sub-tables a [`HuffmanTable`] owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Combined,
    Compression,
    Decompression,
}

impl TableKind {
    pub fn has_compression(self) -> bool {
        self != TableKind::Decompression
    }

    pub fn has_decompression(self) -> bool {
        self != TableKind::Compression
    }
}

impl TryFrom<u32> for TableKind {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Error> {
        match value {
            0 => Ok(TableKind::Combined),
            1 => Ok(TableKind::Compression),
            2 => Ok(TableKind::Decompression),
            other => Err(Error::BadTableType(other)),
        }
    }
}

impl From<TableKind> for u32 {
    fn from(kind: TableKind) -> u32 {
        match kind {
            TableKind::Combined => 0,
            TableKind::Compression => 1,
            TableKind::Decompression => 2,
        }
    }
}

/// Statistics and match-search effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionLevel {
    /// Literal-only statistics and a single-probe match search.
    #[default]
    Default,
    /// Full match-aware statistics and hash chain search.
    High,
}

#[derive(Debug, Clone, Copy, Default)]
pub enum CompressMode<'a> {
    /// Dynamic Huffman blocks built from the statistics of each block.
    #[default]
    Dynamic,
    /// The fixed Huffman code of RFC1951.
    Fixed,
    /// Encode a single header-less block with a previously built table.
    Canned(&'a HuffmanTable),
    /// Encode literals only, with no header and no end-of-block symbol.
    HuffmanOnly(&'a HuffmanTable),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompressOptions<'a> {
    pub level: CompressionLevel,
    pub mode: CompressMode<'a>,
    /// Wrap the output in a zlib header and Adler-32 trailer.
    pub zlib: bool,
}

impl<'a> CompressOptions<'a> {
    pub fn new(mode: CompressMode<'a>) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_zlib(mut self, zlib: bool) -> Self {
        self.zlib = zlib;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        match self.mode {
            CompressMode::Canned(_) | CompressMode::HuffmanOnly(_) if self.zlib => Err(
                Error::UnsupportedMode("zlib wrapping requires dynamic or fixed blocks"),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub enum DecompressMode<'a> {
    /// A regular DEFLATE stream of stored, fixed and dynamic blocks.
    #[default]
    Stream,
    /// A header-less block encoded with the given table.
    Canned(&'a HuffmanTable),
    /// Literal codes only, decoded until the input runs out.
    HuffmanOnly(&'a HuffmanTable),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecompressOptions<'a> {
    pub mode: DecompressMode<'a>,
    pub zlib: bool,
    /// Bit offset into the input where decoding starts.
    pub start_bit: usize,
    /// Number of bits at the end of the input that carry no data.
    pub ignore_end_bits: usize,
    /// Stop cleanly at the end of the input instead of requiring an end-of-block symbol.
    pub no_buffering: bool,
}

impl<'a> DecompressOptions<'a> {
    pub fn new(mode: DecompressMode<'a>) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_zlib(mut self, zlib: bool) -> Self {
        self.zlib = zlib;
        self
    }

    pub fn with_start_bit(mut self, start_bit: usize) -> Self {
        self.start_bit = start_bit;
        self
    }

    pub fn with_ignore_end_bits(mut self, bits: usize) -> Self {
        self.ignore_end_bits = bits;
        self
    }

    pub fn with_no_buffering(mut self, no_buffering: bool) -> Self {
        self.no_buffering = no_buffering;
        self
    }

    pub(crate) fn validate(&self, input_len: usize) -> Result<(), Error> {
        let bit_len = input_len.saturating_mul(8);
        match self.mode {
            DecompressMode::Stream => {
                if self.start_bit != 0 || self.no_buffering || self.ignore_end_bits != 0 {
                    return Err(Error::UnsupportedMode(
                        "random access options require canned or huffman-only mode",
                    ));
                }
            }
            DecompressMode::Canned(_) | DecompressMode::HuffmanOnly(_) => {
                if self.zlib {
                    return Err(Error::UnsupportedMode(
                        "zlib wrapping requires stream mode",
                    ));
                }
                if self.start_bit.saturating_add(self.ignore_end_bits) > bit_len {
                    return Err(Error::InvalidSize("bit range exceeds the input"));
                }
            }
        }
        Ok(())
    }
}

/// Result of a single compress or decompress call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Completion {
    /// Input bytes consumed, counting a partially consumed final byte.
    pub consumed: usize,
    /// Output bytes produced.
    pub produced: usize,
    /// Unused bits in the last byte, either written as zero padding or left unread.
    pub padding_bits: u8,
    /// Adler-32 of the uncompressed bytes of this call.
    pub checksum: u32,
}
