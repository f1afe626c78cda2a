//! Persisting initialized tables.
//!
//! Every serialized table starts with a fixed prefix:
//!
//! | bytes | content |
//! |-------|---------|
//! | 4 | magic `HTBL` |
//! | 4 | layout version, little endian |
//! | 1 | format |
//! | 1 | table kind |
//! | 1 | execution path |
//! | 1 | zero |
//! | 4 | representation flags, little endian |
//!
//! `Raw` then stores each present sub-table byte for byte. `Compact` stores the 286 + 30 code
//! cells, the header bit length and the header bytes, and rebuilds the lookup structures on load.

use std::convert::TryFrom;

use log::debug;

use crate::{
    error::{Error, Result},
    huffman::{codes_fit, HuffmanCode},
    options::{ExecutionPath, TableKind},
    table::{
        flags::RepresentationFlags, Allocator, HuffmanTable, TableFamily, TABLE_VERSION,
    },
    tables::{MAX_HEADER_BYTES, NUM_DIST, NUM_LIT_LEN},
};

const MAGIC: [u8; 4] = *b"HTBL";
const PREFIX_LEN: usize = 16;
const CELLS_LEN: usize = (NUM_LIT_LEN + NUM_DIST) * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializeFormat {
    #[default]
    Compact,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerializeOptions {
    pub format: SerializeFormat,
    /// Reserved, must be zero.
    pub flags: u32,
}

impl SerializeOptions {
    fn validate(&self) -> Result<()> {
        if self.flags != 0 {
            return Err(Error::UnsupportedMode("serialization flags are reserved"));
        }
        Ok(())
    }
}

impl HuffmanTable {
    pub fn serialized_size(&self, options: SerializeOptions) -> Result<usize> {
        options.validate()?;
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        Ok(PREFIX_LEN
            + match options.format {
                SerializeFormat::Raw => {
                    self.compression.as_ref().map_or(0, |r| r.len() * 8)
                        + self.decompression.as_ref().map_or(0, |r| r.len() * 8)
                }
                SerializeFormat::Compact => CELLS_LEN + 4 + (self.header().1 as usize + 7) / 8,
            })
    }

    pub fn serialize(&self, options: SerializeOptions) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.serialized_size(options)?);
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(match options.format {
            SerializeFormat::Compact => 0,
            SerializeFormat::Raw => 1,
        });
        out.push(u32::from(self.kind) as u8);
        out.push(u32::from(self.path) as u8);
        out.push(0);
        out.extend_from_slice(&self.representation.bits().to_le_bytes());

        match options.format {
            SerializeFormat::Raw => {
                if let Some(compression) = self.compression_table() {
                    out.extend_from_slice(bytemuck::bytes_of(compression));
                }
                if let Some(decompression) = self.decompression_table() {
                    out.extend_from_slice(bytemuck::bytes_of(decompression));
                }
            }
            SerializeFormat::Compact => {
                let (lit_len, dist) = self.canonical_codes()?;
                for code in lit_len.iter().chain(&dist) {
                    out.extend_from_slice(&code.to_cell().to_le_bytes());
                }
                let (header, bits) = self.header();
                out.extend_from_slice(&bits.to_le_bytes());
                out.extend_from_slice(header);
            }
        }
        debug!("serialized {:?} table into {} bytes", options.format, out.len());
        Ok(out)
    }

    pub fn deserialize(
        bytes: &[u8],
        options: SerializeOptions,
        allocator: Allocator,
    ) -> Result<Self> {
        options.validate()?;
        if bytes.len() < PREFIX_LEN || bytes[..4] != MAGIC {
            return Err(Error::MalformedTable("missing table prefix"));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != TABLE_VERSION {
            return Err(Error::MalformedTable("unknown table version"));
        }
        let format = match bytes[8] {
            0 => SerializeFormat::Compact,
            1 => SerializeFormat::Raw,
            _ => return Err(Error::MalformedTable("unknown format")),
        };
        if format != options.format {
            return Err(Error::MalformedTable("format does not match the options"));
        }
        let kind = TableKind::try_from(u32::from(bytes[9]))
            .map_err(|_| Error::MalformedTable("unknown table kind"))?;
        let path = ExecutionPath::try_from(u32::from(bytes[10]))
            .map_err(|_| Error::MalformedTable("unknown execution path"))?;
        let representation = RepresentationFlags::from_bits(u32::from_le_bytes([
            bytes[12], bytes[13], bytes[14], bytes[15],
        ]))
        .ok_or(Error::MalformedTable("unknown representation flags"))?;
        let family = if representation.contains(RepresentationFlags::HUFFMAN_ONLY) {
            TableFamily::HuffmanOnly
        } else {
            TableFamily::Deflate
        };

        let mut table = HuffmanTable::new(kind, family, path, allocator)?;
        if table.representation != representation {
            return Err(Error::MalformedTable("representation does not match the path"));
        }
        let body = &bytes[PREFIX_LEN..];
        match format {
            SerializeFormat::Raw => table.load_raw(body)?,
            SerializeFormat::Compact => table.load_compact(body)?,
        }
        table.mark_initialized("serialized bytes");
        Ok(table)
    }

    fn load_raw(&mut self, mut body: &[u8]) -> Result<()> {
        let flags = self.representation;
        let (compression, decompression) = self.views_mut();
        if let Some(compression) = compression {
            let target = bytemuck::bytes_of_mut(compression);
            let len = target.len();
            if body.len() < len {
                return Err(Error::MalformedTable("truncated compression table"));
            }
            target.copy_from_slice(&body[..len]);
            body = &body[len..];
            compression.validate_raw(flags)?;
        }
        if let Some(decompression) = decompression {
            let target = bytemuck::bytes_of_mut(decompression);
            let len = target.len();
            if body.len() < len {
                return Err(Error::MalformedTable("truncated decompression table"));
            }
            target.copy_from_slice(&body[..len]);
            body = &body[len..];
            decompression.validate_raw(flags)?;
        }
        if !body.is_empty() {
            return Err(Error::MalformedTable("trailing bytes"));
        }
        Ok(())
    }

    fn load_compact(&mut self, body: &[u8]) -> Result<()> {
        if body.len() < CELLS_LEN + 4 {
            return Err(Error::MalformedTable("truncated code cells"));
        }
        let mut lit_len = [HuffmanCode::default(); NUM_LIT_LEN];
        let mut dist = [HuffmanCode::default(); NUM_DIST];
        let mut cells = body[..CELLS_LEN]
            .chunks_exact(4)
            .map(|c| HuffmanCode::from_cell(u32::from_le_bytes([c[0], c[1], c[2], c[3]])));
        for (code, cell) in lit_len.iter_mut().chain(dist.iter_mut()).zip(&mut cells) {
            *code = cell;
        }

        if !codes_fit(&lit_len) || !codes_fit(&dist) {
            return Err(Error::MalformedTable("code word longer than its length"));
        }

        let bits = u32::from_le_bytes([
            body[CELLS_LEN],
            body[CELLS_LEN + 1],
            body[CELLS_LEN + 2],
            body[CELLS_LEN + 3],
        ]);
        let header = &body[CELLS_LEN + 4..];
        if header.len() > MAX_HEADER_BYTES || header.len() != (bits as usize + 7) / 8 {
            return Err(Error::MalformedTable("header length does not match its bit count"));
        }

        self.store_all(&lit_len, &dist, header, bits)
    }
}
