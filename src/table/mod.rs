//! Huffman table objects.
//!
//! A [`HuffmanTable`] owns one allocation that holds its compression and/or decompression
//! sub-table, and is initialized exactly once from a histogram, from triplets, or from another
//! table.

use std::{fmt, mem::size_of, ops::Range};

use log::debug;

use crate::{
    error::{Error, Result},
    histogram::Histogram,
    huffman::HuffmanCode,
    options::{ExecutionPath, TableKind},
    tables::{NUM_DIST, NUM_LIT_LEN},
};

pub mod compression;
pub mod decompression;
pub mod flags;
pub mod serialize;
pub mod triplet;

use compression::CompressionTable;
use decompression::DecompressionTable;
use flags::RepresentationFlags;
use triplet::Triplet;

/// Layout version stamped on every table.
pub const TABLE_VERSION: u32 = 1;

const COMPRESSION_WORDS: usize = size_of::<CompressionTable>() / 8;
const DECOMPRESSION_WORDS: usize = size_of::<DecompressionTable>() / 8;

/// Storage hooks for table objects.
///
/// `allocate` receives a size in bytes and returns at least that many bytes as 64-bit words.
/// If either hook is `None`, both fall back to the global allocator.
#[derive(Clone, Copy, Default)]
pub struct Allocator {
    pub allocate: Option<fn(usize) -> Option<Box<[u64]>>>,
    pub deallocate: Option<fn(Box<[u64]>)>,
}

impl Allocator {
    fn allocate(&self, bytes: usize) -> Result<Box<[u64]>> {
        let words = (bytes + 7) / 8;
        let storage = match (self.allocate, self.deallocate) {
            (Some(allocate), Some(_)) => allocate(bytes).ok_or(Error::AllocationFailed)?,
            _ => vec![0u64; words].into_boxed_slice(),
        };
        if storage.len() < words {
            self.deallocate(storage);
            return Err(Error::AllocationFailed);
        }
        Ok(storage)
    }

    fn deallocate(&self, storage: Box<[u64]>) {
        match (self.allocate, self.deallocate) {
            (Some(_), Some(deallocate)) => deallocate(storage),
            _ => drop(storage),
        }
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("custom", &(self.allocate.is_some() && self.deallocate.is_some()))
            .finish()
    }
}

/// Which table family a [`HuffmanTable`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableFamily {
    Deflate,
    HuffmanOnly,
}

impl TableFamily {
    fn flag(self) -> RepresentationFlags {
        match self {
            TableFamily::Deflate => RepresentationFlags::DEFLATE,
            TableFamily::HuffmanOnly => RepresentationFlags::HUFFMAN_ONLY,
        }
    }
}

pub struct HuffmanTable {
    storage: Option<Box<[u64]>>,
    compression: Option<Range<usize>>,
    decompression: Option<Range<usize>>,
    kind: TableKind,
    path: ExecutionPath,
    representation: RepresentationFlags,
    version: u32,
    initialized: bool,
    allocator: Allocator,
}

impl HuffmanTable {
    /// Create an empty table. The sub-tables named by `kind` share one allocation.
    pub fn new(
        kind: TableKind,
        family: TableFamily,
        path: ExecutionPath,
        allocator: Allocator,
    ) -> Result<Self> {
        let compression = kind.has_compression().then_some(0..COMPRESSION_WORDS);
        let start = compression.as_ref().map_or(0, |range| range.end);
        let decompression = kind
            .has_decompression()
            .then_some(start..start + DECOMPRESSION_WORDS);
        let words = decompression
            .as_ref()
            .or(compression.as_ref())
            .map_or(0, |range| range.end);

        let mut storage = allocator.allocate(words * 8)?;
        storage.fill(0);

        Ok(Self {
            storage: Some(storage),
            compression,
            decompression,
            kind,
            path,
            representation: RepresentationFlags::for_path(path) | family.flag(),
            version: TABLE_VERSION,
            initialized: false,
            allocator,
        })
    }

    pub fn deflate(kind: TableKind, path: ExecutionPath, allocator: Allocator) -> Result<Self> {
        Self::new(kind, TableFamily::Deflate, path, allocator)
    }

    pub fn huffman_only(kind: TableKind, path: ExecutionPath, allocator: Allocator) -> Result<Self> {
        Self::new(kind, TableFamily::HuffmanOnly, path, allocator)
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn path(&self) -> ExecutionPath {
        self.path
    }

    pub fn representation(&self) -> RepresentationFlags {
        self.representation
    }

    pub fn family(&self) -> TableFamily {
        if self.representation.contains(RepresentationFlags::HUFFMAN_ONLY) {
            TableFamily::HuffmanOnly
        } else {
            TableFamily::Deflate
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Build codes from symbol frequencies. Zero frequencies are treated as one.
    pub fn init_with_histogram(&mut self, histogram: &Histogram) -> Result<()> {
        self.ensure_uninitialized()?;
        histogram.validate()?;
        let mut histogram = histogram.clone();
        histogram.patch_zeros();

        let flags = self.representation;
        match self.views_mut() {
            (Some(compression), Some(decompression)) => {
                compression.build(&histogram.literal_lengths, &histogram.distances, flags)?;
                decompression.build_from_compression(compression, flags)?;
            }
            (Some(compression), None) => {
                compression.build(&histogram.literal_lengths, &histogram.distances, flags)?;
            }
            (None, Some(decompression)) => {
                let mut compression = CompressionTable::new_boxed();
                compression.build(&histogram.literal_lengths, &histogram.distances, flags)?;
                decompression.build_from_compression(&compression, flags)?;
            }
            (None, None) => return Err(Error::NotInitialized),
        }
        self.mark_initialized("histogram");
        Ok(())
    }

    /// Use caller-assigned literal codes. Only Huffman-only tables accept triplets.
    pub fn init_with_triplets(&mut self, triplets: &[Triplet]) -> Result<()> {
        self.ensure_uninitialized()?;
        if self.family() != TableFamily::HuffmanOnly {
            return Err(Error::InvalidRepresentation(
                "triplets are only valid for huffman-only tables",
            ));
        }

        let flags = self.representation;
        let (compression, decompression) = self.views_mut();
        if let Some(compression) = compression {
            compression.build_from_triplets(triplets, flags)?;
        }
        if let Some(decompression) = decompression {
            decompression.build_from_triplets(triplets, flags)?;
        }
        self.mark_initialized("triplets");
        Ok(())
    }

    /// Take the codes of `other` and build every layout this table was created for, whatever
    /// layouts `other` holds.
    pub fn init_with_other(&mut self, other: &HuffmanTable) -> Result<()> {
        self.ensure_uninitialized()?;
        if !other.initialized {
            return Err(Error::NotInitialized);
        }
        if self.representation.family() != other.representation.family() {
            return Err(Error::InvalidRepresentation("table families differ"));
        }

        let (lit_len, dist) = other.canonical_codes()?;
        let (header, bits) = other.header();
        self.store_all(&lit_len, &dist, header, bits)?;
        self.mark_initialized("another table");
        Ok(())
    }

    /// Release the table. Dropping it has the same effect.
    pub fn destroy(self) {}

    pub fn compression_table(&self) -> Option<&CompressionTable> {
        let storage = self.storage.as_deref()?;
        let range = self.compression.clone()?;
        Some(bytemuck::from_bytes(bytemuck::cast_slice(&storage[range])))
    }

    pub fn decompression_table(&self) -> Option<&DecompressionTable> {
        let storage = self.storage.as_deref()?;
        let range = self.decompression.clone()?;
        Some(bytemuck::from_bytes(bytemuck::cast_slice(&storage[range])))
    }

    /// The compression sub-table of an initialized table.
    pub(crate) fn initialized_compression(&self) -> Result<&CompressionTable> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        self.compression_table()
            .ok_or(Error::UnsupportedMode("table has no compression sub-table"))
    }

    pub(crate) fn initialized_decompression(&self) -> Result<&DecompressionTable> {
        if !self.initialized {
            return Err(Error::NotInitialized);
        }
        self.decompression_table()
            .ok_or(Error::UnsupportedMode("table has no decompression sub-table"))
    }

    pub(crate) fn views_mut(
        &mut self,
    ) -> (Option<&mut CompressionTable>, Option<&mut DecompressionTable>) {
        let Some(storage) = self.storage.as_deref_mut() else {
            return (None, None);
        };
        match (self.compression.clone(), self.decompression.clone()) {
            (Some(compression), Some(decompression)) => {
                let (head, tail) = storage.split_at_mut(decompression.start);
                (
                    Some(bytemuck::from_bytes_mut(bytemuck::cast_slice_mut(
                        &mut head[compression],
                    ))),
                    Some(bytemuck::from_bytes_mut(bytemuck::cast_slice_mut(
                        &mut tail[..decompression.len()],
                    ))),
                )
            }
            (Some(compression), None) => (
                Some(bytemuck::from_bytes_mut(bytemuck::cast_slice_mut(
                    &mut storage[compression],
                ))),
                None,
            ),
            (None, Some(decompression)) => (
                None,
                Some(bytemuck::from_bytes_mut(bytemuck::cast_slice_mut(
                    &mut storage[decompression],
                ))),
            ),
            (None, None) => (None, None),
        }
    }

    /// Rebuild every present sub-table from canonical codes and a block header.
    fn store_all(
        &mut self,
        lit_len: &[HuffmanCode; NUM_LIT_LEN],
        dist: &[HuffmanCode; NUM_DIST],
        header: &[u8],
        bits: u32,
    ) -> Result<()> {
        let flags = self.representation;
        let (compression, decompression) = self.views_mut();
        if let Some(compression) = compression {
            compression.store_codes(lit_len, dist, flags);
            compression.set_header(header, bits)?;
        }
        if let Some(decompression) = decompression {
            decompression.store_codes(lit_len, dist, flags)?;
            decompression.set_header(header, bits)?;
        }
        Ok(())
    }

    /// Codes of an initialized table, from whichever sub-table it has.
    fn canonical_codes(&self) -> Result<([HuffmanCode; NUM_LIT_LEN], [HuffmanCode; NUM_DIST])> {
        match (self.compression_table(), self.decompression_table()) {
            (Some(compression), _) => compression.canonical_codes(),
            (None, Some(decompression)) => Ok(decompression.canonical_codes()),
            (None, None) => Err(Error::NotInitialized),
        }
    }

    fn header(&self) -> (&[u8], u32) {
        match (self.compression_table(), self.decompression_table()) {
            (Some(compression), _) => compression.header(),
            (None, Some(decompression)) => decompression.header(),
            (None, None) => (&[], 0),
        }
    }

    fn ensure_uninitialized(&self) -> Result<()> {
        if self.initialized {
            return Err(Error::AlreadyInitialized);
        }
        Ok(())
    }

    pub(crate) fn mark_initialized(&mut self, source: &str) {
        self.initialized = true;
        debug!(
            "initialized {:?} huffman table from {source} ({:?})",
            self.kind, self.representation
        );
    }
}

impl Drop for HuffmanTable {
    fn drop(&mut self) {
        if let Some(storage) = self.storage.take() {
            self.allocator.deallocate(storage);
        }
    }
}

impl fmt::Debug for HuffmanTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HuffmanTable")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("representation", &self.representation)
            .field("version", &self.version)
            .field("initialized", &self.initialized)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        huffman::reverse_bits,
        table::flags::Representation,
        tables::NUM_LIT_LEN,
    };

    fn scenario_histogram() -> Histogram {
        let mut histogram = Histogram::new();
        histogram.literal_lengths[b'A' as usize] = 100;
        histogram
    }

    #[test]
    fn frequent_literal_roundtrip() {
        let mut table =
            HuffmanTable::deflate(TableKind::Combined, ExecutionPath::Software, Allocator::default())
                .unwrap();
        table.init_with_histogram(&scenario_histogram()).unwrap();

        let compression = table.compression_table().unwrap();
        let a = compression
            .lit_len_code(Representation::Software, b'A' as usize)
            .unwrap();
        for literal in 0..256 {
            let code = compression.lit_len_code(Representation::Software, literal).unwrap();
            assert!(code.length >= a.length);
        }

        let decoded = table
            .decompression_table()
            .unwrap()
            .decode_lit_len(reverse_bits(a.code, a.length));
        assert_eq!(decoded, Some((u16::from(b'A'), a.length)));
    }

    #[test]
    fn initialized_once() {
        let mut table = HuffmanTable::deflate(
            TableKind::Compression,
            ExecutionPath::Auto,
            Allocator::default(),
        )
        .unwrap();
        assert!(table.decompression_table().is_none());
        table.init_with_histogram(&scenario_histogram()).unwrap();
        assert!(matches!(
            table.init_with_histogram(&scenario_histogram()),
            Err(Error::AlreadyInitialized)
        ));
        let compression = table.compression_table().unwrap();
        assert!(compression
            .lit_len_code(Representation::Hardware, 0)
            .is_some());
    }

    #[test]
    fn failed_init_leaves_table_uninitialized() {
        let mut table =
            HuffmanTable::deflate(TableKind::Combined, ExecutionPath::Software, Allocator::default())
                .unwrap();
        let mut histogram = scenario_histogram();
        histogram.reserved[0] = 1;
        assert!(table.init_with_histogram(&histogram).is_err());
        assert!(!table.is_initialized());

        let triplets: Vec<Triplet> = (0..=255u8).map(|s| Triplet::new(s, s.into(), 8)).collect();
        assert!(matches!(
            table.init_with_triplets(&triplets),
            Err(Error::InvalidRepresentation(_))
        ));
        assert!(!table.is_initialized());
    }

    #[test]
    fn decompression_only_from_histogram() {
        let mut table = HuffmanTable::deflate(
            TableKind::Decompression,
            ExecutionPath::Software,
            Allocator::default(),
        )
        .unwrap();
        table.init_with_histogram(&scenario_histogram()).unwrap();
        assert!(table.compression_table().is_none());
        let decompression = table.decompression_table().unwrap();
        assert!(decompression.lookup_tables().is_some());
        assert!(decompression.header().1 > 0);
    }

    #[test]
    fn init_from_other_table() {
        let mut source = HuffmanTable::huffman_only(
            TableKind::Compression,
            ExecutionPath::Software,
            Allocator::default(),
        )
        .unwrap();
        let mut histogram = Histogram::new();
        histogram.literal_lengths[..NUM_LIT_LEN].fill(3);
        source.init_with_histogram(&histogram).unwrap();

        let mut deflate =
            HuffmanTable::deflate(TableKind::Combined, ExecutionPath::Software, Allocator::default())
                .unwrap();
        assert!(matches!(
            deflate.init_with_other(&source),
            Err(Error::InvalidRepresentation(_))
        ));

        let mut target = HuffmanTable::huffman_only(
            TableKind::Decompression,
            ExecutionPath::Software,
            Allocator::default(),
        )
        .unwrap();
        target.init_with_other(&source).unwrap();
        assert_eq!(target.kind(), TableKind::Decompression);
        let code = source
            .compression_table()
            .unwrap()
            .lit_len_code(Representation::Software, 200)
            .unwrap();
        assert_eq!(
            target
                .decompression_table()
                .unwrap()
                .decode_lit_len(reverse_bits(code.code, code.length)),
            Some((200, code.length))
        );

        // A decompression table keeps its code cells, so it can seed an encoder.
        let mut compression_from_decompression = HuffmanTable::huffman_only(
            TableKind::Compression,
            ExecutionPath::Software,
            Allocator::default(),
        )
        .unwrap();
        compression_from_decompression.init_with_other(&target).unwrap();
        assert_eq!(
            compression_from_decompression
                .compression_table()
                .unwrap()
                .lit_len_code(Representation::Software, 200),
            Some(code)
        );
    }

    #[test]
    fn init_from_other_builds_own_layouts() {
        let mut source =
            HuffmanTable::deflate(TableKind::Combined, ExecutionPath::Software, Allocator::default())
                .unwrap();
        source.init_with_histogram(&scenario_histogram()).unwrap();

        let mut target =
            HuffmanTable::deflate(TableKind::Combined, ExecutionPath::Hardware, Allocator::default())
                .unwrap();
        target.init_with_other(&source).unwrap();
        assert_eq!(
            target.representation(),
            RepresentationFlags::HARDWARE | RepresentationFlags::DEFLATE
        );

        let compression = target.compression_table().unwrap();
        assert_eq!(compression.representation(), target.representation());
        assert!(compression.lit_len_code(Representation::Software, 0).is_none());
        let decompression = target.decompression_table().unwrap();
        assert_eq!(decompression.representation(), target.representation());
        assert!(decompression.lookup_tables().is_none());
        let hardware = decompression.hardware_state().unwrap();

        let source_compression = source.compression_table().unwrap();
        for symbol in 0..NUM_LIT_LEN {
            let code = source_compression
                .lit_len_code(Representation::Software, symbol)
                .unwrap();
            assert_eq!(
                compression.lit_len_code(Representation::Hardware, symbol),
                Some(code.reversed())
            );
            if code.length > 0 {
                assert_eq!(hardware.lit_len.lookup(code.code, code.length), Some(symbol as u16));
            }
        }
        assert_eq!(compression.header(), source_compression.header());

        // And back again onto both paths.
        let mut both =
            HuffmanTable::deflate(TableKind::Decompression, ExecutionPath::Auto, Allocator::default())
                .unwrap();
        both.init_with_other(&target).unwrap();
        let decompression = both.decompression_table().unwrap();
        assert!(decompression.lookup_tables().is_some());
        assert!(decompression.hardware_state().is_some());
    }
}
