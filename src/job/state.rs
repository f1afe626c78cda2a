//! Typed views of the regions of a job arena.

use std::mem::{size_of, take};

use bytemuck::{Pod, Zeroable};

use crate::{
    codec::{
        deflate::DeflateState,
        inflate::InflateState,
        matchfinder::{CHAIN_SIZE, HIGH_TABLE_SIZE, LOW_TABLE_SIZE},
    },
    job::layout::{align, JobLayout, Region},
    table::decompression::LookupTables,
};

pub(crate) const ANALYTICS_BUFFERS: usize = 4;
pub(crate) const ANALYTICS_BUFFER_WORDS: usize = 2048;
/// Tokens staged before a block is emitted.
pub(crate) const MIDDLE_LAYER_WORDS: usize = 16384;

/// Public part of a job, stored at the start of its arena.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct ControlBlock {
    pub requested_path: u32,
    pub effective_path: u32,
    pub flags: u32,
    _pad: u32,
    pub total_in: u64,
    pub total_out: u64,
    /// Adler-32 of the last operation's uncompressed bytes.
    pub checksum: u32,
    /// Status code of the last operation, zero for success.
    pub last_status: u32,
    /// Byte offsets of the compression, decompression, analytics, middle-layer and hardware
    /// regions.
    pub region_offsets: [u64; 5],
    pub region_lengths: [u64; 5],
}

/// Set in [`ControlBlock::flags`] while an accelerator context is held.
pub const CONTROL_FLAG_CONTEXT_HELD: u32 = 1;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct CompressionHeader {
    /// Offsets of the high, low and chain tables from the region start.
    pub table_offsets: [u32; 3],
    pub table_lengths: [u32; 3],
    pub deflate: DeflateState,
    _reserved: [u32; 6],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct DecompressionHeader {
    pub inflate: InflateState,
    pub lookup_offset: u32,
    pub lookup_length: u32,
    _reserved: [u32; 10],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct AnalyticsHeader {
    pub buffer_offsets: [u32; ANALYTICS_BUFFERS],
    pub buffer_lengths: [u32; ANALYTICS_BUFFERS],
    _reserved: [u32; 8],
}

const _: () = assert!(size_of::<CompressionHeader>() == 64);
const _: () = assert!(size_of::<DecompressionHeader>() == 64);
const _: () = assert!(size_of::<AnalyticsHeader>() == 64);

pub(crate) struct CompressionRegion<'a> {
    pub header: &'a mut CompressionHeader,
    pub high: &'a mut [u32],
    pub low: &'a mut [u32],
    pub chain: &'a mut [u32],
}

pub(crate) struct DecompressionRegion<'a> {
    pub header: &'a mut DecompressionHeader,
    pub lookup: &'a mut LookupTables,
}

pub(crate) struct AnalyticsRegion<'a> {
    pub header: &'a mut AnalyticsHeader,
    pub buffers: [&'a mut [u32]; ANALYTICS_BUFFERS],
}

/// Disjoint mutable views of every region.
pub(crate) struct Regions<'a> {
    pub control: &'a mut ControlBlock,
    pub compression: CompressionRegion<'a>,
    pub decompression: DecompressionRegion<'a>,
    pub analytics: AnalyticsRegion<'a>,
    pub middle_layer: &'a mut [u32],
    pub hardware: &'a mut [u8],
}

/// Split `bytes` off the front of `rest`. `bytes` must be a multiple of 8.
fn carve<'a>(rest: &mut &'a mut [u64], bytes: usize) -> &'a mut [u64] {
    debug_assert_eq!(bytes % 8, 0);
    let (head, tail) = take(rest).split_at_mut(bytes / 8);
    *rest = tail;
    head
}

fn carve_pod<'a, T: Pod>(rest: &mut &'a mut [u64]) -> &'a mut T {
    bytemuck::from_bytes_mut(bytemuck::cast_slice_mut(carve(rest, size_of::<T>())))
}

fn carve_u32<'a>(rest: &mut &'a mut [u64], words: usize) -> &'a mut [u32] {
    bytemuck::cast_slice_mut(carve(rest, words * 4))
}

/// Cut the arena into its regions. `arena` must hold at least `layout.total` bytes.
pub(crate) fn split<'a>(arena: &'a mut [u64], layout: &JobLayout) -> Regions<'a> {
    let mut rest = &mut arena[..layout.total / 8];
    let mut region = |region: &Region| carve(&mut rest, align(region.len));

    let mut control = region(&layout.control);
    let mut compression = region(&layout.compression);
    let mut decompression = region(&layout.decompression);
    let mut analytics = region(&layout.analytics);
    let middle_layer = region(&layout.middle_layer);
    let hardware = region(&layout.hardware);

    let control = carve_pod::<ControlBlock>(&mut control);

    let compression = CompressionRegion {
        header: carve_pod(&mut compression),
        high: carve_u32(&mut compression, HIGH_TABLE_SIZE),
        low: carve_u32(&mut compression, LOW_TABLE_SIZE),
        chain: carve_u32(&mut compression, CHAIN_SIZE),
    };

    let decompression = DecompressionRegion {
        header: carve_pod(&mut decompression),
        lookup: carve_pod(&mut decompression),
    };

    let header = carve_pod(&mut analytics);
    let buffers =
        [(); ANALYTICS_BUFFERS].map(|_| carve_u32(&mut analytics, ANALYTICS_BUFFER_WORDS));
    let analytics = AnalyticsRegion { header, buffers };

    Regions {
        control,
        compression,
        decompression,
        analytics,
        middle_layer: bytemuck::cast_slice_mut(middle_layer),
        hardware: bytemuck::cast_slice_mut::<u64, u8>(hardware)
            .split_at_mut(layout.hardware.len)
            .0,
    }
}

impl Regions<'_> {
    /// Record the layout in the headers, as a freshly zeroed arena expects.
    pub fn initialize(&mut self, layout: &JobLayout) {
        for (i, region) in layout.state_regions().iter().enumerate() {
            self.control.region_offsets[i] = region.offset as u64;
            self.control.region_lengths[i] = region.len as u64;
        }

        let header = size_of::<CompressionHeader>() as u32;
        let lengths = [HIGH_TABLE_SIZE, LOW_TABLE_SIZE, CHAIN_SIZE].map(|words| words as u32 * 4);
        let compression = &mut *self.compression.header;
        compression.table_lengths = lengths;
        compression.table_offsets = [
            header,
            header + lengths[0],
            header + lengths[0] + lengths[1],
        ];

        let decompression = &mut *self.decompression.header;
        decompression.inflate.reset();
        decompression.lookup_offset = size_of::<DecompressionHeader>() as u32;
        decompression.lookup_length = size_of::<LookupTables>() as u32;

        let analytics = &mut *self.analytics.header;
        let mut offset = size_of::<AnalyticsHeader>() as u32;
        for i in 0..ANALYTICS_BUFFERS {
            analytics.buffer_offsets[i] = offset;
            analytics.buffer_lengths[i] = (ANALYTICS_BUFFER_WORDS * 4) as u32;
            offset += analytics.buffer_lengths[i];
        }
    }
}
