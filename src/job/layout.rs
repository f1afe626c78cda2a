//! Placement of the regions inside a job's arena.
//!
//! Every size here is a constant of the crate or of the accelerator, never of the data, so all
//! jobs on one path and platform have the same layout.

use std::mem::size_of;

use crate::{
    accel::Platform,
    codec::matchfinder::{CHAIN_SIZE, HIGH_TABLE_SIZE, LOW_TABLE_SIZE},
    job::state::{
        AnalyticsHeader, CompressionHeader, ControlBlock, DecompressionHeader,
        ANALYTICS_BUFFER_WORDS, ANALYTICS_BUFFERS, MIDDLE_LAYER_WORDS,
    },
    options::ExecutionPath,
    table::decompression::LookupTables,
};

/// Every region starts on this boundary.
pub const REGION_ALIGN: usize = 64;

pub(crate) const fn align(size: usize) -> usize {
    (size + REGION_ALIGN - 1) / REGION_ALIGN * REGION_ALIGN
}

/// A byte range of the arena. `len` excludes the padding up to the next region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub offset: usize,
    pub len: usize,
}

impl Region {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub(crate) fn padded_end(&self) -> usize {
        self.offset + align(self.len)
    }
}

pub(crate) const COMPRESSION_REGION_SIZE: usize = size_of::<CompressionHeader>()
    + 4 * (HIGH_TABLE_SIZE + LOW_TABLE_SIZE + CHAIN_SIZE);
pub(crate) const DECOMPRESSION_REGION_SIZE: usize =
    size_of::<DecompressionHeader>() + size_of::<LookupTables>();
pub(crate) const ANALYTICS_REGION_SIZE: usize =
    size_of::<AnalyticsHeader>() + 4 * ANALYTICS_BUFFERS * ANALYTICS_BUFFER_WORDS;
pub(crate) const MIDDLE_LAYER_REGION_SIZE: usize = 4 * MIDDLE_LAYER_WORDS;

/// Regions of a job in arena order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobLayout {
    pub control: Region,
    pub compression: Region,
    pub decompression: Region,
    pub analytics: Region,
    pub middle_layer: Region,
    pub hardware: Region,
    /// Size of the whole arena in bytes.
    pub total: usize,
}

impl JobLayout {
    pub fn new(path: ExecutionPath, platform: &Platform) -> Self {
        let hardware_size = match (path, platform.accelerator()) {
            (ExecutionPath::Software, _) | (_, None) => 0,
            (_, Some(accelerator)) => accelerator.state_size(),
        };

        let mut next = 0;
        let mut place = |len: usize| {
            let region = Region { offset: next, len };
            next = region.padded_end();
            region
        };
        let control = place(size_of::<ControlBlock>());
        let compression = place(COMPRESSION_REGION_SIZE);
        let decompression = place(DECOMPRESSION_REGION_SIZE);
        let analytics = place(ANALYTICS_REGION_SIZE);
        let middle_layer = place(MIDDLE_LAYER_REGION_SIZE);
        let hardware = place(hardware_size);

        Self {
            control,
            compression,
            decompression,
            analytics,
            middle_layer,
            hardware,
            total: next,
        }
    }

    /// The five state regions that follow the control block.
    pub fn state_regions(&self) -> [Region; 5] {
        [
            self.compression,
            self.decompression,
            self.analytics,
            self.middle_layer,
            self.hardware,
        ]
    }
}

/// Arena size in bytes of a job on `path`.
pub fn job_size(path: ExecutionPath, platform: &Platform) -> usize {
    JobLayout::new(path, platform).total
}
