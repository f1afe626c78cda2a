//! The boundary to a hardware accelerator.
//!
//! Descriptor submission and driver discovery live behind the [`Accelerator`] trait. This crate
//! only sizes the accelerator's state region, acquires and releases its context, and routes
//! work to it.

use std::{fmt, sync::Arc};

use crate::{
    histogram::Histogram,
    options::{CompressOptions, CompressionLevel, Completion, DecompressOptions},
};

/// Raw status reported by an accelerator. Zero never denotes an error.
pub type AcceleratorStatus = u32;

pub trait Accelerator: Send + Sync {
    fn name(&self) -> &str {
        "accelerator"
    }

    /// Bytes of per-job state the accelerator needs.
    fn state_size(&self) -> usize;

    fn acquire(&self, state: &mut [u8]) -> Result<(), AcceleratorStatus>;

    fn release(&self, state: &mut [u8]);

    fn gather_statistics(
        &self,
        state: &mut [u8],
        source: &[u8],
        level: CompressionLevel,
        histogram: &mut Histogram,
    ) -> Result<(), AcceleratorStatus>;

    fn compress(
        &self,
        state: &mut [u8],
        input: &[u8],
        output: &mut Vec<u8>,
        options: &CompressOptions<'_>,
    ) -> Result<Completion, AcceleratorStatus>;

    fn decompress(
        &self,
        state: &mut [u8],
        input: &[u8],
        output: &mut Vec<u8>,
        options: &DecompressOptions<'_>,
    ) -> Result<Completion, AcceleratorStatus>;
}

/// Capabilities of the machine, constructed once by the caller and passed by reference.
#[derive(Clone, Default)]
pub struct Platform {
    accelerator: Option<Arc<dyn Accelerator>>,
}

impl Platform {
    /// A platform without accelerator support.
    pub fn software() -> Self {
        Self { accelerator: None }
    }

    pub fn with_accelerator(accelerator: Arc<dyn Accelerator>) -> Self {
        Self {
            accelerator: Some(accelerator),
        }
    }

    pub fn accelerator(&self) -> Option<&Arc<dyn Accelerator>> {
        self.accelerator.as_ref()
    }

    pub fn has_accelerator(&self) -> bool {
        self.accelerator.is_some()
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("accelerator", &self.accelerator.as_ref().map(|a| a.name()))
            .finish()
    }
}
