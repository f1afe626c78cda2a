//! DEFLATE engine with reusable Huffman tables.
//!
//! The crate builds canonical Huffman codes from symbol statistics or from caller-assigned
//! [`Triplet`]s, keeps them in [`HuffmanTable`] objects that can be reused across many calls
//! ("canned" mode), and runs compression and decompression inside a [`Job`]: a single arena cut
//! into fixed regions for every sub-state.
//!
//! Work runs on the software path, on a hardware accelerator reached through the
//! [`Accelerator`] trait, or on the accelerator with a software fallback
//! ([`ExecutionPath::Auto`]).
//!
//! ```
//! let data = b"hello hello hello hello";
//! let compressed = cdeflate::compress_to_vec(data).unwrap();
//! assert_eq!(cdeflate::decompress_to_vec(&compressed).unwrap(), data);
//! ```

#![forbid(unsafe_code)]

mod accel;
mod codec;
mod dispatch;
mod error;
mod header;
mod histogram;
mod huffman;
pub mod interop;
pub mod job;
mod options;
mod statistics;
pub mod table;
mod tables;

pub use accel::{Accelerator, AcceleratorStatus, Platform};
pub use error::{Error, Result, ACCELERATOR_INIT_STATUS_BASE};
pub use histogram::Histogram;
pub use huffman::{kraft_sum, HuffmanCode};
pub use job::{job_size, Job, JobInit};
pub use options::{
    Completion, CompressMode, CompressOptions, CompressionLevel, DecompressMode,
    DecompressOptions, ExecutionPath, TableKind,
};
pub use statistics::gather_statistics;
pub use table::{
    flags::{Representation, RepresentationFlags},
    serialize::{SerializeFormat, SerializeOptions},
    triplet::Triplet,
    Allocator, HuffmanTable, TableFamily,
};

/// Compress `input` into a zlib stream of dynamic blocks on the software path.
pub fn compress_to_vec(input: &[u8]) -> Result<Vec<u8>> {
    let mut job = Job::new(ExecutionPath::Software, &Platform::software()).into_job();
    let mut output = Vec::with_capacity(input.len() / 2 + 64);
    job.compress(
        input,
        &mut output,
        &CompressOptions::new(CompressMode::Dynamic).with_zlib(true),
    )?;
    Ok(output)
}

/// Decompress a zlib stream on the software path.
pub fn decompress_to_vec(input: &[u8]) -> Result<Vec<u8>> {
    let mut job = Job::new(ExecutionPath::Software, &Platform::software()).into_job();
    let mut output = Vec::with_capacity(input.len() * 2);
    job.decompress(
        input,
        &mut output,
        &DecompressOptions::new(DecompressMode::Stream).with_zlib(true),
    )?;
    Ok(output)
}
