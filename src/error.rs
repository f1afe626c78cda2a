use std::io;

use thiserror::Error;

/// First status code of the range reserved for accelerator acquisition failures.
///
/// A failed acquisition during job creation is reported as this base plus the status the
/// accelerator returned.
pub const ACCELERATOR_INIT_STATUS_BASE: u32 = 500;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid execution path value {0}")]
    BadPath(u32),

    #[error("invalid table type value {0}")]
    BadTableType(u32),

    #[error("invalid size: {0}")]
    InvalidSize(&'static str),

    #[error("invalid representation flags: {0}")]
    InvalidRepresentation(&'static str),

    #[error("unsupported mode: {0}")]
    UnsupportedMode(&'static str),

    #[error("no hardware accelerator is available")]
    AcceleratorUnavailable,

    /// The accelerator context could not be acquired. The job is still usable on the
    /// software path when this is reported by [`Job::new`](crate::Job::new).
    #[error("accelerator context acquisition failed with status {0}")]
    AcceleratorInit(u32),

    #[error("accelerator operation failed with status {0}")]
    Accelerator(u32),

    #[error("histogram reserved fields must be zero")]
    ReservedHistogramField,

    #[error("invalid triplet: {0}")]
    InvalidTriplet(&'static str),

    #[error("huffman table is not initialized")]
    NotInitialized,

    #[error("huffman table is already initialized")]
    AlreadyInitialized,

    #[error("allocator returned no usable memory")]
    AllocationFailed,

    #[error("compressed data is corrupt: {0}")]
    CorruptData(&'static str),

    #[error("checksum mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("serialized table is malformed: {0}")]
    MalformedTable(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Numeric status for callers that speak status codes. Zero is reserved for success.
    pub fn status_code(&self) -> u32 {
        match self {
            Error::BadPath(_) => 1,
            Error::BadTableType(_) => 2,
            Error::InvalidSize(_) => 3,
            Error::InvalidRepresentation(_) => 4,
            Error::UnsupportedMode(_) => 5,
            Error::AcceleratorUnavailable => 6,
            Error::Accelerator(_) => 7,
            Error::ReservedHistogramField => 8,
            Error::InvalidTriplet(_) => 9,
            Error::NotInitialized => 10,
            Error::AlreadyInitialized => 11,
            Error::AllocationFailed => 12,
            Error::CorruptData(_) => 13,
            Error::ChecksumMismatch { .. } => 14,
            Error::MalformedTable(_) => 15,
            Error::Io(_) => 16,
            Error::AcceleratorInit(status) => ACCELERATOR_INIT_STATUS_BASE.saturating_add(*status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquisition_failures_use_reserved_range() {
        assert_eq!(Error::AcceleratorInit(0).status_code(), ACCELERATOR_INIT_STATUS_BASE);
        assert_eq!(
            Error::AcceleratorInit(17).status_code(),
            ACCELERATOR_INIT_STATUS_BASE + 17
        );
        assert!(Error::Accelerator(17).status_code() < ACCELERATOR_INIT_STATUS_BASE);
    }

    #[test]
    fn status_codes_are_nonzero() {
        let errors = [
            Error::BadPath(9),
            Error::BadTableType(9),
            Error::InvalidSize("x"),
            Error::UnsupportedMode("x"),
            Error::CorruptData("x"),
        ];
        for err in &errors {
            assert_ne!(err.status_code(), 0, "{err}");
        }
    }
}
