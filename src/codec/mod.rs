//! Software execution functions: bit I/O, match search, and the DEFLATE encoder and decoder.

pub(crate) mod bitreader;
pub(crate) mod bitwriter;
pub(crate) mod deflate;
pub(crate) mod inflate;
pub(crate) mod matchfinder;
