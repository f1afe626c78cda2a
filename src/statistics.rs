//! Symbol statistics for building Huffman tables.

use crate::{
    accel::Platform,
    codec::matchfinder::{GreedyParser, MatchFinder, Token},
    error::Result,
    histogram::Histogram,
    job::Job,
    options::{CompressionLevel, ExecutionPath},
    tables::{distance_to_dist_sym, END_OF_BLOCK, LENGTH_TO_SYMBOL, MIN_MATCH, NUM_LITERALS},
};

/// Collect a histogram of `source` on the given path.
///
/// This creates a short-lived [`Job`] for the call. Use [`Job::gather_statistics`] to reuse one.
/// A failed accelerator acquisition is returned as an error on [`ExecutionPath::Hardware`]; on
/// [`ExecutionPath::Auto`] the job continues on software.
pub fn gather_statistics(
    source: &[u8],
    level: CompressionLevel,
    path: ExecutionPath,
    platform: &Platform,
) -> Result<Histogram> {
    let init = Job::new(path, platform);
    if path == ExecutionPath::Hardware {
        if let Some(err) = init.acquisition_error {
            return Err(err);
        }
    }
    let mut job = init.job;
    let histogram = job.gather_statistics(source, level)?;
    job.finalize()?;
    Ok(histogram)
}

/// Count byte frequencies in four interleaved stripes, then add them up.
///
/// Each stripe needs at least 256 counters.
pub(crate) fn count_literals(
    source: &[u8],
    stripes: &mut [&mut [u32]; 4],
    histogram: &mut Histogram,
) {
    for stripe in stripes.iter_mut() {
        stripe[..NUM_LITERALS].fill(0);
    }

    let mut chunks = source.chunks_exact(4);
    for chunk in &mut chunks {
        stripes[0][chunk[0] as usize] += 1;
        stripes[1][chunk[1] as usize] += 1;
        stripes[2][chunk[2] as usize] += 1;
        stripes[3][chunk[3] as usize] += 1;
    }
    for &byte in chunks.remainder() {
        stripes[0][byte as usize] += 1;
    }

    for (literal, frequency) in histogram.literal_lengths[..NUM_LITERALS]
        .iter_mut()
        .enumerate()
    {
        let count = stripes.iter().fold(0u32, |sum, s| sum.saturating_add(s[literal]));
        *frequency = frequency.saturating_add(count);
    }
}

/// Count the literal, length and distance symbols of a greedy parse of `source`.
pub(crate) fn count_tokens(source: &[u8], finder: &mut MatchFinder<'_>, histogram: &mut Histogram) {
    let mut parser = GreedyParser::new();
    while let Some(token) = parser.next(finder, source) {
        match token {
            Token::Literal(byte) => histogram.literal_lengths[byte as usize] += 1,
            Token::Match { length, distance } => {
                let symbol = LENGTH_TO_SYMBOL[length as usize - MIN_MATCH];
                histogram.literal_lengths[symbol as usize] += 1;
                histogram.distances[distance_to_dist_sym(distance) as usize] += 1;
            }
        }
    }
}

/// Scratch memory for the software pass, carved out of a job's arena.
pub(crate) struct Scratch<'a> {
    pub high: &'a mut [u32],
    pub low: &'a mut [u32],
    pub chain: &'a mut [u32],
    pub stripes: [&'a mut [u32]; 4],
}

/// Software statistics: literal counts at the default level, a full parse above it.
pub(crate) fn gather_software(
    source: &[u8],
    level: CompressionLevel,
    scratch: Scratch<'_>,
) -> Histogram {
    let Scratch {
        high,
        low,
        chain,
        mut stripes,
    } = scratch;
    let mut histogram = Histogram::new();
    match level {
        CompressionLevel::Default => count_literals(source, &mut stripes, &mut histogram),
        CompressionLevel::High => {
            let mut finder = MatchFinder::new(high, low, chain, level);
            count_tokens(source, &mut finder, &mut histogram);
        }
    }
    histogram.literal_lengths[END_OF_BLOCK] = 1;
    histogram.patch_zeros();
    histogram
}
