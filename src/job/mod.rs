//! Processing jobs.
//!
//! A [`Job`] owns one arena sized by [`job_size`] and cut into fixed regions: the control block,
//! compression state, decompression state, analytics scratch, the middle-layer token buffer and
//! the accelerator's state. Operations on a job run on its effective path through the
//! dispatcher.

use std::{fmt, mem::size_of, sync::Arc};

use log::{debug, warn};

use crate::{
    accel::{Accelerator, Platform},
    codec::{deflate, inflate, matchfinder::MatchFinder},
    dispatch::dispatch,
    error::{Error, Result},
    histogram::Histogram,
    options::{Completion, CompressOptions, CompressionLevel, DecompressOptions, ExecutionPath},
    statistics::{gather_software, Scratch},
};

pub mod layout;
mod state;

pub use layout::{job_size, JobLayout, Region, REGION_ALIGN};
pub use state::{ControlBlock, CONTROL_FLAG_CONTEXT_HELD};

use state::{CompressionRegion, DecompressionRegion, Regions};

const CONTROL_WORDS: usize = size_of::<ControlBlock>() / 8;

/// Outcome of creating a job.
///
/// A job asked for [`ExecutionPath::Hardware`] or [`ExecutionPath::Auto`] whose accelerator
/// context could not be acquired still runs, on the software path. In that case
/// `acquisition_error` holds [`Error::AcceleratorInit`] and [`status_code`](Self::status_code) is
/// non-zero, yet `job` is fully usable.
#[derive(Debug)]
pub struct JobInit {
    pub job: Job,
    pub acquisition_error: Option<Error>,
}

impl JobInit {
    pub fn status_code(&self) -> u32 {
        self.acquisition_error.as_ref().map_or(0, Error::status_code)
    }

    pub fn into_job(self) -> Job {
        self.job
    }
}

pub struct Job {
    arena: Box<[u64]>,
    layout: JobLayout,
    requested_path: ExecutionPath,
    effective_path: ExecutionPath,
    accelerator: Option<Arc<dyn Accelerator>>,
    context_held: bool,
}

impl Job {
    /// Allocate and initialize a job.
    pub fn new(path: ExecutionPath, platform: &Platform) -> JobInit {
        let layout = JobLayout::new(path, platform);
        let arena = vec![0u64; layout.total / 8].into_boxed_slice();
        Self::init(path, platform, arena, layout)
    }

    /// Initialize a job in caller-provided memory of at least [`job_size`] bytes.
    pub fn with_buffer(
        path: ExecutionPath,
        platform: &Platform,
        mut buffer: Box<[u64]>,
    ) -> Result<JobInit> {
        let layout = JobLayout::new(path, platform);
        if buffer.len() * 8 < layout.total {
            return Err(Error::InvalidSize("job buffer is smaller than the job size"));
        }
        buffer.fill(0);
        Ok(Self::init(path, platform, buffer, layout))
    }

    fn init(
        path: ExecutionPath,
        platform: &Platform,
        arena: Box<[u64]>,
        layout: JobLayout,
    ) -> JobInit {
        let mut job = Job {
            arena,
            layout,
            requested_path: path,
            effective_path: path,
            accelerator: None,
            context_held: false,
        };
        job.regions().initialize(&layout);

        let mut acquisition_error = None;
        if path != ExecutionPath::Software {
            match platform.accelerator() {
                None => {
                    debug!("no accelerator support, {path:?} job runs on software");
                    job.effective_path = ExecutionPath::Software;
                }
                Some(accelerator) => match accelerator.acquire(job.hardware_state()) {
                    Ok(()) => {
                        job.accelerator = Some(Arc::clone(accelerator));
                        job.context_held = true;
                    }
                    Err(status) => {
                        warn!(
                            "{} context acquisition failed with status {status}, {path:?} job \
                             downgraded to software",
                            accelerator.name()
                        );
                        job.effective_path = ExecutionPath::Software;
                        acquisition_error = Some(Error::AcceleratorInit(status));
                    }
                },
            }
        }

        let context_held = job.context_held;
        let effective_path = job.effective_path;
        let control = job.regions().control;
        control.requested_path = path.into();
        control.effective_path = effective_path.into();
        if context_held {
            control.flags |= CONTROL_FLAG_CONTEXT_HELD;
        }
        debug!(
            "created job: requested {path:?}, effective {effective_path:?}, arena {} bytes",
            layout.total
        );

        JobInit {
            job,
            acquisition_error,
        }
    }

    pub fn requested_path(&self) -> ExecutionPath {
        self.requested_path
    }

    pub fn effective_path(&self) -> ExecutionPath {
        self.effective_path
    }

    pub fn layout(&self) -> &JobLayout {
        &self.layout
    }

    pub fn control(&self) -> &ControlBlock {
        bytemuck::from_bytes(bytemuck::cast_slice(&self.arena[..CONTROL_WORDS]))
    }

    /// Input bytes consumed by every operation so far.
    pub fn total_in(&self) -> u64 {
        self.control().total_in
    }

    pub fn total_out(&self) -> u64 {
        self.control().total_out
    }

    /// Compress `input`, appending to `output`.
    ///
    /// On [`ExecutionPath::Auto`] a failed hardware attempt is discarded, including anything it
    /// appended, and the call is repeated on software.
    pub fn compress(
        &mut self,
        input: &[u8],
        output: &mut Vec<u8>,
        options: &CompressOptions<'_>,
    ) -> Result<Completion> {
        let start = output.len();
        let result = dispatch(
            self.effective_path,
            &mut (&mut *self, &mut *output),
            |(job, output)| {
                let (accelerator, state) = job.hardware()?;
                accelerator
                    .compress(state, input, output, options)
                    .map_err(Error::Accelerator)
            },
            |(job, output)| {
                output.truncate(start);
                job.compress_software(input, output, options)
            },
        );
        self.record(&result);
        result
    }

    /// Decompress `input`, appending to `output`.
    pub fn decompress(
        &mut self,
        input: &[u8],
        output: &mut Vec<u8>,
        options: &DecompressOptions<'_>,
    ) -> Result<Completion> {
        let start = output.len();
        let result = dispatch(
            self.effective_path,
            &mut (&mut *self, &mut *output),
            |(job, output)| {
                let (accelerator, state) = job.hardware()?;
                accelerator
                    .decompress(state, input, output, options)
                    .map_err(Error::Accelerator)
            },
            |(job, output)| {
                output.truncate(start);
                job.decompress_software(input, output, options)
            },
        );
        self.record(&result);
        result
    }

    /// Collect the symbol statistics of `source`. Every slot of the result is at least one.
    pub fn gather_statistics(
        &mut self,
        source: &[u8],
        level: CompressionLevel,
    ) -> Result<Histogram> {
        let result = dispatch(
            self.effective_path,
            self,
            |job| {
                let (accelerator, state) = job.hardware()?;
                let mut histogram = Histogram::new();
                accelerator
                    .gather_statistics(state, source, level, &mut histogram)
                    .map_err(Error::Accelerator)?;
                histogram.patch_zeros();
                Ok(histogram)
            },
            |job| {
                let regions = job.regions();
                let CompressionRegion {
                    high, low, chain, ..
                } = regions.compression;
                let scratch = Scratch {
                    high,
                    low,
                    chain,
                    stripes: regions.analytics.buffers,
                };
                Ok(gather_software(source, level, scratch))
            },
        );
        let control = self.regions().control;
        match &result {
            Ok(_) => {
                control.total_in += source.len() as u64;
                control.last_status = 0;
            }
            Err(err) => control.last_status = err.status_code(),
        }
        result
    }

    /// Release the accelerator context, if one is held, and hand back the arena.
    pub fn finalize(mut self) -> Result<Box<[u64]>> {
        self.release();
        Ok(std::mem::take(&mut self.arena))
    }

    fn regions(&mut self) -> Regions<'_> {
        state::split(&mut self.arena, &self.layout)
    }

    fn hardware(&mut self) -> Result<(&dyn Accelerator, &mut [u8])> {
        let accelerator = match &self.accelerator {
            Some(accelerator) if self.context_held => accelerator.as_ref(),
            _ => return Err(Error::AcceleratorUnavailable),
        };
        let state = state::split(&mut self.arena, &self.layout).hardware;
        Ok((accelerator, state))
    }

    fn hardware_state(&mut self) -> &mut [u8] {
        self.regions().hardware
    }

    fn compress_software(
        &mut self,
        input: &[u8],
        output: &mut Vec<u8>,
        options: &CompressOptions<'_>,
    ) -> Result<Completion> {
        let regions = self.regions();
        let CompressionRegion {
            header,
            high,
            low,
            chain,
        } = regions.compression;
        let finder = MatchFinder::new(high, low, chain, options.level);
        deflate::compress(
            &mut header.deflate,
            finder,
            regions.middle_layer,
            input,
            output,
            options,
        )
    }

    fn decompress_software(
        &mut self,
        input: &[u8],
        output: &mut Vec<u8>,
        options: &DecompressOptions<'_>,
    ) -> Result<Completion> {
        let DecompressionRegion { header, lookup } = self.regions().decompression;
        inflate::decompress(&mut header.inflate, lookup, input, output, options)
    }

    fn record(&mut self, result: &Result<Completion>) {
        let control = self.regions().control;
        match result {
            Ok(completion) => {
                control.total_in += completion.consumed as u64;
                control.total_out += completion.produced as u64;
                control.checksum = completion.checksum;
                control.last_status = 0;
            }
            Err(err) => control.last_status = err.status_code(),
        }
    }

    fn release(&mut self) {
        if !self.context_held {
            return;
        }
        if let Some(accelerator) = self.accelerator.take() {
            let mut regions = self.regions();
            accelerator.release(regions.hardware);
            regions.control.flags &= !CONTROL_FLAG_CONTEXT_HELD;
            debug!("released {} context", accelerator.name());
        }
        self.context_held = false;
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("requested_path", &self.requested_path)
            .field("effective_path", &self.effective_path)
            .field("arena_bytes", &(self.arena.len() * 8))
            .field("context_held", &self.context_held)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{accel::AcceleratorStatus, options::CompressMode};

    #[test]
    fn no_accelerator_support_downgrades_silently() {
        let init = Job::new(ExecutionPath::Auto, &Platform::software());
        assert_eq!(init.status_code(), 0);
        let job = init.into_job();
        assert_eq!(job.requested_path(), ExecutionPath::Auto);
        assert_eq!(job.effective_path(), ExecutionPath::Software);
        let control = job.control();
        assert_eq!(control.requested_path, 2);
        assert_eq!(control.effective_path, 0);
        assert_eq!(control.flags & CONTROL_FLAG_CONTEXT_HELD, 0);
    }

    #[test]
    fn control_block_records_layout() {
        let job = Job::new(ExecutionPath::Software, &Platform::software()).into_job();
        let layout = *job.layout();
        let control = job.control();
        for (i, region) in layout.state_regions().iter().enumerate() {
            assert_eq!(control.region_offsets[i], region.offset as u64);
            assert_eq!(control.region_lengths[i], region.len as u64);
        }
    }

    #[test]
    fn roundtrip_updates_totals() {
        let data = b"one two three two one three one two three".repeat(50);
        let mut job = Job::new(ExecutionPath::Software, &Platform::software()).into_job();

        let mut compressed = Vec::new();
        let options = CompressOptions::new(CompressMode::Dynamic).with_zlib(true);
        let completion = job.compress(&data, &mut compressed, &options).unwrap();
        assert_eq!(completion.consumed, data.len());
        assert_eq!(completion.produced, compressed.len());
        assert!(compressed.len() < data.len());

        let mut decompressed = Vec::new();
        let options = DecompressOptions::default().with_zlib(true);
        job.decompress(&compressed, &mut decompressed, &options).unwrap();
        assert_eq!(decompressed, data);

        assert_eq!(job.total_in(), (data.len() + compressed.len()) as u64);
        assert_eq!(job.total_out(), (compressed.len() + data.len()) as u64);
        assert_eq!(job.control().last_status, 0);
        job.finalize().unwrap();
    }

    #[test]
    fn failures_are_recorded() {
        let mut job = Job::new(ExecutionPath::Software, &Platform::software()).into_job();
        let mut output = Vec::new();
        let err = job
            .decompress(&[0xff, 0xff], &mut output, &DecompressOptions::default())
            .unwrap_err();
        assert_eq!(job.control().last_status, err.status_code());
    }

    #[test]
    fn caller_buffer() {
        let platform = Platform::software();
        let size = job_size(ExecutionPath::Software, &platform);
        let small = vec![0u64; size / 8 - 1].into_boxed_slice();
        assert!(matches!(
            Job::with_buffer(ExecutionPath::Software, &platform, small),
            Err(Error::InvalidSize(_))
        ));

        let buffer = vec![7u64; size / 8].into_boxed_slice();
        let job = Job::with_buffer(ExecutionPath::Software, &platform, buffer)
            .unwrap()
            .into_job();
        assert_eq!(job.total_in(), 0);
        assert_eq!(job.finalize().unwrap().len(), size / 8);
    }

    /// Acquires a context, then rejects every request.
    struct Refusing;

    impl Accelerator for Refusing {
        fn state_size(&self) -> usize {
            16
        }

        fn acquire(&self, _state: &mut [u8]) -> std::result::Result<(), AcceleratorStatus> {
            Ok(())
        }

        fn release(&self, _state: &mut [u8]) {}

        fn gather_statistics(
            &self,
            _state: &mut [u8],
            _source: &[u8],
            _level: CompressionLevel,
            _histogram: &mut Histogram,
        ) -> std::result::Result<(), AcceleratorStatus> {
            Err(9)
        }

        fn compress(
            &self,
            _state: &mut [u8],
            _input: &[u8],
            _output: &mut Vec<u8>,
            _options: &CompressOptions<'_>,
        ) -> std::result::Result<Completion, AcceleratorStatus> {
            Err(9)
        }

        fn decompress(
            &self,
            _state: &mut [u8],
            _input: &[u8],
            _output: &mut Vec<u8>,
            _options: &DecompressOptions<'_>,
        ) -> std::result::Result<Completion, AcceleratorStatus> {
            Err(9)
        }
    }

    #[test]
    fn failed_statistics_leave_totals_alone() {
        let platform = Platform::with_accelerator(std::sync::Arc::new(Refusing));
        let mut job = Job::new(ExecutionPath::Hardware, &platform).into_job();
        assert_eq!(job.effective_path(), ExecutionPath::Hardware);

        let err = job
            .gather_statistics(b"some bytes", CompressionLevel::Default)
            .unwrap_err();
        assert!(matches!(err, Error::Accelerator(9)));
        assert_eq!(job.total_in(), 0);
        assert_eq!(job.control().last_status, err.status_code());

        let mut output = Vec::new();
        assert!(job
            .compress(b"some bytes", &mut output, &CompressOptions::default())
            .is_err());
        assert_eq!(job.total_in(), 0);
        assert_eq!(job.total_out(), 0);
        job.finalize().unwrap();
    }

    #[test]
    fn statistics_on_a_job() {
        let mut job = Job::new(ExecutionPath::Software, &Platform::software()).into_job();
        let histogram = job
            .gather_statistics(b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaab", CompressionLevel::High)
            .unwrap();
        assert!(histogram.is_complete());
        // One literal, then a single match covers the rest of the run.
        assert_eq!(histogram.literal_lengths[b'a' as usize], 1);
        assert_eq!(histogram.distances[0], 1);
    }
}
