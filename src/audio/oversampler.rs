use anyhow::{Context, Result, bail};
use log::debug;
use rubato::{FftFixedInOut, Resampler};

const CHANNELS: usize = 2;

/// Stereo up/down sampler pair around a nonlinear stage.
///
/// Works on fixed-size blocks of `block_size` frames; anything else is
/// rejected so the caller can fall back to running at the base rate.
pub struct Oversampler {
    upsampler: FftFixedInOut<f32>,
    downsampler: FftFixedInOut<f32>,
    input_buffer: Vec<Vec<f32>>,
    upsampled_buffer: Vec<Vec<f32>>,
    downsampled_buffer: Vec<Vec<f32>>,
    factor: usize,
}

impl Oversampler {
    pub fn new(block_size: usize, factor: usize, sample_rate: usize) -> Result<Self> {
        if block_size == 0 || factor == 0 || sample_rate == 0 {
            bail!("cannot oversample {block_size}-frame blocks {factor}x at {sample_rate} Hz");
        }

        let upsampler = FftFixedInOut::new(sample_rate, sample_rate * factor, block_size, CHANNELS)
            .context("failed to create upsampler")?;

        let downsampler =
            FftFixedInOut::new(sample_rate * factor, sample_rate, block_size * factor, CHANNELS)
                .context("failed to create downsampler")?;

        let input_buffer = vec![vec![0.0; block_size]; CHANNELS];
        let upsampled_buffer = upsampler.output_buffer_allocate(true);
        let downsampled_buffer = downsampler.output_buffer_allocate(true);

        debug!("Oversampler ready: {factor}x around {block_size}-frame blocks");

        Ok(Self {
            upsampler,
            downsampler,
            input_buffer,
            upsampled_buffer,
            downsampled_buffer,
            factor,
        })
    }

    pub const fn factor(&self) -> usize {
        self.factor
    }

    pub fn block_size(&self) -> usize {
        self.input_buffer[0].len()
    }

    /// Upsample `left`/`right`, run `shape` over every oversampled sample and
    /// write the downsampled result back in place.
    pub fn process<F>(&mut self, left: &mut [f32], right: &mut [f32], mut shape: F) -> Result<()>
    where
        F: FnMut(f32) -> f32,
    {
        if left.len() != self.block_size() || right.len() != self.block_size() {
            return Err(anyhow::anyhow!(
                "oversampler block size mismatch: expected {}, got {}",
                self.block_size(),
                left.len()
            ));
        }

        self.input_buffer[0].copy_from_slice(left);
        self.input_buffer[1].copy_from_slice(right);

        let (_, upsampled_frames) = self
            .upsampler
            .process_into_buffer(&self.input_buffer, &mut self.upsampled_buffer, None)
            .context("Upsampler failed")?;

        for channel in &mut self.upsampled_buffer {
            for s in &mut channel[..upsampled_frames] {
                *s = shape(*s);
            }
        }

        let (_, downsampled_frames) = self
            .downsampler
            .process_into_buffer(&self.upsampled_buffer, &mut self.downsampled_buffer, None)
            .context("Downsampler failed")?;

        let frames = downsampled_frames.min(left.len());
        left[..frames].copy_from_slice(&self.downsampled_buffer[0][..frames]);
        right[..frames].copy_from_slice(&self.downsampled_buffer[1][..frames]);

        Ok(())
    }
}
