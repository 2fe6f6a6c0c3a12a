use anyhow::{Context, Result, bail};
use hound::WavReader;
use std::path::Path;

/// Decoded stereo audio pulled by the engine one quantum at a time.
pub trait AudioSource: Send {
    fn sample_rate(&self) -> u32;

    /// Fill up to `left.len()` frames and return how many were written.
    /// The engine zero-fills the rest.
    fn read(&mut self, left: &mut [f32], right: &mut [f32]) -> usize;

    /// True once a non-looping source has nothing left.
    fn is_finished(&self) -> bool {
        false
    }
}

/// In-memory source over an already decoded buffer.
pub struct BufferSource {
    left: Vec<f32>,
    right: Vec<f32>,
    sample_rate: u32,
    pos: usize,
    looping: bool,
}

impl BufferSource {
    pub fn stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Result<Self> {
        if left.len() != right.len() {
            bail!(
                "channel lengths differ: left {} frames, right {} frames",
                left.len(),
                right.len()
            );
        }
        Ok(Self {
            left,
            right,
            sample_rate,
            pos: 0,
            looping: false,
        })
    }

    /// Mono input is played on both channels.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            right: samples.clone(),
            left: samples,
            sample_rate,
            pos: 0,
            looping: false,
        }
    }

    /// Decode a WAV file. Mono files are duplicated, wider files keep their
    /// first two channels.
    pub fn from_wav(path: &Path) -> Result<Self> {
        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            bail!("{} has no channels", path.display());
        }

        let samples: Vec<f32> = if spec.sample_format == hound::SampleFormat::Float {
            reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read float samples")?
        } else {
            let max_val = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read integer samples")?
        };

        if channels == 1 {
            return Ok(Self::mono(samples, spec.sample_rate));
        }
        let (left, right) = samples
            .chunks_exact(channels)
            .map(|frame| (frame[0], frame[1]))
            .unzip();
        Self::stereo(left, right, spec.sample_rate)
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub const fn position(&self) -> usize {
        self.pos
    }
}

impl AudioSource for BufferSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        let wanted = left.len().min(right.len());
        let total = self.left.len();
        if total == 0 {
            return 0;
        }

        let mut written = 0;
        while written < wanted {
            if self.pos >= total {
                if !self.looping {
                    break;
                }
                self.pos = 0;
            }
            let n = (wanted - written).min(total - self.pos);
            left[written..written + n].copy_from_slice(&self.left[self.pos..self.pos + n]);
            right[written..written + n].copy_from_slice(&self.right[self.pos..self.pos + n]);
            written += n;
            self.pos += n;
        }
        written
    }

    fn is_finished(&self) -> bool {
        !self.looping && self.pos >= self.left.len()
    }
}
