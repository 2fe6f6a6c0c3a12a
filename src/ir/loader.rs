use anyhow::{Context, Result, anyhow, bail};
use hound::WavReader;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::ir::model::ImpulseResponse;

pub const MAX_IR_LENGTH_SECONDS: u32 = 10;
const NORMALIZED_PEAK: f32 = 0.9;

/// Load a WAV impulse response and prepare it for a graph at `target_rate`.
///
/// Mono and stereo files keep their layout; anything wider is folded to mono.
/// The result is resampled when the file rate differs and peak-normalized.
pub fn load_impulse_response(path: &Path, target_rate: u32) -> Result<ImpulseResponse> {
    let reader = WavReader::open(path)
        .with_context(|| format!("Failed to open impulse response {}", path.display()))?;
    let spec = reader.spec();

    if spec.channels == 0 {
        bail!("Impulse response {} has no channels", path.display());
    }
    if reader.duration() > spec.sample_rate * MAX_IR_LENGTH_SECONDS {
        bail!(
            "Impulse response is too long: {:.1} seconds (max {}).",
            reader.duration() as f64 / spec.sample_rate as f64,
            MAX_IR_LENGTH_SECONDS
        );
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

    let channels = deinterleave(&samples, spec.channels as usize);

    let mut channels = if spec.sample_rate == target_rate {
        channels
    } else {
        debug!(
            "Resampling impulse response from {} Hz to {} Hz",
            spec.sample_rate, target_rate
        );
        channels
            .iter()
            .map(|c| resample(c, spec.sample_rate, target_rate))
            .collect::<Result<Vec<_>>>()?
    };

    normalize(&mut channels);

    Ok(ImpulseResponse {
        channels,
        sample_rate: target_rate,
    })
}

fn deinterleave(samples: &[f32], channel_count: usize) -> Vec<Vec<f32>> {
    match channel_count {
        1 => vec![samples.to_vec()],
        2 => {
            let (left, right) = samples.chunks_exact(2).map(|f| (f[0], f[1])).unzip();
            vec![left, right]
        }
        n => vec![
            samples
                .chunks_exact(n)
                .map(|f| f.iter().sum::<f32>() / n as f32)
                .collect(),
        ],
    }
}

/// Scale every channel by the same factor so the loudest sample hits 0.9.
fn normalize(channels: &mut [Vec<f32>]) {
    let peak = channels
        .iter()
        .flatten()
        .fold(0.0_f32, |m, &x| m.max(x.abs()));
    if peak > 0.0 {
        let g = NORMALIZED_PEAK / peak;
        for s in channels.iter_mut().flatten() {
            *s *= g;
        }
    }
}

/// resample takes input samples at a given sample_rate and returns them in the target sample_rate
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = to_rate as f64 / from_rate as f64;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, samples.len(), 1)?;

    let input = vec![samples.to_vec()];
    let output = resampler.process(&input, None)?;

    output
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Resampling failed"))
}

/// Directory of impulse responses addressable by their relative path.
pub struct IrLibrary {
    entries: Vec<(String, PathBuf)>,
    directory: PathBuf,
    target_rate: u32,
}

impl IrLibrary {
    pub fn open(directory: &Path, target_rate: u32) -> Result<Self> {
        let mut library = Self {
            entries: Vec::new(),
            directory: directory.to_path_buf(),
            target_rate,
        };
        library.rescan()?;
        Ok(library)
    }

    /// Relative names, shallow entries first and alphabetical within a depth.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn load(&self, name: &str) -> Result<ImpulseResponse> {
        let (_, path) = self
            .entries
            .iter()
            .find(|(entry, _)| entry == name)
            .ok_or_else(|| anyhow!("impulse response '{}' not found", name))?;
        load_impulse_response(path, self.target_rate)
    }

    pub fn rescan(&mut self) -> Result<()> {
        self.entries.clear();
        if !self.directory.is_dir() {
            warn!("Impulse response directory {:?} does not exist", self.directory);
            return Ok(());
        }

        let base = self.directory.clone();
        self.scan_recursive(&base, &base)?;

        self.entries.sort_by(|a, b| {
            let a_depth = a.0.matches('/').count();
            let b_depth = b.0.matches('/').count();
            a_depth.cmp(&b_depth).then_with(|| a.0.cmp(&b.0))
        });

        debug!("Found {} impulse response files", self.entries.len());
        Ok(())
    }

    fn scan_recursive(&mut self, current_dir: &Path, base_dir: &Path) -> Result<()> {
        for entry in fs::read_dir(current_dir)
            .with_context(|| format!("Failed to read {}", current_dir.display()))?
        {
            let path = entry?.path();

            if path.is_dir() {
                self.scan_recursive(&path, base_dir)?;
            } else if path
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
            {
                let relative = path
                    .strip_prefix(base_dir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");
                self.entries.push((relative, path));
            }
        }
        Ok(())
    }
}
