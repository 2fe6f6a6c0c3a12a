use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::graph::DelayWetTap;

pub const MIN_SAMPLE_RATE: u32 = 8_000;
pub const MAX_SAMPLE_RATE: u32 = 384_000;
pub const MIN_QUANTUM: usize = 16;
pub const MAX_QUANTUM: usize = 4096;
pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32_768;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub sample_rate: u32,
    /// Frames rendered per engine call.
    pub quantum_frames: usize,
    pub analysis_fft_size: usize,
    pub delay_wet_tap: DelayWetTap,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            quantum_frames: 128,
            analysis_fft_size: 256,
            delay_wet_tap: DelayWetTap::DelayLine,
        }
    }
}

impl std::fmt::Display for EngineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Sample Rate: {}", self.sample_rate)?;
        writeln!(f, "Render Quantum: {} frames", self.quantum_frames)?;
        writeln!(f, "Analysis FFT Size: {}", self.analysis_fft_size)?;
        writeln!(f, "Delay Wet Tap: {:?}", self.delay_wet_tap)?;
        Ok(())
    }
}

impl EngineSettings {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            bail!(
                "sample rate {} Hz is outside {MIN_SAMPLE_RATE}..={MAX_SAMPLE_RATE} Hz",
                self.sample_rate
            );
        }
        if !(MIN_QUANTUM..=MAX_QUANTUM).contains(&self.quantum_frames) {
            bail!(
                "render quantum {} is outside {MIN_QUANTUM}..={MAX_QUANTUM} frames",
                self.quantum_frames
            );
        }
        if !self.analysis_fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.analysis_fft_size)
        {
            bail!(
                "analysis FFT size {} must be a power of two in {MIN_FFT_SIZE}..={MAX_FFT_SIZE}",
                self.analysis_fft_size
            );
        }
        Ok(())
    }

    /// Read settings from `path`, or fall back to the defaults when the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).context("Failed to read settings file")?;
        let settings: Self = serde_json::from_str(&contents).context("Failed to parse settings")?;
        settings.validate().context("Invalid settings")?;
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json).context("Failed to write settings file")?;

        debug!("Saved settings to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_valid() {
        let settings = EngineSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.quantum_frames, 128);
        assert!(settings.to_string().contains("Sample Rate: 48000"));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut settings = EngineSettings::default();
        settings.analysis_fft_size = 300;
        assert!(settings.validate().is_err());

        let settings = EngineSettings {
            quantum_frames: 0,
            ..EngineSettings::default()
        };
        assert!(settings.validate().is_err());

        assert!(EngineSettings::default().with_sample_rate(1000).validate().is_err());
    }

    #[test]
    fn save_then_load() -> Result<()> {
        let tmp = TempDir::new()?;
        let path = tmp.path().join("config").join("settings.json");

        let settings = EngineSettings {
            sample_rate: 44_100,
            delay_wet_tap: DelayWetTap::FeedbackGain,
            ..EngineSettings::default()
        };
        settings.save(&path)?;
        assert_eq!(EngineSettings::load(&path)?, settings);
        Ok(())
    }

    #[test]
    fn missing_file_gives_defaults_and_partial_file_fills_in() -> Result<()> {
        let tmp = TempDir::new()?;
        assert_eq!(
            EngineSettings::load(&tmp.path().join("none.json"))?,
            EngineSettings::default()
        );

        let path = tmp.path().join("partial.json");
        fs::write(&path, r#"{"quantum_frames": 256}"#)?;
        let settings = EngineSettings::load(&path)?;
        assert_eq!(settings.quantum_frames, 256);
        assert_eq!(settings.sample_rate, 48_000);

        fs::write(&path, r#"{"analysis_fft_size": 100}"#)?;
        assert!(EngineSettings::load(&path).is_err());
        Ok(())
    }
}
