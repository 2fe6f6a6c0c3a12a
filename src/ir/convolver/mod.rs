pub mod fft;
pub mod fir;

pub use fft::TwoStageConvolver;
pub use fir::FirConvolver;

use anyhow::Result;

/// Longest response convolved directly; anything longer gets the two-stage
/// convolver.
pub const FIR_MAX_LEN: usize = 256;

/// Convolver implementation selector
// Enum dispatch keeps the per-sample call static.
#[allow(clippy::large_enum_variant)]
pub enum Convolver {
    Fir(FirConvolver),
    TwoStage(TwoStageConvolver),
}

impl Convolver {
    /// Pick the cheapest zero-latency convolver for `taps`.
    pub fn for_taps(taps: &[f32]) -> Result<Self> {
        if taps.len() <= FIR_MAX_LEN {
            Ok(Self::Fir(FirConvolver::with_taps(taps)))
        } else {
            Ok(Self::TwoStage(TwoStageConvolver::with_taps(taps)?))
        }
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        match self {
            Self::Fir(c) => c.process_sample(input),
            Self::TwoStage(c) => c.process_sample(input),
        }
    }

    pub fn process_block(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::Fir(c) => c.reset(),
            Self::TwoStage(c) => c.reset(),
        }
    }
}
