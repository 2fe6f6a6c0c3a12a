use anyhow::{Context, Result};

use crate::effects::Stage;
use crate::ir::convolver::Convolver;
use crate::ir::model::ImpulseResponse;

struct Loaded {
    left: Convolver,
    right: Convolver,
    len: usize,
    stereo: bool,
}

/// Convolution reverb. Fully wet; the graph supplies the dry path.
///
/// Without an impulse response the stage outputs silence and the graph
/// leaves it out of the signal path.
#[derive(Default)]
pub struct ConvolutionReverb {
    loaded: Option<Loaded>,
}

impl ConvolutionReverb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_impulse_response(&self) -> bool {
        self.loaded.is_some()
    }

    /// Frames in the installed response, if any.
    pub fn impulse_len(&self) -> Option<usize> {
        self.loaded.as_ref().map(|l| l.len)
    }

    pub fn is_stereo(&self) -> bool {
        self.loaded.as_ref().is_some_and(|l| l.stereo)
    }

    /// Install a new response, or clear it with `None`. An empty response
    /// clears too. On error the previous response stays in place.
    pub fn set_impulse_response(&mut self, ir: Option<&ImpulseResponse>) -> Result<()> {
        let Some(ir) = ir.filter(|ir| !ir.is_empty()) else {
            self.loaded = None;
            return Ok(());
        };

        let (left, right) = ir.left_right()?;
        self.loaded = Some(Loaded {
            left: Convolver::for_taps(left).context("left reverb channel")?,
            right: Convolver::for_taps(right).context("right reverb channel")?,
            len: ir.len(),
            stereo: ir.is_stereo(),
        });
        Ok(())
    }

    pub fn reset(&mut self) {
        if let Some(loaded) = self.loaded.as_mut() {
            loaded.left.reset();
            loaded.right.reset();
        }
    }
}

impl Stage for ConvolutionReverb {
    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        match self.loaded.as_mut() {
            Some(l) => (l.left.process_sample(left), l.right.process_sample(right)),
            None => (0.0, 0.0),
        }
    }

    fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        match self.loaded.as_mut() {
            Some(l) => {
                l.left.process_block(left);
                l.right.process_block(right);
            }
            None => {
                left.fill(0.0);
                right.fill(0.0);
            }
        }
    }

    fn set_parameter(&mut self, _name: &str, _value: f32) -> Result<(), &'static str> {
        Err("Reverb has no live parameters")
    }

    fn get_parameter(&self, _name: &str) -> Result<f32, &'static str> {
        Err("Unknown parameter")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_without_response() {
        let mut reverb = ConvolutionReverb::new();
        assert!(!reverb.has_impulse_response());
        let mut l = vec![1.0; 8];
        let mut r = vec![1.0; 8];
        reverb.process_block(&mut l, &mut r);
        assert!(l.iter().chain(&r).all(|&s| s == 0.0));
    }

    #[test]
    fn mono_response_is_shared() {
        let mut reverb = ConvolutionReverb::new();
        let ir = ImpulseResponse::mono(vec![0.0, 1.0], 48_000);
        reverb.set_impulse_response(Some(&ir)).unwrap();
        assert!(!reverb.is_stereo());

        assert_eq!(reverb.process(1.0, -1.0), (0.0, 0.0));
        assert_eq!(reverb.process(0.0, 0.0), (1.0, -1.0));
    }

    #[test]
    fn stereo_response_per_channel() {
        let mut reverb = ConvolutionReverb::new();
        let ir = ImpulseResponse::stereo(vec![0.5], vec![0.25], 48_000);
        reverb.set_impulse_response(Some(&ir)).unwrap();
        assert!(reverb.is_stereo());
        assert_eq!(reverb.process(1.0, 1.0), (0.5, 0.25));
    }

    #[test]
    fn clearing_and_empty_responses() {
        let mut reverb = ConvolutionReverb::new();
        let long = ImpulseResponse::mono(vec![0.1; 2000], 48_000);
        reverb.set_impulse_response(Some(&long)).unwrap();
        assert_eq!(reverb.impulse_len(), Some(2000));

        reverb.set_impulse_response(Some(&ImpulseResponse::mono(vec![], 48_000))).unwrap();
        assert!(!reverb.has_impulse_response());

        reverb.set_impulse_response(Some(&long)).unwrap();
        reverb.set_impulse_response(None).unwrap();
        assert!(!reverb.has_impulse_response());
    }

    #[test]
    fn invalid_layout_keeps_previous() {
        let mut reverb = ConvolutionReverb::new();
        reverb
            .set_impulse_response(Some(&ImpulseResponse::mono(vec![1.0], 48_000)))
            .unwrap();
        let bad = ImpulseResponse {
            channels: vec![vec![1.0]; 3],
            sample_rate: 48_000,
        };
        assert!(reverb.set_impulse_response(Some(&bad)).is_err());
        assert!(reverb.has_impulse_response());
    }
}
