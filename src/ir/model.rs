use anyhow::{Result, bail};

/// Decoded impulse response, one or two channels at `sample_rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl ImpulseResponse {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    pub fn stereo(left: Vec<f32>, right: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![left, right],
            sample_rate,
        }
    }

    /// Length in frames of the longest channel.
    pub fn len(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_stereo(&self) -> bool {
        self.channels.len() == 2
    }

    /// Samples for the left and right convolvers. A mono response feeds both.
    pub fn left_right(&self) -> Result<(&[f32], &[f32])> {
        match self.channels.as_slice() {
            [mono] => Ok((mono, mono)),
            [left, right] => Ok((left, right)),
            other => bail!("impulse response must have 1 or 2 channels, got {}", other.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_feeds_both_sides() {
        let ir = ImpulseResponse::mono(vec![1.0, 0.5], 48_000);
        let (l, r) = ir.left_right().unwrap();
        assert_eq!(l, r);
        assert!(!ir.is_stereo());
        assert_eq!(ir.len(), 2);
    }

    #[test]
    fn rejects_surround() {
        let ir = ImpulseResponse {
            channels: vec![vec![1.0]; 3],
            sample_rate: 48_000,
        };
        assert!(ir.left_right().is_err());
    }

    #[test]
    fn empty_response() {
        let ir = ImpulseResponse::stereo(vec![], vec![], 44_100);
        assert!(ir.is_empty());
        assert!(ir.is_stereo());
    }
}
