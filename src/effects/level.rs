use crate::effects::Stage;

/// Plain gain stage. Used for the master level, the delay feedback path and
/// the dry/wet/sum stages of a parallel block.
#[derive(Debug, Clone)]
pub struct LevelStage {
    gain: f32,
}

impl LevelStage {
    pub const MAX_GAIN: f32 = 2.0;

    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    pub const fn gain(&self) -> f32 {
        self.gain
    }
}

impl Stage for LevelStage {
    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        (left * self.gain, right * self.gain)
    }

    fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        // Unity stages are on every parallel split; skip the multiply.
        if self.gain == 1.0 {
            return;
        }
        for s in left.iter_mut().chain(right.iter_mut()) {
            *s *= self.gain;
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "gain" => {
                if (0.0..=Self::MAX_GAIN).contains(&value) {
                    self.gain = value;
                    Ok(())
                } else {
                    Err("Gain must be between 0.0 and 2.0")
                }
            }
            _ => Err("Unknown parameter"),
        }
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "gain" => Ok(self.gain),
            _ => Err("Unknown parameter name"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_stage() {
        let mut stage = LevelStage::new(1.0);
        assert_eq!(stage.process(1.0, -1.0), (1.0, -1.0));

        stage.set_parameter("gain", 2.0).unwrap();
        assert_eq!(stage.process(1.0, 0.5), (2.0, 1.0));

        stage.set_parameter("gain", 0.5).unwrap();
        assert_eq!(stage.process(1.0, 1.0), (0.5, 0.5));

        assert!(stage.set_parameter("gain", 3.0).is_err());
        assert!(stage.set_parameter("drive", 1.0).is_err());
    }

    #[test]
    fn block_matches_per_frame() {
        let mut stage = LevelStage::new(0.25);
        let mut left = vec![1.0, -0.5, 0.25];
        let mut right = vec![0.0, 2.0, -4.0];
        stage.process_block(&mut left, &mut right);
        assert_eq!(left, vec![0.25, -0.125, 0.0625]);
        assert_eq!(right, vec![0.0, 0.5, -1.0]);
    }
}
