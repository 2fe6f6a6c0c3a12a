use crate::effects::Stage;
use crate::effects::common::{EnvelopeFollower, calculate_coefficient, db_to_lin, lin_to_db};

const DETECTOR_FLOOR_DB: f32 = -120.0;

/// Stereo-linked feed-forward compressor with a soft knee.
///
/// Attack and release are in seconds. There is no automatic makeup gain.
pub struct CompressorStage {
    threshold_db: f32,
    knee_db: f32,
    ratio: f32,
    attack: f32,
    release: f32,
    envelope: EnvelopeFollower,
    sample_rate: f32,
}

impl CompressorStage {
    pub fn new(
        threshold_db: f32,
        knee_db: f32,
        ratio: f32,
        attack: f32,
        release: f32,
        sample_rate: f32,
    ) -> Self {
        Self {
            threshold_db,
            knee_db,
            ratio,
            attack,
            release,
            envelope: EnvelopeFollower::from_ms(attack * 1000.0, release * 1000.0, sample_rate),
            sample_rate,
        }
    }

    fn update_attack(&mut self, attack: f32) {
        self.attack = attack;
        self.envelope
            .set_attack_coeff(calculate_coefficient(attack * 1000.0, self.sample_rate));
    }

    fn update_release(&mut self, release: f32) {
        self.release = release;
        self.envelope
            .set_release_coeff(calculate_coefficient(release * 1000.0, self.sample_rate));
    }

    /// Static curve: output level in dB for an input level in dB.
    pub fn output_level_db(&self, input_db: f32) -> f32 {
        let over = input_db - self.threshold_db;
        let slope = 1.0 / self.ratio - 1.0;
        let half_knee = self.knee_db * 0.5;

        if self.knee_db > 0.0 && over.abs() <= half_knee {
            let x = over + half_knee;
            input_db + slope * x * x / (2.0 * self.knee_db)
        } else if over > 0.0 {
            self.threshold_db + over / self.ratio
        } else {
            input_db
        }
    }

    /// Current gain reduction in dB (zero or negative).
    pub fn reduction_db(&self) -> f32 {
        let level = lin_to_db(self.envelope.value(), DETECTOR_FLOOR_DB);
        self.output_level_db(level) - level
    }
}

impl Stage for CompressorStage {
    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        // Linked detector so the stereo image does not shift under compression
        self.envelope.process(left.abs().max(right.abs()));
        let gain = db_to_lin(self.reduction_db());
        (left * gain, right * gain)
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "threshold" => {
                if (-100.0..=0.0).contains(&value) {
                    self.threshold_db = value;
                    Ok(())
                } else {
                    Err("Threshold must be between -100 dB and 0 dB")
                }
            }
            "knee" => {
                if (0.0..=40.0).contains(&value) {
                    self.knee_db = value;
                    Ok(())
                } else {
                    Err("Knee must be between 0 dB and 40 dB")
                }
            }
            "ratio" => {
                if (1.0..=20.0).contains(&value) {
                    self.ratio = value;
                    Ok(())
                } else {
                    Err("Ratio must be between 1.0 and 20.0")
                }
            }
            "attack" => {
                if (0.0..=1.0).contains(&value) {
                    self.update_attack(value);
                    Ok(())
                } else {
                    Err("Attack must be between 0 s and 1 s")
                }
            }
            "release" => {
                if (0.0..=1.0).contains(&value) {
                    self.update_release(value);
                    Ok(())
                } else {
                    Err("Release must be between 0 s and 1 s")
                }
            }
            _ => Err("Unknown parameter"),
        }
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "threshold" => Ok(self.threshold_db),
            "knee" => Ok(self.knee_db),
            "ratio" => Ok(self.ratio),
            "attack" => Ok(self.attack),
            "release" => Ok(self.release),
            _ => Err("Unknown parameter"),
        }
    }
}
