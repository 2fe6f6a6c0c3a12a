use std::f32::consts::FRAC_PI_2;

use crate::effects::Stage;

/// Equal-power stereo panner for stereo input.
///
/// Moving left folds part of the right channel into the left one (and vice
/// versa); at centre both channels pass unchanged.
#[derive(Debug, Clone)]
pub struct StereoPanner {
    pan: f32,
    gain_l: f32,
    gain_r: f32,
}

impl StereoPanner {
    pub fn new(pan: f32) -> Self {
        let mut panner = Self {
            pan: pan.clamp(-1.0, 1.0),
            gain_l: 0.0,
            gain_r: 1.0,
        };
        panner.update_gains();
        panner
    }

    pub const fn pan(&self) -> f32 {
        self.pan
    }

    fn update_gains(&mut self) {
        let x = if self.pan <= 0.0 { self.pan + 1.0 } else { self.pan };
        self.gain_l = (x * FRAC_PI_2).cos();
        self.gain_r = (x * FRAC_PI_2).sin();
    }
}

impl Stage for StereoPanner {
    #[inline]
    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        if self.pan <= 0.0 {
            (right.mul_add(self.gain_l, left), right * self.gain_r)
        } else {
            (left * self.gain_l, left.mul_add(self.gain_r, right))
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "pan" => {
                if (-1.0..=1.0).contains(&value) {
                    self.pan = value;
                    self.update_gains();
                    Ok(())
                } else {
                    Err("Pan must be between -1.0 and 1.0")
                }
            }
            _ => Err("Unknown parameter"),
        }
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "pan" => Ok(self.pan),
            _ => Err("Unknown parameter"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centre_is_transparent() {
        let mut panner = StereoPanner::new(0.0);
        let (l, r) = panner.process(0.3, -0.7);
        assert!((l - 0.3).abs() < 1e-6);
        assert!((r + 0.7).abs() < 1e-6);
    }

    #[test]
    fn hard_left_and_right() {
        let mut panner = StereoPanner::new(-1.0);
        let (l, r) = panner.process(0.5, 0.25);
        assert!((l - 0.75).abs() < 1e-6);
        assert!(r.abs() < 1e-6);

        panner.set_parameter("pan", 1.0).unwrap();
        let (l, r) = panner.process(0.5, 0.25);
        assert!(l.abs() < 1e-6);
        assert!((r - 0.75).abs() < 1e-6);
    }

    #[test]
    fn half_left_is_equal_power() {
        let mut panner = StereoPanner::new(-0.5);
        let (l, r) = panner.process(0.0, 1.0);
        let g = (0.5 * FRAC_PI_2).cos();
        assert!((l - g).abs() < 1e-6);
        assert!((l * l + r * r - 1.0).abs() < 1e-5);
    }

    #[test]
    fn rejects_out_of_range() {
        let mut panner = StereoPanner::new(0.0);
        assert!(panner.set_parameter("pan", 1.5).is_err());
        assert!(panner.set_parameter("width", 0.5).is_err());
        assert_eq!(panner.get_parameter("pan").unwrap(), 0.0);
    }
}
