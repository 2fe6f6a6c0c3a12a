use anyhow::Result;
use log::warn;
use std::f32::consts::PI;

use crate::audio::oversampler::Oversampler;
use crate::effects::Stage;

/// Number of points in the transfer curve table.
pub const CURVE_LEN: usize = 44_100;
pub const OVERSAMPLE_FACTOR: usize = 4;
pub const MAX_AMOUNT: f32 = 100.0;

const DEG: f32 = PI / 180.0;

/// Fill `curve` with the distortion transfer function for drive `amount`.
///
/// `curve[i] = (3 + k) * x * 20 * deg / (pi + k * |x|)` with
/// `x = i * 2 / len - 1`. Odd in `x`, so the table is antisymmetric.
pub fn fill_curve(curve: &mut [f32], amount: f32) {
    let len = curve.len() as f32;
    for (i, value) in curve.iter_mut().enumerate() {
        let x = (i as f32).mul_add(2.0 / len, -1.0);
        *value = (3.0 + amount) * x * 20.0 * DEG / amount.mul_add(x.abs(), PI);
    }
}

/// Table-driven waveshaper with optional 4x oversampling.
pub struct WaveShaper {
    amount: f32,
    curve: Vec<f32>,
    oversampler: Option<Oversampler>,
    /// Set after the first oversampling error; the shaper stays at base rate.
    oversampling_failed: bool,
}

impl WaveShaper {
    /// Shaper that runs at the base rate only.
    pub fn new(amount: f32) -> Self {
        let mut curve = vec![0.0; CURVE_LEN];
        fill_curve(&mut curve, amount);
        Self {
            amount,
            curve,
            oversampler: None,
            oversampling_failed: false,
        }
    }

    /// Shaper oversampled 4x around blocks of `block_size` frames.
    pub fn oversampled(amount: f32, block_size: usize, sample_rate: usize) -> Result<Self> {
        let mut shaper = Self::new(amount);
        shaper.oversampler = Some(Oversampler::new(block_size, OVERSAMPLE_FACTOR, sample_rate)?);
        Ok(shaper)
    }

    pub fn curve(&self) -> &[f32] {
        &self.curve
    }

    pub const fn is_oversampled(&self) -> bool {
        self.oversampler.is_some() && !self.oversampling_failed
    }

    /// Regenerate the curve in place for a new drive amount.
    fn update_curve(&mut self) {
        fill_curve(&mut self.curve, self.amount);
    }
}

/// Map `input` through `curve`, clamping outside [-1, 1] and interpolating
/// linearly between table points.
#[inline]
pub fn apply_curve(curve: &[f32], input: f32) -> f32 {
    let last = curve.len() - 1;
    let v = (input + 1.0) * 0.5 * last as f32;
    if v <= 0.0 {
        return curve[0];
    }
    if v >= last as f32 {
        return curve[last];
    }
    let idx = v as usize;
    let frac = v - idx as f32;
    (1.0 - frac).mul_add(curve[idx], frac * curve[idx + 1])
}

impl Stage for WaveShaper {
    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        (apply_curve(&self.curve, left), apply_curve(&self.curve, right))
    }

    fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        if !self.oversampling_failed
            && let Some(os) = self.oversampler.as_mut()
            && os.block_size() == left.len()
        {
            let curve = &self.curve;
            match os.process(left, right, |x| apply_curve(curve, x)) {
                Ok(()) => return,
                Err(e) => {
                    warn!("Oversampled shaping failed, running at base rate from now on: {e}");
                    self.oversampling_failed = true;
                }
            }
        }

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            *l = apply_curve(&self.curve, *l);
            *r = apply_curve(&self.curve, *r);
        }
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "amount" => {
                if (0.0..=MAX_AMOUNT).contains(&value) {
                    self.amount = value;
                    self.update_curve();
                    Ok(())
                } else {
                    Err("Amount must be between 0 and 100")
                }
            }
            _ => Err("Unknown parameter"),
        }
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "amount" => Ok(self.amount),
            _ => Err("Unknown parameter"),
        }
    }
}
