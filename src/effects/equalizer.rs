use crate::effects::Stage;
use std::f32::consts::{PI, SQRT_2};

pub const LOW_SHELF_HZ: f32 = 120.0;
pub const PEAKING_HZ: f32 = 1000.0;
pub const PEAKING_Q: f32 = 0.8;
pub const HIGH_SHELF_HZ: f32 = 6500.0;

pub const MIN_GAIN_DB: f32 = -24.0;
pub const MAX_GAIN_DB: f32 = 24.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FilterType {
    LowShelf,
    Peaking,
    HighShelf,
}

#[derive(Clone, Copy, Debug)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    // RBJ cookbook, shelf slope S = 1.
    fn compute(
        filter_type: FilterType,
        frequency: f32,
        q: f32,
        gain_db: f32,
        sample_rate: f32,
    ) -> Self {
        let nyquist = sample_rate * 0.5;
        let frequency = frequency.clamp(1.0, nyquist * 0.999);
        let a = 10f32.powf(gain_db / 40.0);
        let omega = 2.0 * PI * frequency / sample_rate;
        let (sin_w, cos_w) = omega.sin_cos();

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::Peaking => {
                let alpha = sin_w / (2.0 * q.max(1e-3));
                (
                    alpha.mul_add(a, 1.0),
                    -2.0 * cos_w,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w,
                    1.0 - alpha / a,
                )
            }
            FilterType::LowShelf => {
                let two_sqrt_a_alpha = a.sqrt() * sin_w * SQRT_2;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w),
                    a * ((a + 1.0) - (a - 1.0) * cos_w - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w),
                    (a + 1.0) + (a - 1.0) * cos_w - two_sqrt_a_alpha,
                )
            }
            FilterType::HighShelf => {
                let two_sqrt_a_alpha = a.sqrt() * sin_w * SQRT_2;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w),
                    a * ((a + 1.0) + (a - 1.0) * cos_w - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w),
                    (a + 1.0) - (a - 1.0) * cos_w - two_sqrt_a_alpha,
                )
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Direct form I history for one channel.
#[derive(Clone, Copy, Debug, Default)]
struct History {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl History {
    #[inline]
    fn process(&mut self, c: &Coefficients, x: f32) -> f32 {
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

/// One second-order section of the equalizer.
pub struct BiquadStage {
    filter_type: FilterType,
    frequency: f32,
    q: f32,
    gain_db: f32,
    sample_rate: f32,
    coefficients: Coefficients,
    left: History,
    right: History,
}

impl BiquadStage {
    pub fn new(
        filter_type: FilterType,
        frequency: f32,
        q: f32,
        gain_db: f32,
        sample_rate: f32,
    ) -> Self {
        Self {
            filter_type,
            frequency,
            q,
            gain_db,
            sample_rate,
            coefficients: Coefficients::compute(filter_type, frequency, q, gain_db, sample_rate),
            left: History::default(),
            right: History::default(),
        }
    }

    pub const fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    // This recalculates the coefficients when frequency or gain change
    fn update_coefficients(&mut self) {
        self.coefficients = Coefficients::compute(
            self.filter_type,
            self.frequency,
            self.q,
            self.gain_db,
            self.sample_rate,
        );
    }
}

impl Stage for BiquadStage {
    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        (
            self.left.process(&self.coefficients, left),
            self.right.process(&self.coefficients, right),
        )
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "gain" => {
                if (MIN_GAIN_DB..=MAX_GAIN_DB).contains(&value) {
                    self.gain_db = value;
                    self.update_coefficients();
                    Ok(())
                } else {
                    Err("Gain must be between -24 dB and 24 dB")
                }
            }
            "frequency" => {
                if (10.0..=20000.0).contains(&value) {
                    self.frequency = value;
                    self.update_coefficients();
                    Ok(())
                } else {
                    Err("Frequency must be between 10 Hz and 20 kHz")
                }
            }
            _ => Err("Unknown parameter name"),
        }
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "gain" => Ok(self.gain_db),
            "frequency" => Ok(self.frequency),
            "q" => Ok(self.q),
            _ => Err("Unknown parameter name"),
        }
    }
}

/// Three-band equalizer: low shelf, peaking mid and high shelf, wired as three
/// separate graph stages.
pub struct Equalizer {
    pub low: BiquadStage,
    pub mid: BiquadStage,
    pub high: BiquadStage,
}

impl Equalizer {
    pub fn new(
        (low_gain, mid_gain, high_gain): (f32, f32, f32),
        (low_hz, mid_hz, high_hz): (f32, f32, f32),
        sample_rate: f32,
    ) -> Self {
        Self {
            low: BiquadStage::new(
                FilterType::LowShelf,
                low_hz,
                SQRT_2.recip(),
                low_gain,
                sample_rate,
            ),
            mid: BiquadStage::new(FilterType::Peaking, mid_hz, PEAKING_Q, mid_gain, sample_rate),
            high: BiquadStage::new(
                FilterType::HighShelf,
                high_hz,
                SQRT_2.recip(),
                high_gain,
                sample_rate,
            ),
        }
    }
}
