use std::f32::consts::TAU;

use crate::effects::Stage;
use crate::effects::common::lerp;

pub const MAX_DELAY_SECONDS: f32 = 0.05;
pub const MIN_RATE_HZ: f32 = 0.05;
pub const MAX_RATE_HZ: f32 = 10.0;
pub const MAX_DEPTH_SECONDS: f32 = 0.02;

/// Sine LFO that drives the chorus delay time.
///
/// The oscillator is started once and then free-runs; starting it again is a
/// no-op, so the phase never jumps.
#[derive(Debug, Clone)]
pub struct Lfo {
    phase: f32,
    rate_hz: f32,
    sample_rate: f32,
    started: bool,
}

impl Lfo {
    pub fn new(rate_hz: f32, sample_rate: f32) -> Self {
        Self {
            phase: 0.0,
            rate_hz,
            sample_rate,
            started: false,
        }
    }

    /// Returns `true` the first time only.
    pub fn start(&mut self) -> bool {
        if self.started {
            return false;
        }
        self.started = true;
        true
    }

    pub const fn is_started(&self) -> bool {
        self.started
    }

    pub const fn phase(&self) -> f32 {
        self.phase
    }

    pub fn set_rate(&mut self, rate_hz: f32) {
        self.rate_hz = rate_hz;
    }

    /// Next value in [-1, 1]; silent until started.
    #[inline]
    pub fn next(&mut self) -> f32 {
        if !self.started {
            return 0.0;
        }
        let value = (TAU * self.phase).sin();
        self.phase += self.rate_hz / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value
    }
}

/// Modulated delay (chorus).
///
/// `delay(t) = base + depth * lfo(t)`, clamped to the 50 ms line.
pub struct Chorus {
    lfo: Lfo,
    base_delay: f32,
    depth: f32,
    left: Vec<f32>,
    right: Vec<f32>,
    write_pos: usize,
    sample_rate: f32,
}

impl Chorus {
    pub fn new(rate_hz: f32, depth: f32, base_delay: f32, sample_rate: f32) -> Self {
        let len = (MAX_DELAY_SECONDS * sample_rate) as usize + 2;
        Self {
            lfo: Lfo::new(rate_hz, sample_rate),
            base_delay,
            depth,
            left: vec![0.0; len],
            right: vec![0.0; len],
            write_pos: 0,
            sample_rate,
        }
    }

    pub const fn lfo(&self) -> &Lfo {
        &self.lfo
    }

    /// Start the modulation oscillator. Only the first call has an effect.
    pub fn start(&mut self) -> bool {
        self.lfo.start()
    }

    #[inline]
    fn delay_samples(&mut self) -> f32 {
        let seconds = self.depth.mul_add(self.lfo.next(), self.base_delay);
        (seconds.clamp(0.0, MAX_DELAY_SECONDS) * self.sample_rate).max(1.0)
    }
}

impl Stage for Chorus {
    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let len = self.left.len();
        self.left[self.write_pos] = left;
        self.right[self.write_pos] = right;

        let delay = self.delay_samples();
        let mut read_pos = self.write_pos as f32 - delay;
        if read_pos < 0.0 {
            read_pos += len as f32;
        }
        let read_idx = read_pos as usize % len;
        let next_idx = (read_idx + 1) % len;
        let frac = read_pos.fract();

        self.write_pos = (self.write_pos + 1) % len;

        (
            lerp(self.left[read_idx], self.left[next_idx], frac),
            lerp(self.right[read_idx], self.right[next_idx], frac),
        )
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "rate" => {
                if (MIN_RATE_HZ..=MAX_RATE_HZ).contains(&value) {
                    self.lfo.set_rate(value);
                    Ok(())
                } else {
                    Err("Rate must be between 0.05 Hz and 10 Hz")
                }
            }
            "depth" => {
                if (0.0..=MAX_DEPTH_SECONDS).contains(&value) {
                    self.depth = value;
                    Ok(())
                } else {
                    Err("Depth must be between 0 s and 0.02 s")
                }
            }
            "delay" => {
                if (0.0..=MAX_DELAY_SECONDS).contains(&value) {
                    self.base_delay = value;
                    Ok(())
                } else {
                    Err("Delay must be between 0 s and 0.05 s")
                }
            }
            _ => Err("Unknown parameter"),
        }
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "rate" => Ok(self.lfo.rate_hz),
            "depth" => Ok(self.depth),
            "delay" => Ok(self.base_delay),
            _ => Err("Unknown parameter"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48_000.0;

    #[test]
    fn lfo_starts_once() {
        let mut lfo = Lfo::new(1.0, SR);
        assert_eq!(lfo.next(), 0.0);
        assert_eq!(lfo.phase(), 0.0);

        assert!(lfo.start());
        for _ in 0..1000 {
            lfo.next();
        }
        let phase = lfo.phase();
        assert!(phase > 0.0);

        assert!(!lfo.start());
        assert_eq!(lfo.phase(), phase, "restart must not reset the phase");
        assert!(lfo.is_started());
    }

    #[test]
    fn zero_depth_is_a_fixed_delay() {
        let mut chorus = Chorus::new(2.0, 0.0, 0.01, SR);
        chorus.start();
        let delay_samples = (0.01 * SR) as usize;

        let _ = chorus.process(1.0, 1.0);
        for i in 1..=delay_samples + 4 {
            let (l, _) = chorus.process(0.0, 0.0);
            if i == delay_samples {
                assert!((l - 1.0).abs() < 1e-3, "impulse expected at {delay_samples}, got {l}");
            } else {
                assert!(l.abs() < 1e-3, "unexpected {l} at {i}");
            }
        }
    }

    #[test]
    fn modulation_keeps_output_bounded() {
        let mut chorus = Chorus::new(5.0, MAX_DEPTH_SECONDS, MAX_DELAY_SECONDS, SR);
        chorus.start();
        for i in 0..48_000 {
            let x = (i as f32 * 0.05).sin();
            let (l, r) = chorus.process(x, x);
            assert!(l.abs() <= 1.0 + 1e-6 && r.abs() <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn parameter_validation() {
        let mut chorus = Chorus::new(1.5, 0.002, 0.02, SR);
        assert!(chorus.set_parameter("rate", 0.0).is_err());
        assert!(chorus.set_parameter("rate", 11.0).is_err());
        assert!(chorus.set_parameter("depth", 0.03).is_err());
        assert!(chorus.set_parameter("delay", 0.06).is_err());
        assert!(chorus.set_parameter("wet", 0.5).is_err());

        chorus.set_parameter("rate", 3.0).unwrap();
        chorus.set_parameter("depth", 0.004).unwrap();
        chorus.set_parameter("delay", 0.015).unwrap();
        assert_eq!(chorus.get_parameter("rate").unwrap(), 3.0);
        assert_eq!(chorus.get_parameter("depth").unwrap(), 0.004);
        assert_eq!(chorus.get_parameter("delay").unwrap(), 0.015);
    }
}
