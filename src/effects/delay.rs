use crate::effects::Stage;
use crate::effects::common::{calculate_coefficient, lerp};
use crate::effects::level::LevelStage;

pub const MAX_DELAY_SECONDS: f32 = 2.0;
pub const MAX_FEEDBACK: f32 = 0.95;
const SMOOTH_TIME_MS: f32 = 50.0;

/// Stereo delay line for echo effects.
///
/// Uses a pre-allocated ring buffer (max 2 s) with linear interpolation for
/// fractional delay lengths and one-pole smoothing on the delay time so moving
/// the time control does not click.
///
/// The line can run in two ways:
/// - frame by frame through [`Stage::process`] (read, then write), or
/// - split into [`DelayLine::read_block`] and [`DelayLine::write_block`] when
///   it sits inside a feedback cycle of the graph. The read half produces the
///   whole block before its input exists, so the effective delay is never
///   shorter than `min_delay_frames`.
pub struct DelayLine {
    delay_seconds: f32,
    left: Vec<f32>,
    right: Vec<f32>,
    write_pos: usize,
    sample_rate: f32,
    delay_samples_smoothed: f32,
    delay_samples_target: f32,
    min_delay_samples: f32,
    max_delay_samples: f32,
    smooth_coeff: f32,
}

impl DelayLine {
    pub fn new(
        delay_seconds: f32,
        max_delay_seconds: f32,
        min_delay_frames: usize,
        sample_rate: f32,
    ) -> Self {
        let min_delay_samples = min_delay_frames.max(1) as f32;
        let max_delay_samples = (max_delay_seconds * sample_rate).max(min_delay_samples);
        let len = max_delay_samples as usize + min_delay_frames + 2;

        let mut line = Self {
            delay_seconds,
            left: vec![0.0; len],
            right: vec![0.0; len],
            write_pos: 0,
            sample_rate,
            delay_samples_smoothed: 0.0,
            delay_samples_target: 0.0,
            min_delay_samples,
            max_delay_samples,
            smooth_coeff: calculate_coefficient(SMOOTH_TIME_MS, sample_rate),
        };
        line.update_delay_target();
        line.delay_samples_smoothed = line.delay_samples_target;
        line
    }

    pub const fn delay_seconds(&self) -> f32 {
        self.delay_seconds
    }

    /// Shortest delay the line will produce, in frames.
    pub const fn min_delay_samples(&self) -> f32 {
        self.min_delay_samples
    }

    fn update_delay_target(&mut self) {
        self.delay_samples_target = (self.delay_seconds * self.sample_rate)
            .clamp(self.min_delay_samples, self.max_delay_samples);
    }

    #[inline]
    fn next_delay(&mut self) -> f32 {
        self.delay_samples_smoothed = self.smooth_coeff.mul_add(
            self.delay_samples_smoothed,
            (1.0 - self.smooth_coeff) * self.delay_samples_target,
        );
        self.delay_samples_smoothed
    }

    #[inline]
    fn tap(&self, offset: usize, delay_samples: f32) -> (f32, f32) {
        let len = self.left.len();
        let mut read_pos = (self.write_pos + offset) as f32 - delay_samples;
        if read_pos < 0.0 {
            read_pos += len as f32;
        }
        let read_idx = read_pos as usize % len;
        let next_idx = (read_idx + 1) % len;
        let frac = read_pos.fract();
        (
            lerp(self.left[read_idx], self.left[next_idx], frac),
            lerp(self.right[read_idx], self.right[next_idx], frac),
        )
    }

    /// Produce the next `left.len()` delayed frames without consuming input.
    pub fn read_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (i, (l, r)) in left.iter_mut().zip(right.iter_mut()).enumerate() {
            let delay = self.next_delay();
            (*l, *r) = self.tap(i, delay);
        }
    }

    /// Silence the line without touching the delay time.
    pub fn clear(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
    }

    /// Append a block of input frames to the line.
    pub fn write_block(&mut self, left: &[f32], right: &[f32]) {
        let len = self.left.len();
        for (i, (&l, &r)) in left.iter().zip(right.iter()).enumerate() {
            let idx = (self.write_pos + i) % len;
            self.left[idx] = l;
            self.right[idx] = r;
        }
        self.write_pos = (self.write_pos + left.len().min(right.len())) % len;
    }
}

impl Stage for DelayLine {
    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let delay = self.next_delay();
        let out = self.tap(0, delay);

        self.left[self.write_pos] = left;
        self.right[self.write_pos] = right;
        self.write_pos = (self.write_pos + 1) % self.left.len();

        out
    }

    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "time" => {
                if (0.0..=MAX_DELAY_SECONDS).contains(&value) {
                    self.delay_seconds = value;
                    self.update_delay_target();
                    Ok(())
                } else {
                    Err("Delay time must be between 0 s and 2 s")
                }
            }
            _ => Err("Unknown parameter"),
        }
    }

    fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "time" => Ok(self.delay_seconds),
            _ => Err("Unknown parameter"),
        }
    }
}

/// The delay-with-feedback effect: a delay line plus the gain stage that the
/// graph wires from the line's output back into its own input.
pub struct FeedbackDelay {
    pub line: DelayLine,
    pub feedback: LevelStage,
}

impl FeedbackDelay {
    pub fn new(
        delay_seconds: f32,
        feedback: f32,
        min_delay_frames: usize,
        sample_rate: f32,
    ) -> Self {
        Self {
            line: DelayLine::new(delay_seconds, MAX_DELAY_SECONDS, min_delay_frames, sample_rate),
            feedback: LevelStage::new(feedback.clamp(0.0, MAX_FEEDBACK)),
        }
    }

    pub fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str> {
        match name {
            "time" => self.line.set_parameter("time", value),
            "feedback" => {
                if (0.0..=MAX_FEEDBACK).contains(&value) {
                    self.feedback.set_parameter("gain", value)
                } else {
                    Err("Feedback must be between 0.0 and 0.95")
                }
            }
            _ => Err("Unknown parameter"),
        }
    }

    pub fn get_parameter(&self, name: &str) -> Result<f32, &'static str> {
        match name {
            "time" => self.line.get_parameter("time"),
            "feedback" => self.feedback.get_parameter("gain"),
            _ => Err("Unknown parameter"),
        }
    }
}
