/// Convert decibels to linear amplitude.
#[inline]
pub fn db_to_lin(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Convert linear amplitude to decibels, floored at `floor_db`.
#[inline]
pub fn lin_to_db(lin: f32, floor_db: f32) -> f32 {
    if lin > 0.0 {
        (20.0 * lin.log10()).max(floor_db)
    } else {
        floor_db
    }
}

/// Calculate a one-pole smoothing coefficient from a time constant in milliseconds.
///
/// Returns `exp(-1 / (sample_rate * time_ms * 0.001))`, which is `0.0` for a
/// zero time constant (instant response).
#[inline]
pub fn calculate_coefficient(time_ms: f32, sample_rate: f32) -> f32 {
    (-1.0 / (sample_rate * 0.001 * time_ms)).exp()
}

/// Linear interpolation between two neighbouring samples.
#[inline]
pub fn lerp(a: f32, b: f32, frac: f32) -> f32 {
    (1.0 - frac).mul_add(a, frac * b)
}

/// One-pole envelope follower with configurable attack and release coefficients.
#[derive(Clone)]
pub struct EnvelopeFollower {
    envelope: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl EnvelopeFollower {
    /// Create from pre-computed coefficients.
    pub const fn new(attack_coeff: f32, release_coeff: f32) -> Self {
        Self {
            envelope: 0.0,
            attack_coeff,
            release_coeff,
        }
    }

    /// Create from attack/release times in milliseconds.
    pub fn from_ms(attack_ms: f32, release_ms: f32, sample_rate: f32) -> Self {
        Self::new(
            calculate_coefficient(attack_ms, sample_rate),
            calculate_coefficient(release_ms, sample_rate),
        )
    }

    pub const fn set_attack_coeff(&mut self, coeff: f32) {
        self.attack_coeff = coeff;
    }

    pub const fn set_release_coeff(&mut self, coeff: f32) {
        self.release_coeff = coeff;
    }

    pub const fn value(&self) -> f32 {
        self.envelope
    }

    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let abs_input = input.abs();
        let coeff = if abs_input > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff.mul_add(self.envelope, (1.0 - coeff) * abs_input);
        self.envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_conversions_are_inverse() {
        for db in [-40.0f32, -6.0, 0.0, 6.0, 12.0] {
            let back = lin_to_db(db_to_lin(db), -120.0);
            assert!((back - db).abs() < 1e-3, "{db} dB came back as {back}");
        }
        assert_eq!(lin_to_db(0.0, -100.0), -100.0);
    }

    #[test]
    fn zero_time_constant_is_instant() {
        assert_eq!(calculate_coefficient(0.0, 48_000.0), 0.0);

        let mut env = EnvelopeFollower::from_ms(0.0, 0.0, 48_000.0);
        assert_eq!(env.process(0.7), 0.7);
        assert_eq!(env.process(-0.2), 0.2);
    }

    #[test]
    fn envelope_attacks_faster_than_it_releases() {
        let mut env = EnvelopeFollower::from_ms(1.0, 200.0, 48_000.0);
        for _ in 0..480 {
            env.process(1.0);
        }
        assert!(env.value() > 0.99);

        for _ in 0..480 {
            env.process(0.0);
        }
        assert!(env.value() > 0.9, "release too fast: {}", env.value());
    }
}
