/// Direct-form FIR convolver over a ring of past inputs.
///
/// Zero latency; cost grows with the response length, so it is used for
/// short responses and as the head of [`super::TwoStageConvolver`].
pub struct FirConvolver {
    taps: Vec<f32>,
    history: Vec<f32>,
    pos: usize,
}

impl FirConvolver {
    pub fn with_taps(taps: &[f32]) -> Self {
        Self {
            taps: taps.to_vec(),
            history: vec![0.0; taps.len()],
            pos: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// An empty convolver outputs silence.
    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let len = self.taps.len();
        if len == 0 {
            return 0.0;
        }

        self.history[self.pos] = input;

        // taps[k] pairs with the input k samples ago: walk backwards from pos
        let (recent, older) = self.history.split_at(self.pos + 1);
        let mut acc = 0.0;
        let mut taps = self.taps.iter();
        for (&x, &h) in recent.iter().rev().zip(&mut taps) {
            acc = h.mul_add(x, acc);
        }
        for (&x, &h) in older.iter().rev().zip(taps) {
            acc = h.mul_add(x, acc);
        }

        self.pos = (self.pos + 1) % len;
        acc
    }

    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.pos = 0;
    }
}
