use anyhow::{Result, anyhow};
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::sync::Arc;

use super::fir::FirConvolver;

/// Length of the direct-form head. Equal to the tail partition size, so a
/// tail block computed at the end of one partition is ready exactly when
/// the head runs out.
pub const HEAD_LEN: usize = 256;
const PARTITION: usize = HEAD_LEN;
const FFT_LEN: usize = PARTITION * 2;

/// Zero-latency convolver for long responses.
///
/// The first [`HEAD_LEN`] taps run through a direct FIR; the rest is a
/// uniformly partitioned overlap-save convolution whose output lags one
/// partition, which the head length covers.
pub struct TwoStageConvolver {
    head: FirConvolver,

    partitions: Vec<Vec<Complex<f32>>>,
    // Frequency-domain delay line of past input frames; `newest` is the latest
    spectra: Vec<Vec<Complex<f32>>>,
    newest: usize,

    // [previous partition | current partition]
    frame: Vec<f32>,
    fill: usize,
    // Tail output of the last completed partition, read during the current one
    tail_out: Vec<f32>,

    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    time_scratch: Vec<f32>,
    accumulator: Vec<Complex<f32>>,
    r2c_scratch: Vec<Complex<f32>>,
    c2r_scratch: Vec<Complex<f32>>,
}

impl TwoStageConvolver {
    pub fn with_taps(taps: &[f32]) -> Result<Self> {
        let split = taps.len().min(HEAD_LEN);
        let (head, tail) = taps.split_at(split);

        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(FFT_LEN);
        let c2r = planner.plan_fft_inverse(FFT_LEN);
        let r2c_scratch = r2c.make_scratch_vec();
        let c2r_scratch = c2r.make_scratch_vec();

        let mut conv = Self {
            head: FirConvolver::with_taps(head),
            partitions: Vec::new(),
            spectra: Vec::new(),
            newest: 0,
            frame: vec![0.0; FFT_LEN],
            fill: 0,
            tail_out: vec![0.0; PARTITION],
            r2c,
            c2r,
            time_scratch: vec![0.0; FFT_LEN],
            accumulator: vec![Complex::new(0.0, 0.0); FFT_LEN / 2 + 1],
            r2c_scratch,
            c2r_scratch,
        };
        conv.partition_tail(tail)?;
        Ok(conv)
    }

    fn partition_tail(&mut self, tail: &[f32]) -> Result<()> {
        for chunk in tail.chunks(PARTITION) {
            self.time_scratch.fill(0.0);
            self.time_scratch[..chunk.len()].copy_from_slice(chunk);

            let mut spectrum = vec![Complex::new(0.0, 0.0); FFT_LEN / 2 + 1];
            self.r2c
                .process_with_scratch(&mut self.time_scratch, &mut spectrum, &mut self.r2c_scratch)
                .map_err(|e| anyhow!("FFT failed while partitioning impulse response: {e}"))?;
            self.partitions.push(spectrum);
        }
        self.spectra = vec![vec![Complex::new(0.0, 0.0); FFT_LEN / 2 + 1]; self.partitions.len()];
        Ok(())
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let head = self.head.process_sample(input);
        if self.partitions.is_empty() {
            return head;
        }

        let tail = self.tail_out[self.fill];
        self.frame[PARTITION + self.fill] = input;
        self.fill += 1;
        if self.fill == PARTITION {
            self.run_tail_block();
            self.fill = 0;
        }

        head + tail
    }

    fn run_tail_block(&mut self) {
        let count = self.spectra.len();
        self.newest = (self.newest + 1) % count;

        self.time_scratch.copy_from_slice(&self.frame);
        let forward = self.r2c.process_with_scratch(
            &mut self.time_scratch,
            &mut self.spectra[self.newest],
            &mut self.r2c_scratch,
        );

        // Slide the input frame by one partition
        self.frame.copy_within(PARTITION.., 0);

        if forward.is_err() {
            self.tail_out.fill(0.0);
            return;
        }

        self.accumulator.fill(Complex::new(0.0, 0.0));
        for (age, partition) in self.partitions.iter().enumerate() {
            let spectrum = &self.spectra[(self.newest + count - age) % count];
            for ((acc, &x), &h) in self.accumulator.iter_mut().zip(spectrum).zip(partition) {
                *acc += x * h;
            }
        }
        self.accumulator[0].im = 0.0;
        if let Some(nyquist) = self.accumulator.last_mut() {
            nyquist.im = 0.0;
        }

        let inverse = self.c2r.process_with_scratch(
            &mut self.accumulator,
            &mut self.time_scratch,
            &mut self.c2r_scratch,
        );
        if inverse.is_err() {
            self.tail_out.fill(0.0);
            return;
        }

        // Overlap-save: only the second half is free of circular aliasing
        let scale = 1.0 / FFT_LEN as f32;
        for (out, &y) in self.tail_out.iter_mut().zip(&self.time_scratch[PARTITION..]) {
            *out = y * scale;
        }
    }

    pub fn reset(&mut self) {
        self.head.reset();
        self.frame.fill(0.0);
        self.fill = 0;
        self.tail_out.fill(0.0);
        for spectrum in &mut self.spectra {
            spectrum.fill(Complex::new(0.0, 0.0));
        }
        self.newest = 0;
    }
}
