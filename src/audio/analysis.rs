use arc_swap::ArcSwap;
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::f32::consts::TAU;
use std::sync::Arc;

use crate::effects::common::lin_to_db;
use crate::graph::NodeRef;

/// Floor of the reported spectrum, in dBFS.
pub const MIN_DECIBELS: f32 = -100.0;

/// Pass-through measurement point in front of the sink.
///
/// Keeps the last `fft_size` mono samples and publishes them once per
/// quantum for [`TapHandle::snapshot`].
pub struct AnalysisTap {
    ring: Vec<f32>,
    pos: usize,
    attached: Option<NodeRef>,
    window: Arc<ArcSwap<Vec<f32>>>,
}

/// Control-side reader of an [`AnalysisTap`].
#[derive(Clone)]
pub struct TapHandle {
    fft_size: usize,
    window: Arc<ArcSwap<Vec<f32>>>,
    blackman: Arc<[f32]>,
    fft: Arc<dyn RealToComplex<f32>>,
}

impl AnalysisTap {
    pub fn new(fft_size: usize) -> (Self, TapHandle) {
        let fft_size = fft_size.max(2);
        let window = Arc::new(ArcSwap::from_pointee(vec![0.0; fft_size]));

        let blackman: Arc<[f32]> = (0..fft_size)
            .map(|n| {
                let x = n as f32 / fft_size as f32;
                0.08f32.mul_add((2.0 * TAU * x).cos(), 0.5f32.mul_add(-(TAU * x).cos(), 0.42))
            })
            .collect();
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);

        (
            Self {
                ring: vec![0.0; fft_size],
                pos: 0,
                attached: None,
                window: Arc::clone(&window),
            },
            TapHandle {
                fft_size,
                window,
                blackman,
                fft,
            },
        )
    }

    pub fn fft_size(&self) -> usize {
        self.ring.len()
    }

    /// Record where the tap now sits in the graph.
    pub fn attach(&mut self, point: NodeRef) {
        self.attached = Some(point);
    }

    pub const fn attached_to(&self) -> Option<NodeRef> {
        self.attached
    }

    /// Measure a block; the audio passes through untouched.
    pub fn process(&mut self, left: &[f32], right: &[f32]) {
        let len = self.ring.len();
        for (&l, &r) in left.iter().zip(right) {
            self.ring[self.pos] = (l + r) * 0.5;
            self.pos = (self.pos + 1) % len;
        }
        self.publish();
    }

    fn publish(&self) {
        let mut ordered = Vec::with_capacity(self.ring.len());
        ordered.extend_from_slice(&self.ring[self.pos..]);
        ordered.extend_from_slice(&self.ring[..self.pos]);
        self.window.store(Arc::new(ordered));
    }

    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.pos = 0;
        self.publish();
    }
}

impl TapHandle {
    pub const fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub const fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Most recent `fft_size` samples, oldest first.
    pub fn waveform(&self) -> Vec<f32> {
        self.window.load().as_ref().clone()
    }

    /// Magnitude spectrum of the current window in dBFS, `fft_size / 2`
    /// bins from DC upward, floored at [`MIN_DECIBELS`].
    pub fn snapshot(&self) -> Vec<f32> {
        let window = self.window.load();
        let mut input: Vec<f32> = window
            .iter()
            .zip(self.blackman.iter())
            .map(|(s, w)| s * w)
            .collect();
        let mut spectrum = vec![Complex::new(0.0, 0.0); self.fft_size / 2 + 1];

        if self.fft.process(&mut input, &mut spectrum).is_err() {
            return vec![MIN_DECIBELS; self.bin_count()];
        }

        let scale = 1.0 / self.fft_size as f32;
        spectrum
            .iter()
            .take(self.bin_count())
            .map(|c| lin_to_db(c.norm() * scale, MIN_DECIBELS))
            .collect()
    }

    /// Index and level of the loudest bin.
    pub fn peak_bin(&self) -> Option<(usize, f32)> {
        self.snapshot()
            .into_iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}
