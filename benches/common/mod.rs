use hound::{WavSpec, WavWriter};
use std::f32::consts::TAU;
use std::fs;
use std::path::{Path, PathBuf};

use fxgraph::ir::ImpulseResponse;

pub fn synthetic_taps(length: usize, sample_rate: u32) -> Vec<f32> {
    (0..length)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (TAU * 440.0 * t).sin() * (-t * 3.0).exp()
        })
        .collect()
}

#[allow(dead_code)]
pub fn synthetic_ir(length: usize, sample_rate: u32) -> ImpulseResponse {
    ImpulseResponse::mono(synthetic_taps(length, sample_rate), sample_rate)
}

/// Write a synthetic response to the temp dir once and return its path.
#[allow(dead_code)]
pub fn synthetic_ir_file(length: usize, sample_rate: u32) -> PathBuf {
    let ir_dir = std::env::temp_dir().join("fxgraph_bench_ir");
    fs::create_dir_all(&ir_dir).unwrap();

    let ir_path = ir_dir.join(format!("test_ir_{length}.wav"));
    if !ir_path.exists() {
        write_wav(&ir_path, &synthetic_taps(length, sample_rate), sample_rate);
    }
    ir_path
}

#[allow(dead_code)]
fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).unwrap();
    for &sample in samples {
        writer.write_sample((sample * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}
