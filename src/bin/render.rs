use anyhow::{Context, Result};
use clap::Parser;
use hound::{SampleFormat, WavSpec, WavWriter};
use log::{error, info, warn};
use std::path::PathBuf;

use fxgraph::audio::{AnalysisTap, AudioSource, BufferSource, Engine};
use fxgraph::chain::EffectKind;
use fxgraph::ir::loader::load_impulse_response;
use fxgraph::patch::Patch;
use fxgraph::settings::EngineSettings;

#[derive(Parser, Debug)]
#[command(name = "fxgraph-render")]
#[command(version)]
#[command(about = "Render a WAV file through a configurable effect graph.")]
struct Args {
    /// Input WAV file
    input: PathBuf,
    /// Output WAV file (32-bit float stereo)
    output: PathBuf,
    #[arg(long, env = "FXGRAPH_PATCH", help = "Patch JSON with chain and parameters")]
    patch: Option<PathBuf>,
    #[arg(long, env = "FXGRAPH_SETTINGS", help = "Engine settings JSON")]
    settings: Option<PathBuf>,
    #[arg(long, env = "FXGRAPH_IR", help = "Impulse response WAV for the reverb")]
    ir: Option<PathBuf>,
    #[arg(long, help = "Master output level (0.0 - 2.0)")]
    master: Option<f32>,
    #[arg(long, default_value_t = 2.0, help = "Seconds rendered after the input ends")]
    tail: f32,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    info!("fxgraph-render v{}", env!("CARGO_PKG_VERSION"));
    info!("Args: {:?}", args);

    let source = BufferSource::from_wav(&args.input)?;
    let sample_rate = source.sample_rate();
    let frames = source.frames();

    let settings = match &args.settings {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::default(),
    }
    .with_sample_rate(sample_rate);
    info!("Settings:\n{settings}");

    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&args.output, spec)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let (tap, tap_handle) = AnalysisTap::new(settings.analysis_fft_size);
    let (mut engine, _handle) = match Engine::new(settings.clone(), tap) {
        Ok(engine) => engine,
        Err(e) => {
            warn!("Engine unavailable ({e:#}), writing the input unprocessed");
            return pass_through(source, &mut writer, settings.quantum_frames)
                .and_then(|()| writer.finalize().context("Failed to finalize output"));
        }
    };

    if let Some(path) = &args.patch {
        let patch = Patch::load(path)?;
        for kind in EffectKind::ALL {
            for (key, value) in patch.parameters.values(kind) {
                engine.update_parameter(kind, key, value)?;
            }
        }
        engine.set_master_level(patch.parameters.master_level());
        engine.set_chain(patch.chain)?;
    }
    if let Some(level) = args.master {
        info!("Master level {}", engine.set_master_level(level));
    }

    if let Some(path) = &args.ir {
        match load_impulse_response(path, sample_rate) {
            Ok(ir) => engine.set_impulse_response(Some(ir))?,
            Err(e) => error!("Reverb stays inactive, failed to load impulse response: {e:#}"),
        }
    }

    engine.attach_source(Box::new(source))?;

    let quantum = engine.quantum();
    let total = frames + (args.tail.max(0.0) * sample_rate as f32) as usize;
    let mut left = vec![0.0; quantum];
    let mut right = vec![0.0; quantum];
    let mut rendered = 0;

    while rendered < total {
        engine.process(&mut left, &mut right)?;
        let n = quantum.min(total - rendered);
        for (l, r) in left.iter().zip(&right).take(n) {
            writer.write_sample(*l)?;
            writer.write_sample(*r)?;
        }
        rendered += n;
    }
    writer.finalize().context("Failed to finalize output")?;

    info!(
        "Rendered {} frames through {} rebuild(s)",
        rendered,
        engine.rebuild_count()
    );
    if let Some((bin, db)) = tap_handle.peak_bin() {
        let hz = bin as f32 * sample_rate as f32 / tap_handle.fft_size() as f32;
        info!("Loudest spectrum bin: {bin} (~{hz:.0} Hz) at {db:.1} dB");
    }
    Ok(())
}

fn pass_through<W>(
    mut source: BufferSource,
    writer: &mut WavWriter<W>,
    quantum: usize,
) -> Result<()>
where
    W: std::io::Write + std::io::Seek,
{
    let mut left = vec![0.0; quantum];
    let mut right = vec![0.0; quantum];
    loop {
        let read = source.read(&mut left, &mut right);
        if read == 0 {
            return Ok(());
        }
        for (l, r) in left.iter().zip(&right).take(read) {
            writer.write_sample(*l)?;
            writer.write_sample(*r)?;
        }
    }
}
