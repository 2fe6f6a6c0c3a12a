use anyhow::Result;
use std::f32::consts::TAU;

use fxgraph::audio::{AnalysisTap, AudioSource, BufferSource, Engine, TapHandle};
use fxgraph::chain::{EffectKind, RoutingMode};
use fxgraph::graph::{DelayWetTap, EffectNode, NodeRef};
use fxgraph::ir::ImpulseResponse;
use fxgraph::settings::EngineSettings;

const SAMPLE_RATE: u32 = 48_000;
const QUANTUM: usize = 128;
const FFT_SIZE: usize = 256;

fn engine() -> Result<(Engine, TapHandle)> {
    let (tap, tap_handle) = AnalysisTap::new(FFT_SIZE);
    let (engine, _) = Engine::new(EngineSettings::default(), tap)?;
    Ok((engine, tap_handle))
}

fn impulse_source(frames: usize) -> Box<BufferSource> {
    let mut impulse = vec![0.0; frames];
    impulse[0] = 1.0;
    Box::new(BufferSource::mono(impulse, SAMPLE_RATE))
}

fn sine(freq: f32, amplitude: f32, frames: usize) -> Vec<f32> {
    (0..frames)
        .map(|n| amplitude * (TAU * freq * n as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

fn sine_source(freq: f32) -> Box<BufferSource> {
    Box::new(BufferSource::mono(sine(freq, 0.5, SAMPLE_RATE as usize), SAMPLE_RATE).looping(true))
}

fn render(engine: &mut Engine, quanta: usize) -> Result<Vec<f32>> {
    let mut left = vec![0.0; QUANTUM];
    let mut right = vec![0.0; QUANTUM];
    let mut out = Vec::with_capacity(quanta * QUANTUM);
    for _ in 0..quanta {
        engine.process(&mut left, &mut right)?;
        out.extend_from_slice(&left);
    }
    Ok(out)
}

fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}

#[test]
fn silence_without_source() -> Result<()> {
    let (mut engine, _) = engine()?;
    assert!(!engine.rebuild()?);
    assert!(!engine.set_enabled(EffectKind::Shaper, true)?);
    assert!(engine.topology().is_none());
    assert_eq!(engine.rebuild_count(), 0);

    let mut left = vec![1.0; QUANTUM];
    let mut right = vec![1.0; QUANTUM];
    engine.process(&mut left, &mut right)?;
    assert!(left.iter().chain(&right).all(|&s| s == 0.0));
    Ok(())
}

#[test]
fn rejects_wrong_buffer_size() -> Result<()> {
    let (mut engine, _) = engine()?;
    engine.attach_source(sine_source(440.0))?;
    let mut left = vec![0.0; QUANTUM / 2];
    let mut right = vec![0.0; QUANTUM / 2];
    assert!(engine.process(&mut left, &mut right).is_err());
    Ok(())
}

#[test]
fn rejects_mismatched_rates() -> Result<()> {
    let (mut engine, _) = engine()?;
    let source = BufferSource::mono(vec![0.0; 64], 44_100);
    assert!(engine.attach_source(Box::new(source)).is_err());
    assert!(!engine.has_source());

    engine.attach_source(sine_source(440.0))?;
    let ir = ImpulseResponse::mono(vec![1.0, 0.5], 44_100);
    assert!(engine.set_impulse_response(Some(ir)).is_err());
    assert!(!engine.registry().has_impulse_response());
    Ok(())
}

#[test]
fn rejects_mismatched_tap() {
    let (tap, _) = AnalysisTap::new(512);
    assert!(Engine::new(EngineSettings::default(), tap).is_err());
}

#[test]
fn empty_chain_passes_input_through_master() -> Result<()> {
    let (mut engine, _) = engine()?;
    engine.attach_source(sine_source(440.0))?;
    let input = sine(440.0, 0.5, 4 * QUANTUM);

    assert_eq!(render(&mut engine, 4)?, input);

    assert_eq!(engine.set_master_level(0.5), 0.5);
    let out = render(&mut engine, 4)?;
    let expected: Vec<f32> = sine(440.0, 0.5, 8 * QUANTUM)[4 * QUANTUM..]
        .iter()
        .map(|s| s * 0.5)
        .collect();
    assert!(max_abs_diff(&out, &expected) < 1e-6);
    Ok(())
}

#[test]
fn parallel_wet_zero_matches_dry() -> Result<()> {
    let (mut dry, _) = engine()?;
    dry.attach_source(sine_source(440.0))?;

    let (mut split, _) = engine()?;
    split.attach_source(sine_source(440.0))?;
    split.set_enabled(EffectKind::Compressor, true)?;
    assert_eq!(
        split.set_mode(EffectKind::Compressor, RoutingMode::Parallel)?,
        RoutingMode::Parallel
    );
    split.update_parameter(EffectKind::Compressor, "wet", 0.0)?;

    assert_eq!(render(&mut split, 16)?, render(&mut dry, 16)?);
    Ok(())
}

#[test]
fn parallel_wet_one_with_transparent_node_doubles() -> Result<()> {
    let (mut engine, _) = engine()?;
    engine.update_parameter(EffectKind::Compressor, "threshold", 0.0)?;
    engine.update_parameter(EffectKind::Compressor, "ratio", 1.0)?;
    engine.update_parameter(EffectKind::Compressor, "wet", 1.0)?;
    engine.attach_source(sine_source(440.0))?;
    engine.set_enabled(EffectKind::Compressor, true)?;
    engine.set_mode(EffectKind::Compressor, RoutingMode::Parallel)?;

    let out = render(&mut engine, 8)?;
    let expected: Vec<f32> = sine(440.0, 0.5, out.len()).iter().map(|s| 2.0 * s).collect();
    assert!(max_abs_diff(&out, &expected) < 1e-4);
    Ok(())
}

#[test]
fn reordering_non_commuting_blocks_changes_output() -> Result<()> {
    let setup = |order: [EffectKind; 2]| -> Result<Vec<f32>> {
        let (mut engine, _) = engine()?;
        engine.update_parameter(EffectKind::Equalizer, "low_gain", 12.0)?;
        engine.update_parameter(EffectKind::Shaper, "amount", 50.0)?;
        engine.attach_source(sine_source(110.0))?;
        let mut chain = engine.chain().clone();
        chain.reorder(&order)?;
        chain.set_enabled(EffectKind::Equalizer, true);
        chain.set_enabled(EffectKind::Shaper, true);
        engine.set_chain(chain)?;
        render(&mut engine, 32)
    };

    let eq_first = setup([EffectKind::Equalizer, EffectKind::Shaper])?;
    let shaper_first = setup([EffectKind::Shaper, EffectKind::Equalizer])?;
    assert!(max_abs_diff(&eq_first, &shaper_first) > 1e-3);
    Ok(())
}

#[test]
fn disabled_nodes_keep_their_state() -> Result<()> {
    let (mut engine, _) = engine()?;
    engine.attach_source(sine_source(440.0))?;
    engine.set_enabled(EffectKind::Chorus, true)?;
    engine.set_enabled(EffectKind::Delay, true)?;
    engine.update_parameter(EffectKind::Delay, "time", 1.2)?;
    render(&mut engine, 8)?;

    let delay_ptr = engine.registry().delay().map(|d| d as *const _);
    let phase = engine.registry().chorus().unwrap().lfo().phase();
    assert!(phase > 0.0);

    engine.set_enabled(EffectKind::Chorus, false)?;
    engine.set_enabled(EffectKind::Delay, false)?;
    let chorus = NodeRef::Effect(EffectNode::Chorus);
    assert!(!engine.topology().unwrap().contains(chorus));
    engine.set_enabled(EffectKind::Chorus, true)?;
    engine.set_enabled(EffectKind::Delay, true)?;

    let registry = engine.registry();
    assert_eq!(registry.delay().map(|d| d as *const _), delay_ptr);
    assert_eq!(registry.delay().unwrap().get_parameter("time"), Ok(1.2));
    let lfo = registry.chorus().unwrap().lfo();
    assert!(lfo.is_started());
    assert_eq!(lfo.phase(), phase);
    Ok(())
}

#[test]
fn feedback_loop_repeats() -> Result<()> {
    let (mut engine, _) = engine()?;
    engine.update_parameter(EffectKind::Delay, "time", 0.01)?;
    engine.update_parameter(EffectKind::Delay, "feedback", 0.5)?;

    engine.attach_source(impulse_source(4 * 1024))?;
    engine.set_enabled(EffectKind::Delay, true)?;

    let out = render(&mut engine, 16)?;
    assert!((out[480] - 1.0).abs() < 1e-3);
    assert!((out[960] - 0.5).abs() < 1e-3);
    assert!((out[1440] - 0.25).abs() < 1e-3);
    assert!(out[..480].iter().all(|s| s.abs() < 1e-6));
    Ok(())
}

#[test]
fn live_updates_skip_rebuild() -> Result<()> {
    let (mut engine, _) = engine()?;
    engine.attach_source(sine_source(440.0))?;
    engine.set_enabled(EffectKind::Panner, true)?;
    let rebuilds = engine.rebuild_count();

    engine.update_parameter(EffectKind::Panner, "pan", -1.0)?;
    assert_eq!(engine.rebuild_count(), rebuilds);
    assert_eq!(engine.registry().panner().unwrap().pan(), -1.0);

    let mut left = vec![0.0; QUANTUM];
    let mut right = vec![0.0; QUANTUM];
    engine.process(&mut left, &mut right)?;
    assert!(right.iter().all(|s| s.abs() < 1e-6));
    assert!(left.iter().any(|s| s.abs() > 0.1));
    Ok(())
}

#[test]
fn structural_updates_rebuild_once_when_changed() -> Result<()> {
    let (mut engine, _) = engine()?;
    engine.attach_source(sine_source(440.0))?;
    engine.set_enabled(EffectKind::Shaper, true)?;
    engine.set_mode(EffectKind::Shaper, RoutingMode::Parallel)?;
    let rebuilds = engine.rebuild_count();

    let update = engine.update_parameter(EffectKind::Shaper, "wet", 0.8)?;
    assert!(update.changed);
    assert_eq!(engine.rebuild_count(), rebuilds + 1);
    let topology = engine.topology().unwrap();
    assert_eq!(topology.mixer(NodeRef::Mixer(1)).unwrap().stage.gain(), 0.8);

    let update = engine.update_parameter(EffectKind::Shaper, "wet", 0.8)?;
    assert!(!update.changed);
    assert_eq!(engine.rebuild_count(), rebuilds + 1);
    Ok(())
}

#[test]
fn queued_messages_share_one_rebuild() -> Result<()> {
    let (tap, _) = AnalysisTap::new(FFT_SIZE);
    let (mut engine, handle) = Engine::new(EngineSettings::default(), tap)?;
    handle.attach_source(sine_source(440.0));
    handle.set_enabled(EffectKind::Equalizer, true);
    handle.set_enabled(EffectKind::Compressor, true);
    handle.set_mode(EffectKind::Compressor, RoutingMode::Parallel);
    handle.update_parameter(EffectKind::Compressor, "wet", 0.25);
    handle.set_master_level(0.8);

    render(&mut engine, 1)?;
    assert_eq!(engine.rebuild_count(), 1);
    assert!(engine.has_source());
    assert_eq!(engine.params().master_level(), 0.8);
    assert_eq!(
        engine.topology().unwrap().effect_groups(),
        None,
        "parallel compressor splits the path"
    );
    assert_eq!(engine.tap().attached_to(), Some(NodeRef::Mixer(2)));

    render(&mut engine, 1)?;
    assert_eq!(engine.rebuild_count(), 1);
    Ok(())
}

#[test]
fn bad_messages_are_dropped() -> Result<()> {
    let (tap, _) = AnalysisTap::new(FFT_SIZE);
    let (mut engine, handle) = Engine::new(EngineSettings::default(), tap)?;
    engine.attach_source(sine_source(440.0))?;
    let rebuilds = engine.rebuild_count();

    handle.update_parameter(EffectKind::Delay, "no_such_key", 1.0);
    handle.move_block(0, 42);
    handle.attach_source(Box::new(BufferSource::mono(vec![0.0; 16], 22_050)));
    render(&mut engine, 1)?;

    assert_eq!(engine.rebuild_count(), rebuilds);
    assert_eq!(engine.chain().blocks()[0].id, EffectKind::Equalizer);
    Ok(())
}

#[test]
fn reverb_follows_impulse_response() -> Result<()> {
    let (mut engine, _) = engine()?;
    engine.attach_source(sine_source(440.0))?;
    engine.set_enabled(EffectKind::Reverb, true)?;
    let reverb = NodeRef::Effect(EffectNode::Reverb);
    assert!(!engine.topology().unwrap().contains(reverb));

    let ir = ImpulseResponse::mono(vec![0.0, 0.0, 1.0], SAMPLE_RATE);
    engine.set_impulse_response(Some(ir))?;
    assert!(engine.topology().unwrap().contains(reverb));

    // A three-tap response only delays the signal by two frames
    let out = render(&mut engine, 4)?;
    let input = sine(440.0, 0.5, out.len());
    assert!(max_abs_diff(&out[2..], &input[..out.len() - 2]) < 1e-5);

    engine.set_impulse_response(None)?;
    assert!(!engine.topology().unwrap().contains(reverb));
    Ok(())
}

#[test]
fn tap_sees_the_output() -> Result<()> {
    let (mut engine, tap_handle) = engine()?;
    // Bin 10 of a 256 point FFT at 48 kHz
    let freq = 10.0 * SAMPLE_RATE as f32 / FFT_SIZE as f32;
    engine.attach_source(sine_source(freq))?;
    assert_eq!(engine.tap().attached_to(), Some(NodeRef::Master));

    render(&mut engine, 4)?;
    let (bin, level) = tap_handle.peak_bin().unwrap();
    assert_eq!(bin, 10);
    assert!(level > -30.0);
    Ok(())
}

#[test]
fn detaching_silences_output() -> Result<()> {
    let (mut engine, _) = engine()?;
    engine.attach_source(sine_source(440.0))?;
    render(&mut engine, 2)?;
    assert!(engine.detach_source().is_some());
    assert!(render(&mut engine, 2)?.iter().all(|&s| s == 0.0));
    Ok(())
}

fn parallel_delay_echoes(wet_tap: DelayWetTap) -> Result<Vec<f32>> {
    let settings = EngineSettings {
        delay_wet_tap: wet_tap,
        ..EngineSettings::default()
    };
    let (tap, _) = AnalysisTap::new(settings.analysis_fft_size);
    let (mut engine, _) = Engine::new(settings, tap)?;
    engine.update_parameter(EffectKind::Delay, "time", 0.01)?;
    engine.update_parameter(EffectKind::Delay, "feedback", 0.5)?;
    engine.update_parameter(EffectKind::Delay, "wet", 0.5)?;
    engine.attach_source(impulse_source(4 * 1024))?;
    engine.set_enabled(EffectKind::Delay, true)?;
    engine.set_mode(EffectKind::Delay, RoutingMode::Parallel)?;

    let out = render(&mut engine, 16)?;
    Ok([0, 480, 960, 1440].iter().map(|&i| out[i]).collect())
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-3, "got {actual:?}, expected {expected:?}");
    }
}

#[test]
fn parallel_delay_wet_reads_the_line() -> Result<()> {
    let echoes = parallel_delay_echoes(DelayWetTap::DelayLine)?;
    assert_close(&echoes, &[1.0, 0.5, 0.25, 0.125]);
    Ok(())
}

#[test]
fn parallel_delay_wet_reads_the_feedback_gain() -> Result<()> {
    let echoes = parallel_delay_echoes(DelayWetTap::FeedbackGain)?;
    assert_close(&echoes, &[1.0, 0.25, 0.125, 0.0625]);
    Ok(())
}

#[test]
fn edits_while_disabled_apply_on_enable() -> Result<()> {
    let (mut engine, _) = engine()?;
    engine.attach_source(sine_source(440.0))?;
    engine.set_enabled(EffectKind::Panner, true)?;
    engine.set_enabled(EffectKind::Panner, false)?;

    engine.update_parameter(EffectKind::Panner, "pan", 1.0)?;
    engine.set_enabled(EffectKind::Panner, true)?;

    let mut left = vec![0.0; QUANTUM];
    let mut right = vec![0.0; QUANTUM];
    engine.process(&mut left, &mut right)?;
    assert!(left.iter().all(|s| s.abs() < 1e-5));
    assert!(right.iter().any(|s| s.abs() > 0.5));
    Ok(())
}

#[test]
fn new_source_starts_without_old_echoes() -> Result<()> {
    let (mut engine, _) = engine()?;
    engine.update_parameter(EffectKind::Delay, "time", 0.01)?;
    engine.attach_source(impulse_source(QUANTUM))?;
    engine.set_enabled(EffectKind::Delay, true)?;
    render(&mut engine, 1)?;

    engine.attach_source(Box::new(BufferSource::mono(vec![0.0; 4096], SAMPLE_RATE)))?;
    assert!(render(&mut engine, 16)?.iter().all(|&s| s == 0.0));
    Ok(())
}

/// Source that claims more frames than it was asked for.
struct OverreportingSource;

impl AudioSource for OverreportingSource {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn read(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        left.fill(0.25);
        right.fill(0.25);
        left.len() + 100
    }
}

#[test]
fn overreported_reads_are_clamped() -> Result<()> {
    let (mut engine, _) = engine()?;
    engine.attach_source(Box::new(OverreportingSource))?;
    assert!(render(&mut engine, 2)?.iter().all(|&s| s == 0.25));
    Ok(())
}
