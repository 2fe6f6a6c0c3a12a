use anyhow::{Context, Result, bail};
use crossbeam::channel::{Receiver, Sender, bounded};
use log::{debug, error, info};

use crate::audio::analysis::AnalysisTap;
use crate::audio::source::AudioSource;
use crate::chain::{ChainSpec, EffectKind, RoutingMode};
use crate::graph::{EffectNodeRegistry, GraphBuilder, StereoBuffer, Topology};
use crate::ir::model::ImpulseResponse;
use crate::params::{ParamClass, ParamUpdate, ParameterStore};
use crate::settings::EngineSettings;

const MESSAGE_CAPACITY: usize = 64;

pub enum EngineMessage {
    Rebuild,
    SetParameter {
        kind: EffectKind,
        key: String,
        value: f32,
    },
    SetMasterLevel(f32),
    SetImpulseResponse(Option<Box<ImpulseResponse>>),
    SetChain(Box<ChainSpec>),
    SetEnabled(EffectKind, bool),
    SetMode(EffectKind, RoutingMode),
    MoveBlock {
        from: usize,
        to: usize,
    },
    AttachSource(Box<dyn AudioSource>),
    DetachSource,
}

/// Control-side sender for an [`Engine`] running elsewhere.
///
/// Never blocks; a full queue drops the message and logs an error.
#[derive(Clone)]
pub struct EngineHandle {
    tx_updates: Sender<EngineMessage>,
}

impl EngineHandle {
    fn send(&self, message: EngineMessage, what: &str) {
        self.tx_updates.try_send(message).unwrap_or_else(|e| {
            error!("Failed to send {what}: {e}");
        });
    }

    pub fn rebuild(&self) {
        self.send(EngineMessage::Rebuild, "rebuild request");
    }

    pub fn update_parameter(&self, kind: EffectKind, key: &str, value: f32) {
        let message = EngineMessage::SetParameter {
            kind,
            key: key.to_string(),
            value,
        };
        self.send(message, "parameter update");
    }

    pub fn set_master_level(&self, level: f32) {
        self.send(EngineMessage::SetMasterLevel(level), "master level");
    }

    pub fn set_impulse_response(&self, ir: Option<ImpulseResponse>) {
        self.send(
            EngineMessage::SetImpulseResponse(ir.map(Box::new)),
            "impulse response",
        );
    }

    pub fn set_chain(&self, chain: ChainSpec) {
        self.send(EngineMessage::SetChain(Box::new(chain)), "chain");
    }

    pub fn set_enabled(&self, kind: EffectKind, enabled: bool) {
        self.send(EngineMessage::SetEnabled(kind, enabled), "enable toggle");
    }

    pub fn set_mode(&self, kind: EffectKind, mode: RoutingMode) {
        self.send(EngineMessage::SetMode(kind, mode), "routing mode");
    }

    pub fn move_block(&self, from: usize, to: usize) {
        self.send(EngineMessage::MoveBlock { from, to }, "block move");
    }

    pub fn attach_source(&self, source: Box<dyn AudioSource>) {
        self.send(EngineMessage::AttachSource(source), "audio source");
    }

    pub fn detach_source(&self) {
        self.send(EngineMessage::DetachSource, "source detach");
    }
}

/// Owns the chain, parameters, nodes and the live topology, and renders one
/// quantum per [`Engine::process`] call.
pub struct Engine {
    settings: EngineSettings,
    chain: ChainSpec,
    params: ParameterStore,
    registry: EffectNodeRegistry,
    builder: GraphBuilder,
    topology: Option<Topology>,
    tap: AnalysisTap,
    source: Option<Box<dyn AudioSource>>,
    input: StereoBuffer,
    rx_updates: Receiver<EngineMessage>,
    rebuild_count: usize,
}

impl Engine {
    pub fn new(settings: EngineSettings, tap: AnalysisTap) -> Result<(Self, EngineHandle)> {
        settings.validate().context("invalid engine settings")?;
        if tap.fft_size() != settings.analysis_fft_size {
            bail!(
                "analysis tap has {} points, settings ask for {}",
                tap.fft_size(),
                settings.analysis_fft_size
            );
        }

        let (tx_updates, rx_updates) = bounded(MESSAGE_CAPACITY);
        let params = ParameterStore::default();
        let engine = Self {
            registry: EffectNodeRegistry::new(
                settings.sample_rate,
                settings.quantum_frames,
                params.master_level(),
            ),
            builder: GraphBuilder::new(settings.delay_wet_tap),
            input: StereoBuffer::new(settings.quantum_frames),
            chain: ChainSpec::default(),
            params,
            topology: None,
            tap,
            source: None,
            rx_updates,
            rebuild_count: 0,
            settings,
        };
        info!(
            "Engine ready: {} Hz, {} frame quantum",
            engine.settings.sample_rate, engine.settings.quantum_frames
        );

        Ok((engine, EngineHandle { tx_updates }))
    }

    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub const fn quantum(&self) -> usize {
        self.settings.quantum_frames
    }

    pub const fn chain(&self) -> &ChainSpec {
        &self.chain
    }

    pub const fn params(&self) -> &ParameterStore {
        &self.params
    }

    pub const fn registry(&self) -> &EffectNodeRegistry {
        &self.registry
    }

    pub const fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    pub const fn tap(&self) -> &AnalysisTap {
        &self.tap
    }

    /// Successful rebuilds so far.
    pub const fn rebuild_count(&self) -> usize {
        self.rebuild_count
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_source_finished(&self) -> bool {
        self.source.as_ref().is_none_or(|s| s.is_finished())
    }

    /// Rebuild the topology from the chain. Returns `Ok(false)` without a
    /// source. The new graph replaces the old one only when it compiled;
    /// on error the previous graph keeps playing.
    pub fn rebuild(&mut self) -> Result<bool> {
        if self.source.is_none() {
            debug!("No source attached, rebuild skipped");
            return Ok(false);
        }

        match self
            .builder
            .build(&self.chain, &self.params, &mut self.registry, self.settings.quantum_frames)
        {
            Ok(topology) => {
                if let Some(point) = topology.tap_point() {
                    self.tap.attach(point);
                }
                self.topology = Some(topology);
                self.rebuild_count += 1;
                Ok(true)
            }
            Err(e) => {
                error!("Rebuild failed, keeping previous graph: {e:#}");
                Err(e)
            }
        }
    }

    /// Store a parameter and push it to the graph: live values go straight
    /// into the node, structural ones rebuild when they changed.
    pub fn update_parameter(
        &mut self,
        kind: EffectKind,
        key: &str,
        value: f32,
    ) -> Result<ParamUpdate> {
        let update = self.store_parameter(kind, key, value)?;
        if update.class == ParamClass::Structural && update.changed {
            self.rebuild()?;
        }
        Ok(update)
    }

    fn store_parameter(&mut self, kind: EffectKind, key: &str, value: f32) -> Result<ParamUpdate> {
        let update = self.params.set(kind, key, value)?;
        if update.class == ParamClass::Live {
            self.registry.apply_parameter(kind, key, update.value)?;
        }
        Ok(update)
    }

    /// Returns the clamped level actually applied.
    pub fn set_master_level(&mut self, level: f32) -> f32 {
        let level = self.params.set_master_level(level);
        if let Err(e) = self.registry.set_master_level(level) {
            error!("{e}");
        }
        level
    }

    /// Install or clear the reverb's impulse response, then rebuild.
    pub fn set_impulse_response(&mut self, ir: Option<ImpulseResponse>) -> Result<()> {
        self.store_impulse_response(ir)?;
        self.rebuild()?;
        Ok(())
    }

    fn store_impulse_response(&mut self, ir: Option<ImpulseResponse>) -> Result<()> {
        if let Some(ir) = ir.as_ref()
            && ir.sample_rate != self.settings.sample_rate
        {
            bail!(
                "impulse response is {} Hz, engine runs at {} Hz",
                ir.sample_rate,
                self.settings.sample_rate
            );
        }
        self.registry.set_impulse_response(ir)
    }

    pub fn set_chain(&mut self, chain: ChainSpec) -> Result<bool> {
        self.chain = chain;
        self.rebuild()
    }

    pub fn set_enabled(&mut self, kind: EffectKind, enabled: bool) -> Result<bool> {
        self.chain.set_enabled(kind, enabled);
        self.rebuild()
    }

    /// Returns the mode actually applied after coercion.
    pub fn set_mode(&mut self, kind: EffectKind, mode: RoutingMode) -> Result<RoutingMode> {
        let mode = self.chain.set_mode(kind, mode);
        self.rebuild()?;
        Ok(mode)
    }

    pub fn move_block(&mut self, from: usize, to: usize) -> Result<()> {
        self.chain.move_block(from, to)?;
        self.rebuild()?;
        Ok(())
    }

    /// Attach the stream to play. Its rate must match the engine's. Reverb
    /// and delay tails of the previous stream are cleared.
    pub fn attach_source(&mut self, source: Box<dyn AudioSource>) -> Result<()> {
        if source.sample_rate() != self.settings.sample_rate {
            bail!(
                "source runs at {} Hz, engine at {} Hz",
                source.sample_rate(),
                self.settings.sample_rate
            );
        }
        self.source = Some(source);
        self.tap.reset();
        self.registry.reset_tails();
        self.rebuild()?;
        Ok(())
    }

    pub fn detach_source(&mut self) -> Option<Box<dyn AudioSource>> {
        self.source.take()
    }

    /// Render one quantum. Both buffers must be exactly one quantum long.
    pub fn process(&mut self, left_out: &mut [f32], right_out: &mut [f32]) -> Result<()> {
        self.handle_messages();

        let quantum = self.settings.quantum_frames;
        if left_out.len() != quantum || right_out.len() != quantum {
            bail!(
                "output buffers are {}/{} frames, engine renders {} per call",
                left_out.len(),
                right_out.len(),
                quantum
            );
        }

        let (Some(source), Some(topology)) = (self.source.as_mut(), self.topology.as_mut()) else {
            left_out.fill(0.0);
            right_out.fill(0.0);
            return Ok(());
        };

        let (left, right) = self.input.channels_mut();
        let read = source.read(left, right).min(left.len());
        left[read..].fill(0.0);
        right[read..].fill(0.0);

        topology.render(&mut self.registry, &mut self.tap, &self.input, left_out, right_out);
        Ok(())
    }

    /// Apply queued messages. Structural changes in one batch share a
    /// single rebuild.
    pub fn handle_messages(&mut self) {
        let mut needs_rebuild = false;
        while let Ok(message) = self.rx_updates.try_recv() {
            needs_rebuild |= self.apply_message(message);
        }
        // rebuild() logs its own failure and keeps the previous graph
        if needs_rebuild && let Err(e) = self.rebuild() {
            debug!("Queued changes not applied: {e:#}");
        }
    }

    fn apply_message(&mut self, message: EngineMessage) -> bool {
        match message {
            EngineMessage::Rebuild => true,
            EngineMessage::SetParameter { kind, key, value } => {
                match self.store_parameter(kind, &key, value) {
                    Ok(update) => {
                        debug!("{kind} {key} = {}", update.value);
                        update.class == ParamClass::Structural && update.changed
                    }
                    Err(e) => {
                        error!("Failed to set parameter: {e:#}");
                        false
                    }
                }
            }
            EngineMessage::SetMasterLevel(level) => {
                self.set_master_level(level);
                false
            }
            EngineMessage::SetImpulseResponse(ir) => {
                match self.store_impulse_response(ir.map(|ir| *ir)) {
                    Ok(()) => true,
                    Err(e) => {
                        error!("Failed to set impulse response: {e:#}");
                        false
                    }
                }
            }
            EngineMessage::SetChain(chain) => {
                self.chain = *chain;
                true
            }
            EngineMessage::SetEnabled(kind, enabled) => {
                self.chain.set_enabled(kind, enabled);
                true
            }
            EngineMessage::SetMode(kind, mode) => {
                self.chain.set_mode(kind, mode);
                true
            }
            EngineMessage::MoveBlock { from, to } => match self.chain.move_block(from, to) {
                Ok(()) => true,
                Err(e) => {
                    error!("Failed to move block: {e:#}");
                    false
                }
            },
            EngineMessage::AttachSource(source) => {
                if source.sample_rate() == self.settings.sample_rate {
                    self.source = Some(source);
                    self.tap.reset();
                    self.registry.reset_tails();
                    debug!("Audio source attached");
                    true
                } else {
                    error!(
                        "Rejected source at {} Hz, engine runs at {} Hz",
                        source.sample_rate(),
                        self.settings.sample_rate
                    );
                    false
                }
            }
            EngineMessage::DetachSource => {
                self.source = None;
                debug!("Audio source detached");
                false
            }
        }
    }
}
