use anyhow::{Context, Result, anyhow};
use log::{debug, warn};

use crate::chain::EffectKind;
use crate::effects::Stage;
use crate::effects::chorus::Chorus;
use crate::effects::compressor::CompressorStage;
use crate::effects::delay::FeedbackDelay;
use crate::effects::equalizer::Equalizer;
use crate::effects::level::LevelStage;
use crate::effects::panner::StereoPanner;
use crate::effects::reverb::ConvolutionReverb;
use crate::effects::shaper::WaveShaper;
use crate::graph::EffectNode;
use crate::ir::model::ImpulseResponse;
use crate::params::ParameterStore;

/// Where the builder wires a block: signal enters at `entry` and leaves at
/// `exit`. Single-node effects have `entry == exit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectHandle {
    pub kind: EffectKind,
    pub entry: EffectNode,
    pub exit: EffectNode,
}

impl EffectHandle {
    pub const fn for_kind(kind: EffectKind) -> Self {
        let (entry, exit) = match kind {
            EffectKind::Equalizer => (EffectNode::EqLowShelf, EffectNode::EqHighShelf),
            EffectKind::Shaper => (EffectNode::Shaper, EffectNode::Shaper),
            EffectKind::Chorus => (EffectNode::Chorus, EffectNode::Chorus),
            EffectKind::Delay => (EffectNode::Delay, EffectNode::Delay),
            EffectKind::Reverb => (EffectNode::Reverb, EffectNode::Reverb),
            EffectKind::Panner => (EffectNode::Panner, EffectNode::Panner),
            EffectKind::Compressor => (EffectNode::Compressor, EffectNode::Compressor),
        };
        Self { kind, entry, exit }
    }
}

fn param(params: &ParameterStore, kind: EffectKind, key: &str) -> Result<f32> {
    params
        .get(kind, key)
        .ok_or_else(|| anyhow!("{kind} has no parameter '{key}'"))
}

/// Owns one processing node per effect kind, created on first use and kept
/// for the rest of the session so parameter and oscillator state survive
/// every rebuild.
pub struct EffectNodeRegistry {
    sample_rate: f32,
    quantum: usize,
    master: LevelStage,
    impulse_response: Option<ImpulseResponse>,

    equalizer: Option<Equalizer>,
    shaper: Option<WaveShaper>,
    chorus: Option<Chorus>,
    delay: Option<FeedbackDelay>,
    reverb: Option<ConvolutionReverb>,
    panner: Option<StereoPanner>,
    compressor: Option<CompressorStage>,
}

impl EffectNodeRegistry {
    pub fn new(sample_rate: u32, quantum: usize, master_level: f32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            quantum,
            master: LevelStage::new(master_level),
            impulse_response: None,
            equalizer: None,
            shaper: None,
            chorus: None,
            delay: None,
            reverb: None,
            panner: None,
            compressor: None,
        }
    }

    pub fn contains(&self, kind: EffectKind) -> bool {
        match kind {
            EffectKind::Equalizer => self.equalizer.is_some(),
            EffectKind::Shaper => self.shaper.is_some(),
            EffectKind::Chorus => self.chorus.is_some(),
            EffectKind::Delay => self.delay.is_some(),
            EffectKind::Reverb => self.reverb.is_some(),
            EffectKind::Panner => self.panner.is_some(),
            EffectKind::Compressor => self.compressor.is_some(),
        }
    }

    /// Kinds whose node exists, in default order.
    pub fn created(&self) -> Vec<EffectKind> {
        EffectKind::ALL
            .into_iter()
            .filter(|&kind| self.contains(kind))
            .collect()
    }

    /// Return the node for `kind`, creating it from the current parameters on
    /// first use. Later calls never touch an existing node.
    pub fn get_or_create(
        &mut self,
        kind: EffectKind,
        params: &ParameterStore,
    ) -> Result<EffectHandle> {
        if !self.contains(kind) {
            self.create(kind, params)
                .with_context(|| format!("failed to create {kind} node"))?;
            debug!("Created {kind} node");
        }
        Ok(EffectHandle::for_kind(kind))
    }

    fn create(&mut self, kind: EffectKind, params: &ParameterStore) -> Result<()> {
        let sr = self.sample_rate;
        let p = |key: &str| param(params, kind, key);

        match kind {
            EffectKind::Equalizer => {
                self.equalizer = Some(Equalizer::new(
                    (p("low_gain")?, p("mid_gain")?, p("high_gain")?),
                    (p("low_freq")?, p("mid_freq")?, p("high_freq")?),
                    sr,
                ));
            }
            EffectKind::Shaper => {
                let amount = p("amount")?;
                let shaper = match WaveShaper::oversampled(amount, self.quantum, sr as usize) {
                    Ok(shaper) => shaper,
                    Err(e) => {
                        warn!("Shaper oversampling unavailable, running at base rate: {e:#}");
                        WaveShaper::new(amount)
                    }
                };
                self.shaper = Some(shaper);
            }
            EffectKind::Chorus => {
                self.chorus = Some(Chorus::new(p("rate")?, p("depth")?, p("delay")?, sr));
            }
            EffectKind::Delay => {
                self.delay = Some(FeedbackDelay::new(p("time")?, p("feedback")?, self.quantum, sr));
            }
            EffectKind::Reverb => {
                let mut reverb = ConvolutionReverb::new();
                reverb.set_impulse_response(self.impulse_response.as_ref())?;
                self.reverb = Some(reverb);
            }
            EffectKind::Panner => {
                self.panner = Some(StereoPanner::new(p("pan")?));
            }
            EffectKind::Compressor => {
                self.compressor = Some(CompressorStage::new(
                    p("threshold")?,
                    p("knee")?,
                    p("ratio")?,
                    p("attack")?,
                    p("release")?,
                    sr,
                ));
            }
        }
        Ok(())
    }

    /// Write a live parameter into an existing node. Returns `false` when
    /// the node has not been created yet; it will pick the value up from the
    /// store when it is.
    pub fn apply_parameter(&mut self, kind: EffectKind, key: &str, value: f32) -> Result<bool> {
        let result = match (kind, key) {
            (EffectKind::Equalizer, _) => match self.equalizer.as_mut() {
                None => return Ok(false),
                Some(eq) => {
                    let (band, name) = match key {
                        "low_gain" => (&mut eq.low, "gain"),
                        "mid_gain" => (&mut eq.mid, "gain"),
                        "high_gain" => (&mut eq.high, "gain"),
                        "low_freq" => (&mut eq.low, "frequency"),
                        "mid_freq" => (&mut eq.mid, "frequency"),
                        "high_freq" => (&mut eq.high, "frequency"),
                        _ => return Err(anyhow!("{kind} has no live parameter '{key}'")),
                    };
                    band.set_parameter(name, value)
                }
            },
            (EffectKind::Shaper, "amount") => match self.shaper.as_mut() {
                None => return Ok(false),
                Some(shaper) => shaper.set_parameter("amount", value),
            },
            (EffectKind::Chorus, "rate" | "depth" | "delay") => match self.chorus.as_mut() {
                None => return Ok(false),
                Some(chorus) => chorus.set_parameter(key, value),
            },
            (EffectKind::Delay, "time" | "feedback") => match self.delay.as_mut() {
                None => return Ok(false),
                Some(delay) => delay.set_parameter(key, value),
            },
            (EffectKind::Panner, "pan") => match self.panner.as_mut() {
                None => return Ok(false),
                Some(panner) => panner.set_parameter("pan", value),
            },
            (EffectKind::Compressor, "threshold" | "knee" | "ratio" | "attack" | "release") => {
                match self.compressor.as_mut() {
                    None => return Ok(false),
                    Some(comp) => comp.set_parameter(key, value),
                }
            }
            _ => return Err(anyhow!("{kind} has no live parameter '{key}'")),
        };
        result.map_err(|e| anyhow!("{kind} {key}: {e}"))?;
        Ok(true)
    }

    pub const fn master(&self) -> &LevelStage {
        &self.master
    }

    pub fn set_master_level(&mut self, level: f32) -> Result<()> {
        self.master
            .set_parameter("gain", level)
            .map_err(|e| anyhow!("master level: {e}"))
    }

    pub fn master_mut(&mut self) -> &mut LevelStage {
        &mut self.master
    }

    /// Store a response for the reverb and install it if the node exists.
    /// On failure nothing changes.
    pub fn set_impulse_response(&mut self, ir: Option<ImpulseResponse>) -> Result<()> {
        if let Some(reverb) = self.reverb.as_mut() {
            reverb.set_impulse_response(ir.as_ref())?;
        }
        self.impulse_response = ir.filter(|ir| !ir.is_empty());
        Ok(())
    }

    /// Drop the ringing state of the reverb and the delay line so a new
    /// stream does not start inside the previous one's tail.
    pub fn reset_tails(&mut self) {
        if let Some(reverb) = self.reverb.as_mut() {
            reverb.reset();
        }
        if let Some(delay) = self.delay.as_mut() {
            delay.line.clear();
        }
    }

    pub fn has_impulse_response(&self) -> bool {
        self.impulse_response.is_some()
    }

    /// Start the chorus LFO. Only the first call in a session has an effect.
    pub fn start_chorus(&mut self) -> bool {
        self.chorus.as_mut().is_some_and(Chorus::start)
    }

    pub fn equalizer(&self) -> Option<&Equalizer> {
        self.equalizer.as_ref()
    }

    pub fn shaper(&self) -> Option<&WaveShaper> {
        self.shaper.as_ref()
    }

    pub fn chorus(&self) -> Option<&Chorus> {
        self.chorus.as_ref()
    }

    pub fn delay(&self) -> Option<&FeedbackDelay> {
        self.delay.as_ref()
    }

    pub fn reverb(&self) -> Option<&ConvolutionReverb> {
        self.reverb.as_ref()
    }

    pub fn panner(&self) -> Option<&StereoPanner> {
        self.panner.as_ref()
    }

    pub fn compressor(&self) -> Option<&CompressorStage> {
        self.compressor.as_ref()
    }

    /// Run one node over a block. Missing nodes output silence.
    ///
    /// The delay line itself is driven through [`Self::delay_read`] and
    /// [`Self::delay_write`] instead.
    pub fn process(&mut self, node: EffectNode, left: &mut [f32], right: &mut [f32]) {
        let stage: Option<&mut dyn Stage> = match node {
            EffectNode::EqLowShelf => {
                self.equalizer.as_mut().map(|eq| &mut eq.low as &mut dyn Stage)
            }
            EffectNode::EqPeaking => {
                self.equalizer.as_mut().map(|eq| &mut eq.mid as &mut dyn Stage)
            }
            EffectNode::EqHighShelf => {
                self.equalizer.as_mut().map(|eq| &mut eq.high as &mut dyn Stage)
            }
            EffectNode::Shaper => self.shaper.as_mut().map(|s| s as &mut dyn Stage),
            EffectNode::Chorus => self.chorus.as_mut().map(|s| s as &mut dyn Stage),
            EffectNode::Delay => self.delay.as_mut().map(|d| &mut d.line as &mut dyn Stage),
            EffectNode::DelayFeedback => {
                self.delay.as_mut().map(|d| &mut d.feedback as &mut dyn Stage)
            }
            EffectNode::Reverb => self.reverb.as_mut().map(|s| s as &mut dyn Stage),
            EffectNode::Panner => self.panner.as_mut().map(|s| s as &mut dyn Stage),
            EffectNode::Compressor => self.compressor.as_mut().map(|s| s as &mut dyn Stage),
        };

        match stage {
            Some(stage) => stage.process_block(left, right),
            None => {
                left.fill(0.0);
                right.fill(0.0);
            }
        }
    }

    pub fn delay_read(&mut self, left: &mut [f32], right: &mut [f32]) {
        match self.delay.as_mut() {
            Some(delay) => delay.line.read_block(left, right),
            None => {
                left.fill(0.0);
                right.fill(0.0);
            }
        }
    }

    pub fn delay_write(&mut self, left: &[f32], right: &[f32]) {
        if let Some(delay) = self.delay.as_mut() {
            delay.line.write_block(left, right);
        }
    }
}
