use anyhow::Result;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::chain::{ChainSpec, EffectKind, RoutingMode};
use crate::graph::registry::EffectNodeRegistry;
use crate::graph::topology::{MixerRole, Topology};
use crate::graph::{EffectNode, NodeRef};
use crate::params::ParameterStore;

/// Which node feeds the wet gain of a parallel delay block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayWetTap {
    /// Raw delay-line output; it already carries every repeat.
    #[default]
    DelayLine,
    /// Output of the feedback gain, i.e. the repeats scaled once more.
    FeedbackGain,
}

/// Compiles a [`ChainSpec`] into a fresh [`Topology`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphBuilder {
    wet_tap: DelayWetTap,
}

impl GraphBuilder {
    pub const fn new(wet_tap: DelayWetTap) -> Self {
        Self { wet_tap }
    }

    pub const fn wet_tap(&self) -> DelayWetTap {
        self.wet_tap
    }

    /// Wire source -> master -> enabled blocks -> tap -> sink.
    ///
    /// Nodes come from `registry` and are created on first use. Disabled
    /// blocks, a reverb without an impulse response and nodes that fail to
    /// create are left out. The result is compiled and ready to render.
    pub fn build(
        &self,
        chain: &ChainSpec,
        params: &ParameterStore,
        registry: &mut EffectNodeRegistry,
        quantum: usize,
    ) -> Result<Topology> {
        let mut topo = Topology::new();
        topo.connect(NodeRef::Source, NodeRef::Master);
        let mut head = NodeRef::Master;

        for block in chain.enabled_blocks() {
            let kind = block.id;
            if kind == EffectKind::Reverb && !registry.has_impulse_response() {
                debug!("Reverb enabled without an impulse response, skipping");
                continue;
            }

            let handle = match registry.get_or_create(kind, params) {
                Ok(handle) => handle,
                Err(e) => {
                    warn!("Skipping {kind}: {e:#}");
                    continue;
                }
            };

            if kind == EffectKind::Equalizer {
                topo.connect(
                    NodeRef::Effect(EffectNode::EqLowShelf),
                    NodeRef::Effect(EffectNode::EqPeaking),
                );
                topo.connect(
                    NodeRef::Effect(EffectNode::EqPeaking),
                    NodeRef::Effect(EffectNode::EqHighShelf),
                );
            }
            if kind == EffectKind::Chorus && registry.start_chorus() {
                debug!("Chorus LFO started");
            }

            let entry = NodeRef::Effect(handle.entry);
            let exit = NodeRef::Effect(handle.exit);

            match block.mode {
                RoutingMode::Parallel if kind.supports_parallel() => {
                    let wet = params.wet(kind).unwrap_or(1.0);
                    let dry_node = topo.add_mixer(kind, MixerRole::Dry, 1.0);
                    let wet_node = topo.add_mixer(kind, MixerRole::Wet, wet);
                    let sum_node = topo.add_mixer(kind, MixerRole::Sum, 1.0);

                    let wet_source = match (kind, self.wet_tap) {
                        (EffectKind::Delay, DelayWetTap::FeedbackGain) => {
                            NodeRef::Effect(EffectNode::DelayFeedback)
                        }
                        _ => exit,
                    };

                    topo.connect(head, dry_node);
                    topo.connect(head, entry);
                    topo.connect(wet_source, wet_node);
                    topo.connect(dry_node, sum_node);
                    topo.connect(wet_node, sum_node);
                    head = sum_node;
                }
                _ => {
                    topo.connect(head, entry);
                    head = exit;
                }
            }
        }

        // The loop is rewired on every rebuild, even while the block is off
        if registry.contains(EffectKind::Delay) {
            let delay = NodeRef::Effect(EffectNode::Delay);
            let feedback = NodeRef::Effect(EffectNode::DelayFeedback);
            topo.connect(delay, feedback);
            topo.connect(feedback, delay);
        }

        topo.connect(head, NodeRef::Tap);
        topo.connect(NodeRef::Tap, NodeRef::Sink);
        topo.set_tap_point(head);

        topo.compile(registry, quantum)?;
        debug!(
            "Rebuilt graph: {} connections, {} mixers, tap after {}",
            topo.connections().len(),
            topo.mixers().len(),
            head
        );
        Ok(topo)
    }
}
