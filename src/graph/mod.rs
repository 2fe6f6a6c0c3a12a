//! The routing graph: node identities, the registry that owns effect nodes,
//! the builder that wires a chain, and the compiled topology that renders it.

pub mod buffer;
pub mod builder;
pub mod registry;
pub mod topology;

pub use buffer::StereoBuffer;
pub use builder::{DelayWetTap, GraphBuilder};
pub use registry::{EffectHandle, EffectNodeRegistry};
pub use topology::{Mixer, MixerRole, Topology};

use std::fmt;

use crate::chain::EffectKind;

/// A processing node owned by the registry. The equalizer contributes three
/// nodes and the feedback delay two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectNode {
    EqLowShelf,
    EqPeaking,
    EqHighShelf,
    Shaper,
    Chorus,
    Delay,
    DelayFeedback,
    Reverb,
    Panner,
    Compressor,
}

impl EffectNode {
    pub const fn kind(self) -> EffectKind {
        match self {
            EffectNode::EqLowShelf | EffectNode::EqPeaking | EffectNode::EqHighShelf => {
                EffectKind::Equalizer
            }
            EffectNode::Shaper => EffectKind::Shaper,
            EffectNode::Chorus => EffectKind::Chorus,
            EffectNode::Delay | EffectNode::DelayFeedback => EffectKind::Delay,
            EffectNode::Reverb => EffectKind::Reverb,
            EffectNode::Panner => EffectKind::Panner,
            EffectNode::Compressor => EffectKind::Compressor,
        }
    }
}

/// Any vertex of the routing graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Source,
    Master,
    Effect(EffectNode),
    /// Dry, wet or sum stage of a parallel block, owned by the topology.
    Mixer(usize),
    Tap,
    Sink,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRef::Source => write!(f, "source"),
            NodeRef::Master => write!(f, "master"),
            NodeRef::Effect(node) => write!(f, "{node:?}"),
            NodeRef::Mixer(idx) => write!(f, "mixer#{idx}"),
            NodeRef::Tap => write!(f, "tap"),
            NodeRef::Sink => write!(f, "sink"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub from: NodeRef,
    pub to: NodeRef,
}
