use anyhow::{Result, anyhow, bail};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an effect block. There is exactly one block, and at most one
/// processing node, per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Equalizer,
    Shaper,
    Chorus,
    Delay,
    Reverb,
    Panner,
    Compressor,
}

impl EffectKind {
    /// Every kind, in the default processing order.
    pub const ALL: [EffectKind; 7] = [
        EffectKind::Equalizer,
        EffectKind::Shaper,
        EffectKind::Chorus,
        EffectKind::Delay,
        EffectKind::Reverb,
        EffectKind::Panner,
        EffectKind::Compressor,
    ];

    pub const fn title(self) -> &'static str {
        match self {
            EffectKind::Equalizer => "Equalizer",
            EffectKind::Shaper => "Distortion",
            EffectKind::Chorus => "Chorus",
            EffectKind::Delay => "Delay",
            EffectKind::Reverb => "Reverb",
            EffectKind::Panner => "Stereo Pan",
            EffectKind::Compressor => "Compressor",
        }
    }

    /// Whether the block can be mixed in parallel with the dry signal.
    pub const fn supports_parallel(self) -> bool {
        !matches!(self, EffectKind::Equalizer | EffectKind::Panner)
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    #[default]
    Serial,
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectBlock {
    pub id: EffectKind,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub mode: RoutingMode,
}

impl EffectBlock {
    pub const fn new(id: EffectKind) -> Self {
        Self {
            id,
            enabled: false,
            mode: RoutingMode::Serial,
        }
    }

    pub const fn title(&self) -> &'static str {
        self.id.title()
    }
}

/// Coerce `mode` to one `kind` can realize.
fn coerce_mode(kind: EffectKind, mode: RoutingMode) -> RoutingMode {
    if mode == RoutingMode::Parallel && !kind.supports_parallel() {
        warn!("{kind} cannot run in parallel, using serial");
        RoutingMode::Serial
    } else {
        mode
    }
}

/// Ordered list of effect blocks, one per kind. The order is the processing
/// order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<EffectBlock>", into = "Vec<EffectBlock>")]
pub struct ChainSpec {
    blocks: Vec<EffectBlock>,
}

impl Default for ChainSpec {
    fn default() -> Self {
        Self {
            blocks: EffectKind::ALL.into_iter().map(EffectBlock::new).collect(),
        }
    }
}

impl ChainSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[EffectBlock] {
        &self.blocks
    }

    pub fn block(&self, kind: EffectKind) -> Option<&EffectBlock> {
        self.blocks.iter().find(|b| b.id == kind)
    }

    pub fn position(&self, kind: EffectKind) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == kind)
    }

    fn block_mut(&mut self, kind: EffectKind) -> &mut EffectBlock {
        let idx = self.position(kind).unwrap_or_else(|| {
            self.blocks.push(EffectBlock::new(kind));
            self.blocks.len() - 1
        });
        &mut self.blocks[idx]
    }

    pub fn enabled_blocks(&self) -> impl Iterator<Item = &EffectBlock> {
        self.blocks.iter().filter(|b| b.enabled)
    }

    /// Returns whether anything changed.
    pub fn set_enabled(&mut self, kind: EffectKind, enabled: bool) -> bool {
        let block = self.block_mut(kind);
        let changed = block.enabled != enabled;
        block.enabled = enabled;
        changed
    }

    /// Set the routing mode, coercing Parallel to Serial on kinds that do
    /// not support it. Returns the mode actually applied.
    pub fn set_mode(&mut self, kind: EffectKind, mode: RoutingMode) -> RoutingMode {
        let mode = coerce_mode(kind, mode);
        self.block_mut(kind).mode = mode;
        mode
    }

    /// Move the block at `from` so it ends up at index `to`.
    pub fn move_block(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.blocks.len();
        if from >= len || to >= len {
            bail!("block index out of range: {from} -> {to} (chain has {len} blocks)");
        }
        let block = self.blocks.remove(from);
        self.blocks.insert(to, block);
        debug!("Moved {} from {} to {}", block.id, from, to);
        Ok(())
    }

    /// Reorder to follow `order`. Kinds not listed keep their relative order
    /// after the listed ones.
    pub fn reorder(&mut self, order: &[EffectKind]) -> Result<()> {
        for (i, kind) in order.iter().enumerate() {
            if order[..i].contains(kind) {
                bail!("{kind} listed twice in chain order");
            }
        }
        let mut reordered: Vec<EffectBlock> = order.iter().map(|&k| *self.block_mut(k)).collect();
        reordered.extend(self.blocks.iter().filter(|b| !order.contains(&b.id)).copied());
        self.blocks = reordered;
        Ok(())
    }
}

impl TryFrom<Vec<EffectBlock>> for ChainSpec {
    type Error = anyhow::Error;

    fn try_from(blocks: Vec<EffectBlock>) -> Result<Self> {
        let mut spec = ChainSpec { blocks: Vec::new() };
        for mut block in blocks {
            if spec.position(block.id).is_some() {
                return Err(anyhow!("duplicate effect block '{}'", block.id));
            }
            block.mode = coerce_mode(block.id, block.mode);
            spec.blocks.push(block);
        }
        for kind in EffectKind::ALL {
            if spec.position(kind).is_none() {
                spec.blocks.push(EffectBlock::new(kind));
            }
        }
        Ok(spec)
    }
}

impl From<ChainSpec> for Vec<EffectBlock> {
    fn from(spec: ChainSpec) -> Self {
        spec.blocks
    }
}
