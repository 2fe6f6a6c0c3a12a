use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::chain::EffectKind;

/// How a parameter change reaches the running graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamClass {
    /// Written straight into the existing node.
    Live,
    /// Needs a topology rebuild.
    Structural,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub key: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub class: ParamClass,
}

const fn live(key: &'static str, min: f32, max: f32, default: f32) -> ParamSpec {
    ParamSpec {
        key,
        min,
        max,
        default,
        class: ParamClass::Live,
    }
}

const fn wet(default: f32) -> ParamSpec {
    ParamSpec {
        key: "wet",
        min: 0.0,
        max: 1.0,
        default,
        class: ParamClass::Structural,
    }
}

const EQUALIZER: &[ParamSpec] = &[
    live("low_gain", -24.0, 24.0, 0.0),
    live("mid_gain", -24.0, 24.0, 0.0),
    live("high_gain", -24.0, 24.0, 0.0),
    live("low_freq", 10.0, 20_000.0, 120.0),
    live("mid_freq", 10.0, 20_000.0, 1000.0),
    live("high_freq", 10.0, 20_000.0, 6500.0),
];
const SHAPER: &[ParamSpec] = &[live("amount", 0.0, 100.0, 20.0), wet(0.5)];
const CHORUS: &[ParamSpec] = &[
    live("rate", 0.05, 10.0, 1.5),
    live("depth", 0.0, 0.02, 0.002),
    live("delay", 0.0, 0.05, 0.02),
    wet(0.5),
];
const DELAY: &[ParamSpec] = &[
    live("time", 0.0, 2.0, 0.3),
    live("feedback", 0.0, 0.95, 0.35),
    wet(0.4),
];
const REVERB: &[ParamSpec] = &[wet(0.35)];
const PANNER: &[ParamSpec] = &[live("pan", -1.0, 1.0, 0.0)];
const COMPRESSOR: &[ParamSpec] = &[
    live("threshold", -100.0, 0.0, -24.0),
    live("knee", 0.0, 40.0, 30.0),
    live("ratio", 1.0, 20.0, 12.0),
    live("attack", 0.0, 1.0, 0.003),
    live("release", 0.0, 1.0, 0.25),
    wet(1.0),
];

pub const MASTER_LEVEL: ParamSpec = live("master_level", 0.0, 2.0, 1.0);

/// Parameter table for `kind`, in a fixed order.
pub const fn param_specs(kind: EffectKind) -> &'static [ParamSpec] {
    match kind {
        EffectKind::Equalizer => EQUALIZER,
        EffectKind::Shaper => SHAPER,
        EffectKind::Chorus => CHORUS,
        EffectKind::Delay => DELAY,
        EffectKind::Reverb => REVERB,
        EffectKind::Panner => PANNER,
        EffectKind::Compressor => COMPRESSOR,
    }
}

pub fn param_spec(kind: EffectKind, key: &str) -> Option<&'static ParamSpec> {
    param_specs(kind).iter().find(|s| s.key == key)
}

/// Outcome of a store write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamUpdate {
    /// Value after clamping.
    pub value: f32,
    pub class: ParamClass,
    pub changed: bool,
}

/// Current parameter values per effect kind plus the master level.
///
/// Values are clamped to their range on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredParameters", into = "StoredParameters")]
pub struct ParameterStore {
    values: BTreeMap<EffectKind, Vec<f32>>,
    master_level: f32,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self {
            values: EffectKind::ALL
                .into_iter()
                .map(|kind| (kind, param_specs(kind).iter().map(|s| s.default).collect()))
                .collect(),
            master_level: MASTER_LEVEL.default,
        }
    }
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn index(kind: EffectKind, key: &str) -> Result<usize> {
        param_specs(kind)
            .iter()
            .position(|s| s.key == key)
            .ok_or_else(|| anyhow!("{kind} has no parameter '{key}'"))
    }

    pub fn get(&self, kind: EffectKind, key: &str) -> Option<f32> {
        let idx = Self::index(kind, key).ok()?;
        self.values.get(&kind).and_then(|v| v.get(idx)).copied()
    }

    /// All `(key, value)` pairs of `kind`.
    pub fn values(&self, kind: EffectKind) -> impl Iterator<Item = (&'static str, f32)> + '_ {
        param_specs(kind)
            .iter()
            .zip(self.values.get(&kind).into_iter().flatten())
            .map(|(spec, &value)| (spec.key, value))
    }

    /// Wet level of a block that can run in parallel.
    pub fn wet(&self, kind: EffectKind) -> Option<f32> {
        self.get(kind, "wet")
    }

    /// Clamp and store. Unknown keys and non-finite values are errors.
    pub fn set(&mut self, kind: EffectKind, key: &str, value: f32) -> Result<ParamUpdate> {
        let idx = Self::index(kind, key)?;
        if !value.is_finite() {
            return Err(anyhow!("{kind} {key}: value {value} is not finite"));
        }
        let spec = &param_specs(kind)[idx];
        let value = value.clamp(spec.min, spec.max);

        let slots = self
            .values
            .entry(kind)
            .or_insert_with(|| param_specs(kind).iter().map(|s| s.default).collect());
        let changed = slots[idx] != value;
        slots[idx] = value;

        Ok(ParamUpdate {
            value,
            class: spec.class,
            changed,
        })
    }

    pub const fn master_level(&self) -> f32 {
        self.master_level
    }

    /// Returns the clamped level.
    pub fn set_master_level(&mut self, level: f32) -> f32 {
        if level.is_finite() {
            self.master_level = level.clamp(MASTER_LEVEL.min, MASTER_LEVEL.max);
        }
        self.master_level
    }
}

/// On-disk form: `{"master_level": 1.0, "effects": {"delay": {"time": 0.5}}}`.
/// Missing values take their defaults.
#[derive(Serialize, Deserialize)]
struct StoredParameters {
    #[serde(default = "default_master_level")]
    master_level: f32,
    #[serde(default)]
    effects: BTreeMap<EffectKind, BTreeMap<String, f32>>,
}

fn default_master_level() -> f32 {
    MASTER_LEVEL.default
}

impl TryFrom<StoredParameters> for ParameterStore {
    type Error = anyhow::Error;

    fn try_from(stored: StoredParameters) -> Result<Self> {
        let mut store = ParameterStore::default();
        store.set_master_level(stored.master_level);
        for (kind, values) in stored.effects {
            for (key, value) in values {
                store.set(kind, &key, value)?;
            }
        }
        Ok(store)
    }
}

impl From<ParameterStore> for StoredParameters {
    fn from(store: ParameterStore) -> Self {
        let effects = EffectKind::ALL
            .into_iter()
            .map(|kind| {
                let values = store.values(kind).map(|(k, v)| (k.to_string(), v)).collect();
                (kind, values)
            })
            .collect();
        Self {
            master_level: store.master_level,
            effects,
        }
    }
}
