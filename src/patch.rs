use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::chain::ChainSpec;
use crate::params::ParameterStore;

/// A saved effect setup: block order and state plus every parameter value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub chain: ChainSpec,
    #[serde(default)]
    pub parameters: ParameterStore,
}

impl Patch {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read patch {}", path.display()))?;
        let patch: Self = serde_json::from_str(&contents).context("Failed to parse patch")?;
        debug!(
            "Loaded patch {:?} with {} enabled blocks",
            patch.name.as_deref().unwrap_or("unnamed"),
            patch.chain.enabled_blocks().count()
        );
        Ok(patch)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize patch")?;
        fs::write(path, json).context("Failed to write patch")?;
        Ok(())
    }
}
