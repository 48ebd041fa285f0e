use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

/// Engine tunables, usually read from a TOML file:
///
/// ```toml
/// max_call_depth = 256
/// allow_trailing_bytes = true
/// strict_counts = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    /// Nesting limit for `Call` commands.
    pub max_call_depth: usize,
    /// Let `end()` succeed when a load stopped before the end of its input.
    pub allow_trailing_bytes: bool,
    /// Treat count-mismatch warnings as failures. Applied by callers such as
    /// `ChunkedTransform`; the interpreter itself only reports them.
    pub strict_counts: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 512,
            allow_trailing_bytes: false,
            strict_counts: false,
        }
    }
}

impl EngineOptions {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid engine options")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }
}
