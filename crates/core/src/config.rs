use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Tunables for the governance engine. Defaults match the observed behavior
/// of the browser extension this engine governs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Quiet period after the last input event before aggregated input is
    /// committed as one audit entry.
    #[serde(default = "default_input_debounce_ms")]
    pub input_debounce_ms: u64,
    /// Delay between a click's pre-action capture and its result capture.
    #[serde(default = "default_click_settle_ms")]
    pub click_settle_ms: u64,
    /// Delay before a result capture, letting the page settle.
    #[serde(default = "default_capture_settle_ms")]
    pub capture_settle_ms: u64,
    /// How long the transient badge stays up.
    #[serde(default = "default_badge_duration_ms")]
    pub badge_duration_ms: u64,
    /// Bounded retries for the best-effort "stop agent" script.
    #[serde(default = "default_stop_retries")]
    pub stop_retries: u32,
    #[serde(default = "default_stop_retry_spacing_ms")]
    pub stop_retry_spacing_ms: u64,
    /// Ring-buffer cap on retained audit entries; oldest dropped first.
    #[serde(default = "default_max_audit_entries")]
    pub max_audit_entries: usize,
}

fn default_input_debounce_ms() -> u64 {
    1000
}

fn default_click_settle_ms() -> u64 {
    300
}

fn default_capture_settle_ms() -> u64 {
    500
}

fn default_badge_duration_ms() -> u64 {
    3000
}

fn default_stop_retries() -> u32 {
    3
}

fn default_stop_retry_spacing_ms() -> u64 {
    200
}

fn default_max_audit_entries() -> usize {
    100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_debounce_ms: default_input_debounce_ms(),
            click_settle_ms: default_click_settle_ms(),
            capture_settle_ms: default_capture_settle_ms(),
            badge_duration_ms: default_badge_duration_ms(),
            stop_retries: default_stop_retries(),
            stop_retry_spacing_ms: default_stop_retry_spacing_ms(),
            max_audit_entries: default_max_audit_entries(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
