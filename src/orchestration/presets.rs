//! Named gate presets and their env-style override form.

use crate::engine::{GateConfig, GateMode};
use thiserror::Error;

pub const PRESET_NAMES: [&str; 3] = ["conservative", "balanced", "aggressive"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PresetError {
    #[error("unknown preset '{0}' (expected one of conservative, balanced, aggressive)")]
    Unknown(String),
}

/// Look up a preset by name, ignoring case and surrounding whitespace.
pub fn preset(name: &str) -> Result<GateConfig, PresetError> {
    let gate = |mode, threshold, block_bear_buys| GateConfig {
        mode,
        max_drawdown_threshold: threshold,
        block_bear_buys,
        health_check_enabled: true,
        min_confidence: None,
    };

    match name.trim().to_ascii_lowercase().as_str() {
        "conservative" => Ok(gate(GateMode::Strict, -0.05, true)),
        "balanced" => Ok(gate(GateMode::Strict, -0.10, true)),
        "aggressive" => Ok(gate(GateMode::Permissive, -0.15, false)),
        _ => Err(PresetError::Unknown(name.to_string())),
    }
}

/// Every preset, in canonical order.
pub fn all_presets() -> Vec<(String, GateConfig)> {
    PRESET_NAMES
        .iter()
        .filter_map(|name| preset(name).ok().map(|g| (name.to_string(), g)))
        .collect()
}

/// Env-style keys that reproduce `gate` when applied to a config scope.
/// `None` clears a key.
pub fn gate_overrides(gate: &GateConfig) -> Vec<(String, Option<String>)> {
    vec![
        ("CAPITAL_SHIELD_MODE".to_string(), Some(gate.mode.to_string())),
        (
            "MAX_DRAWDOWN_THRESHOLD".to_string(),
            Some(gate.max_drawdown_threshold.to_string()),
        ),
        (
            "BLOCK_BEAR_BUYS".to_string(),
            Some(gate.block_bear_buys.to_string()),
        ),
        (
            "HEALTH_CHECK_ENABLED".to_string(),
            Some(gate.health_check_enabled.to_string()),
        ),
        (
            "MIN_SIGNAL_CONFIDENCE".to_string(),
            gate.min_confidence.map(|c| c.to_string()),
        ),
    ]
}

/// The configuration whose drawdown threshold is closest to zero.
/// Ties prefer STRICT mode, then the lexically smaller name.
pub fn most_conservative<'a>(configs: &'a [(String, GateConfig)]) -> Option<&'a str> {
    configs
        .iter()
        .max_by(|(name_a, a), (name_b, b)| {
            a.max_drawdown_threshold
                .total_cmp(&b.max_drawdown_threshold)
                .then_with(|| {
                    (a.mode == GateMode::Strict).cmp(&(b.mode == GateMode::Strict))
                })
                .then_with(|| name_b.cmp(name_a))
        })
        .map(|(name, _)| name.as_str())
}
