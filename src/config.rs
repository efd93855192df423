//! SPC engine configuration.

use crate::error::{Result, SpcError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default subgroup size.
pub const DEFAULT_SAMPLE_SIZE: usize = 5;

/// Default monitoring interval (5 minutes).
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 300_000;

/// Master configuration for an SPC session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpcConfig {
    /// Subgroup size `n`. Values outside 2..=10 still partition the data
    /// but take the n = 5 row of the constants table.
    pub sample_size: usize,

    /// Interval between timer-driven recalculations (ms).
    pub update_interval_ms: u64,

    /// Per-rule enable flags.
    pub control_rules: ControlRules,
}

impl Default for SpcConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            control_rules: ControlRules::default(),
        }
    }
}

impl SpcConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set subgroup size.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Builder: set update interval.
    pub fn with_update_interval_ms(mut self, interval_ms: u64) -> Self {
        self.update_interval_ms = interval_ms;
        self
    }

    /// Builder: replace rule flags.
    pub fn with_control_rules(mut self, rules: ControlRules) -> Self {
        self.control_rules = rules;
        self
    }

    /// Number of primary measurements below which the loader falls back
    /// to production-derived synthesis.
    pub fn fallback_threshold(&self) -> usize {
        self.sample_size * 4
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.sample_size == 0 {
            return Err(SpcError::InvalidConfig(
                "sample_size must be at least 1".to_string(),
            ));
        }
        if self.update_interval_ms == 0 {
            return Err(SpcError::InvalidConfig(
                "update_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SpcError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Western Electric rule flags.
///
/// Rules 1 to 3 have built-in detectors. Rules 4 to 8 are accepted here so
/// that detectors registered through [`crate::rules::RuleEngine::with_rule`]
/// can be switched on and off the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlRules {
    /// Point beyond the control limits.
    pub rule1: bool,
    /// 9 consecutive points on the same side of the center line.
    pub rule2: bool,
    /// 6 consecutive points steadily increasing or decreasing.
    pub rule3: bool,
    /// 14 consecutive points alternating up and down.
    pub rule4: bool,
    /// 2 of 3 consecutive points in zone A or beyond.
    pub rule5: bool,
    /// 4 of 5 consecutive points in zone B or beyond.
    pub rule6: bool,
    /// 15 consecutive points in zone C.
    pub rule7: bool,
    /// 8 consecutive points outside zone C.
    pub rule8: bool,
}

impl Default for ControlRules {
    fn default() -> Self {
        Self::all()
    }
}

impl ControlRules {
    /// Every rule enabled.
    pub fn all() -> Self {
        Self {
            rule1: true,
            rule2: true,
            rule3: true,
            rule4: true,
            rule5: true,
            rule6: true,
            rule7: true,
            rule8: true,
        }
    }

    /// Every rule disabled.
    pub fn none() -> Self {
        Self {
            rule1: false,
            rule2: false,
            rule3: false,
            rule4: false,
            rule5: false,
            rule6: false,
            rule7: false,
            rule8: false,
        }
    }

    /// Whether rule `number` (1..=8) is enabled. Unknown numbers are off.
    pub fn is_enabled(&self, number: u8) -> bool {
        match number {
            1 => self.rule1,
            2 => self.rule2,
            3 => self.rule3,
            4 => self.rule4,
            5 => self.rule5,
            6 => self.rule6,
            7 => self.rule7,
            8 => self.rule8,
            _ => false,
        }
    }

    /// Set rule `number` (1..=8). Unknown numbers are ignored.
    pub fn set(&mut self, number: u8, enabled: bool) {
        match number {
            1 => self.rule1 = enabled,
            2 => self.rule2 = enabled,
            3 => self.rule3 = enabled,
            4 => self.rule4 = enabled,
            5 => self.rule5 = enabled,
            6 => self.rule6 = enabled,
            7 => self.rule7 = enabled,
            8 => self.rule8 = enabled,
            _ => {}
        }
    }
}
