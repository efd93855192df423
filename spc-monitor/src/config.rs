// SPC Monitor - Monitoring loop and data sources for the SPC engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Monitor configuration.

use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use spc::SpcConfig;
use std::path::Path;
use std::time::Duration;

/// Configuration of the monitoring loop and its data windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Engine configuration (sample size, interval, rule flags).
    pub spc: SpcConfig,
    /// Days of history loaded on every timer cycle.
    pub history_window_days: i64,
    /// Record cap of a quality-source query.
    pub query_limit: usize,
    /// Hours covered by the rolling feed.
    pub feed_window_hours: i64,
    /// Record cap of a feed query.
    pub feed_limit: usize,
    /// Feed polling interval (ms).
    pub feed_poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            spc: SpcConfig::default(),
            history_window_days: 30,
            query_limit: 1000,
            feed_window_hours: 24,
            feed_limit: 100,
            feed_poll_interval_ms: 30_000,
        }
    }
}

impl MonitorConfig {
    /// Builder: replace the engine configuration.
    pub fn with_spc(mut self, spc: SpcConfig) -> Self {
        self.spc = spc;
        self
    }

    /// Timer period of the monitoring loop.
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.spc.update_interval_ms)
    }

    /// Polling period of the rolling feed.
    pub fn feed_poll_interval(&self) -> Duration {
        Duration::from_millis(self.feed_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.spc.validate()?;
        if self.history_window_days <= 0 {
            return Err(MonitorError::Config(
                "history_window_days must be positive".to_string(),
            ));
        }
        if self.query_limit == 0 || self.feed_limit == 0 {
            return Err(MonitorError::Config(
                "query limits must be positive".to_string(),
            ));
        }
        if self.feed_window_hours <= 0 || self.feed_poll_interval_ms == 0 {
            return Err(MonitorError::Config(
                "feed window and poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
