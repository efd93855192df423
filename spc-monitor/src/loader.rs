// SPC Monitor - Monitoring loop and data sources for the SPC engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Measurement loader with production fallback.

use crate::config::MonitorConfig;
use crate::source::{MeasurementSource, ProductionSource};
use chrono::Utc;
use spc::{production, MeasurementBatch, TimeWindow};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a loaded batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOrigin {
    /// Quality measurements as stored.
    Quality,
    /// Synthesized from production quantities.
    Production,
}

impl BatchOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOrigin::Quality => "quality",
            BatchOrigin::Production => "production",
        }
    }
}

/// Result of one load.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedBatch {
    pub batch: MeasurementBatch,
    pub origin: BatchOrigin,
}

/// Loads time-windowed measurement batches.
///
/// Source failures never escape: they are logged and read as empty.
#[derive(Clone)]
pub struct MeasurementLoader {
    quality: Arc<dyn MeasurementSource>,
    production: Option<Arc<dyn ProductionSource>>,
    query_limit: usize,
    fallback_threshold: usize,
}

impl MeasurementLoader {
    /// Loader over a quality source, with limits taken from `config`.
    pub fn new(quality: Arc<dyn MeasurementSource>, config: &MonitorConfig) -> Self {
        Self {
            quality,
            production: None,
            query_limit: config.query_limit,
            fallback_threshold: config.spc.fallback_threshold(),
        }
    }

    /// Builder: production source used when quality data is thin.
    pub fn with_production(mut self, production: Arc<dyn ProductionSource>) -> Self {
        self.production = Some(production);
        self
    }

    /// Record count below which synthesis is attempted.
    pub fn fallback_threshold(&self) -> usize {
        self.fallback_threshold
    }

    /// Load the batch for `window`.
    pub async fn load(&self, window: TimeWindow) -> LoadedBatch {
        let measurements = match self
            .quality
            .fetch_measurements(window, self.query_limit)
            .await
        {
            Ok(measurements) => measurements,
            Err(e) => {
                warn!("Quality source '{}' failed: {}", self.quality.name(), e);
                Vec::new()
            }
        };

        let mut primary = MeasurementBatch::from_measurements(measurements);
        primary.sort_by_timestamp();
        debug!("Loaded {} quality measurements", primary.len());

        if primary.len() >= self.fallback_threshold {
            return LoadedBatch {
                batch: primary,
                origin: BatchOrigin::Quality,
            };
        }

        warn!(
            "Only {} quality measurements (need {}), trying production fallback",
            primary.len(),
            self.fallback_threshold
        );

        if let Some(mut synthesized) = self.synthesize(window).await {
            synthesized.sort_by_timestamp();
            info!("Using {} measurements synthesized from production", synthesized.len());
            return LoadedBatch {
                batch: synthesized,
                origin: BatchOrigin::Production,
            };
        }

        LoadedBatch {
            batch: primary,
            origin: BatchOrigin::Quality,
        }
    }

    /// The newest `limit` quality measurements in `window`, oldest first.
    /// No fallback applies.
    pub async fn load_recent(&self, window: TimeWindow, limit: usize) -> MeasurementBatch {
        let measurements = match self.quality.fetch_recent(window, limit).await {
            Ok(measurements) => measurements,
            Err(e) => {
                warn!("Quality source '{}' failed: {}", self.quality.name(), e);
                Vec::new()
            }
        };
        let mut batch = MeasurementBatch::from_measurements(measurements);
        batch.sort_by_timestamp();
        batch
    }

    /// Synthesized batch, or `None` if nothing usable came back.
    async fn synthesize(&self, window: TimeWindow) -> Option<MeasurementBatch> {
        let source = self.production.as_ref()?;
        let records = match source.fetch_production(window).await {
            Ok(records) => records,
            Err(e) => {
                warn!("Production source '{}' failed: {}", source.name(), e);
                return None;
            }
        };

        let synthesis = production::synthesize(&records, Utc::now());
        if synthesis.skipped > 0 {
            debug!("Skipped {} malformed production records", synthesis.skipped);
        }
        if synthesis.batch.is_empty() {
            warn!("Production data yielded no usable measurements");
            return None;
        }
        Some(synthesis.batch)
    }
}
