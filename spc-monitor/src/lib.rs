// SPC Monitor - Monitoring loop and data sources for the SPC engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # SPC Monitor
//!
//! Async monitoring around the [`spc`] engine: data sources, a loader
//! with production fallback, the monitoring loop, a rolling feed and
//! Prometheus metrics.
//!
//! ```no_run
//! use spc::SpcEngine;
//! use spc_monitor::{MeasurementLoader, MonitorConfig, MonitorHandle, CsvMeasurementSource};
//! use std::sync::Arc;
//!
//! # async fn run() -> spc_monitor::Result<()> {
//! let config = MonitorConfig::default();
//! let source = Arc::new(CsvMeasurementSource::new("quality.csv"));
//! let loader = MeasurementLoader::new(source, &config);
//! let mut handle = MonitorHandle::start(SpcEngine::new(config.spc.clone())?, loader, &config);
//!
//! handle.flush().await?;
//! println!("{}", handle.snapshot().await.status);
//! handle.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod demo;
pub mod error;
pub mod feed;
pub mod loader;
pub mod metrics;
pub mod monitor;
pub mod source;

pub use config::MonitorConfig;
pub use demo::{DemoConfig, DemoSource};
pub use error::{MonitorError, Result};
pub use feed::{Feed, FeedHandle};
pub use loader::{BatchOrigin, LoadedBatch, MeasurementLoader};
pub use monitor::{Monitor, MonitorHandle, MonitorStats, Notifier, SharedEngine, Trigger};
pub use source::{
    CsvMeasurementSource, JsonMeasurementSource, JsonProductionSource, MeasurementSource,
    MemorySource, ProductionSource, UnavailableSource,
};
