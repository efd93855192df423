//! # SPC - Statistical Process Control engine
//!
//! X-bar/R control charts, Western Electric run rules and process
//! capability for manufacturing measurements.
//!
//! ## Key Features
//!
//! - **Subgrouping**: contiguous, positional subgroups of size `n`
//! - **Control limits**: X-bar and R charts with warning limits
//! - **Run rules**: rules 1 to 3 built in, pluggable detectors for 4 to 8
//! - **Capability**: Cp, Cpk, Pp, Ppk, DPMO and sigma level
//! - **Degraded states**: thin data yields explicit flags, never a panic
//!
//! ## Quick Start
//!
//! ```rust
//! use spc::{Measurement, MeasurementBatch, SpcConfig, SpcEngine, Specification};
//! use chrono::{Duration, Utc};
//!
//! let start = Utc::now();
//! let measurements: Vec<Measurement> = (0..50)
//!     .map(|i| {
//!         let value = 10.0 + [-0.2, 0.1, 0.0, -0.1, 0.2][i % 5];
//!         Measurement::new(format!("q-{}", i), value, "H01", start + Duration::minutes(i as i64))
//!     })
//!     .collect();
//! let batch = MeasurementBatch::with_specification(
//!     measurements,
//!     Some(Specification::symmetric(10.0, 1.0)),
//! );
//!
//! let mut engine = SpcEngine::new(SpcConfig::default()).unwrap();
//! let report = engine.run_pipeline(batch);
//!
//! assert_eq!(report.subgroups, 10);
//! assert!(engine.control_limits().is_some());
//! assert!(engine.process_capability().unwrap().cp > 1.0);
//! ```
//!
//! ## Modules
//!
//! - [`measurement`]: Measurements, specifications and batches
//! - [`subgroup`]: Subgroup building and statistics
//! - [`constants`]: Control-chart constants table
//! - [`limits`]: X-bar/R control limits
//! - [`capability`]: Process capability indices
//! - [`rules`]: Run-rule engine
//! - [`production`]: Measurements synthesized from production records
//! - [`engine`]: Session orchestration
//! - [`snapshot`]: Exported session view

// Modules
pub mod alarm;
pub mod capability;
pub mod config;
pub mod constants;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod limits;
pub mod measurement;
pub mod production;
pub mod rules;
pub mod snapshot;
pub mod stats;
pub mod status;
pub mod subgroup;

// Re-exports for convenient access
pub use alarm::{Alarm, AlarmSeverity, AlarmType};
pub use capability::{CapabilityClass, ProcessCapability, CAPABILITY_INDEX_CAP};
pub use config::{ControlRules, SpcConfig};
pub use constants::ControlConstants;
pub use distribution::{Bin, Distribution};
pub use engine::{CycleReport, MonitorState, SpcEngine};
pub use error::{InsufficientData, Result, SourceError, SpcError};
pub use limits::{ChartLimits, ControlLimits};
pub use measurement::{Measurement, MeasurementBatch, Specification, TimeWindow};
pub use production::{synthesize, ProductionRecord, Synthesis};
pub use rules::{ControlRule, RuleEngine, RuleWindow};
pub use snapshot::{SpcSnapshot, SNAPSHOT_VERSION};
pub use status::ProcessStatus;
pub use subgroup::{build_subgroups, subgroup_statistics, SubgroupStatistic};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_empty_session() {
        let mut engine = SpcEngine::default();
        let report = engine.run_pipeline(MeasurementBatch::empty());

        assert_eq!(report.measurements, 0);
        assert_eq!(report.status, ProcessStatus::NoData);
        assert!(report.flags.contains(&"INSUFFICIENT_DATA".to_string()));
        assert!(engine.export_snapshot().distribution.is_none());
    }
}
