//! Measurement records and batches.
//!
//! A [`MeasurementBatch`] is the unit every stage of the pipeline works
//! on. It carries the one specification envelope that applies to the whole
//! batch, so capability never has to guess which record holds it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Specification envelope of a measured characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Specification {
    /// Nominal value.
    pub target: f64,
    /// Upper specification limit (USL).
    #[serde(alias = "upperLimit")]
    pub upper_limit: f64,
    /// Lower specification limit (LSL).
    #[serde(alias = "lowerLimit")]
    pub lower_limit: f64,
}

impl Specification {
    pub fn new(target: f64, lower_limit: f64, upper_limit: f64) -> Self {
        Self {
            target,
            upper_limit,
            lower_limit,
        }
    }

    /// Symmetric envelope `target ± tolerance`.
    pub fn symmetric(target: f64, tolerance: f64) -> Self {
        Self::new(target, target - tolerance, target + tolerance)
    }

    /// Distance between the limits.
    pub fn width(&self) -> f64 {
        self.upper_limit - self.lower_limit
    }

    /// Whether `value` lies inside `[LSL, USL]`.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower_limit && value <= self.upper_limit
    }
}

/// One inspection or production-quantity reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: String,
    pub value: f64,
    pub machine: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<Specification>,
}

impl Measurement {
    pub fn new(
        id: impl Into<String>,
        value: f64,
        machine: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            value,
            machine: machine.into(),
            timestamp,
            specification: None,
        }
    }

    /// Builder: attach a specification envelope.
    pub fn with_specification(mut self, specification: Specification) -> Self {
        self.specification = Some(specification);
        self
    }
}

/// Ordered set of measurements plus the specification shared by all of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementBatch {
    pub measurements: Vec<Measurement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<Specification>,
}

impl MeasurementBatch {
    /// Empty batch.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a batch from raw measurements. The canonical specification
    /// is taken from the first measurement.
    pub fn from_measurements(measurements: Vec<Measurement>) -> Self {
        let specification = measurements.first().and_then(|m| m.specification);
        Self {
            measurements,
            specification,
        }
    }

    /// Build a batch with an explicit specification.
    pub fn with_specification(
        measurements: Vec<Measurement>,
        specification: Option<Specification>,
    ) -> Self {
        Self {
            measurements,
            specification,
        }
    }

    /// Stable sort by timestamp. Subgrouping is positional, so every
    /// batch is put in chronological order before it is used.
    pub fn sort_by_timestamp(&mut self) {
        self.measurements.sort_by_key(|m| m.timestamp);
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    /// Measured values in order.
    pub fn values(&self) -> Vec<f64> {
        self.measurements.iter().map(|m| m.value).collect()
    }
}

/// Closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window ending now and reaching `days` back.
    pub fn last_days(days: i64) -> Self {
        Self::ending_at(Utc::now(), Duration::days(days))
    }

    /// Window ending now and reaching `hours` back.
    pub fn last_hours(hours: i64) -> Self {
        Self::ending_at(Utc::now(), Duration::hours(hours))
    }

    /// Window of `length` ending at `end`.
    pub fn ending_at(end: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start: end - length,
            end,
        }
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }
}
