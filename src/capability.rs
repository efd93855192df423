//! Process capability indices.
//!
//! Cp/Cpk and Pp/Ppk are both computed from the overall sample standard
//! deviation, so each pair carries the same value. The separate fields
//! keep the export shape stable for consumers that display all four.

use crate::error::InsufficientData;
use crate::limits::ControlLimits;
use crate::measurement::{MeasurementBatch, Specification};
use crate::stats::{self, round_to};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Magnitude reported for an index whose spread is zero.
pub const CAPABILITY_INDEX_CAP: f64 = 999.999;

/// Decimal places of every reported figure.
const DECIMALS: i32 = 3;

/// Qualitative capability label derived from Cpk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapabilityClass {
    Excellent,
    Adequate,
    Marginal,
    Inadequate,
}

impl CapabilityClass {
    pub fn from_cpk(cpk: f64) -> Self {
        if cpk >= 2.0 {
            CapabilityClass::Excellent
        } else if cpk >= 1.33 {
            CapabilityClass::Adequate
        } else if cpk >= 1.0 {
            CapabilityClass::Marginal
        } else {
            CapabilityClass::Inadequate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityClass::Excellent => "Excellent",
            CapabilityClass::Adequate => "Adequate",
            CapabilityClass::Marginal => "Marginal",
            CapabilityClass::Inadequate => "Inadequate",
        }
    }
}

impl fmt::Display for CapabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability of the process against its specification envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessCapability {
    pub cp: f64,
    pub cpk: f64,
    pub pp: f64,
    pub ppk: f64,
    pub process_mean: f64,
    pub process_std_dev: f64,
    /// Percentage of individual values outside `[LSL, USL]`.
    pub defect_rate: f64,
    pub dpmo: f64,
    pub sigma_level: f64,
    pub specification: Specification,
    pub sample_size: usize,
    pub capability: CapabilityClass,
    pub calculated_at: DateTime<Utc>,
}

impl ProcessCapability {
    /// Compute capability for `batch`.
    ///
    /// Requires control limits from the same cycle and the batch
    /// specification. Neither missing input is an error.
    pub fn calculate(
        batch: &MeasurementBatch,
        limits: Option<&ControlLimits>,
    ) -> Result<Self, InsufficientData> {
        if limits.is_none() {
            return Err(InsufficientData::NoControlLimits);
        }
        let spec = batch.specification.ok_or(InsufficientData::NoSpecification)?;

        let values = batch.values();
        let process_mean = stats::mean(&values);
        let sigma = stats::sample_std_dev(&values);

        let usl = spec.upper_limit;
        let lsl = spec.lower_limit;

        let cp = capability_ratio(usl - lsl, 6.0 * sigma);
        let cpk = capability_ratio(usl - process_mean, 3.0 * sigma)
            .min(capability_ratio(process_mean - lsl, 3.0 * sigma));

        let defect_fraction = defect_fraction(&values, &spec);
        let dpmo = defect_fraction * 1_000_000.0;

        Ok(Self {
            cp: round_to(cp, DECIMALS),
            cpk: round_to(cpk, DECIMALS),
            pp: round_to(cp, DECIMALS),
            ppk: round_to(cpk, DECIMALS),
            process_mean: round_to(process_mean, DECIMALS),
            process_std_dev: round_to(sigma, DECIMALS),
            defect_rate: round_to(defect_fraction * 100.0, DECIMALS),
            dpmo: round_to(dpmo, DECIMALS),
            sigma_level: sigma_level(dpmo),
            specification: spec,
            sample_size: values.len(),
            capability: CapabilityClass::from_cpk(cpk),
            calculated_at: Utc::now(),
        })
    }

    /// Whether Cpk meets the usual 1.33 acceptance bar.
    pub fn is_capable(&self) -> bool {
        matches!(
            self.capability,
            CapabilityClass::Excellent | CapabilityClass::Adequate
        )
    }
}

/// `numerator / denominator`, capped at ±[`CAPABILITY_INDEX_CAP`].
///
/// A zero (or negative) denominator means zero spread: the sign of the
/// numerator decides between the caps, and a zero numerator gives 0.
pub fn capability_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        (numerator / denominator).clamp(-CAPABILITY_INDEX_CAP, CAPABILITY_INDEX_CAP)
    } else if numerator > 0.0 {
        CAPABILITY_INDEX_CAP
    } else if numerator < 0.0 {
        -CAPABILITY_INDEX_CAP
    } else {
        0.0
    }
}

/// Fraction of values outside the specification.
pub fn defect_fraction(values: &[f64], spec: &Specification) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let defects = values.iter().filter(|v| !spec.contains(**v)).count();
    defects as f64 / values.len() as f64
}

/// Coarse sigma level from DPMO.
pub fn sigma_level(dpmo: f64) -> f64 {
    if dpmo <= 3.4 {
        6.0
    } else if dpmo <= 233.0 {
        5.0
    } else if dpmo <= 6210.0 {
        4.0
    } else if dpmo <= 66807.0 {
        3.0
    } else if dpmo <= 308538.0 {
        2.0
    } else {
        1.0
    }
}
