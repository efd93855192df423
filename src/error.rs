//! Error types for the SPC engine
//!
//! Two kinds of outcome are modelled here. [`SpcError`] covers genuine
//! failures (bad configuration, unreachable sources, serialization).
//! [`InsufficientData`] is not a failure: it names the reason a stage
//! produced no result, and callers keep running with that stage absent.

use thiserror::Error;

/// Result type alias for SPC operations
pub type Result<T> = std::result::Result<T, SpcError>;

/// Main error type for SPC operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpcError {
    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Data source error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Snapshot or config (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SpcError {
    fn from(err: serde_json::Error) -> Self {
        SpcError::Serialization(err.to_string())
    }
}

/// Errors raised by measurement and production sources
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Source cannot be reached
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    /// Underlying I/O failure
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// Record could not be parsed
    #[error("Parse error at record {record}: {reason}")]
    Parse { record: usize, reason: String },
}

/// Reason a calculation stage produced no result.
///
/// Every variant is a valid steady state of the engine.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsufficientData {
    /// Fewer measurements than control limits require
    #[error("Insufficient measurements: have {have}, need {need}")]
    TooFewMeasurements { have: usize, need: usize },

    /// Not a single complete subgroup could be formed
    #[error("No complete subgroup of size {sample_size}")]
    NoCompleteSubgroups { sample_size: usize },

    /// Too few subgroup statistics to evaluate run rules
    #[error("Insufficient subgroups for rule evaluation: have {have}, need {need}")]
    TooFewSubgroups { have: usize, need: usize },

    /// Capability needs control limits first
    #[error("Control limits not available")]
    NoControlLimits,

    /// Capability needs a specification envelope
    #[error("No specification envelope")]
    NoSpecification,
}

impl InsufficientData {
    /// Flag string used in exported snapshots.
    pub fn flag(&self) -> &'static str {
        match self {
            InsufficientData::TooFewMeasurements { .. } => "INSUFFICIENT_DATA",
            InsufficientData::NoCompleteSubgroups { .. } => "NO_COMPLETE_SUBGROUPS",
            InsufficientData::TooFewSubgroups { .. } => "RULES_NOT_EVALUATED",
            InsufficientData::NoControlLimits => "NO_CONTROL_LIMITS",
            InsufficientData::NoSpecification => "NO_SPECIFICATION",
        }
    }
}
