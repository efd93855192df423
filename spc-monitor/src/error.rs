// SPC Monitor - Monitoring loop and data sources for the SPC engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Monitor errors.

use spc::{SourceError, SpcError};

/// Errors raised by the monitor crate.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("SPC error: {0}")]
    Spc(#[from] SpcError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Monitor task is no longer running")]
    ChannelClosed,
}

impl From<SourceError> for MonitorError {
    fn from(err: SourceError) -> Self {
        MonitorError::Spc(SpcError::Source(err))
    }
}

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
