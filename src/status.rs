//! Overall process status shown next to the charts.

use crate::alarm::{Alarm, AlarmSeverity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process status derived from the current alarms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessStatus {
    /// At least one critical alarm.
    OutOfControl,
    /// At least one high-severity alarm.
    AttentionRequired,
    /// Data present and no serious alarm.
    UnderControl,
    /// Nothing loaded yet.
    #[default]
    NoData,
}

impl ProcessStatus {
    /// Derive the status from the alarm list and whether data is loaded.
    pub fn evaluate(alarms: &[Alarm], has_measurements: bool) -> Self {
        if alarms.iter().any(|a| a.severity == AlarmSeverity::Critical) {
            ProcessStatus::OutOfControl
        } else if alarms.iter().any(|a| a.severity == AlarmSeverity::High) {
            ProcessStatus::AttentionRequired
        } else if has_measurements {
            ProcessStatus::UnderControl
        } else {
            ProcessStatus::NoData
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessStatus::OutOfControl => "Out of control",
            ProcessStatus::AttentionRequired => "Attention required",
            ProcessStatus::UnderControl => "Under control",
            ProcessStatus::NoData => "No data",
        }
    }

    /// Whether the process needs operator action.
    pub fn needs_attention(&self) -> bool {
        matches!(
            self,
            ProcessStatus::OutOfControl | ProcessStatus::AttentionRequired
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
