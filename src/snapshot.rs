//! SpcSnapshot - exported view of a session.

use crate::alarm::{Alarm, AlarmSeverity};
use crate::capability::ProcessCapability;
use crate::config::SpcConfig;
use crate::distribution::Distribution;
use crate::engine::MonitorState;
use crate::limits::ControlLimits;
use crate::measurement::{Measurement, Specification};
use crate::status::ProcessStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version of the snapshot format.
pub const SNAPSHOT_VERSION: &str = "0.3.0";

/// Everything a consumer needs to render or archive the current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpcSnapshot {
    /// Format version.
    pub version: String,
    /// Monitoring state at export time.
    pub monitor_state: MonitorState,
    /// Measurements of the current batch, in time order.
    pub measurements: Vec<Measurement>,
    /// Canonical specification of the batch.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub specification: Option<Specification>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub control_limits: Option<ControlLimits>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub process_capability: Option<ProcessCapability>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub alarms: Vec<Alarm>,
    pub status: ProcessStatus,
    /// Value histogram.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub distribution: Option<Distribution>,
    pub config: SpcConfig,
    /// Degraded-state markers such as `INSUFFICIENT_DATA`.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub flags: Vec<String>,
    /// Completion time of the last pipeline pass.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_update: Option<DateTime<Utc>>,
    pub exported_at: DateTime<Utc>,
}

impl SpcSnapshot {
    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn has_alarms(&self) -> bool {
        !self.alarms.is_empty()
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// Alarms of the given severity.
    pub fn alarms_by_severity(&self, severity: AlarmSeverity) -> Vec<&Alarm> {
        self.alarms.iter().filter(|a| a.severity == severity).collect()
    }
}
