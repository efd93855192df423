//! Alarm types emitted by the rule engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of out-of-control signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlarmType {
    /// A point beyond the control limits.
    OutOfControl,
    /// A non-random run pattern.
    Trend,
}

impl AlarmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmType::OutOfControl => "OUT_OF_CONTROL",
            AlarmType::Trend => "TREND",
        }
    }
}

/// Severity of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AlarmSeverity {
    Medium,
    High,
    Critical,
}

impl AlarmSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlarmSeverity::Medium => "medium",
            AlarmSeverity::High => "high",
            AlarmSeverity::Critical => "critical",
        }
    }
}

/// One rule violation at one subgroup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub alarm_type: AlarmType,
    /// Rule label, e.g. `"Rule 1"`.
    pub rule: String,
    /// Rule number 1..=8.
    pub rule_number: u8,
    pub description: String,
    /// Global 1-based subgroup index.
    pub subgroup: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub severity: AlarmSeverity,
}

impl Alarm {
    /// Create a new alarm.
    pub fn new(
        alarm_type: AlarmType,
        rule_number: u8,
        description: impl Into<String>,
        subgroup: usize,
        severity: AlarmSeverity,
    ) -> Self {
        Self {
            alarm_type,
            rule: format!("Rule {}", rule_number),
            rule_number,
            description: description.into(),
            subgroup,
            value: None,
            timestamp: None,
            severity,
        }
    }

    /// Builder: attach the offending value.
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Builder: attach the subgroup timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Rule 1: point beyond the control limits.
    pub fn out_of_control(subgroup: usize, mean: f64, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            AlarmType::OutOfControl,
            1,
            "Point beyond control limits",
            subgroup,
            AlarmSeverity::Critical,
        )
        .with_value(mean)
        .with_timestamp(timestamp)
    }

    /// Rule 2: long run on one side of the center line.
    pub fn same_side_run(subgroup: usize, run: usize, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            AlarmType::Trend,
            2,
            format!("{} consecutive points on the same side of the center line", run),
            subgroup,
            AlarmSeverity::High,
        )
        .with_timestamp(timestamp)
    }

    /// Rule 3: steady rise or fall.
    pub fn monotonic_run(subgroup: usize, run: usize, timestamp: DateTime<Utc>) -> Self {
        Self::new(
            AlarmType::Trend,
            3,
            format!("{} consecutive points steadily increasing or decreasing", run),
            subgroup,
            AlarmSeverity::High,
        )
        .with_timestamp(timestamp)
    }

    /// One-line summary for logs and notifications.
    pub fn summary(&self) -> String {
        format!(
            "[{}] {}: {} (subgroup {})",
            self.severity.as_str(),
            self.rule,
            self.description,
            self.subgroup
        )
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_type_as_str() {
        assert_eq!(AlarmType::OutOfControl.as_str(), "OUT_OF_CONTROL");
        assert_eq!(AlarmType::Trend.as_str(), "TREND");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlarmSeverity::Critical > AlarmSeverity::High);
        assert!(AlarmSeverity::High > AlarmSeverity::Medium);
        assert_eq!(AlarmSeverity::Critical.as_str(), "critical");
    }

    #[test]
    fn test_out_of_control_alarm() {
        let now = Utc::now();
        let alarm = Alarm::out_of_control(4, 12.5, now);
        assert_eq!(alarm.rule, "Rule 1");
        assert_eq!(alarm.severity, AlarmSeverity::Critical);
        assert_eq!(alarm.value, Some(12.5));
        assert_eq!(alarm.timestamp, Some(now));
        assert!(alarm.summary().contains("subgroup 4"));
    }

    #[test]
    fn test_trend_alarms() {
        let now = Utc::now();
        let run = Alarm::same_side_run(9, 9, now);
        assert_eq!(run.alarm_type, AlarmType::Trend);
        assert_eq!(run.rule_number, 2);
        assert!(run.value.is_none());

        let trend = Alarm::monotonic_run(6, 6, now);
        assert_eq!(trend.rule, "Rule 3");
        assert!(trend.description.contains('6'));
    }

    #[test]
    fn test_alarm_json_omits_empty_fields() {
        let alarm = Alarm::new(AlarmType::Trend, 5, "custom", 3, AlarmSeverity::Medium);
        let json = alarm.to_json().unwrap();
        assert!(json.contains("\"Trend\""));
        assert!(!json.contains("\"value\""));
        assert!(!json.contains("\"timestamp\""));
    }
}
