//! Measurements synthesized from production-quantity records.
//!
//! When the quality source is too thin, each production record with a
//! positive quantity stands in for one measurement. The specification for
//! the synthesized batch is derived from the synthesized values.

use crate::measurement::{Measurement, MeasurementBatch, Specification};
use crate::stats;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Machine recorded when a production record names none.
pub const UNKNOWN_MACHINE: &str = "UNKNOWN";

/// Relative tolerance floor of a derived specification.
const RELATIVE_TOLERANCE: f64 = 0.05;

/// Absolute tolerance floor of a derived specification.
const MIN_TOLERANCE: f64 = 1.0;

/// One production-quantity document.
///
/// Field names follow the upstream documents: the quantity may arrive as
/// `quantity`, `produzido` or `total`, timestamps in several fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductionRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub quantity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub produzido: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub machine: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub datetime: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<String>,
    #[serde(default, alias = "updatedAt", deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<String>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient_timestamp")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub date: Option<String>,
}

impl ProductionRecord {
    /// Record with a quantity and machine, mainly for tests and demos.
    pub fn new(quantity: f64, machine: impl Into<String>) -> Self {
        Self {
            quantity: Some(quantity),
            machine: Some(machine.into()),
            ..Self::default()
        }
    }

    /// Builder: set the record id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Builder: set the explicit timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp.to_rfc3339());
        self
    }

    /// Builder: set the calendar date.
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date.format("%Y-%m-%d").to_string());
        self
    }

    /// First quantity field present, in `quantity`, `produzido`, `total` order.
    pub fn resolved_quantity(&self) -> Option<f64> {
        self.quantity.or(self.produzido).or(self.total)
    }

    /// Best available time: explicit datetime fields first, then the
    /// record date at start of day (UTC). `None` if nothing parses.
    pub fn resolve_timestamp(&self) -> Option<DateTime<Utc>> {
        [
            &self.datetime,
            &self.timestamp,
            &self.updated_at,
            &self.created_at,
        ]
        .into_iter()
        .flatten()
        .find_map(|raw| parse_datetime(raw))
        .or_else(|| self.date.as_deref().and_then(parse_date))
    }
}

/// Result of synthesizing a batch from production records.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub batch: MeasurementBatch,
    /// Records dropped for a missing, non-finite or non-positive quantity.
    pub skipped: usize,
}

/// Turn production records into a measurement batch.
///
/// Records without a usable quantity are skipped. Records without a
/// usable time get `now`. An empty result carries no specification.
pub fn synthesize(records: &[ProductionRecord], now: DateTime<Utc>) -> Synthesis {
    let mut measurements = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for (index, record) in records.iter().enumerate() {
        let value = match record.resolved_quantity() {
            Some(v) if v.is_finite() && v > 0.0 => v,
            _ => {
                skipped += 1;
                continue;
            }
        };

        let id = match &record.id {
            Some(id) if !id.is_empty() => format!("prod-{}", id),
            _ => format!("prod-{}", index),
        };
        let machine = record
            .machine
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_MACHINE);
        let timestamp = record.resolve_timestamp().unwrap_or(now);

        measurements.push(Measurement::new(id, value, machine, timestamp));
    }

    if measurements.is_empty() {
        return Synthesis {
            batch: MeasurementBatch::empty(),
            skipped,
        };
    }

    let values: Vec<f64> = measurements.iter().map(|m| m.value).collect();
    let specification = derive_specification(&values);
    for m in &mut measurements {
        m.specification = Some(specification);
    }

    log::debug!(
        "Synthesized {} measurements from production ({} skipped), target {:.3}",
        measurements.len(),
        skipped,
        specification.target
    );

    Synthesis {
        batch: MeasurementBatch::with_specification(measurements, Some(specification)),
        skipped,
    }
}

/// Specification envelope derived from a synthesized population.
///
/// `target` is the mean and the tolerance is the largest of 5 % of the
/// mean, the sample standard deviation and 1. The lower limit is clamped
/// at zero.
pub fn derive_specification(values: &[f64]) -> Specification {
    let target = stats::mean(values);
    let tolerance = (target * RELATIVE_TOLERANCE)
        .max(stats::sample_std_dev(values))
        .max(MIN_TOLERANCE);
    Specification {
        target,
        upper_limit: target + tolerance,
        lower_limit: (target - tolerance).max(0.0),
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    .map(|naive| Utc.from_utc_datetime(&naive))
    .or_else(|| parse_date(raw))
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()?;
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Accept numbers and numeric strings. Anything else reads as absent.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Accept time strings and epoch milliseconds. Numbers are stored as
/// RFC 3339 text; anything else reads as absent.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|v| v.is_finite()).map(|v| v as i64))
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .map(|dt| dt.to_rfc3339()),
        _ => None,
    })
}

/// Accept string or numeric values.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
