// SPC Monitor - Monitoring loop and data sources for the SPC engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Measurement and production sources.
//!
//! A source answers time-window queries. The loader and the feed only see
//! the traits, so a document store, a file or an in-memory fixture can
//! sit behind them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use spc::{Measurement, ProductionRecord, SourceError, Specification, TimeWindow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Source of quality measurements.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Measurements inside `window`, oldest first, at most `limit`.
    async fn fetch_measurements(
        &self,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<Measurement>, SourceError>;

    /// The `limit` newest measurements inside `window`, newest first.
    async fn fetch_recent(
        &self,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<Measurement>, SourceError> {
        let mut all = self.fetch_measurements(window, usize::MAX).await?;
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }
}

/// Source of production-quantity records.
#[async_trait]
pub trait ProductionSource: Send + Sync {
    fn name(&self) -> &str;

    /// Production records inside `window`.
    async fn fetch_production(&self, window: TimeWindow)
        -> Result<Vec<ProductionRecord>, SourceError>;
}

/// Window filter, ascending stable sort and cap.
fn select_window(
    measurements: impl IntoIterator<Item = Measurement>,
    window: TimeWindow,
    limit: usize,
) -> Vec<Measurement> {
    let mut selected: Vec<Measurement> = measurements
        .into_iter()
        .filter(|m| window.contains(m.timestamp))
        .collect();
    selected.sort_by_key(|m| m.timestamp);
    selected.truncate(limit);
    selected
}

/// Records with a resolvable time outside `window` are dropped. Records
/// without one cannot be placed and are kept.
fn select_production(records: &[ProductionRecord], window: TimeWindow) -> Vec<ProductionRecord> {
    records
        .iter()
        .filter(|r| r.resolve_timestamp().map_or(true, |ts| window.contains(ts)))
        .cloned()
        .collect()
}

/// Parse a JSON array record by record. Records that fail to convert are
/// logged and skipped; only a document that is not an array fails.
fn parse_json_records<T: DeserializeOwned>(
    text: &str,
    path: &Path,
) -> Result<Vec<T>, SourceError> {
    let values: Vec<serde_json::Value> =
        serde_json::from_str(text).map_err(|e| SourceError::Parse {
            record: e.line(),
            reason: e.to_string(),
        })?;
    let mut records = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value(value) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping record {} of {}: {}", index + 1, path.display(), e),
        }
    }
    Ok(records)
}

fn io_error(path: &Path, err: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

// ============================================================
// In-memory source
// ============================================================

/// Shared in-memory store, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    measurements: Arc<RwLock<Vec<Measurement>>>,
    production: Arc<RwLock<Vec<ProductionRecord>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_measurements(measurements: Vec<Measurement>) -> Self {
        Self {
            measurements: Arc::new(RwLock::new(measurements)),
            production: Arc::default(),
        }
    }

    pub fn with_production(records: Vec<ProductionRecord>) -> Self {
        Self {
            measurements: Arc::default(),
            production: Arc::new(RwLock::new(records)),
        }
    }

    /// Append one measurement.
    pub async fn push(&self, measurement: Measurement) {
        self.measurements.write().await.push(measurement);
    }

    /// Replace every stored measurement.
    pub async fn set_measurements(&self, measurements: Vec<Measurement>) {
        *self.measurements.write().await = measurements;
    }

    /// Replace every stored production record.
    pub async fn set_production(&self, records: Vec<ProductionRecord>) {
        *self.production.write().await = records;
    }

    pub async fn len(&self) -> usize {
        self.measurements.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.measurements.read().await.is_empty()
    }
}

#[async_trait]
impl MeasurementSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_measurements(
        &self,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<Measurement>, SourceError> {
        let stored = self.measurements.read().await;
        Ok(select_window(stored.iter().cloned(), window, limit))
    }
}

#[async_trait]
impl ProductionSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_production(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<ProductionRecord>, SourceError> {
        let stored = self.production.read().await;
        Ok(select_production(&stored, window))
    }
}

// ============================================================
// File sources
// ============================================================

/// One row of a measurement CSV file.
///
/// Columns: `id,value,machine,timestamp[,target,lower_limit,upper_limit]`.
#[derive(Debug, Deserialize)]
struct CsvRow {
    id: String,
    value: f64,
    #[serde(default)]
    machine: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    target: Option<f64>,
    #[serde(default, alias = "lowerLimit")]
    lower_limit: Option<f64>,
    #[serde(default, alias = "upperLimit")]
    upper_limit: Option<f64>,
}

impl CsvRow {
    fn into_measurement(self) -> Measurement {
        let specification = match (self.target, self.lower_limit, self.upper_limit) {
            (Some(target), Some(lower), Some(upper)) => {
                Some(Specification::new(target, lower, upper))
            }
            _ => None,
        };
        let machine = if self.machine.is_empty() {
            spc::production::UNKNOWN_MACHINE.to_string()
        } else {
            self.machine
        };
        Measurement {
            id: self.id,
            value: self.value,
            machine,
            timestamp: self.timestamp,
            specification,
        }
    }
}

/// Measurements read from a CSV file on every query.
#[derive(Debug, Clone)]
pub struct CsvMeasurementSource {
    path: PathBuf,
}

impl CsvMeasurementSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse CSV text. Rows that fail to parse or carry a non-finite
    /// value are skipped.
    pub fn parse(text: &str) -> Vec<Measurement> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());
        let mut measurements = Vec::new();

        for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
            match result {
                Ok(row) if row.value.is_finite() => measurements.push(row.into_measurement()),
                Ok(row) => warn!("Skipping row {} ({}): non-finite value", index + 1, row.id),
                Err(e) => warn!("Skipping row {}: {}", index + 1, e),
            }
        }
        measurements
    }
}

#[async_trait]
impl MeasurementSource for CsvMeasurementSource {
    fn name(&self) -> &str {
        "csv"
    }

    async fn fetch_measurements(
        &self,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<Measurement>, SourceError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        let measurements = Self::parse(&text);
        debug!("Read {} measurements from {}", measurements.len(), self.path.display());
        Ok(select_window(measurements, window, limit))
    }
}

/// Measurements read from a JSON array file on every query.
#[derive(Debug, Clone)]
pub struct JsonMeasurementSource {
    path: PathBuf,
}

impl JsonMeasurementSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MeasurementSource for JsonMeasurementSource {
    fn name(&self) -> &str {
        "json"
    }

    async fn fetch_measurements(
        &self,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<Measurement>, SourceError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        let measurements: Vec<Measurement> = parse_json_records(&text, &self.path)?;
        debug!("Read {} measurements from {}", measurements.len(), self.path.display());
        Ok(select_window(measurements, window, limit))
    }
}

/// Production records read from a JSON array file on every query.
#[derive(Debug, Clone)]
pub struct JsonProductionSource {
    path: PathBuf,
}

impl JsonProductionSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProductionSource for JsonProductionSource {
    fn name(&self) -> &str {
        "json"
    }

    async fn fetch_production(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<ProductionRecord>, SourceError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        let records: Vec<ProductionRecord> = parse_json_records(&text, &self.path)?;
        Ok(select_production(&records, window))
    }
}

// ============================================================
// Unavailable source
// ============================================================

/// A source that is never reachable.
#[derive(Debug, Clone, Default)]
pub struct UnavailableSource;

#[async_trait]
impl MeasurementSource for UnavailableSource {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn fetch_measurements(
        &self,
        _window: TimeWindow,
        _limit: usize,
    ) -> Result<Vec<Measurement>, SourceError> {
        Err(SourceError::Unavailable("quality measurements".to_string()))
    }
}

#[async_trait]
impl ProductionSource for UnavailableSource {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn fetch_production(
        &self,
        _window: TimeWindow,
    ) -> Result<Vec<ProductionRecord>, SourceError> {
        Err(SourceError::Unavailable("production".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
    }

    fn window() -> TimeWindow {
        TimeWindow::new(ts(0), ts(10))
    }

    #[tokio::test]
    async fn test_memory_window_order_and_limit() {
        let source = MemorySource::with_measurements(vec![
            Measurement::new("c", 3.0, "H01", ts(3)),
            Measurement::new("a", 1.0, "H01", ts(1)),
            Measurement::new("out", 9.0, "H01", ts(20)),
            Measurement::new("b", 2.0, "H01", ts(2)),
        ]);

        let all = source.fetch_measurements(window(), 10).await.unwrap();
        let ids: Vec<_> = all.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let capped = source.fetch_measurements(window(), 2).await.unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[1].id, "b");

        let recent = source.fetch_recent(window(), 2).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_memory_updates() {
        let source = MemorySource::new();
        assert!(source.is_empty().await);
        source.push(Measurement::new("a", 1.0, "H01", ts(1))).await;
        assert_eq!(source.len().await, 1);
        source.set_measurements(Vec::new()).await;
        assert!(source.fetch_measurements(window(), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_production_window() {
        let source = MemorySource::with_production(vec![
            ProductionRecord::new(5.0, "H01").with_timestamp(ts(2)),
            ProductionRecord::new(6.0, "H01").with_timestamp(ts(30)),
            ProductionRecord::new(7.0, "H02"),
        ]);
        let records = source.fetch_production(window()).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_csv_parse() {
        let text = "id,value,machine,timestamp,target,lower_limit,upper_limit\n\
                    q1,10.1,H01,2024-06-01T01:00:00Z,10,9,11\n\
                    q2,oops,H01,2024-06-01T02:00:00Z,,,\n\
                    q3,9.9,,2024-06-01T03:00:00Z,,,\n";
        let measurements = CsvMeasurementSource::parse(text);
        assert_eq!(measurements.len(), 2);
        assert_eq!(
            measurements[0].specification,
            Some(Specification::new(10.0, 9.0, 11.0))
        );
        assert!(measurements[1].specification.is_none());
        assert_eq!(measurements[1].machine, "UNKNOWN");
    }

    #[tokio::test]
    async fn test_csv_source_missing_file() {
        let source = CsvMeasurementSource::new("/nonexistent/quality.csv");
        let err = source.fetch_measurements(window(), 10).await.unwrap_err();
        assert!(matches!(err, SourceError::Io { .. }));
    }

    #[tokio::test]
    async fn test_json_sources() {
        let dir = tempfile::tempdir().unwrap();
        let quality = dir.path().join("quality.json");
        let measurements = vec![
            Measurement::new("q1", 10.0, "H01", ts(1)),
            Measurement::new("q2", 10.2, "H01", ts(2)),
        ];
        std::fs::write(&quality, serde_json::to_string(&measurements).unwrap()).unwrap();
        let fetched = JsonMeasurementSource::new(&quality)
            .fetch_measurements(window(), 10)
            .await
            .unwrap();
        assert_eq!(fetched, measurements);

        let production = dir.path().join("production.json");
        std::fs::write(&production, r#"[{"id": 1, "quantity": 12, "machine": "H02"}]"#).unwrap();
        let records = JsonProductionSource::new(&production)
            .fetch_production(window())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].resolved_quantity(), Some(12.0));

        std::fs::write(
            &quality,
            r#"[
                {"id": "q1", "value": 10.0, "machine": "H01",
                 "timestamp": "2024-06-01T01:00:00Z"},
                {"id": "q2", "value": "high", "machine": "H01",
                 "timestamp": "2024-06-01T02:00:00Z"},
                {"id": "q3", "value": 9.8, "machine": "H01",
                 "timestamp": "2024-06-01T03:00:00Z"}
            ]"#,
        )
        .unwrap();
        let fetched = JsonMeasurementSource::new(&quality)
            .fetch_measurements(window(), 10)
            .await
            .unwrap();
        let ids: Vec<_> = fetched.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q3"]);

        std::fs::write(&production, "not json").unwrap();
        let err = JsonProductionSource::new(&production)
            .fetch_production(window())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_unavailable_source() {
        assert!(UnavailableSource.fetch_measurements(window(), 10).await.is_err());
        assert!(UnavailableSource.fetch_production(window()).await.is_err());
    }
}
