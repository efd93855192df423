// SPC Monitor - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for SPC monitoring.
//!
//! Gauges mirror the engine after every cycle. Stages without a result
//! report `NaN` so stale values never linger on a dashboard.

use crate::error::Result;
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_gauge_vec, Counter,
    CounterVec, Encoder, Gauge, GaugeVec, TextEncoder,
};
use spc::{ChartLimits, MonitorState, ProcessStatus, SpcEngine};
use std::path::Path;

lazy_static! {
    // ============================================================
    // Capability
    // ============================================================

    /// Capability indices, labelled by index name (cp, cpk, pp, ppk).
    pub static ref CAPABILITY_INDEX: GaugeVec = register_gauge_vec!(
        "spc_capability_index",
        "Process capability index",
        &["index"]
    ).unwrap();

    pub static ref PROCESS_MEAN: Gauge = register_gauge!(
        "spc_process_mean",
        "Mean of all measurement values"
    ).unwrap();

    pub static ref PROCESS_STD_DEV: Gauge = register_gauge!(
        "spc_process_std_dev",
        "Sample standard deviation of all measurement values"
    ).unwrap();

    pub static ref DEFECT_RATE_PERCENT: Gauge = register_gauge!(
        "spc_defect_rate_percent",
        "Percentage of values outside the specification"
    ).unwrap();

    pub static ref DPMO: Gauge = register_gauge!(
        "spc_dpmo",
        "Defects per million opportunities"
    ).unwrap();

    pub static ref SIGMA_LEVEL: Gauge = register_gauge!(
        "spc_sigma_level",
        "Sigma level derived from DPMO"
    ).unwrap();

    // ============================================================
    // Control limits
    // ============================================================

    /// X-bar chart lines (cl, ucl, lcl, uwl, lwl).
    pub static ref XBAR_LIMIT: GaugeVec = register_gauge_vec!(
        "spc_xbar_limit",
        "X-bar chart center line, control and warning limits",
        &["line"]
    ).unwrap();

    /// R chart lines (cl, ucl, lcl, uwl, lwl).
    pub static ref RANGE_LIMIT: GaugeVec = register_gauge_vec!(
        "spc_range_limit",
        "R chart center line, control and warning limits",
        &["line"]
    ).unwrap();

    pub static ref MEASUREMENTS: Gauge = register_gauge!(
        "spc_measurements",
        "Measurements in the current batch"
    ).unwrap();

    pub static ref SUBGROUPS: Gauge = register_gauge!(
        "spc_subgroups",
        "Complete subgroups in the current batch"
    ).unwrap();

    // ============================================================
    // Alarms and status
    // ============================================================

    pub static ref ACTIVE_ALARMS: Gauge = register_gauge!(
        "spc_active_alarms",
        "Alarms raised by the last rule evaluation"
    ).unwrap();

    /// Alarms raised, labelled by rule and severity.
    pub static ref ALARMS_TOTAL: CounterVec = register_counter_vec!(
        "spc_alarms_total",
        "Total alarms raised",
        &["rule", "severity"]
    ).unwrap();

    /// 0 = under control, 1 = attention required, 2 = out of control, 3 = no data.
    pub static ref PROCESS_STATUS: Gauge = register_gauge!(
        "spc_process_status",
        "Process status (0=under control, 1=attention, 2=out of control, 3=no data)"
    ).unwrap();

    // ============================================================
    // Monitor
    // ============================================================

    /// Cycles run, labelled by trigger (init, timer, push).
    pub static ref CYCLES_TOTAL: CounterVec = register_counter_vec!(
        "spc_monitor_cycles_total",
        "Pipeline cycles run",
        &["trigger"]
    ).unwrap();

    pub static ref CYCLE_FAILURES_TOTAL: Counter = register_counter!(
        "spc_monitor_cycle_failures_total",
        "Pipeline cycles that failed and kept the prior state"
    ).unwrap();

    pub static ref MONITOR_STATE: Gauge = register_gauge!(
        "spc_monitor_state",
        "Monitor state (0=idle, 1=initializing, 2=monitoring, 3=recalculating, 4=stopped)"
    ).unwrap();

    pub static ref LAST_UPDATE_SECONDS: Gauge = register_gauge!(
        "spc_last_update_timestamp_seconds",
        "Unix time of the last completed cycle"
    ).unwrap();
}

fn status_code(status: ProcessStatus) -> f64 {
    match status {
        ProcessStatus::UnderControl => 0.0,
        ProcessStatus::AttentionRequired => 1.0,
        ProcessStatus::OutOfControl => 2.0,
        ProcessStatus::NoData => 3.0,
    }
}

fn set_chart(vec: &GaugeVec, chart: Option<&ChartLimits>) {
    let lines = [
        ("cl", chart.map(|c| c.center_line)),
        ("ucl", chart.map(|c| c.upper_control_limit)),
        ("lcl", chart.map(|c| c.lower_control_limit)),
        ("uwl", chart.map(|c| c.upper_warning_limit)),
        ("lwl", chart.map(|c| c.lower_warning_limit)),
    ];
    for (line, value) in lines {
        vec.with_label_values(&[line]).set(value.unwrap_or(f64::NAN));
    }
}

/// Mirror the engine state into the gauges.
pub fn update_from_engine(engine: &SpcEngine) {
    let capability = engine.process_capability();
    let indices = [
        ("cp", capability.map(|c| c.cp)),
        ("cpk", capability.map(|c| c.cpk)),
        ("pp", capability.map(|c| c.pp)),
        ("ppk", capability.map(|c| c.ppk)),
    ];
    for (index, value) in indices {
        CAPABILITY_INDEX
            .with_label_values(&[index])
            .set(value.unwrap_or(f64::NAN));
    }
    PROCESS_MEAN.set(capability.map_or(f64::NAN, |c| c.process_mean));
    PROCESS_STD_DEV.set(capability.map_or(f64::NAN, |c| c.process_std_dev));
    DEFECT_RATE_PERCENT.set(capability.map_or(f64::NAN, |c| c.defect_rate));
    DPMO.set(capability.map_or(f64::NAN, |c| c.dpmo));
    SIGMA_LEVEL.set(capability.map_or(f64::NAN, |c| c.sigma_level));

    let limits = engine.control_limits();
    set_chart(&XBAR_LIMIT, limits.map(|l| &l.x_chart));
    set_chart(&RANGE_LIMIT, limits.map(|l| &l.r_chart));
    MEASUREMENTS.set(engine.measurements().len() as f64);
    SUBGROUPS.set(limits.map_or(0.0, |l| l.subgroup_count() as f64));

    ACTIVE_ALARMS.set(engine.alarms().len() as f64);
    PROCESS_STATUS.set(status_code(engine.status()));
    if let Some(ts) = engine.last_update() {
        LAST_UPDATE_SECONDS.set(ts.timestamp() as f64);
    }
}

/// Count the alarms of one rule evaluation.
pub fn record_alarms(engine: &SpcEngine) {
    for alarm in engine.alarms() {
        ALARMS_TOTAL
            .with_label_values(&[alarm.rule.as_str(), alarm.severity.as_str()])
            .inc();
    }
}

/// Count one cycle.
pub fn record_cycle(trigger: &str) {
    CYCLES_TOTAL.with_label_values(&[trigger]).inc();
}

pub fn record_failure() {
    CYCLE_FAILURES_TOTAL.inc();
}

pub fn set_monitor_state(state: MonitorState) {
    MONITOR_STATE.set(state.code() as f64);
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Write the text exposition to `path`, textfile-collector style.
pub async fn write_metrics_file(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let tmp = path.with_extension("prom.tmp");
    tokio::fs::write(&tmp, encode_metrics()).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use spc::{Measurement, MeasurementBatch, Specification};

    fn engine_with_data() -> SpcEngine {
        let start = Utc::now();
        let measurements = (0..50)
            .map(|i| {
                let value = 10.0 + [-0.2, 0.1, 0.0, -0.1, 0.2][i % 5];
                let timestamp = start + Duration::minutes(i as i64);
                Measurement::new(format!("m{}", i), value, "H01", timestamp)
            })
            .collect();
        let mut engine = SpcEngine::default();
        engine.run_pipeline(MeasurementBatch::with_specification(
            measurements,
            Some(Specification::symmetric(10.0, 1.0)),
        ));
        engine
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(status_code(ProcessStatus::UnderControl), 0.0);
        assert_eq!(status_code(ProcessStatus::OutOfControl), 2.0);
        assert_eq!(status_code(ProcessStatus::NoData), 3.0);
    }

    #[test]
    fn test_encode_metrics() {
        let engine = engine_with_data();
        update_from_engine(&engine);
        record_cycle("timer");
        set_monitor_state(MonitorState::Monitoring);

        let output = encode_metrics();
        assert!(output.contains("spc_capability_index"));
        assert!(output.contains("spc_xbar_limit"));
        assert!(output.contains("spc_monitor_cycles_total"));
        assert!(output.contains("spc_monitor_state"));
    }

    #[tokio::test]
    async fn test_write_metrics_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spc.prom");
        record_failure();
        write_metrics_file(&path).await.unwrap();
        assert!(!path.with_extension("prom.tmp").exists());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("spc_monitor_cycle_failures_total"));
    }
}
