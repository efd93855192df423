//! SpcEngine - one SPC session.
//!
//! The engine owns the current measurement batch and everything derived
//! from it. Each stage records either its result or the reason it has
//! none, so a thin batch degrades the session instead of failing it.

use crate::alarm::Alarm;
use crate::capability::ProcessCapability;
use crate::config::SpcConfig;
use crate::distribution::Distribution;
use crate::error::{InsufficientData, Result};
use crate::limits::ControlLimits;
use crate::measurement::{Measurement, MeasurementBatch};
use crate::rules::{ControlRule, RuleEngine};
use crate::snapshot::{SpcSnapshot, SNAPSHOT_VERSION};
use crate::status::ProcessStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a monitored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MonitorState {
    #[default]
    Idle,
    Initializing,
    Monitoring,
    Recalculating,
    Stopped,
}

impl MonitorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorState::Idle => "idle",
            MonitorState::Initializing => "initializing",
            MonitorState::Monitoring => "monitoring",
            MonitorState::Recalculating => "recalculating",
            MonitorState::Stopped => "stopped",
        }
    }

    /// Numeric code for gauges.
    pub fn code(&self) -> i64 {
        match self {
            MonitorState::Idle => 0,
            MonitorState::Initializing => 1,
            MonitorState::Monitoring => 2,
            MonitorState::Recalculating => 3,
            MonitorState::Stopped => 4,
        }
    }

    /// Whether a monitoring loop is attached.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MonitorState::Initializing | MonitorState::Monitoring | MonitorState::Recalculating
        )
    }
}

/// Summary of one pipeline pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub measurements: usize,
    pub subgroups: usize,
    pub alarms: usize,
    pub status: ProcessStatus,
    pub flags: Vec<String>,
}

/// Main SPC session.
#[derive(Debug)]
pub struct SpcEngine {
    config: SpcConfig,
    rules: RuleEngine,
    batch: MeasurementBatch,

    control_limits: Option<ControlLimits>,
    process_capability: Option<ProcessCapability>,
    alarms: Vec<Alarm>,

    /// Why each stage has no result, if it has none.
    limits_gap: Option<InsufficientData>,
    capability_gap: Option<InsufficientData>,
    rules_gap: Option<InsufficientData>,

    state: MonitorState,
    last_update: Option<DateTime<Utc>>,
}

impl SpcEngine {
    /// Create a session with a validated configuration.
    pub fn new(config: SpcConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rules: RuleEngine::from_config(config.control_rules),
            config,
            batch: MeasurementBatch::empty(),
            control_limits: None,
            process_capability: None,
            alarms: Vec::new(),
            limits_gap: None,
            capability_gap: None,
            rules_gap: None,
            state: MonitorState::Idle,
            last_update: None,
        })
    }

    /// Builder: register an extra run-rule detector.
    pub fn with_rule(mut self, rule: impl ControlRule + 'static) -> Self {
        self.rules.register(Box::new(rule));
        self
    }

    /// Replace the configuration. Rule flags apply from the next pass.
    pub fn set_config(&mut self, config: SpcConfig) -> Result<()> {
        config.validate()?;
        self.rules.set_flags(config.control_rules);
        self.config = config;
        Ok(())
    }

    /// Replace the batch wholesale and order it by time.
    ///
    /// Derived results from the previous batch stay until recalculated.
    pub fn replace_measurements(&mut self, mut batch: MeasurementBatch) {
        batch.sort_by_timestamp();
        log::debug!("Replacing batch: {} measurements", batch.len());
        self.batch = batch;
    }

    /// Replace the batch with a pushed one.
    ///
    /// An empty batch is ignored and `false` returned. A batch without a
    /// specification keeps the session's current one.
    pub fn push_measurements(&mut self, mut batch: MeasurementBatch) -> bool {
        if batch.is_empty() {
            log::debug!("Ignoring empty pushed batch");
            return false;
        }
        self.inherit_specification(&mut batch);
        self.replace_measurements(batch);
        true
    }

    fn inherit_specification(&self, batch: &mut MeasurementBatch) {
        if batch.specification.is_none() {
            batch.specification = self.batch.specification;
        }
    }

    /// Full pass: replace the batch, then limits, capability and rules.
    ///
    /// Every result is computed before any is stored, so a pass that
    /// panics leaves the previous state in place.
    pub fn run_pipeline(&mut self, mut batch: MeasurementBatch) -> CycleReport {
        batch.sort_by_timestamp();
        let limits = ControlLimits::calculate(&batch.measurements, self.config.sample_size);
        let capability = ProcessCapability::calculate(&batch, limits.as_ref().ok());
        let alarms = self.evaluate_rules(limits.as_ref().ok());

        self.batch = batch;
        self.store_limits(limits);
        self.store_capability(capability);
        self.store_alarms(alarms);
        self.finish_cycle()
    }

    /// Reduced pass for pushed data: limits and rules, no capability.
    ///
    /// Returns `None` when the pushed batch was empty and nothing ran.
    pub fn recalculate_with(&mut self, mut batch: MeasurementBatch) -> Option<CycleReport> {
        if batch.is_empty() {
            log::debug!("Ignoring empty pushed batch");
            return None;
        }
        self.inherit_specification(&mut batch);
        batch.sort_by_timestamp();
        let limits = ControlLimits::calculate(&batch.measurements, self.config.sample_size);
        let alarms = self.evaluate_rules(limits.as_ref().ok());

        self.batch = batch;
        self.store_limits(limits);
        self.store_alarms(alarms);
        Some(self.finish_cycle())
    }

    /// Compute control limits for the current batch.
    pub fn calculate_control_limits(&mut self) -> Option<&ControlLimits> {
        let limits = ControlLimits::calculate(&self.batch.measurements, self.config.sample_size);
        self.store_limits(limits);
        self.control_limits.as_ref()
    }

    /// Compute process capability from the current batch and limits.
    pub fn calculate_process_capability(&mut self) -> Option<&ProcessCapability> {
        let capability = ProcessCapability::calculate(&self.batch, self.control_limits.as_ref());
        self.store_capability(capability);
        self.process_capability.as_ref()
    }

    /// Evaluate run rules. The alarm list is replaced, never merged.
    pub fn apply_control_rules(&mut self) -> &[Alarm] {
        let alarms = self.evaluate_rules(self.control_limits.as_ref());
        self.store_alarms(alarms);
        &self.alarms
    }

    fn evaluate_rules(
        &self,
        limits: Option<&ControlLimits>,
    ) -> std::result::Result<Vec<Alarm>, InsufficientData> {
        match limits {
            Some(limits) => self.rules.evaluate(limits),
            None => Err(InsufficientData::NoControlLimits),
        }
    }

    fn store_limits(&mut self, outcome: std::result::Result<ControlLimits, InsufficientData>) {
        match outcome {
            Ok(limits) => {
                log::debug!(
                    "Control limits: CL {:.4}, UCL {:.4}, LCL {:.4} over {} subgroups",
                    limits.x_chart.center_line,
                    limits.x_chart.upper_control_limit,
                    limits.x_chart.lower_control_limit,
                    limits.subgroup_count()
                );
                self.control_limits = Some(limits);
                self.limits_gap = None;
            }
            Err(reason) => {
                log::warn!("Control limits not calculated: {}", reason);
                self.control_limits = None;
                self.limits_gap = Some(reason);
            }
        }
    }

    fn store_capability(
        &mut self,
        outcome: std::result::Result<ProcessCapability, InsufficientData>,
    ) {
        match outcome {
            Ok(capability) => {
                log::debug!(
                    "Capability: Cp {:.3}, Cpk {:.3} ({})",
                    capability.cp,
                    capability.cpk,
                    capability.capability
                );
                self.process_capability = Some(capability);
                self.capability_gap = None;
            }
            Err(reason) => {
                log::warn!("Process capability not calculated: {}", reason);
                self.process_capability = None;
                self.capability_gap = Some(reason);
            }
        }
    }

    fn store_alarms(&mut self, outcome: std::result::Result<Vec<Alarm>, InsufficientData>) {
        match outcome {
            Ok(alarms) => {
                for alarm in &alarms {
                    log::warn!("SPC alarm: {}", alarm.summary());
                }
                self.alarms = alarms;
                self.rules_gap = None;
            }
            Err(reason) => {
                log::debug!("Rules not evaluated: {}", reason);
                self.alarms.clear();
                self.rules_gap = Some(reason);
            }
        }
    }

    fn finish_cycle(&mut self) -> CycleReport {
        self.last_update = Some(Utc::now());
        let report = CycleReport {
            measurements: self.batch.len(),
            subgroups: self
                .control_limits
                .as_ref()
                .map_or(0, |l| l.subgroup_count()),
            alarms: self.alarms.len(),
            status: self.status(),
            flags: self.flags(),
        };
        log::info!(
            "SPC cycle: {} measurements, {} subgroups, {} alarms, status {}",
            report.measurements,
            report.subgroups,
            report.alarms,
            report.status
        );
        report
    }

    pub fn config(&self) -> &SpcConfig {
        &self.config
    }

    pub fn batch(&self) -> &MeasurementBatch {
        &self.batch
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.batch.measurements
    }

    pub fn control_limits(&self) -> Option<&ControlLimits> {
        self.control_limits.as_ref()
    }

    pub fn process_capability(&self) -> Option<&ProcessCapability> {
        self.process_capability.as_ref()
    }

    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    /// Overall status from the current alarms.
    pub fn status(&self) -> ProcessStatus {
        ProcessStatus::evaluate(&self.alarms, !self.batch.is_empty())
    }

    /// Histogram of the current values.
    pub fn distribution(&self) -> Option<Distribution> {
        Distribution::from_values(&self.batch.values())
    }

    /// Degraded-state flags of the last pass, deduplicated.
    pub fn flags(&self) -> Vec<String> {
        let mut flags: Vec<String> = Vec::new();
        for gap in [self.limits_gap, self.capability_gap, self.rules_gap]
            .into_iter()
            .flatten()
        {
            let flag = gap.flag().to_string();
            if !flags.contains(&flag) {
                flags.push(flag);
            }
        }
        flags
    }

    /// Reasons stages are currently empty.
    pub fn insufficient_data(&self) -> Vec<InsufficientData> {
        [self.limits_gap, self.capability_gap, self.rules_gap]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn set_state(&mut self, state: MonitorState) {
        if self.state != state {
            log::debug!("Monitor state {} -> {}", self.state.as_str(), state.as_str());
            self.state = state;
        }
    }

    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Exportable view of the whole session.
    pub fn export_snapshot(&self) -> SpcSnapshot {
        SpcSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            monitor_state: self.state,
            measurements: self.batch.measurements.clone(),
            specification: self.batch.specification,
            control_limits: self.control_limits.clone(),
            process_capability: self.process_capability.clone(),
            alarms: self.alarms.clone(),
            status: self.status(),
            distribution: self.distribution(),
            config: self.config.clone(),
            flags: self.flags(),
            last_update: self.last_update,
            exported_at: Utc::now(),
        }
    }
}

impl Default for SpcEngine {
    fn default() -> Self {
        Self {
            rules: RuleEngine::default(),
            config: SpcConfig::default(),
            batch: MeasurementBatch::empty(),
            control_limits: None,
            process_capability: None,
            alarms: Vec::new(),
            limits_gap: None,
            capability_gap: None,
            rules_gap: None,
            state: MonitorState::Idle,
            last_update: None,
        }
    }
}
