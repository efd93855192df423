//! Western Electric run-rule evaluation.
//!
//! The engine looks at the most recent [`RULE_WINDOW`] subgroup statistics
//! and asks every enabled detector for alarms. Rules 1 to 3 ship as
//! built-in detectors. Rules 4 to 8 exist only as configuration flags
//! until a detector is registered for them with [`RuleEngine::with_rule`].

use crate::alarm::Alarm;
use crate::config::ControlRules;
use crate::error::InsufficientData;
use crate::limits::{ChartLimits, ControlLimits};
use crate::subgroup::SubgroupStatistic;
use std::fmt;

/// Number of most recent subgroups the rules look at.
pub const RULE_WINDOW: usize = 25;

/// Fewer subgroup statistics than this and no rule is evaluated.
pub const MIN_RULE_SUBGROUPS: usize = 9;

/// Run length for the same-side rule.
pub const SAME_SIDE_RUN: usize = 9;

/// Run length for the monotonic trend rule.
pub const TREND_RUN: usize = 6;

/// The slice of subgroup statistics a rule inspects.
#[derive(Debug, Clone, Copy)]
pub struct RuleWindow<'a> {
    /// Statistics inside the window, oldest first.
    pub stats: &'a [SubgroupStatistic],
    /// X-bar chart limits.
    pub x_chart: &'a ChartLimits,
    /// Number of statistics that precede the window.
    pub offset: usize,
}

impl<'a> RuleWindow<'a> {
    /// Window over the last [`RULE_WINDOW`] statistics of `limits`.
    pub fn latest(limits: &'a ControlLimits) -> Self {
        let total = limits.subgroup_stats.len();
        let offset = total.saturating_sub(RULE_WINDOW);
        Self {
            stats: &limits.subgroup_stats[offset..],
            x_chart: &limits.x_chart,
            offset,
        }
    }

    /// Global 1-based subgroup number of window position `i`.
    pub fn subgroup_number(&self, i: usize) -> usize {
        self.offset + i + 1
    }

    /// Subgroup means in window order.
    pub fn means(&self) -> Vec<f64> {
        self.stats.iter().map(|s| s.mean).collect()
    }
}

/// A run-rule detector.
pub trait ControlRule: Send + Sync {
    /// Rule number 1..=8, matched against the configuration flags.
    fn number(&self) -> u8;

    /// Every alarm this rule raises inside `window`.
    fn check(&self, window: &RuleWindow<'_>) -> Vec<Alarm>;
}

/// Rule 1: a subgroup mean strictly outside `[LCL, UCL]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeyondLimitsRule;

impl ControlRule for BeyondLimitsRule {
    fn number(&self) -> u8 {
        1
    }

    fn check(&self, window: &RuleWindow<'_>) -> Vec<Alarm> {
        window
            .stats
            .iter()
            .enumerate()
            .filter(|(_, s)| window.x_chart.is_beyond_control(s.mean))
            .map(|(i, s)| Alarm::out_of_control(window.subgroup_number(i), s.mean, s.timestamp))
            .collect()
    }
}

/// Rule 2: nine consecutive means strictly on one side of the center line.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameSideRule;

impl ControlRule for SameSideRule {
    fn number(&self) -> u8 {
        2
    }

    fn check(&self, window: &RuleWindow<'_>) -> Vec<Alarm> {
        let center = window.x_chart.center_line;
        let means = window.means();
        let mut alarms = Vec::new();

        for i in (SAME_SIDE_RUN - 1)..means.len() {
            let run = &means[i + 1 - SAME_SIDE_RUN..=i];
            let above = run.iter().all(|&m| m > center);
            let below = run.iter().all(|&m| m < center);
            if above || below {
                alarms.push(Alarm::same_side_run(
                    window.subgroup_number(i),
                    SAME_SIDE_RUN,
                    window.stats[i].timestamp,
                ));
            }
        }
        alarms
    }
}

/// Rule 3: six consecutive means strictly increasing or decreasing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrendRule;

impl ControlRule for TrendRule {
    fn number(&self) -> u8 {
        3
    }

    fn check(&self, window: &RuleWindow<'_>) -> Vec<Alarm> {
        let means = window.means();
        let mut alarms = Vec::new();

        for i in (TREND_RUN - 1)..means.len() {
            let run = &means[i + 1 - TREND_RUN..=i];
            let increasing = run.windows(2).all(|p| p[1] > p[0]);
            let decreasing = run.windows(2).all(|p| p[1] < p[0]);
            if increasing || decreasing {
                alarms.push(Alarm::monotonic_run(
                    window.subgroup_number(i),
                    TREND_RUN,
                    window.stats[i].timestamp,
                ));
            }
        }
        alarms
    }
}

/// Evaluates the enabled detectors against a set of control limits.
pub struct RuleEngine {
    flags: ControlRules,
    detectors: Vec<Box<dyn ControlRule>>,
}

impl RuleEngine {
    /// Engine with the built-in detectors for rules 1 to 3.
    pub fn from_config(flags: ControlRules) -> Self {
        Self {
            flags,
            detectors: vec![
                Box::new(BeyondLimitsRule),
                Box::new(SameSideRule),
                Box::new(TrendRule),
            ],
        }
    }

    /// Builder: register an additional detector.
    pub fn with_rule(mut self, rule: impl ControlRule + 'static) -> Self {
        self.detectors.push(Box::new(rule));
        self
    }

    /// Register an additional detector.
    pub fn register(&mut self, rule: Box<dyn ControlRule>) {
        self.detectors.push(rule);
    }

    /// Replace the rule flags, keeping the registered detectors.
    pub fn set_flags(&mut self, flags: ControlRules) {
        self.flags = flags;
    }

    pub fn flags(&self) -> &ControlRules {
        &self.flags
    }

    /// Rule numbers that currently have a detector.
    pub fn registered_rules(&self) -> Vec<u8> {
        self.detectors.iter().map(|d| d.number()).collect()
    }

    /// Evaluate every enabled detector.
    ///
    /// Alarms come back ordered by subgroup, then by rule number.
    pub fn evaluate(&self, limits: &ControlLimits) -> Result<Vec<Alarm>, InsufficientData> {
        let have = limits.subgroup_stats.len();
        if have < MIN_RULE_SUBGROUPS {
            return Err(InsufficientData::TooFewSubgroups {
                have,
                need: MIN_RULE_SUBGROUPS,
            });
        }

        let window = RuleWindow::latest(limits);
        let mut alarms: Vec<Alarm> = self
            .detectors
            .iter()
            .filter(|d| self.flags.is_enabled(d.number()))
            .flat_map(|d| d.check(&window))
            .collect();

        alarms.sort_by_key(|a| (a.subgroup, a.rule_number));
        Ok(alarms)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::from_config(ControlRules::default())
    }
}

impl fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleEngine")
            .field("flags", &self.flags)
            .field("detectors", &self.registered_rules())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{AlarmSeverity, AlarmType};
    use crate::constants::ControlConstants;
    use chrono::{TimeZone, Utc};

    fn stats(means: &[f64]) -> Vec<SubgroupStatistic> {
        means
            .iter()
            .enumerate()
            .map(|(i, &m)| SubgroupStatistic {
                mean: m,
                range: 1.0,
                timestamp: Utc.timestamp_opt(1_700_000_000 + i as i64 * 300, 0).unwrap(),
                machine: "H01".to_string(),
                values: vec![m],
                size: 5,
            })
            .collect()
    }

    /// Limits with CL 10 and control limits 7..13, independent of the means.
    fn limits(means: &[f64]) -> ControlLimits {
        let mut limits =
            ControlLimits::from_statistics(stats(means), ControlConstants::for_sample_size(5));
        limits.x_chart = ChartLimits {
            center_line: 10.0,
            upper_control_limit: 13.0,
            lower_control_limit: 7.0,
            upper_warning_limit: 12.0,
            lower_warning_limit: 8.0,
        };
        limits
    }

    fn alternating(len: usize) -> Vec<f64> {
        (0..len).map(|i| if i % 2 == 0 { 9.5 } else { 10.5 }).collect()
    }

    #[test]
    fn test_too_few_subgroups() {
        let engine = RuleEngine::default();
        let err = engine.evaluate(&limits(&[20.0; 8])).unwrap_err();
        assert_eq!(err, InsufficientData::TooFewSubgroups { have: 8, need: 9 });
    }

    #[test]
    fn test_quiet_process_has_no_alarms() {
        let engine = RuleEngine::default();
        assert!(engine.evaluate(&limits(&alternating(20))).unwrap().is_empty());
    }

    #[test]
    fn test_rule1_beyond_limits() {
        let mut means = alternating(12);
        means[4] = 13.5;
        means[7] = 7.0; // on the limit, not beyond
        let alarms = RuleEngine::default().evaluate(&limits(&means)).unwrap();

        assert_eq!(alarms.len(), 1);
        let alarm = &alarms[0];
        assert_eq!(alarm.rule_number, 1);
        assert_eq!(alarm.subgroup, 5);
        assert_eq!(alarm.severity, AlarmSeverity::Critical);
        assert_eq!(alarm.alarm_type, AlarmType::OutOfControl);
        assert_eq!(alarm.value, Some(13.5));
    }

    #[test]
    fn test_rule2_nine_on_one_side() {
        let mut means = alternating(9);
        means.extend([10.2; 9]);
        let alarms = RuleEngine::default().evaluate(&limits(&means)).unwrap();

        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].rule_number, 2);
        assert_eq!(alarms[0].subgroup, 18);
        assert_eq!(alarms[0].severity, AlarmSeverity::High);
    }

    #[test]
    fn test_rule2_ignores_points_on_center_line() {
        let mut means = vec![10.2; 9];
        means[4] = 10.0;
        means.extend(alternating(2));
        let alarms = RuleEngine::default().evaluate(&limits(&means)).unwrap();
        assert!(alarms.iter().all(|a| a.rule_number != 2));
    }

    #[test]
    fn test_rule3_six_increasing() {
        let mut means = alternating(6);
        means.extend([9.0, 9.2, 9.4, 9.6, 9.8, 10.0]);
        means.extend([9.0, 11.0, 9.0]);
        let alarms = RuleEngine::default().evaluate(&limits(&means)).unwrap();

        let trend: Vec<_> = alarms.iter().filter(|a| a.rule_number == 3).collect();
        assert_eq!(trend.len(), 1);
        assert_eq!(trend[0].subgroup, 12);
        assert_eq!(trend[0].alarm_type, AlarmType::Trend);
    }

    #[test]
    fn test_rule3_decreasing_and_ties() {
        let means = vec![11.0, 10.8, 10.6, 10.4, 10.2, 10.0, 10.5, 9.5, 10.5, 9.5];
        let alarms = RuleEngine::default().evaluate(&limits(&means)).unwrap();
        assert_eq!(alarms.iter().filter(|a| a.rule_number == 3).count(), 1);

        let flat = vec![9.0, 9.2, 9.4, 9.4, 9.6, 9.8, 10.0, 9.0, 11.0];
        let alarms = RuleEngine::default().evaluate(&limits(&flat)).unwrap();
        assert!(alarms.iter().all(|a| a.rule_number != 3));
    }

    #[test]
    fn test_window_keeps_global_numbering() {
        let mut means = alternating(40);
        means[39] = 20.0;
        means[10] = 20.0; // outside the window
        let alarms = RuleEngine::default().evaluate(&limits(&means)).unwrap();

        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].subgroup, 40);
    }

    #[test]
    fn test_disabled_rules_are_skipped() {
        let mut means = alternating(12);
        means[4] = 20.0;
        let mut flags = ControlRules::all();
        flags.rule1 = false;
        let alarms = RuleEngine::from_config(flags).evaluate(&limits(&means)).unwrap();
        assert!(alarms.is_empty());
    }

    struct AlwaysFires(u8);

    impl ControlRule for AlwaysFires {
        fn number(&self) -> u8 {
            self.0
        }

        fn check(&self, window: &RuleWindow<'_>) -> Vec<Alarm> {
            vec![Alarm::new(
                AlarmType::Trend,
                self.0,
                "custom detector",
                window.subgroup_number(0),
                AlarmSeverity::Medium,
            )]
        }
    }

    #[test]
    fn test_registered_rule_respects_flag() {
        let engine = RuleEngine::default().with_rule(AlwaysFires(5));
        assert_eq!(engine.registered_rules(), vec![1, 2, 3, 5]);
        let alarms = engine.evaluate(&limits(&alternating(10))).unwrap();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].rule, "Rule 5");

        let mut flags = ControlRules::all();
        flags.rule5 = false;
        let engine = RuleEngine::from_config(flags).with_rule(AlwaysFires(5));
        assert!(engine.evaluate(&limits(&alternating(10))).unwrap().is_empty());
    }

    #[test]
    fn test_alarm_order() {
        let mut means = alternating(10);
        means[9] = 20.0;
        let engine = RuleEngine::default().with_rule(AlwaysFires(4));
        let alarms = engine.evaluate(&limits(&means)).unwrap();
        let order: Vec<_> = alarms.iter().map(|a| (a.subgroup, a.rule_number)).collect();
        assert_eq!(order, vec![(1, 4), (10, 1)]);
    }
}
