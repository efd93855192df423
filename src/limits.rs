//! X-bar/R control-limit calculation.

use crate::constants::ControlConstants;
use crate::error::InsufficientData;
use crate::measurement::Measurement;
use crate::stats;
use crate::subgroup::{subgroup_statistics, SubgroupStatistic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum number of measurements before limits are computed.
pub const MIN_MEASUREMENTS: usize = 20;

/// Warning limits sit at this fraction of the control-limit distance.
pub const WARNING_FRACTION: f64 = 2.0 / 3.0;

/// Center line, control and warning limits of one chart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartLimits {
    pub center_line: f64,
    pub upper_control_limit: f64,
    pub lower_control_limit: f64,
    pub upper_warning_limit: f64,
    pub lower_warning_limit: f64,
}

impl ChartLimits {
    /// Whether `value` lies strictly outside `[LCL, UCL]`.
    pub fn is_beyond_control(&self, value: f64) -> bool {
        value > self.upper_control_limit || value < self.lower_control_limit
    }
}

/// Limits for both charts plus the statistics they were derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlLimits {
    pub x_chart: ChartLimits,
    pub r_chart: ChartLimits,
    pub subgroup_stats: Vec<SubgroupStatistic>,
    pub constants: ControlConstants,
    pub calculated_at: DateTime<Utc>,
}

impl ControlLimits {
    /// Compute limits from an ordered measurement sequence.
    ///
    /// Needs [`MIN_MEASUREMENTS`] measurements and at least one complete
    /// subgroup; otherwise the reason is returned and no limits exist.
    pub fn calculate(
        measurements: &[Measurement],
        sample_size: usize,
    ) -> Result<Self, InsufficientData> {
        if measurements.len() < MIN_MEASUREMENTS {
            return Err(InsufficientData::TooFewMeasurements {
                have: measurements.len(),
                need: MIN_MEASUREMENTS,
            });
        }

        let subgroup_stats = subgroup_statistics(measurements, sample_size);
        if subgroup_stats.is_empty() {
            return Err(InsufficientData::NoCompleteSubgroups { sample_size });
        }

        let constants = ControlConstants::for_sample_size(sample_size);
        Ok(Self::from_statistics(subgroup_stats, constants))
    }

    /// Compute limits from precomputed subgroup statistics.
    pub fn from_statistics(
        subgroup_stats: Vec<SubgroupStatistic>,
        constants: ControlConstants,
    ) -> Self {
        let means: Vec<f64> = subgroup_stats.iter().map(|s| s.mean).collect();
        let ranges: Vec<f64> = subgroup_stats.iter().map(|s| s.range).collect();
        let overall_mean = stats::mean(&means);
        let average_range = stats::mean(&ranges);

        let spread = constants.a2 * average_range;
        let x_chart = ChartLimits {
            center_line: overall_mean,
            upper_control_limit: overall_mean + spread,
            lower_control_limit: overall_mean - spread,
            upper_warning_limit: overall_mean + spread * WARNING_FRACTION,
            lower_warning_limit: overall_mean - spread * WARNING_FRACTION,
        };

        let r_chart = ChartLimits {
            center_line: average_range,
            upper_control_limit: constants.d4 * average_range,
            lower_control_limit: (constants.d3 * average_range).max(0.0),
            upper_warning_limit: constants.d4 * average_range * WARNING_FRACTION,
            lower_warning_limit: (constants.d3 * average_range * WARNING_FRACTION).max(0.0),
        };

        Self {
            x_chart,
            r_chart,
            subgroup_stats,
            constants,
            calculated_at: Utc::now(),
        }
    }

    /// Grand mean of the subgroup means.
    pub fn overall_mean(&self) -> f64 {
        self.x_chart.center_line
    }

    /// Mean subgroup range.
    pub fn average_range(&self) -> f64 {
        self.r_chart.center_line
    }

    /// Short-term sigma estimate `R̄ / d2`.
    pub fn sigma_estimate(&self) -> f64 {
        if self.constants.d2 > 0.0 {
            self.average_range() / self.constants.d2
        } else {
            0.0
        }
    }

    pub fn subgroup_count(&self) -> usize {
        self.subgroup_stats.len()
    }

    /// Indices of subgroups whose range exceeds the R chart UCL.
    pub fn ranges_beyond_control(&self) -> Vec<usize> {
        self.subgroup_stats
            .iter()
            .enumerate()
            .filter(|(_, s)| s.range > self.r_chart.upper_control_limit)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;

    fn measurements(values: &[f64]) -> Vec<Measurement> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let ts = Utc.timestamp_opt(1_700_000_000 + i as i64 * 60, 0).unwrap();
                Measurement::new(format!("m{}", i), *v, "H01", ts)
            })
            .collect()
    }

    fn wavy(len: usize) -> Vec<f64> {
        (0..len).map(|i| 10.0 + ((i * 7) % 5) as f64 * 0.1).collect()
    }

    #[test]
    fn test_too_few_measurements() {
        let data = measurements(&wavy(19));
        let err = ControlLimits::calculate(&data, 5).unwrap_err();
        assert_eq!(err, InsufficientData::TooFewMeasurements { have: 19, need: 20 });
    }

    #[test]
    fn test_no_complete_subgroup() {
        let data = measurements(&wavy(20));
        let err = ControlLimits::calculate(&data, 25).unwrap_err();
        assert_eq!(err, InsufficientData::NoCompleteSubgroups { sample_size: 25 });
    }

    #[test]
    fn test_xbar_limits_n5() {
        let data = measurements(&wavy(40));
        let limits = ControlLimits::calculate(&data, 5).unwrap();
        let r_bar = limits.average_range();

        assert_eq!(limits.subgroup_count(), 8);
        assert_relative_eq!(
            limits.x_chart.upper_control_limit - limits.x_chart.center_line,
            0.577 * r_bar,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            limits.x_chart.center_line - limits.x_chart.lower_control_limit,
            0.577 * r_bar,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            limits.x_chart.upper_warning_limit - limits.x_chart.center_line,
            0.577 * r_bar * 2.0 / 3.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_r_chart_limits() {
        let data = measurements(&wavy(40));
        let limits = ControlLimits::calculate(&data, 5).unwrap();
        let r_bar = limits.average_range();

        assert_relative_eq!(limits.r_chart.center_line, r_bar);
        assert_relative_eq!(limits.r_chart.upper_control_limit, 2.114 * r_bar);
        assert_eq!(limits.r_chart.lower_control_limit, 0.0);
        assert_eq!(limits.r_chart.lower_warning_limit, 0.0);
    }

    #[test]
    fn test_r_chart_lcl_non_negative() {
        for n in 2..=10 {
            let data = measurements(&wavy(60));
            let limits = ControlLimits::calculate(&data, n).unwrap();
            assert!(limits.r_chart.lower_control_limit >= 0.0);
            assert!(limits.r_chart.lower_warning_limit >= 0.0);
        }

        // Hand-built statistics with a negative range still clamp at zero.
        let stat = SubgroupStatistic {
            mean: 1.0,
            range: -4.0,
            timestamp: Utc::now(),
            machine: "H01".to_string(),
            values: vec![],
            size: 7,
        };
        let limits =
            ControlLimits::from_statistics(vec![stat], ControlConstants::for_sample_size(7));
        assert_eq!(limits.r_chart.lower_control_limit, 0.0);
        assert_eq!(limits.r_chart.lower_warning_limit, 0.0);
    }

    #[test]
    fn test_untabulated_size_uses_n5_constants() {
        let data = measurements(&wavy(36));
        let limits = ControlLimits::calculate(&data, 12).unwrap();
        assert_eq!(limits.subgroup_count(), 3);
        assert_eq!(limits.constants, ControlConstants::for_sample_size(5));
    }

    #[test]
    fn test_sigma_estimate() {
        let data = measurements(&wavy(40));
        let limits = ControlLimits::calculate(&data, 5).unwrap();
        assert_relative_eq!(limits.sigma_estimate(), limits.average_range() / 2.326);
    }

    #[test]
    fn test_is_beyond_control_is_strict() {
        let chart = ChartLimits {
            center_line: 0.0,
            upper_control_limit: 1.0,
            lower_control_limit: -1.0,
            upper_warning_limit: 0.5,
            lower_warning_limit: -0.5,
        };
        assert!(!chart.is_beyond_control(1.0));
        assert!(!chart.is_beyond_control(-1.0));
        assert!(chart.is_beyond_control(1.0001));
        assert!(chart.is_beyond_control(-1.0001));
    }

    #[test]
    fn test_ranges_beyond_control() {
        let mut values = vec![10.0; 40];
        values[35] = 30.0;
        let data = measurements(&values);
        let limits = ControlLimits::calculate(&data, 5).unwrap();
        assert_eq!(limits.ranges_beyond_control(), vec![7]);
    }
}
