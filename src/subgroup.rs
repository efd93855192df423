//! Subgroup building and per-subgroup statistics.

use crate::measurement::Measurement;
use crate::stats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A complete, contiguous slice of the measurement sequence.
pub type Subgroup<'a> = &'a [Measurement];

/// Partition `measurements` into consecutive subgroups of exactly
/// `sample_size` elements, starting at index 0. The trailing remainder is
/// dropped. Composition is purely positional: callers sort first.
pub fn build_subgroups(measurements: &[Measurement], sample_size: usize) -> Vec<Subgroup<'_>> {
    if sample_size == 0 {
        return Vec::new();
    }
    measurements.chunks_exact(sample_size).collect()
}

/// Statistics of one subgroup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgroupStatistic {
    pub mean: f64,
    pub range: f64,
    /// Timestamp of the first member.
    pub timestamp: DateTime<Utc>,
    /// Machine of the first member.
    pub machine: String,
    pub values: Vec<f64>,
    pub size: usize,
}

impl SubgroupStatistic {
    /// Compute statistics for a non-empty subgroup.
    pub fn from_subgroup(subgroup: Subgroup<'_>) -> Option<Self> {
        let first = subgroup.first()?;
        let values: Vec<f64> = subgroup.iter().map(|m| m.value).collect();
        Some(Self {
            mean: stats::mean(&values),
            range: stats::range(&values),
            timestamp: first.timestamp,
            machine: first.machine.clone(),
            size: values.len(),
            values,
        })
    }
}

/// Subgroup and summarise in one pass.
pub fn subgroup_statistics(
    measurements: &[Measurement],
    sample_size: usize,
) -> Vec<SubgroupStatistic> {
    build_subgroups(measurements, sample_size)
        .into_iter()
        .filter_map(SubgroupStatistic::from_subgroup)
        .collect()
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
                Measurement::new(format!("m{}", i), *v, format!("H{:02}", i % 3 + 1), ts)
            })
            .collect()
    }

    #[test]
    fn test_partition_drops_remainder() {
        let data = measurements(&[1.0; 12]);
        let groups = build_subgroups(&data, 5);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.len() == 5));
        assert_eq!(groups[1][0].id, "m5");
    }

    #[test]
    fn test_short_input_yields_nothing() {
        let data = measurements(&[1.0, 2.0, 3.0]);
        assert!(build_subgroups(&data, 5).is_empty());
        assert!(build_subgroups(&data, 0).is_empty());
    }

    #[test]
    fn test_subgroup_count_is_floor() {
        for len in 0..23 {
            let data = measurements(&vec![1.0; len]);
            for n in 1..=6 {
                assert_eq!(build_subgroups(&data, n).len(), len / n);
            }
        }
    }

    #[test]
    fn test_statistics() {
        let data = measurements(&[2.0, 4.0, 6.0, 8.0, 10.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let stats = subgroup_statistics(&data, 5);
        assert_eq!(stats.len(), 2);
        assert_relative_eq!(stats[0].mean, 6.0);
        assert_relative_eq!(stats[0].range, 8.0);
        assert_eq!(stats[0].timestamp, data[0].timestamp);
        assert_eq!(stats[0].machine, data[0].machine);
        assert_eq!(stats[0].size, 5);
        assert_relative_eq!(stats[1].range, 0.0);
    }

    #[test]
    fn test_empty_subgroup_has_no_statistic() {
        assert!(SubgroupStatistic::from_subgroup(&[]).is_none());
    }
}
