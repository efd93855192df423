// SPC Monitor - Monitoring loop and data sources for the SPC engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Synthetic demonstration data.
//!
//! Hourly readings around a nominal value with uniform noise and a slow
//! sinusoidal drift, spread over ten machines.

use crate::source::MeasurementSource;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use spc::{Measurement, SourceError, Specification, TimeWindow};

/// Demo generator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoConfig {
    /// Number of readings.
    pub count: usize,
    /// Nominal value.
    pub base_value: f64,
    /// Tolerance as a fraction of the nominal value.
    pub tolerance_fraction: f64,
    /// Spacing between readings (seconds).
    pub interval_secs: i64,
    /// Number of machines readings rotate over.
    pub machines: usize,
    /// Random seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            count: 100,
            base_value: 100.0,
            tolerance_fraction: 0.05,
            interval_secs: 3600,
            machines: 10,
            seed: None,
        }
    }
}

impl DemoConfig {
    /// Builder: fix the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Specification envelope shared by every reading.
    pub fn specification(&self) -> Specification {
        Specification::symmetric(self.base_value, self.base_value * self.tolerance_fraction)
    }
}

/// Generate readings whose last one falls one interval before `now`.
pub fn generate(config: &DemoConfig, now: DateTime<Utc>) -> Vec<Measurement> {
    let mut rng: StdRng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let spec = config.specification();
    let tolerance = config.base_value * config.tolerance_fraction;
    let machines = config.machines.max(1);

    (0..config.count)
        .map(|i| {
            let offset = (config.count - i) as i64 * config.interval_secs;
            let timestamp = now - Duration::seconds(offset);
            let noise = (rng.gen::<f64>() - 0.5) * tolerance * 0.8;
            let drift = (i as f64 / 20.0).sin() * tolerance * 0.2;
            let value = spc::stats::round_to(config.base_value + noise + drift, 2);

            Measurement::new(
                format!("synthetic-{}", i),
                value,
                format!("H{:02}", i % machines + 1),
                timestamp,
            )
            .with_specification(spec)
        })
        .collect()
}

/// Measurement source over a fixed set of generated readings.
#[derive(Debug, Clone)]
pub struct DemoSource {
    measurements: Vec<Measurement>,
}

impl DemoSource {
    /// Generate readings anchored at the current time.
    pub fn new(config: DemoConfig) -> Self {
        Self::anchored(config, Utc::now())
    }

    /// Generate readings anchored at `now`.
    pub fn anchored(config: DemoConfig, now: DateTime<Utc>) -> Self {
        Self {
            measurements: generate(&config, now),
        }
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }
}

#[async_trait]
impl MeasurementSource for DemoSource {
    fn name(&self) -> &str {
        "demo"
    }

    async fn fetch_measurements(
        &self,
        window: TimeWindow,
        limit: usize,
    ) -> Result<Vec<Measurement>, SourceError> {
        Ok(self
            .measurements
            .iter()
            .filter(|m| window.contains(m.timestamp))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_shape() {
        let config = DemoConfig::default().with_seed(7);
        let data = generate(&config, now());

        assert_eq!(data.len(), 100);
        assert_eq!(data[0].id, "synthetic-0");
        assert_eq!(data[0].machine, "H01");
        assert_eq!(data[9].machine, "H10");
        assert_eq!(data[10].machine, "H01");
        assert_eq!(data[99].timestamp, now() - Duration::hours(1));
        assert!(data.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_values_stay_inside_specification() {
        let config = DemoConfig::default().with_seed(42);
        let spec = config.specification();
        assert_eq!(spec.upper_limit, 105.0);
        assert_eq!(spec.lower_limit, 95.0);

        // noise <= 2.0 and drift <= 1.0 around 100
        for m in generate(&config, now()) {
            assert!(m.value > 96.9 && m.value < 103.1, "value {}", m.value);
            assert_eq!(m.specification, Some(spec));
        }
    }

    #[test]
    fn test_seed_is_reproducible() {
        let config = DemoConfig::default().with_seed(3);
        assert_eq!(generate(&config, now()), generate(&config, now()));
    }

    #[tokio::test]
    async fn test_demo_source_window() {
        let source = DemoSource::anchored(DemoConfig::default().with_seed(1), now());
        let window = TimeWindow::ending_at(now(), Duration::hours(24));
        let recent = source.fetch_measurements(window, 1000).await.unwrap();
        assert_eq!(recent.len(), 24);
        assert_eq!(source.measurements().len(), 100);
    }
}
