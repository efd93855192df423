//! Histogram of measurement values for the distribution chart.

use crate::stats;
use serde::{Deserialize, Serialize};

/// Upper bound on the number of bins.
pub const MAX_BINS: usize = 20;

/// One histogram bin `[lower, upper)`. The last bin is closed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

impl Bin {
    /// Midpoint, used as the bar label.
    pub fn center(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }
}

/// Equal-width histogram between the smallest and largest value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub min: f64,
    pub max: f64,
    pub bin_width: f64,
    pub bins: Vec<Bin>,
}

impl Distribution {
    /// Histogram of `values` with `min(20, ceil(sqrt(len)))` bins.
    ///
    /// `None` for an empty input or when every value is equal.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let (min, max) = stats::min_max(values);
        if max <= min {
            return None;
        }

        let bin_count = bin_count(values.len());
        let bin_width = (max - min) / bin_count as f64;
        let mut bins: Vec<Bin> = (0..bin_count)
            .map(|i| Bin {
                lower: min + i as f64 * bin_width,
                upper: min + (i + 1) as f64 * bin_width,
                count: 0,
            })
            .collect();

        for &v in values {
            let index = (((v - min) / bin_width) as usize).min(bin_count - 1);
            bins[index].count += 1;
        }

        Some(Self {
            min,
            max,
            bin_width,
            bins,
        })
    }

    /// Total number of values counted.
    pub fn total(&self) -> usize {
        self.bins.iter().map(|b| b.count).sum()
    }

    pub fn counts(&self) -> Vec<usize> {
        self.bins.iter().map(|b| b.count).collect()
    }
}

/// `min(MAX_BINS, ceil(sqrt(len)))`.
pub fn bin_count(len: usize) -> usize {
    ((len as f64).sqrt().ceil() as usize).clamp(1, MAX_BINS)
}
