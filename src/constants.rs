//! Control-chart constants for X-bar/R charts.
//!
//! Industry-standard factors for subgroup sizes 2 to 10. Sizes outside the
//! table use the n = 5 row.

use serde::{Deserialize, Serialize};

/// Factors for one subgroup size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlConstants {
    /// X-bar control limit factor.
    pub a2: f64,
    /// R chart lower limit factor.
    pub d3: f64,
    /// R chart upper limit factor.
    pub d4: f64,
    /// Mean of the relative range (sigma estimator).
    pub d2: f64,
}

/// Subgroup size whose row is used outside the table.
pub const DEFAULT_CONSTANTS_SIZE: usize = 5;

const fn row(a2: f64, d3: f64, d4: f64, d2: f64) -> ControlConstants {
    ControlConstants { a2, d3, d4, d2 }
}

const TABLE: [(usize, ControlConstants); 9] = [
    (2, row(1.880, 0.0, 3.267, 1.128)),
    (3, row(1.023, 0.0, 2.574, 1.693)),
    (4, row(0.729, 0.0, 2.282, 2.059)),
    (5, row(0.577, 0.0, 2.114, 2.326)),
    (6, row(0.483, 0.0, 2.004, 2.534)),
    (7, row(0.419, 0.076, 1.924, 2.704)),
    (8, row(0.373, 0.136, 1.864, 2.847)),
    (9, row(0.337, 0.184, 1.816, 2.970)),
    (10, row(0.308, 0.223, 1.777, 3.078)),
];

impl ControlConstants {
    /// Constants for subgroup size `n`, falling back to the n = 5 row.
    pub fn for_sample_size(n: usize) -> Self {
        Self::lookup(n).unwrap_or(TABLE[DEFAULT_CONSTANTS_SIZE - 2].1)
    }

    /// Exact table lookup.
    pub fn lookup(n: usize) -> Option<Self> {
        TABLE.iter().find(|(size, _)| *size == n).map(|(_, c)| *c)
    }

    /// Whether `n` has its own row.
    pub fn is_tabulated(n: usize) -> bool {
        Self::lookup(n).is_some()
    }
}
