//! Small descriptive-statistics helpers shared by the calculators.

/// Arithmetic mean. `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (divisor `n - 1`). `0.0` below two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// `max - min`. `0.0` for an empty slice.
pub fn range(values: &[f64]) -> f64 {
    let (min, max) = min_max(values);
    max - min
}

/// Minimum and maximum. `(0.0, 0.0)` for an empty slice.
pub fn min_max(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Round to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), 0.0);
        assert_relative_eq!(mean(&[1.0, 2.0, 3.0, 4.0]), 2.5);
    }

    #[test]
    fn test_sample_std_dev() {
        assert_eq!(sample_std_dev(&[5.0]), 0.0);
        // Variance with n-1: ((-2)^2 + 0 + 2^2) / 2 = 4
        assert_relative_eq!(sample_std_dev(&[1.0, 3.0, 5.0]), 2.0);
        assert_eq!(sample_std_dev(&[7.0, 7.0, 7.0]), 0.0);
    }

    #[test]
    fn test_range_and_min_max() {
        assert_eq!(range(&[]), 0.0);
        assert_eq!(min_max(&[3.0, -1.0, 8.0]), (-1.0, 8.0));
        assert_relative_eq!(range(&[3.0, -1.0, 8.0]), 9.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 3), 1.235);
        assert_eq!(round_to(-0.0004, 3), 0.0);
        assert_eq!(round_to(2.0, 3), 2.0);
    }
}
