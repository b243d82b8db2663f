use serde::{Deserialize, Serialize};

/// Index-based quantile over an ascending-sorted slice: `floor(len * p)`,
/// clamped to the last element. No interpolation — the displayed numbers
/// must match the historical charts, so the simple selection is kept even
/// for even-length lists.
pub fn quantile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    let idx = ((sorted_values.len() as f64) * p).floor() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}

pub fn median(sorted_values: &[f64]) -> f64 {
    quantile(sorted_values, 0.5)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median absolute deviation: median of `|v - median|` over the same list.
pub fn mad(sorted_values: &[f64]) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    let m = median(sorted_values);
    let mut deviations: Vec<f64> = sorted_values.iter().map(|v| (v - m).abs()).collect();
    deviations.sort_by(|a, b| a.total_cmp(b));
    median(&deviations)
}

pub fn sorted_ascending(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Five-number summary plus mean, computed with the same index-based
/// quantile selection as the median.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BoxStats {
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

impl BoxStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let sorted = sorted_ascending(values);
        Self {
            count: sorted.len(),
            min: sorted[0],
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
            mean: mean(&sorted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_inputs_are_zero() {
        assert_eq!(quantile(&[], 0.5), 0.0);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mad(&[]), 0.0);
        let stats = BoxStats::from_values(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.median, 0.0);
    }

    #[test]
    fn test_median_odd_length() {
        assert_eq!(median(&[100.0, 200.0, 300.0]), 200.0);
    }

    #[test]
    fn test_median_even_length_uses_floor_index_not_interpolation() {
        // floor(4 * 0.5) = index 2, not the interpolated 250
        assert_eq!(median(&[100.0, 200.0, 300.0, 400.0]), 300.0);
    }

    #[test]
    fn test_quantile_clamps_to_last() {
        assert_eq!(quantile(&[1.0, 2.0, 3.0], 1.0), 3.0);
    }

    #[test]
    fn test_box_stats_quartiles() {
        let stats = BoxStats::from_values(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.q1, 2.0); // floor(4 * 0.25) = index 1
        assert_eq!(stats.median, 3.0); // floor(4 * 0.5) = index 2
        assert_eq!(stats.q3, 4.0); // floor(4 * 0.75) = index 3
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.mean, 2.5);
    }

    #[test]
    fn test_mad() {
        // median = 300; deviations [200, 100, 0, 100, 200] -> sorted
        // [0, 100, 100, 200, 200], median = 100
        let sorted = [100.0, 200.0, 300.0, 400.0, 500.0];
        assert_eq!(mad(&sorted), 100.0);
    }

    #[test]
    fn test_mad_single_value() {
        assert_eq!(mad(&[42.0]), 0.0);
    }
}
