//! Pure summary statistics over a window snapshot.

/// Summary statistics derived from one endpoint's buffered durations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p95: f64,
}

impl Aggregate {
    /// All-zero placeholder used before any samples are recorded.
    pub const ZERO: Self = Self {
        avg: 0.0,
        min: 0.0,
        max: 0.0,
        p95: 0.0,
    };
}

/// Computes mean, extrema, and the 95th percentile of `samples`.
///
/// The percentile uses the nearest-rank method: sort ascending, take the
/// value at 1-indexed rank `ceil(0.95 * n)`, clamped to the valid range.
/// No interpolation; fixtures with known inputs produce exact outputs.
/// An empty slice yields [`Aggregate::ZERO`] rather than an error.
pub fn aggregate(samples: &[f64]) -> Aggregate {
    if samples.is_empty() {
        return Aggregate::ZERO;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let sum: f64 = sorted.iter().sum();

    let rank = (0.95 * n as f64).ceil() as usize;
    let idx = rank.saturating_sub(1).min(n - 1);

    Aggregate {
        avg: sum / n as f64,
        min: sorted[0],
        max: sorted[n - 1],
        p95: sorted[idx],
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_is_all_zero() {
        assert_eq!(aggregate(&[]), Aggregate::ZERO);
    }

    #[test]
    fn full_window_fixture() {
        // The last 100 of durations 1..=150: exactly {51..150}.
        let samples: Vec<f64> = (51..=150).map(f64::from).collect();
        let stats = aggregate(&samples);

        assert_eq!(stats.min, 51.0);
        assert_eq!(stats.max, 150.0);
        assert_eq!(stats.avg, 100.5);
        // ceil(0.95 * 100) = 95, so the 95th smallest of {51..150} = 145.
        assert_eq!(stats.p95, 145.0);
    }

    #[test]
    fn single_sample() {
        let stats = aggregate(&[42.0]);
        assert_eq!(stats.avg, 42.0);
        assert_eq!(stats.min, 42.0);
        assert_eq!(stats.max, 42.0);
        assert_eq!(stats.p95, 42.0);
    }

    #[test]
    fn nearest_rank_small_sets() {
        // n = 20: rank = ceil(19.0) = 19, so the 19th smallest.
        let samples: Vec<f64> = (1..=20).map(f64::from).collect();
        assert_eq!(aggregate(&samples).p95, 19.0);

        // n = 10: rank = ceil(9.5) = 10, so the largest.
        let samples: Vec<f64> = (1..=10).map(f64::from).collect();
        assert_eq!(aggregate(&samples).p95, 10.0);
    }

    #[test]
    fn input_order_does_not_matter() {
        let stats = aggregate(&[9.0, 1.0, 5.0, 3.0, 7.0]);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.avg, 5.0);
        assert_eq!(stats.p95, 9.0);
    }
}
