//! Window and lag helpers over a date-ordered column.

use super::Metric;

/// Arithmetic mean. Returns 0.0 for empty input.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// First difference of a cumulative column, floored at 0.
///
/// The first element has no prior day, so its delta is the first cumulative
/// value itself. Returns the floored deltas and the `(index, raw_delta)` of
/// every position that had to be floored.
pub fn daily_deltas(cumulative: &[i64]) -> (Vec<i64>, Vec<(usize, i64)>) {
    let mut deltas = Vec::with_capacity(cumulative.len());
    let mut floored = Vec::new();

    for (i, &value) in cumulative.iter().enumerate() {
        let raw = match i {
            0 => value,
            _ => value - cumulative[i - 1],
        };
        if raw < 0 {
            floored.push((i, raw));
        }
        deltas.push(raw.max(0));
    }

    (deltas, floored)
}

/// Strict trailing mean over `window` points.
///
/// The first `window - 1` positions are [`Metric::InsufficientHistory`].
pub fn trailing_mean(values: &[i64], window: usize) -> Vec<Metric> {
    (0..values.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                return Metric::InsufficientHistory;
            }
            let slice: Vec<f64> = values[i + 1 - window..=i].iter().map(|v| *v as f64).collect();
            Metric::Value(mean(&slice))
        })
        .collect()
}

/// Applies `f(current, lagged)` at every position that has a value `lag`
/// steps back. Earlier positions are [`Metric::InsufficientHistory`].
pub fn lagged<F>(values: &[i64], lag: usize, f: F) -> Vec<Metric>
where
    F: Fn(i64, i64) -> Metric,
{
    (0..values.len())
        .map(|i| {
            if i < lag {
                Metric::InsufficientHistory
            } else {
                f(values[i], values[i - lag])
            }
        })
        .collect()
}

/// Keeps the last `keep` defined values and marks older defined values
/// [`Metric::Undefined`].
pub fn keep_most_recent(metrics: &mut [Metric], keep: usize) {
    let mut seen = 0;
    for m in metrics.iter_mut().rev() {
        if m.is_defined() {
            if seen >= keep {
                *m = Metric::Undefined;
            }
            seen += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_deltas_first_element_is_cumulative() {
        let (deltas, floored) = daily_deltas(&[10, 10, 25, 40]);
        assert_eq!(deltas, vec![10, 0, 15, 15]);
        assert!(floored.is_empty());
    }

    #[test]
    fn test_daily_deltas_floor_corrections() {
        let (deltas, floored) = daily_deltas(&[5, 9, 7, 12]);
        assert_eq!(deltas, vec![5, 4, 0, 5]);
        assert_eq!(floored, vec![(2, -2)]);
    }

    #[test]
    fn test_trailing_mean_absent_until_window_full() {
        let values = [1, 2, 3, 4, 5, 6, 7, 8, 20];
        let means = trailing_mean(&values, 7);

        for m in &means[..6] {
            assert_eq!(*m, Metric::InsufficientHistory);
        }
        assert_eq!(means[6], Metric::Value(4.0));
        assert_eq!(means[7], Metric::Value(5.0));
        assert_eq!(means[8], Metric::Value((3 + 4 + 5 + 6 + 7 + 8 + 20) as f64 / 7.0));
    }

    #[test]
    fn test_trailing_mean_short_series() {
        let means = trailing_mean(&[3, 3, 3], 7);
        assert!(means.iter().all(|m| *m == Metric::InsufficientHistory));
    }

    #[test]
    fn test_lagged_marks_missing_history() {
        let out = lagged(&[1, 2, 4], 1, |cur, base| Metric::Value((cur - base) as f64));
        assert_eq!(
            out,
            vec![Metric::InsufficientHistory, Metric::Value(1.0), Metric::Value(2.0)]
        );
    }

    #[test]
    fn test_keep_most_recent() {
        let mut metrics = vec![
            Metric::Value(1.0),
            Metric::Value(2.0),
            Metric::Undefined,
            Metric::Value(3.0),
            Metric::Value(4.0),
        ];
        keep_most_recent(&mut metrics, 2);
        assert_eq!(
            metrics,
            vec![
                Metric::Undefined,
                Metric::Undefined,
                Metric::Undefined,
                Metric::Value(3.0),
                Metric::Value(4.0),
            ]
        );
    }

    #[test]
    fn test_mean_empty() {
        assert_eq!(mean(&[]), 0.0);
    }
}
