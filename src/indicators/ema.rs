// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// Formula:
//   k     = 2 / (period + 1)
//   EMA_t = close_t * k + EMA_{t-1} * (1 - k)
//
// Seeding differs by caller:
//   - Cold start (full history): the first value seeds itself, EMA_0 = close_0.
//   - Prior (incremental): the recurrence continues from a stored EMA. A stored
//     `None` propagates as `None` to every following bar; it never recovers and
//     is never coerced to zero.
// =============================================================================

/// Where an EMA scan starts from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EmaSeed {
    /// No prior value: the first input seeds the series.
    ColdStart,
    /// Continue from the EMA of the bar immediately before the input.
    Prior(Option<f64>),
}

/// Smoothing constant `2 / (period + 1)`.
#[inline]
pub fn smoothing(period: u32) -> f64 {
    2.0 / (f64::from(period) + 1.0)
}

/// One step of the recurrence. `None` in either input yields `None`.
#[inline]
pub fn ema_step(value: Option<f64>, prior: Option<f64>, k: f64) -> Option<f64> {
    Some(value? * k + prior? * (1.0 - k))
}

/// EMA series over `values`, one output per input.
pub fn ema_series(values: &[Option<f64>], period: u32, seed: EmaSeed) -> Vec<Option<f64>> {
    let k = smoothing(period);
    let (mut prior, mut cold) = match seed {
        EmaSeed::ColdStart => (None, true),
        EmaSeed::Prior(p) => (p, false),
    };

    values
        .iter()
        .map(|&value| {
            let next = if cold {
                cold = false;
                value
            } else {
                ema_step(value, prior, k)
            };
            prior = next;
            next
        })
        .collect()
}

/// Convenience wrapper for a plain close series.
pub fn ema_of_closes(closes: &[f64], period: u32, seed: EmaSeed) -> Vec<Option<f64>> {
    let values: Vec<Option<f64>> = closes.iter().copied().map(Some).collect();
    ema_series(&values, period, seed)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smoothing_constant() {
        assert!((smoothing(3) - 0.5).abs() < 1e-15);
        assert!((smoothing(9) - 0.2).abs() < 1e-15);
    }

    #[test]
    fn cold_start_known_values() {
        let ema = ema_of_closes(&[10.0, 20.0, 30.0, 40.0], 3, EmaSeed::ColdStart);
        assert_eq!(ema, vec![Some(10.0), Some(15.0), Some(22.5), Some(31.25)]);
    }

    #[test]
    fn empty_input() {
        assert!(ema_of_closes(&[], 5, EmaSeed::ColdStart).is_empty());
    }

    #[test]
    fn prior_seed_continues_recurrence() {
        // Seeding with the cold-start value at bar 1 reproduces bars 2..
        let ema = ema_of_closes(&[30.0, 40.0], 3, EmaSeed::Prior(Some(15.0)));
        assert_eq!(ema, vec![Some(22.5), Some(31.25)]);
    }

    #[test]
    fn null_seed_never_recovers() {
        let ema = ema_of_closes(&[1.0, 2.0, 3.0], 3, EmaSeed::Prior(None));
        assert_eq!(ema, vec![None, None, None]);
    }

    #[test]
    fn null_value_propagates_forward() {
        let values = [Some(10.0), None, Some(30.0), Some(40.0)];
        let ema = ema_series(&values, 3, EmaSeed::ColdStart);
        assert_eq!(ema, vec![Some(10.0), None, None, None]);
    }

    #[test]
    fn step_matches_series() {
        let k = smoothing(5);
        let series = ema_of_closes(&[100.0, 101.0, 99.5], 5, EmaSeed::ColdStart);
        let stepped = ema_step(Some(99.5), series[1], k);
        assert_eq!(stepped, series[2]);
    }
}
