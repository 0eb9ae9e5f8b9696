//! Window statistics shared by the feature strategies.
//!
//! All standard deviations are population (divide by N). EMAs use the
//! two-term recursion seeded with the first value.

use forecast_core::{log_return, simple_return};
use std::collections::VecDeque;

/// Trailing population standard deviation over a fixed window.
///
/// Each reading recomputes mean and variance from the buffered values
/// (two passes), so no running-sum drift accumulates over long series.
#[derive(Debug, Clone)]
pub struct RollingStd {
    /// Window size in periods.
    window: usize,
    /// Most recent values, oldest first.
    values: VecDeque<f64>,
}

impl RollingStd {
    /// Create a new rolling std over `window` values.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            values: VecDeque::with_capacity(window),
        }
    }

    /// Add a value. Returns the std once the window is full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        if self.values.len() >= self.window {
            self.values.pop_front();
        }
        self.values.push_back(value);
        self.std()
    }

    /// Current std, `None` until the window is full.
    pub fn std(&self) -> Option<f64> {
        if !self.is_ready() || self.window == 0 {
            return None;
        }
        let n = self.values.len() as f64;
        let mean = self.values.iter().sum::<f64>() / n;
        let sq: f64 = self.values.iter().map(|v| (v - mean) * (v - mean)).sum();
        Some((sq / n).sqrt())
    }

    /// Check if the window is full.
    pub fn is_ready(&self) -> bool {
        self.values.len() >= self.window
    }

    /// Number of buffered values.
    pub fn count(&self) -> usize {
        self.values.len()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Trailing std for every position of `values`; `None` until the window is full.
pub fn rolling_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut roll = RollingStd::new(window);
    values.iter().map(|&v| roll.push(v)).collect()
}

/// EMA smoothing factor for a span.
#[inline]
pub fn ema_alpha(span: usize) -> f64 {
    2.0 / (span as f64 + 1.0)
}

/// EMA at every position: `ema[0] = values[0]`,
/// `ema[i] = alpha * values[i] + (1 - alpha) * ema[i - 1]`.
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = ema_alpha(span);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => alpha * v + (1.0 - alpha) * p,
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

/// Final EMA value of `values`, seeded with its first element.
pub fn ema_last(values: &[f64], span: usize) -> Option<f64> {
    let alpha = ema_alpha(span);
    let (&first, rest) = values.split_first()?;
    Some(rest.iter().fold(first, |ema, &v| alpha * v + (1.0 - alpha) * ema))
}

/// Arithmetic mean; NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (two-pass); NaN for an empty slice.
pub fn population_std(values: &[f64]) -> f64 {
    let m = mean(values);
    let sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sq / values.len() as f64).sqrt()
}

/// Last `n` elements of `values` (all of them when shorter).
#[inline]
pub fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}

/// Per-step log returns aligned with `closes`; index 0 is 0.0.
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(closes.len());
    if closes.is_empty() {
        return out;
    }
    out.push(0.0);
    out.extend(closes.windows(2).map(|w| log_return(w[0], w[1])));
    out
}

/// Pairwise simple returns, one per consecutive pair (`len - 1` values).
pub fn simple_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| simple_return(w[0], w[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_not_ready() {
        let roll = RollingStd::new(20);
        assert!(!roll.is_ready());
        assert!(roll.std().is_none());
    }

    #[test]
    fn test_rolling_window_drops_oldest() {
        let mut roll = RollingStd::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            roll.push(v);
        }
        assert_eq!(roll.count(), 3);
        // Window is [2, 3, 4].
        assert_relative_eq!(roll.std().unwrap(), (2.0_f64 / 3.0).sqrt(), epsilon = 1e-12);

        roll.clear();
        assert_eq!(roll.count(), 0);
    }

    #[test]
    fn test_rolling_std_series() {
        let out = rolling_std(&[1.0, 1.0, 3.0, 3.0], 2);
        assert_eq!(out[0], None);
        assert_relative_eq!(out[1].unwrap(), 0.0);
        assert_relative_eq!(out[2].unwrap(), 1.0);
        assert_relative_eq!(out[3].unwrap(), 0.0);
    }

    #[test]
    fn test_ema_two_points() {
        let (a, b, span) = (100.0, 110.0, 10);
        let alpha = 2.0 / (span as f64 + 1.0);
        let expected = alpha * b + (1.0 - alpha) * a;

        let series = ema_series(&[a, b], span);
        assert_eq!(series[0], a);
        assert_eq!(series[1], expected);
        assert_eq!(ema_last(&[a, b], span), Some(expected));
        assert_eq!(ema_last(&[], span), None);
    }

    #[test]
    fn test_population_std() {
        assert_relative_eq!(population_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0);
        assert_relative_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
    }

    #[test]
    fn test_returns() {
        let closes = [100.0, 110.0, 0.0, 5.0];
        let lr = log_returns(&closes);
        assert_eq!(lr.len(), 4);
        assert_eq!(lr[0], 0.0);
        assert_relative_eq!(lr[1], 1.1_f64.ln(), epsilon = 1e-12);
        assert_eq!(lr[2], 0.0);
        assert_eq!(lr[3], 0.0);

        let sr = simple_returns(&closes);
        assert_eq!(sr.len(), 3);
        assert_relative_eq!(sr[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(sr[1], -1.0);
        assert_eq!(sr[2], 0.0);
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail(&[1.0, 2.0, 3.0], 2), &[2.0, 3.0]);
        assert_eq!(tail(&[1.0], 5), &[1.0]);
    }
}
