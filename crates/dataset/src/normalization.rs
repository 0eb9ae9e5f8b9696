//! Z-score normalization statistics.
//!
//! Fitted once on the train slice and applied unchanged to every other
//! slice and at inference time.

use forecast_core::{Error, Result};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Default additive epsilon in the denominator.
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Per-column mean and population std.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationStats {
    /// Always `"zscore"`.
    #[serde(rename = "type", default = "zscore_tag")]
    pub kind: String,
    pub mean: Vec<f64>,
    /// Raw population std; `epsilon` is added when applying.
    pub std: Vec<f64>,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

fn zscore_tag() -> String {
    "zscore".to_string()
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

impl NormalizationStats {
    /// Fit on a row-major matrix.
    pub fn fit(rows: &[Vec<f64>], epsilon: f64) -> Result<Self> {
        let width = match rows.first() {
            Some(first) => first.len(),
            None => return Err(Error::insufficient_data("cannot fit normalization on zero rows")),
        };
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(Error::data(format!(
                "row {bad} has {} columns, expected {width}",
                rows[bad].len()
            )));
        }

        let mut mean = Vec::with_capacity(width);
        let mut std = Vec::with_capacity(width);
        for col in 0..width {
            let column: Vec<f64> = rows.iter().map(|r| r[col]).collect();
            mean.push(column.iter().mean());
            std.push(column.iter().population_std_dev());
        }

        Ok(Self {
            kind: zscore_tag(),
            mean,
            std,
            epsilon,
        })
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    /// Check the stats are usable for vectors of `width` columns.
    pub fn validate(&self, width: usize) -> Result<()> {
        if self.kind != "zscore" {
            return Err(Error::config(format!(
                "unsupported normalization type '{}'",
                self.kind
            )));
        }
        if self.mean.len() != width || self.std.len() != width {
            return Err(Error::schema(format!(
                "normalization has {}/{} mean/std entries for {width} features",
                self.mean.len(),
                self.std.len()
            )));
        }
        Ok(())
    }

    /// `(x - mean) / (std + epsilon)` per column.
    pub fn apply(&self, features: &[f64]) -> Result<Vec<f64>> {
        self.validate(features.len())?;
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (m, s))| (x - m) / (s + self.epsilon))
            .collect())
    }

    /// Apply to every row of a matrix.
    pub fn apply_rows(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.apply(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_population_stats() {
        let rows = vec![vec![1.0, 10.0], vec![2.0, 10.0], vec![3.0, 10.0]];
        let stats = NormalizationStats::fit(&rows, DEFAULT_EPSILON).unwrap();

        assert_relative_eq!(stats.mean[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(stats.std[0], (2.0_f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(stats.mean[1], 10.0, epsilon = 1e-12);
        assert_relative_eq!(stats.std[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_apply_adds_epsilon() {
        let stats = NormalizationStats {
            kind: "zscore".to_string(),
            mean: vec![1.0, 5.0],
            std: vec![2.0, 0.0],
            epsilon: 1e-6,
        };
        let out = stats.apply(&[3.0, 5.0]).unwrap();
        assert_relative_eq!(out[0], 2.0 / (2.0 + 1e-6), epsilon = 1e-15);
        assert_eq!(out[1], 0.0);
        assert!(stats.apply(&[1.0]).is_err());
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        assert!(NormalizationStats::fit(&[], DEFAULT_EPSILON).is_err());
        assert!(NormalizationStats::fit(&[vec![1.0, 2.0], vec![1.0]], DEFAULT_EPSILON).is_err());
    }

    #[test]
    fn test_serde_shape() {
        let json = r#"{"type": "zscore", "mean": [0.0], "std": [1.0], "epsilon": 1e-6}"#;
        let stats: NormalizationStats = serde_json::from_str(json).unwrap();
        assert_eq!(stats.width(), 1);

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["type"], "zscore");

        let bad = NormalizationStats {
            kind: "minmax".to_string(),
            ..stats
        };
        assert!(bad.validate(1).is_err());
    }
}
