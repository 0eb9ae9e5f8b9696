//! Scoring artifact seam.
//!
//! The pipeline never fits models. It only needs something that maps a
//! normalized feature vector to per-horizon deltas.

use forecast_core::io::write_json_atomic;
use forecast_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A fitted scoring function.
pub trait Scorer {
    /// Number of outputs (per-step deltas).
    fn horizon(&self) -> usize;

    /// Number of inputs.
    fn feature_count(&self) -> usize;

    /// Score one normalized feature vector.
    fn score(&self, features: &[f64]) -> Result<Vec<f64>>;
}

/// Linear scoring artifact: `out[h] = intercepts[h] + sum_j coefficients[h][j] * x[j]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearScorer {
    /// `[horizon][feature_count]`.
    pub coefficients: Vec<Vec<f64>>,
    /// `[horizon]`.
    pub intercepts: Vec<f64>,
}

impl LinearScorer {
    pub fn new(coefficients: Vec<Vec<f64>>, intercepts: Vec<f64>) -> Result<Self> {
        let scorer = Self {
            coefficients,
            intercepts,
        };
        scorer.validate()?;
        Ok(scorer)
    }

    /// Load and validate a JSON artifact.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let scorer: LinearScorer = serde_json::from_str(&text)?;
        scorer.validate()?;
        Ok(scorer)
    }

    pub fn save(&self, path: &Path, pretty: bool) -> Result<()> {
        write_json_atomic(path, self, pretty)
    }

    fn validate(&self) -> Result<()> {
        if self.coefficients.is_empty() {
            return Err(Error::config("linear scorer has no outputs"));
        }
        if self.coefficients.len() != self.intercepts.len() {
            return Err(Error::config(format!(
                "linear scorer has {} coefficient rows but {} intercepts",
                self.coefficients.len(),
                self.intercepts.len()
            )));
        }
        let width = self.coefficients[0].len();
        if width == 0 || self.coefficients.iter().any(|row| row.len() != width) {
            return Err(Error::config("linear scorer coefficient rows must share a non-zero width"));
        }
        Ok(())
    }
}

impl Scorer for LinearScorer {
    fn horizon(&self) -> usize {
        self.intercepts.len()
    }

    fn feature_count(&self) -> usize {
        self.coefficients.first().map_or(0, Vec::len)
    }

    fn score(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.feature_count() {
            return Err(Error::schema(format!(
                "scorer expects {} features, got {}",
                self.feature_count(),
                features.len()
            )));
        }
        Ok(self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(row, b)| b + row.iter().zip(features).map(|(w, x)| w * x).sum::<f64>())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_score() {
        let scorer = LinearScorer::new(vec![vec![1.0, 2.0], vec![0.0, -1.0]], vec![0.5, 1.0]).unwrap();
        assert_eq!(scorer.horizon(), 2);
        assert_eq!(scorer.feature_count(), 2);
        assert_eq!(scorer.score(&[3.0, 4.0]).unwrap(), vec![11.5, -3.0]);
        assert!(scorer.score(&[1.0]).is_err());
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(LinearScorer::new(vec![], vec![]).is_err());
        assert!(LinearScorer::new(vec![vec![1.0]], vec![0.0, 1.0]).is_err());
        assert!(LinearScorer::new(vec![vec![1.0], vec![1.0, 2.0]], vec![0.0, 1.0]).is_err());
    }

    #[test]
    fn test_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linear.json");
        let scorer = LinearScorer::new(vec![vec![0.25; 3]], vec![1.0]).unwrap();
        scorer.save(&path, false).unwrap();
        assert_eq!(LinearScorer::load(&path).unwrap(), scorer);

        fs::write(&path, r#"{"coefficients": [[1.0]], "intercepts": []}"#).unwrap();
        assert!(LinearScorer::load(&path).is_err());
    }
}
