//! Golden test-vector generation and verification.
//!
//! Each case recomputes the fixed ten-feature vector from a bounded tail,
//! normalizes it with the persisted train statistics and scores it. An
//! independent inference runtime must reproduce the recorded outputs within
//! the recorded tolerances.

use forecast_core::config::ParityConfig;
use forecast_core::{Error, Result, TailPoint};
use forecast_dataset::NormalizationStats;
use forecast_features::{featurize, FeatureVector, FixedTenFeatures};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::manifest::{ExpectedOutput, TestVectorCase, TestVectorManifest};
use crate::scorer::Scorer;

/// `|actual - expected| <= atol + rtol * |expected|` for every element.
pub fn allclose(actual: &[f64], expected: &[f64], rtol: f64, atol: f64) -> bool {
    actual.len() == expected.len()
        && actual
            .iter()
            .zip(expected)
            .all(|(a, e)| (a - e).abs() <= atol + rtol * e.abs())
}

fn max_abs_error(actual: &[f64], expected: &[f64]) -> f64 {
    actual
        .iter()
        .zip(expected)
        .map(|(a, e)| (a - e).abs())
        .fold(0.0, f64::max)
}

/// Verification outcome of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseReport {
    pub id: String,
    pub max_abs_error: f64,
    pub passed: bool,
}

/// Verification outcome of a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub model_ver: String,
    pub cases: Vec<CaseReport>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        !self.cases.is_empty() && self.cases.iter().all(|c| c.passed)
    }
}

/// Parity harness.
#[derive(Debug, Clone)]
pub struct ParityHarness {
    config: ParityConfig,
}

impl ParityHarness {
    pub fn new(config: &ParityConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Reject a scorer/normalization pair that cannot consume the
    /// fixed ten-feature vector.
    fn check_inputs(&self, scorer: &dyn Scorer, stats: &NormalizationStats) -> Result<()> {
        let width = FixedTenFeatures::NAMES.len();
        if scorer.feature_count() != width {
            return Err(Error::schema(format!(
                "scorer expects {} features, the feature vector has {width}",
                scorer.feature_count()
            )));
        }
        stats.validate(width)
    }

    /// Expected output for one tail, computed the way an inference runtime does.
    pub fn expected_for_tail(
        &self,
        scorer: &dyn Scorer,
        stats: &NormalizationStats,
        tail: &[TailPoint],
        window: usize,
    ) -> Result<ExpectedOutput> {
        let closes: Vec<f64> = tail.iter().map(|p| p.close).collect();
        let last_close = *closes
            .last()
            .ok_or_else(|| Error::insufficient_data("empty tail"))?;
        let windowed = &closes[closes.len().saturating_sub(window)..];

        let features = featurize(windowed)?.to_vec();
        let normalized = stats.apply(&features)?;
        let delta = scorer.score(&normalized)?;
        if delta.len() != scorer.horizon() {
            return Err(Error::data(format!(
                "scorer returned {} outputs for horizon {}",
                delta.len(),
                scorer.horizon()
            )));
        }
        let p50 = delta.iter().map(|d| d + last_close).collect();
        Ok(ExpectedOutput { delta, p50 })
    }

    /// Build a manifest for `model_version` from pre-selected tails.
    pub fn build_test_vectors(
        &self,
        scorer: &dyn Scorer,
        stats: &NormalizationStats,
        tails: &[Vec<TailPoint>],
        model_version: &str,
    ) -> Result<TestVectorManifest> {
        self.check_inputs(scorer, stats)?;
        if tails.is_empty() {
            return Err(Error::insufficient_data("no tails to build test vectors from"));
        }
        if scorer.horizon() != self.config.horizon {
            return Err(Error::config(format!(
                "scorer horizon {} differs from configured parity horizon {}",
                scorer.horizon(),
                self.config.horizon
            )));
        }

        let window = self.config.feature_window;
        let cases = tails
            .iter()
            .enumerate()
            .map(|(idx, tail)| {
                Ok(TestVectorCase {
                    id: format!("case-{}", idx + 1),
                    tail: tail.clone(),
                    expected: self.expected_for_tail(scorer, stats, tail, window)?,
                    rtol: self.config.rtol,
                    atol: self.config.atol,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(model_version, cases = cases.len(), "built test vectors");
        Ok(TestVectorManifest {
            model_ver: model_version.to_string(),
            horizon: scorer.horizon(),
            window,
            feature_count: FixedTenFeatures::NAMES.len(),
            rtol: self.config.rtol,
            atol: self.config.atol,
            cases,
        })
    }

    /// Recompute every case from its stored tail and compare within the
    /// case tolerances.
    ///
    /// Returns the per-case report; fails with [`Error::ParityMismatch`]
    /// if any case is out of tolerance.
    pub fn verify_manifest(
        &self,
        scorer: &dyn Scorer,
        stats: &NormalizationStats,
        manifest: &TestVectorManifest,
    ) -> Result<VerifyReport> {
        self.check_inputs(scorer, stats)?;
        if manifest.cases.is_empty() {
            return Err(Error::insufficient_data(format!(
                "manifest for '{}' has no cases",
                manifest.model_ver
            )));
        }
        if manifest.horizon != scorer.horizon() || manifest.feature_count != scorer.feature_count() {
            return Err(Error::schema(format!(
                "manifest shape {}x{} does not match scorer {}x{}",
                manifest.feature_count,
                manifest.horizon,
                scorer.feature_count(),
                scorer.horizon()
            )));
        }

        let mut reports = Vec::with_capacity(manifest.cases.len());
        for case in &manifest.cases {
            let actual = self.expected_for_tail(scorer, stats, &case.tail, manifest.window)?;
            let passed = allclose(&actual.delta, &case.expected.delta, case.rtol, case.atol)
                && allclose(&actual.p50, &case.expected.p50, case.rtol, case.atol);
            let max_abs_error = max_abs_error(&actual.delta, &case.expected.delta)
                .max(max_abs_error(&actual.p50, &case.expected.p50));
            if !passed {
                warn!(case = %case.id, max_abs_error, "case out of tolerance");
            }
            reports.push(CaseReport {
                id: case.id.clone(),
                max_abs_error,
                passed,
            });
        }

        let report = VerifyReport {
            model_ver: manifest.model_ver.clone(),
            cases: reports,
        };
        if !report.passed() {
            let failed: Vec<&str> = report
                .cases
                .iter()
                .filter(|c| !c.passed)
                .map(|c| c.id.as_str())
                .collect();
            return Err(Error::parity_mismatch(format!(
                "model '{}': cases {failed:?} out of tolerance",
                manifest.model_ver
            )));
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::LinearScorer;
    use crate::tails::pick_tails;
    use forecast_core::Bar;

    fn bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let c = 200.0 + 10.0 * (i as f64 / 11.0).sin() + 0.05 * i as f64;
                Bar::flat(1_700_000_000_000 + i as i64 * 3_600_000, c, None)
            })
            .collect()
    }

    fn stats() -> NormalizationStats {
        NormalizationStats {
            kind: "zscore".to_string(),
            mean: vec![200.0, 200.0, 200.0, 5.0, 0.0, 0.0, 200.0, 200.0, 0.0, 0.01],
            std: vec![10.0, 10.0, 10.0, 2.0, 1.0, 2.0, 10.0, 10.0, 0.001, 0.005],
            epsilon: 1e-6,
        }
    }

    fn scorer(horizon: usize) -> LinearScorer {
        let coefficients = (0..horizon)
            .map(|h| (0..10).map(|j| 0.01 * (h + 1) as f64 * (j as f64 - 4.5)).collect())
            .collect();
        let intercepts = (0..horizon).map(|h| 0.1 * h as f64).collect();
        LinearScorer::new(coefficients, intercepts).unwrap()
    }

    #[test]
    fn test_allclose() {
        assert!(allclose(&[1.0, 2.0], &[1.0, 2.0], 1e-3, 1e-4));
        assert!(allclose(&[100.05], &[100.0], 1e-3, 1e-4));
        assert!(!allclose(&[100.2], &[100.0], 1e-3, 1e-4));
        assert!(!allclose(&[1.0], &[1.0, 2.0], 1e-3, 1e-4));
        assert!(!allclose(&[f64::NAN], &[1.0], 1e-3, 1e-4));
    }

    #[test]
    fn test_build_and_verify() {
        let config = ParityConfig::default();
        let harness = ParityHarness::new(&config);
        let scorer = scorer(config.horizon);
        let tails = pick_tails(&bars(400), &config).unwrap();

        let manifest = harness
            .build_test_vectors(&scorer, &stats(), &tails, "lin-0-1-0")
            .unwrap();
        assert_eq!(manifest.cases.len(), 2);
        assert_eq!(manifest.cases[0].id, "case-1");
        assert_eq!(manifest.window, 64);
        assert_eq!(manifest.feature_count, 10);

        let case = &manifest.cases[1];
        let last = case.last_close().unwrap();
        assert_eq!(case.expected.delta.len(), 24);
        for (d, p) in case.expected.delta.iter().zip(&case.expected.p50) {
            assert_eq!(*p, d + last);
        }

        let report = harness.verify_manifest(&scorer, &stats(), &manifest).unwrap();
        assert!(report.passed());
        assert!(report.cases.iter().all(|c| c.max_abs_error == 0.0));
    }

    #[test]
    fn test_tampered_case_fails() {
        let config = ParityConfig::default();
        let harness = ParityHarness::new(&config);
        let scorer = scorer(config.horizon);
        let tails = pick_tails(&bars(300), &config).unwrap();
        let mut manifest = harness
            .build_test_vectors(&scorer, &stats(), &tails, "lin-0-1-0")
            .unwrap();
        manifest.cases[0].expected.delta[3] += 1.0;

        let err = harness.verify_manifest(&scorer, &stats(), &manifest).unwrap_err();
        assert!(matches!(err, Error::ParityMismatch(_)));
    }

    #[test]
    fn test_shape_checks() {
        let config = ParityConfig::default();
        let harness = ParityHarness::new(&config);
        let tails = pick_tails(&bars(300), &config).unwrap();

        let wrong_horizon = scorer(3);
        assert!(harness
            .build_test_vectors(&wrong_horizon, &stats(), &tails, "v")
            .is_err());

        let narrow = LinearScorer::new(vec![vec![1.0; 9]; 24], vec![0.0; 24]).unwrap();
        assert!(matches!(
            harness.build_test_vectors(&narrow, &stats(), &tails, "v"),
            Err(Error::Schema(_))
        ));

        assert!(harness
            .build_test_vectors(&scorer(24), &stats(), &[], "v")
            .is_err());
    }
}
