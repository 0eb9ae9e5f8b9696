//! Forecast accuracy metrics.
//!
//! Errors are measured on predicted deltas; MAPE is measured in price
//! space, where a value is `delta + last_close`.

use forecast_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Smallest MAPE denominator.
const MAPE_FLOOR: f64 = 1e-6;

/// Error metrics for one target column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonMetrics {
    pub mae_delta: f64,
    pub rmse_delta: f64,
    pub mape_price: f64,
}

/// Forecast metrics over all target columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    /// Mean absolute error of deltas.
    pub mae_delta: f64,
    /// Root mean squared error of deltas.
    pub rmse_delta: f64,
    /// Mean absolute percentage error of price-space values.
    pub mape_price: f64,
    /// Per target column, present when there is more than one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_horizon: Option<Vec<HorizonMetrics>>,
}

/// Model metrics with the zero-delta baseline on the same rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model: String,
    pub split: String,
    pub rows: usize,
    pub targets: Vec<String>,
    pub metrics: ForecastMetrics,
    pub baseline: ForecastMetrics,
}

#[derive(Default)]
struct Accumulator {
    abs: f64,
    sq: f64,
    ape: f64,
    n: usize,
}

impl Accumulator {
    fn add(&mut self, truth: f64, pred: f64, last_close: f64) {
        let err = truth - pred;
        self.abs += err.abs();
        self.sq += err * err;
        let price_true = truth + last_close;
        let price_pred = pred + last_close;
        self.ape += ((price_true - price_pred) / price_true.abs().max(MAPE_FLOOR)).abs();
        self.n += 1;
    }

    fn finish(&self) -> HorizonMetrics {
        if self.n == 0 {
            return HorizonMetrics::default();
        }
        let n = self.n as f64;
        HorizonMetrics {
            mae_delta: self.abs / n,
            rmse_delta: (self.sq / n).sqrt(),
            mape_price: self.ape / n,
        }
    }
}

/// Metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Calculate metrics for `predicted` against `actual` deltas.
    ///
    /// Both matrices are rows x targets; `last_close` has one entry per row.
    pub fn calculate(
        actual: &[Vec<f64>],
        predicted: &[Vec<f64>],
        last_close: &[f64],
    ) -> Result<ForecastMetrics> {
        if actual.len() != predicted.len() || actual.len() != last_close.len() {
            return Err(Error::data(format!(
                "metric inputs disagree on row count: {} actual, {} predicted, {} closes",
                actual.len(),
                predicted.len(),
                last_close.len()
            )));
        }
        let width = actual.first().map_or(0, Vec::len);

        let mut overall = Accumulator::default();
        let mut per_column: Vec<Accumulator> = (0..width).map(|_| Accumulator::default()).collect();

        for (row, ((truth, pred), &close)) in actual.iter().zip(predicted).zip(last_close).enumerate() {
            if truth.len() != width || pred.len() != width {
                return Err(Error::data(format!(
                    "row {row}: expected {width} targets, got {} actual and {} predicted",
                    truth.len(),
                    pred.len()
                )));
            }
            for (col, (&t, &p)) in truth.iter().zip(pred).enumerate() {
                overall.add(t, p, close);
                per_column[col].add(t, p, close);
            }
        }

        let total = overall.finish();
        Ok(ForecastMetrics {
            mae_delta: total.mae_delta,
            rmse_delta: total.rmse_delta,
            mape_price: total.mape_price,
            per_horizon: (width > 1).then(|| per_column.iter().map(Accumulator::finish).collect()),
        })
    }

    /// Metrics of always predicting a zero delta.
    pub fn baseline(actual: &[Vec<f64>], last_close: &[f64]) -> Result<ForecastMetrics> {
        let zeros: Vec<Vec<f64>> = actual.iter().map(|r| vec![0.0; r.len()]).collect();
        Self::calculate(actual, &zeros, last_close)
    }
}
