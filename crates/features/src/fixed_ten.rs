//! Fixed ten-feature strategy.
//!
//! Every feature reads only the trailing [`MIN_WINDOW`] + 1 closes, so a
//! scoring runtime holding a bounded tail recomputes exactly the vector the
//! training rows carry. Windows are constants and cannot be configured.

use forecast_core::config::FixedTenConfig;
use forecast_core::{Bar, Error, FeatureStrategyKind, Result, TargetKind, TargetShape};
use std::collections::BTreeMap;

use crate::stats::{ema_last, mean, population_std, simple_returns, tail};
use crate::strategy::{FeatureRow, FeatureStrategy, FeatureVector};

const SHORT_WINDOW: usize = 5;
const MOMENTUM_WINDOW: usize = 8;
const EMA_LONG_WINDOW: usize = 10;
const LONG_WINDOW: usize = 20;

/// Fewest closes [`featurize`] accepts; also the first eligible row index.
pub const MIN_WINDOW: usize = LONG_WINDOW;

/// Feature record of the fixed ten-feature strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedTenFeatures {
    pub last_close: f64,
    pub mean_5: f64,
    pub mean_20: f64,
    /// Population std of the last 20 closes.
    pub std_20: f64,
    /// `close[i] - close[i - 2]`.
    pub momentum_3: f64,
    /// `close[i] - close[i - 7]`.
    pub momentum_8: f64,
    /// EMA(5) over the last 5 closes only.
    pub ema_5: f64,
    /// EMA(10) over the last 10 closes only.
    pub ema_10: f64,
    /// Mean of the last 5 simple returns.
    pub ret_mean_5: f64,
    /// Population std of the last 20 simple returns.
    pub ret_std_20: f64,
}

impl FeatureVector for FixedTenFeatures {
    const NAMES: &'static [&'static str] = &[
        "last_close",
        "mean_5",
        "mean_20",
        "std_20",
        "momentum_3",
        "momentum_8",
        "ema_5",
        "ema_10",
        "ret_mean_5",
        "ret_std_20",
    ];

    fn to_vec(&self) -> Vec<f64> {
        vec![
            self.last_close,
            self.mean_5,
            self.mean_20,
            self.std_20,
            self.momentum_3,
            self.momentum_8,
            self.ema_5,
            self.ema_10,
            self.ret_mean_5,
            self.ret_std_20,
        ]
    }
}

/// Compute the ten features from a trailing window of closes.
///
/// This is the inference-time definition; training rows call it on the
/// closes ending at their own index. Only the last `MIN_WINDOW + 1` closes
/// are read. With exactly `MIN_WINDOW` closes the return std covers the 19
/// available returns.
pub fn featurize(window: &[f64]) -> Result<FixedTenFeatures> {
    if window.len() < MIN_WINDOW {
        return Err(Error::insufficient_data(format!(
            "fixed ten-feature vector needs at least {MIN_WINDOW} closes, got {}",
            window.len()
        )));
    }
    let w = tail(window, LONG_WINDOW + 1);
    let n = w.len();
    let last = w[n - 1];
    let returns = simple_returns(w);

    let closes_20 = tail(w, LONG_WINDOW);
    let ema_5 = ema_last(tail(w, SHORT_WINDOW), SHORT_WINDOW).unwrap_or(last);
    let ema_10 = ema_last(tail(w, EMA_LONG_WINDOW), EMA_LONG_WINDOW).unwrap_or(last);

    Ok(FixedTenFeatures {
        last_close: last,
        mean_5: mean(tail(w, SHORT_WINDOW)),
        mean_20: mean(closes_20),
        std_20: population_std(closes_20),
        momentum_3: last - w[n - 3],
        momentum_8: last - w[n - MOMENTUM_WINDOW],
        ema_5,
        ema_10,
        ret_mean_5: mean(tail(&returns, SHORT_WINDOW)),
        ret_std_20: population_std(tail(&returns, LONG_WINDOW)),
    })
}

/// Fixed ten-feature strategy.
#[derive(Debug, Clone)]
pub struct FixedTenFeature {
    horizon: usize,
    target_kind: TargetKind,
    target_shape: TargetShape,
}

impl FixedTenFeature {
    pub fn new(config: &FixedTenConfig) -> Self {
        Self {
            horizon: config.horizon,
            target_kind: config.target_kind,
            target_shape: config.target_shape,
        }
    }

    pub fn target_shape(&self) -> TargetShape {
        self.target_shape
    }

    fn targets(&self, closes: &[f64], i: usize) -> Vec<f64> {
        let current = closes[i];
        match self.target_shape {
            TargetShape::Single => {
                vec![self.target_kind.compute(current, closes[i + self.horizon])]
            }
            TargetShape::PerStep => (1..=self.horizon)
                .map(|k| self.target_kind.compute(current, closes[i + k]))
                .collect(),
        }
    }
}

impl FeatureStrategy for FixedTenFeature {
    type Features = FixedTenFeatures;

    fn kind(&self) -> FeatureStrategyKind {
        FeatureStrategyKind::FixedTenFeature
    }

    fn horizon(&self) -> usize {
        self.horizon
    }

    fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    fn target_columns(&self) -> Vec<String> {
        match self.target_shape {
            TargetShape::Single => vec![format!("target_{}", self.horizon)],
            TargetShape::PerStep => (1..=self.horizon).map(|k| format!("target_{k}")).collect(),
        }
    }

    fn windows(&self) -> BTreeMap<String, usize> {
        BTreeMap::from([
            ("short".to_string(), SHORT_WINDOW),
            ("momentum".to_string(), MOMENTUM_WINDOW),
            ("ema_long".to_string(), EMA_LONG_WINDOW),
            ("long".to_string(), LONG_WINDOW),
        ])
    }

    fn rows(&self, bars: &[Bar]) -> Vec<FeatureRow<FixedTenFeatures>> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let end = closes.len().saturating_sub(self.horizon);
        if MIN_WINDOW >= end {
            return Vec::new();
        }

        (MIN_WINDOW..end)
            .filter_map(|i| {
                let features = featurize(&closes[..=i]).ok()?;
                Some(FeatureRow {
                    ts: bars[i].ts_ms,
                    close: closes[i],
                    features,
                    targets: self.targets(&closes, i),
                })
            })
            .collect()
    }
}
