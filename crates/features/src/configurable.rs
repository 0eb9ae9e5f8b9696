//! Configurable-window feature strategy.
//!
//! Lagged closes, the step log return, a full-history EMA, trailing
//! volatility of log returns and UTC calendar parts. Windows and horizon
//! come from [`ConfigurableWindowConfig`].

use forecast_core::config::ConfigurableWindowConfig;
use forecast_core::{calendar_parts, Bar, FeatureStrategyKind, TargetKind};
use std::collections::BTreeMap;
use tracing::debug;

use crate::stats::{ema_series, log_returns, rolling_std};
use crate::strategy::{FeatureRow, FeatureStrategy, FeatureVector};

/// Largest close lag used by the feature vector.
const MAX_LAG: usize = 5;

/// Feature record of the configurable-window strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigurableWindowFeatures {
    pub close_lag_1: f64,
    pub close_lag_3: f64,
    pub close_lag_5: f64,
    /// `ln(close[i] / close[i - 1])`.
    pub log_return: f64,
    /// EMA of closes over the whole series up to `i`.
    pub ema: f64,
    /// Population std of the trailing `vol_window` log returns.
    pub rolling_vol: f64,
    /// Monday = 0.
    pub day_of_week: u32,
    /// 1-12.
    pub month: u32,
}

impl FeatureVector for ConfigurableWindowFeatures {
    const NAMES: &'static [&'static str] = &[
        "close_lag_1",
        "close_lag_3",
        "close_lag_5",
        "log_return",
        "ema",
        "rolling_vol",
        "day_of_week",
        "month",
    ];

    fn to_vec(&self) -> Vec<f64> {
        vec![
            self.close_lag_1,
            self.close_lag_3,
            self.close_lag_5,
            self.log_return,
            self.ema,
            self.rolling_vol,
            f64::from(self.day_of_week),
            f64::from(self.month),
        ]
    }
}

/// Configurable-window strategy.
#[derive(Debug, Clone)]
pub struct ConfigurableWindow {
    ema_span: usize,
    vol_window: usize,
    horizon: usize,
    target_kind: TargetKind,
}

impl ConfigurableWindow {
    pub fn new(config: &ConfigurableWindowConfig) -> Self {
        Self {
            ema_span: config.ema_span,
            vol_window: config.vol_window,
            horizon: config.horizon,
            target_kind: config.target_kind,
        }
    }

    /// First index that can carry a row.
    pub fn min_index(&self) -> usize {
        MAX_LAG.max(self.ema_span).max(self.vol_window)
    }
}

impl FeatureStrategy for ConfigurableWindow {
    type Features = ConfigurableWindowFeatures;

    fn kind(&self) -> FeatureStrategyKind {
        FeatureStrategyKind::ConfigurableWindow
    }

    fn horizon(&self) -> usize {
        self.horizon
    }

    fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    fn target_columns(&self) -> Vec<String> {
        vec!["target".to_string()]
    }

    fn windows(&self) -> BTreeMap<String, usize> {
        BTreeMap::from([
            ("ema_span".to_string(), self.ema_span),
            ("vol_window".to_string(), self.vol_window),
        ])
    }

    fn rows(&self, bars: &[Bar]) -> Vec<FeatureRow<ConfigurableWindowFeatures>> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let end = closes.len().saturating_sub(self.horizon);
        let start = self.min_index();
        if start >= end {
            return Vec::new();
        }

        let returns = log_returns(&closes);
        let ema = ema_series(&closes, self.ema_span);
        let vol = rolling_std(&returns, self.vol_window);

        let mut rows = Vec::with_capacity(end - start);
        let mut skipped = 0usize;
        for i in start..end {
            let (Some(rolling_vol), Some((day_of_week, month))) =
                (vol[i], calendar_parts(bars[i].ts_ms))
            else {
                skipped += 1;
                continue;
            };
            let features = ConfigurableWindowFeatures {
                close_lag_1: closes[i - 1],
                close_lag_3: closes[i - 3],
                close_lag_5: closes[i - 5],
                log_return: returns[i],
                ema: ema[i],
                rolling_vol,
                day_of_week,
                month,
            };
            rows.push(FeatureRow {
                ts: bars[i].ts_ms,
                close: closes[i],
                features,
                targets: vec![self.target_kind.compute(closes[i], closes[i + self.horizon])],
            });
        }
        if skipped > 0 {
            debug!(skipped, "skipped indices without a full volatility window");
        }
        rows
    }
}
