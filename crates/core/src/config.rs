//! Configuration structures for the forecast pipeline.
//!
//! A single [`PipelineConfig`] is built once (defaults, optional JSON file,
//! CLI overrides) and handed to each component at construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::TargetKind;

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bar normalization configuration.
    pub normalize: NormalizeConfig,
    /// Feature derivation configuration.
    pub features: FeatureConfig,
    /// Dataset split configuration.
    pub split: SplitConfig,
    /// Parity vector configuration.
    pub parity: ParityConfig,
    /// Output configuration.
    pub output: OutputConfig,
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing sections take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations no component could run with.
    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        self.split.validate()?;
        self.parity.validate()?;
        if let Some(interval) = self.normalize.interval_override_ms {
            if interval <= 0 {
                return Err(Error::config("interval_override_ms must be positive"));
            }
        }
        Ok(())
    }
}

/// Bar normalization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Fill missing intervals with flat bars.
    pub fill_gaps: bool,
    /// Interval to use when the source file does not declare a usable one.
    pub interval_override_ms: Option<i64>,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            fill_gaps: true,
            interval_override_ms: None,
        }
    }
}

/// Which feature definition a dataset or model is pinned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStrategyKind {
    /// Lags, log-return, EMA, rolling volatility and calendar columns with
    /// configurable windows.
    ConfigurableWindow,
    /// Fixed ten-column vector reproducible from a bounded tail.
    FixedTenFeature,
}

impl FeatureStrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FeatureStrategyKind::ConfigurableWindow => "configurable_window",
            FeatureStrategyKind::FixedTenFeature => "fixed_ten_feature",
        }
    }
}

impl fmt::Display for FeatureStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureStrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "configurable_window" => Ok(FeatureStrategyKind::ConfigurableWindow),
            "fixed_ten_feature" => Ok(FeatureStrategyKind::FixedTenFeature),
            other => Err(Error::config(format!("unknown feature strategy '{other}'"))),
        }
    }
}

/// Shape of the targets emitted by the fixed ten-feature strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetShape {
    /// One target at `horizon` steps ahead.
    Single,
    /// One target per step `1..=horizon`.
    PerStep,
}

impl FromStr for TargetShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(TargetShape::Single),
            "per_step" => Ok(TargetShape::PerStep),
            other => Err(Error::config(format!("unknown target shape '{other}'"))),
        }
    }
}

/// Feature derivation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Selected strategy.
    pub strategy: FeatureStrategyKind,
    /// Settings for [`FeatureStrategyKind::ConfigurableWindow`].
    pub configurable_window: ConfigurableWindowConfig,
    /// Settings for [`FeatureStrategyKind::FixedTenFeature`].
    pub fixed_ten: FixedTenConfig,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            strategy: FeatureStrategyKind::ConfigurableWindow,
            configurable_window: ConfigurableWindowConfig::default(),
            fixed_ten: FixedTenConfig::default(),
        }
    }
}

impl FeatureConfig {
    fn validate(&self) -> Result<()> {
        let cw = &self.configurable_window;
        if cw.ema_span == 0 || cw.vol_window == 0 || cw.horizon == 0 {
            return Err(Error::config(
                "ema_span, vol_window and horizon must all be at least 1",
            ));
        }
        if self.fixed_ten.horizon == 0 {
            return Err(Error::config("fixed_ten.horizon must be at least 1"));
        }
        Ok(())
    }
}

/// Configurable-window strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigurableWindowConfig {
    /// EMA span (alpha = 2 / (span + 1)).
    pub ema_span: usize,
    /// Rolling volatility window over log returns.
    pub vol_window: usize,
    /// Forecast horizon in bars.
    pub horizon: usize,
    /// Target definition.
    pub target_kind: TargetKind,
}

impl Default for ConfigurableWindowConfig {
    fn default() -> Self {
        Self {
            ema_span: 10,
            vol_window: 20,
            horizon: 5,
            target_kind: TargetKind::LogReturn,
        }
    }
}

/// Fixed ten-feature strategy settings. Windows are constants of the
/// strategy itself and cannot be configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedTenConfig {
    /// Forecast horizon in bars.
    pub horizon: usize,
    /// Target definition.
    pub target_kind: TargetKind,
    /// Single target or one per step.
    pub target_shape: TargetShape,
}

impl Default for FixedTenConfig {
    fn default() -> Self {
        Self {
            horizon: 24,
            target_kind: TargetKind::DeltaPrice,
            target_shape: TargetShape::PerStep,
        }
    }
}

/// Time-ordered split boundaries, as fractions of the row count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// End of the train slice.
    pub train_end: f64,
    /// End of the validation slice.
    pub val_end: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_end: 0.70,
            val_end: 0.85,
        }
    }
}

impl SplitConfig {
    fn validate(&self) -> Result<()> {
        let ok = 0.0 < self.train_end && self.train_end <= self.val_end && self.val_end <= 1.0;
        if !ok {
            return Err(Error::config(format!(
                "split fractions must satisfy 0 < train_end <= val_end <= 1 (got {} / {})",
                self.train_end, self.val_end
            )));
        }
        Ok(())
    }
}

/// Parity vector generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParityConfig {
    /// Number of cases per manifest.
    pub case_count: usize,
    /// Bars kept per case tail.
    pub tail_size: usize,
    /// Trailing closes handed to the feature function.
    pub feature_window: usize,
    /// Forecast horizon of the scoring artifact.
    pub horizon: usize,
    /// Relative tolerance recorded with every case.
    pub rtol: f64,
    /// Absolute tolerance recorded with every case.
    pub atol: f64,
    /// Added to the normalization std before dividing.
    pub epsilon: f64,
}

impl Default for ParityConfig {
    fn default() -> Self {
        Self {
            case_count: 2,
            tail_size: 128,
            feature_window: 64,
            horizon: 24,
            rtol: 1e-3,
            atol: 1e-4,
            epsilon: 1e-6,
        }
    }
}

impl ParityConfig {
    /// Fewest source bars that can produce a manifest.
    pub fn min_source_bars(&self) -> usize {
        self.tail_size + self.feature_window + self.horizon
    }

    fn validate(&self) -> Result<()> {
        if self.case_count == 0 {
            return Err(Error::config("parity.case_count must be at least 1"));
        }
        if self.feature_window > self.tail_size {
            return Err(Error::config(format!(
                "parity.feature_window ({}) exceeds parity.tail_size ({})",
                self.feature_window, self.tail_size
            )));
        }
        if !(self.rtol > 0.0 && self.atol > 0.0 && self.epsilon > 0.0) {
            return Err(Error::config("parity tolerances and epsilon must be positive"));
        }
        Ok(())
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory for written artifacts.
    pub out_dir: PathBuf,
    /// Pretty-print JSON artifacts.
    pub pretty_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("data/out"),
            pretty_json: true,
        }
    }
}
