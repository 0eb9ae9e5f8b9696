//! Feature computation engine.
//!
//! Selects one of the feature strategies by its configuration tag and
//! exposes a uniform, erased interface to the dataset stage.

use forecast_core::config::FeatureConfig;
use forecast_core::{Bar, FeatureStrategyKind, TargetKind};
use std::collections::BTreeMap;
use tracing::info;

use crate::configurable::{ConfigurableWindow, ConfigurableWindowFeatures};
use crate::fixed_ten::{FixedTenFeature, FixedTenFeatures};
use crate::strategy::{FeatureStrategy, FeatureTable, FeatureVector};

/// Feature computation engine.
///
/// The two strategies stay separate types; the engine only dispatches.
#[derive(Debug, Clone)]
pub enum FeatureEngine {
    ConfigurableWindow(ConfigurableWindow),
    FixedTenFeature(FixedTenFeature),
}

impl FeatureEngine {
    /// Create a new feature engine for the configured strategy.
    pub fn new(config: &FeatureConfig) -> Self {
        match config.strategy {
            FeatureStrategyKind::ConfigurableWindow => {
                FeatureEngine::ConfigurableWindow(ConfigurableWindow::new(&config.configurable_window))
            }
            FeatureStrategyKind::FixedTenFeature => {
                FeatureEngine::FixedTenFeature(FixedTenFeature::new(&config.fixed_ten))
            }
        }
    }

    pub fn kind(&self) -> FeatureStrategyKind {
        match self {
            FeatureEngine::ConfigurableWindow(s) => s.kind(),
            FeatureEngine::FixedTenFeature(s) => s.kind(),
        }
    }

    /// Feature column names of the selected strategy.
    pub fn feature_names(&self) -> &'static [&'static str] {
        match self {
            FeatureEngine::ConfigurableWindow(_) => ConfigurableWindowFeatures::NAMES,
            FeatureEngine::FixedTenFeature(_) => FixedTenFeatures::NAMES,
        }
    }

    pub fn target_columns(&self) -> Vec<String> {
        match self {
            FeatureEngine::ConfigurableWindow(s) => s.target_columns(),
            FeatureEngine::FixedTenFeature(s) => s.target_columns(),
        }
    }

    pub fn horizon(&self) -> usize {
        match self {
            FeatureEngine::ConfigurableWindow(s) => s.horizon(),
            FeatureEngine::FixedTenFeature(s) => s.horizon(),
        }
    }

    pub fn target_kind(&self) -> TargetKind {
        match self {
            FeatureEngine::ConfigurableWindow(s) => s.target_kind(),
            FeatureEngine::FixedTenFeature(s) => s.target_kind(),
        }
    }

    pub fn windows(&self) -> BTreeMap<String, usize> {
        match self {
            FeatureEngine::ConfigurableWindow(s) => s.windows(),
            FeatureEngine::FixedTenFeature(s) => s.windows(),
        }
    }

    /// Compute the feature table for a canonical bar sequence.
    pub fn compute(&self, bars: &[Bar]) -> FeatureTable {
        let table = match self {
            FeatureEngine::ConfigurableWindow(s) => s.table(bars),
            FeatureEngine::FixedTenFeature(s) => s.table(bars),
        };
        info!(
            strategy = %table.strategy,
            bars = bars.len(),
            rows = table.len(),
            "computed feature rows"
        );
        table
    }
}
