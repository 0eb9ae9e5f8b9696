//! Dataset and model metadata documents.

use forecast_core::io::write_json_atomic;
use forecast_core::{Error, FeatureStrategyKind, Result, TargetKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::metrics::ForecastMetrics;
use crate::normalization::NormalizationStats;
use crate::split::SplitCounts;

/// Written next to the split CSVs of one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    /// Total feature rows before splitting.
    pub rows: usize,
    pub strategy: FeatureStrategyKind,
    /// Feature schema, in column order.
    pub features: Vec<String>,
    pub target_columns: Vec<String>,
    pub horizon: usize,
    #[serde(rename = "target")]
    pub target_kind: TargetKind,
    /// Window sizes the features were built with.
    pub windows: BTreeMap<String, usize>,
    pub splits: SplitCounts,
    /// Canonical bar file the rows came from.
    pub source: String,
}

impl DatasetMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn save(&self, path: &Path, pretty: bool) -> Result<()> {
        write_json_atomic(path, self, pretty)
    }
}

/// Metadata persisted with a trained model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_name: String,
    /// Feature schema the model consumes, in input order.
    pub features: Vec<String>,
    /// Targets the model predicts, in output order.
    pub target_columns: Vec<String>,
    pub normalization: NormalizationStats,
    /// Metrics keyed by split name.
    #[serde(default)]
    pub metrics: BTreeMap<String, ForecastMetrics>,
    /// Training rows per split.
    #[serde(default)]
    pub splits: SplitCounts,
    #[serde(default)]
    pub data_dirs: Vec<String>,
    /// Estimator hyperparameters, opaque to the pipeline.
    #[serde(default)]
    pub params: serde_json::Value,
}

impl ModelMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        load_json(path)
    }

    pub fn save(&self, path: &Path, pretty: bool) -> Result<()> {
        write_json_atomic(path, self, pretty)
    }

    /// Fail unless the model's feature schema equals `expected`.
    pub fn check_features(&self, expected: &[&str]) -> Result<()> {
        if self.features.len() != expected.len()
            || self.features.iter().zip(expected).any(|(a, b)| a != b)
        {
            return Err(Error::schema(format!(
                "model '{}' features {:?} do not match expected {:?}",
                self.model_name, self.features, expected
            )));
        }
        self.normalization.validate(expected.len())
    }
}

/// Indices of `wanted` target names within `available`.
///
/// A missing target is an error; there is no fallback to another column.
pub fn select_targets(available: &[String], wanted: &[String]) -> Result<Vec<usize>> {
    wanted
        .iter()
        .map(|name| {
            available.iter().position(|a| a == name).ok_or_else(|| {
                Error::schema(format!(
                    "target '{name}' not found in dataset targets {available:?}"
                ))
            })
        })
        .collect()
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
