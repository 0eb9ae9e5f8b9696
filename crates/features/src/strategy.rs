//! Feature strategy interface and row/table types.

use forecast_core::{Bar, FeatureStrategyKind, TargetKind, TimestampMs};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fixed-field feature record with a compile-time column list.
pub trait FeatureVector: Sized {
    /// Column names, in vector order.
    const NAMES: &'static [&'static str];

    /// Values in [`Self::NAMES`] order.
    fn to_vec(&self) -> Vec<f64>;
}

/// Features and targets for one eligible bar index.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow<F> {
    /// Bar timestamp (ms).
    pub ts: TimestampMs,
    /// Bar close.
    pub close: f64,
    /// Typed feature record.
    pub features: F,
    /// Forward-looking targets, in target column order.
    pub targets: Vec<f64>,
}

impl<F: FeatureVector> FeatureRow<F> {
    /// Drop the feature type, keeping values in column order.
    pub fn erase(&self) -> TableRow {
        TableRow {
            ts: self.ts,
            close: self.close,
            features: self.features.to_vec(),
            targets: self.targets.clone(),
        }
    }
}

/// Untyped feature row as stored in a table file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub ts: TimestampMs,
    pub close: f64,
    pub features: Vec<f64>,
    pub targets: Vec<f64>,
}

/// Rows of one strategy with their column names.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Strategy that produced the rows.
    pub strategy: FeatureStrategyKind,
    /// Feature columns, in order.
    pub feature_names: Vec<String>,
    /// Target columns, in order.
    pub target_names: Vec<String>,
    /// Rows, time ordered.
    pub rows: Vec<TableRow>,
}

impl FeatureTable {
    /// Full header: `ts, close, <features>, <targets>`.
    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(2 + self.feature_names.len() + self.target_names.len());
        header.push("ts".to_string());
        header.push("close".to_string());
        header.extend(self.feature_names.iter().cloned());
        header.extend(self.target_names.iter().cloned());
        header
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One named, versioned way of deriving features and targets from bars.
pub trait FeatureStrategy {
    /// Typed feature record.
    type Features: FeatureVector;

    /// Tag consumers pin to.
    fn kind(&self) -> FeatureStrategyKind;

    /// Steps ahead of the farthest target.
    fn horizon(&self) -> usize;

    fn target_kind(&self) -> TargetKind;

    /// Target column names, in row target order.
    fn target_columns(&self) -> Vec<String>;

    /// Windows the strategy was built with, recorded in dataset metadata.
    fn windows(&self) -> BTreeMap<String, usize>;

    /// Rows for every eligible index of a canonical bar sequence.
    fn rows(&self, bars: &[Bar]) -> Vec<FeatureRow<Self::Features>>;

    /// Rows erased into a [`FeatureTable`].
    fn table(&self, bars: &[Bar]) -> FeatureTable {
        FeatureTable {
            strategy: self.kind(),
            feature_names: Self::Features::NAMES.iter().map(|s| s.to_string()).collect(),
            target_names: self.target_columns(),
            rows: self.rows(bars).iter().map(FeatureRow::erase).collect(),
        }
    }
}
