//! Time-ordered train/validation/test split.
//!
//! A pure partition by position: no shuffling, so no later row can land in
//! an earlier slice.

use forecast_core::config::SplitConfig;
use forecast_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named dataset slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitName {
    Train,
    Val,
    Test,
}

impl SplitName {
    pub const ALL: [SplitName; 3] = [SplitName::Train, SplitName::Val, SplitName::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            SplitName::Train => "train",
            SplitName::Val => "val",
            SplitName::Test => "test",
        }
    }

    /// File name suffix used for the slice, e.g. `_train.csv`.
    pub fn file_suffix(self) -> String {
        format!("_{}.csv", self.as_str())
    }
}

impl fmt::Display for SplitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(SplitName::Train),
            "val" => Ok(SplitName::Val),
            "test" => Ok(SplitName::Test),
            other => Err(Error::config(format!(
                "unknown split '{other}' (expected train, val or test)"
            ))),
        }
    }
}

/// Row counts per slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitCounts {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl SplitCounts {
    pub fn total(&self) -> usize {
        self.train + self.val + self.test
    }
}

/// Three disjoint, time-ordered slices.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit<T> {
    pub train: Vec<T>,
    pub val: Vec<T>,
    pub test: Vec<T>,
}

impl<T> DatasetSplit<T> {
    pub fn counts(&self) -> SplitCounts {
        SplitCounts {
            train: self.train.len(),
            val: self.val.len(),
            test: self.test.len(),
        }
    }

    pub fn get(&self, name: SplitName) -> &[T] {
        match name {
            SplitName::Train => &self.train,
            SplitName::Val => &self.val,
            SplitName::Test => &self.test,
        }
    }
}

/// Time-ordered splitter.
#[derive(Debug, Clone)]
pub struct SplitEngine {
    train_end: f64,
    val_end: f64,
}

impl SplitEngine {
    pub fn new(config: &SplitConfig) -> Self {
        Self {
            train_end: config.train_end,
            val_end: config.val_end,
        }
    }

    /// Boundary indices `(floor(train_end * n), floor(val_end * n))`.
    pub fn boundaries(&self, n: usize) -> (usize, usize) {
        let train = ((n as f64 * self.train_end) as usize).min(n);
        let val = ((n as f64 * self.val_end) as usize).clamp(train, n);
        (train, val)
    }

    /// Partition `rows` in place order.
    pub fn split<T>(&self, mut rows: Vec<T>) -> DatasetSplit<T> {
        let (train_end, val_end) = self.boundaries(rows.len());
        let test = rows.split_off(val_end);
        let val = rows.split_off(train_end);
        DatasetSplit {
            train: rows,
            val,
            test,
        }
    }
}

impl Default for SplitEngine {
    fn default() -> Self {
        Self::new(&SplitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sizes_and_order() {
        for n in [0usize, 1, 2, 7, 10, 99, 100, 1001] {
            let rows: Vec<usize> = (0..n).collect();
            let split = SplitEngine::default().split(rows.clone());

            let train = (n as f64 * 0.70) as usize;
            let val = (n as f64 * 0.85) as usize;
            assert_eq!(split.train.len(), train, "n={n}");
            assert_eq!(split.val.len(), val - train, "n={n}");
            assert_eq!(split.test.len(), n - val, "n={n}");

            let joined: Vec<usize> = split
                .train
                .iter()
                .chain(&split.val)
                .chain(&split.test)
                .copied()
                .collect();
            assert_eq!(joined, rows);
        }
    }

    #[test]
    fn test_hundred_rows() {
        let split = SplitEngine::default().split((0..100).collect::<Vec<_>>());
        assert_eq!(split.counts(), SplitCounts { train: 70, val: 15, test: 15 });
        assert_eq!(split.get(SplitName::Val)[0], 70);
        assert_eq!(split.counts().total(), 100);
    }

    #[test]
    fn test_split_names() {
        assert_eq!("val".parse::<SplitName>().unwrap(), SplitName::Val);
        assert!("validation".parse::<SplitName>().is_err());
        assert_eq!(SplitName::Test.file_suffix(), "_test.csv");
    }
}
