//! Per-file dataset build: features, split, CSVs and metadata.

use forecast_core::config::PipelineConfig;
use forecast_core::{Bar, Error, Result};
use forecast_features::{FeatureEngine, FeatureTable};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::metadata::DatasetMetadata;
use crate::split::{SplitEngine, SplitName};
use crate::table_io::write_table_csv;

/// Read a canonical bar file (a JSON array of bar tuples).
pub fn read_bars(path: &Path) -> Result<Vec<Bar>> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Paths written for one source file.
#[derive(Debug, Clone)]
pub struct DatasetOutput {
    pub metadata: DatasetMetadata,
    pub csv_paths: Vec<PathBuf>,
    pub meta_path: PathBuf,
}

/// Builds split feature CSVs from canonical bar files.
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    engine: FeatureEngine,
    splitter: SplitEngine,
    pretty_json: bool,
}

impl DatasetBuilder {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            engine: FeatureEngine::new(&config.features),
            splitter: SplitEngine::new(&config.split),
            pretty_json: config.output.pretty_json,
        }
    }

    pub fn engine(&self) -> &FeatureEngine {
        &self.engine
    }

    /// Build the dataset for `bars_path` into `out_dir`.
    pub fn build_file(&self, bars_path: &Path, out_dir: &Path) -> Result<DatasetOutput> {
        let stem = bars_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::config(format!("bad bar file name {}", bars_path.display())))?;
        let bars = read_bars(bars_path)?;
        self.build_bars(&bars, stem, &bars_path.display().to_string(), out_dir)
    }

    /// Build the dataset for in-memory bars, naming files after `stem`.
    pub fn build_bars(
        &self,
        bars: &[Bar],
        stem: &str,
        source: &str,
        out_dir: &Path,
    ) -> Result<DatasetOutput> {
        let FeatureTable {
            strategy,
            feature_names,
            target_names,
            rows,
        } = self.engine.compute(bars);
        let total = rows.len();
        let split = self.splitter.split(rows);

        let mut csv_paths = Vec::with_capacity(SplitName::ALL.len());
        for name in SplitName::ALL {
            let path = out_dir.join(format!("{stem}{}", name.file_suffix()));
            write_table_csv(&path, &feature_names, &target_names, split.get(name))?;
            csv_paths.push(path);
        }

        let metadata = DatasetMetadata {
            rows: total,
            strategy,
            features: feature_names,
            target_columns: target_names,
            horizon: self.engine.horizon(),
            target_kind: self.engine.target_kind(),
            windows: self.engine.windows(),
            splits: split.counts(),
            source: source.to_string(),
        };
        let meta_path = out_dir.join(format!("{stem}_meta.json"));
        metadata.save(&meta_path, self.pretty_json)?;

        info!(
            source,
            rows = total,
            train = metadata.splits.train,
            val = metadata.splits.val,
            test = metadata.splits.test,
            "wrote dataset"
        );
        Ok(DatasetOutput {
            metadata,
            csv_paths,
            meta_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_io::load_split;
    use forecast_core::io::write_json_atomic;
    use forecast_core::FeatureStrategyKind;
    use forecast_features::ConfigurableWindowFeatures;
    use forecast_features::FeatureVector;

    fn bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let c = 100.0 + (i as f64 / 5.0).sin();
                Bar::flat(1_704_067_200_000 + i as i64 * 3_600_000, c, Some(1.0))
            })
            .collect()
    }

    #[test]
    fn test_build_file_writes_splits_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let bars_path = dir.path().join("BTCUSDT_1h.json");
        write_json_atomic(&bars_path, &bars(125), false).unwrap();

        let out_dir = dir.path().join("features");
        let builder = DatasetBuilder::new(&PipelineConfig::default());
        let out = builder.build_file(&bars_path, &out_dir).unwrap();

        // 125 bars, first index 20, horizon 5: 100 rows.
        assert_eq!(out.metadata.rows, 100);
        assert_eq!(out.metadata.splits.train, 70);
        assert_eq!(out.metadata.splits.val, 15);
        assert_eq!(out.metadata.splits.test, 15);
        assert_eq!(out.metadata.strategy, FeatureStrategyKind::ConfigurableWindow);
        assert!(out_dir.join("BTCUSDT_1h_val.csv").exists());

        let meta = DatasetMetadata::load(&out.meta_path).unwrap();
        assert_eq!(meta, out.metadata);

        let train = load_split(&[out_dir.clone()], SplitName::Train, ConfigurableWindowFeatures::NAMES).unwrap();
        assert_eq!(train.len(), 70);
        assert_eq!(train.target_columns, vec!["target"]);
    }

    #[test]
    fn test_short_series_writes_empty_splits() {
        let dir = tempfile::tempdir().unwrap();
        let builder = DatasetBuilder::new(&PipelineConfig::default());
        let out = builder.build_bars(&bars(10), "tiny", "mem", dir.path()).unwrap();
        assert_eq!(out.metadata.rows, 0);
        assert_eq!(out.metadata.splits.total(), 0);
        assert_eq!(out.csv_paths.len(), 3);
    }
}
