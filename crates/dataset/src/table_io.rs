//! Feature table CSV output and split loading.
//!
//! Files are named `<stem>_<split>.csv` with the header
//! `ts, close, <features>, <targets>`.

use forecast_core::io::write_atomic;
use forecast_core::{Error, Result};
use forecast_features::TableRow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::split::SplitName;

/// Write rows to `path` as CSV, atomically.
pub fn write_table_csv(
    path: &Path,
    feature_names: &[String],
    target_names: &[String],
    rows: &[TableRow],
) -> Result<()> {
    write_atomic(path, |w| {
        let mut writer = csv::Writer::from_writer(w);
        let header = ["ts", "close"]
            .into_iter()
            .chain(feature_names.iter().map(String::as_str))
            .chain(target_names.iter().map(String::as_str));
        writer.write_record(header)?;

        let mut record: Vec<String> = Vec::with_capacity(2 + feature_names.len() + target_names.len());
        for row in rows {
            record.clear();
            record.push(row.ts.to_string());
            record.push(row.close.to_string());
            record.extend(row.features.iter().map(f64::to_string));
            record.extend(row.targets.iter().map(f64::to_string));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// Rows of one split gathered from every matching file.
#[derive(Debug, Clone, Default)]
pub struct LoadedSplit {
    /// Feature matrix, columns in the requested schema order.
    pub features: Vec<Vec<f64>>,
    /// Target matrix, columns in `target_columns` order.
    pub targets: Vec<Vec<f64>>,
    /// Close of each row's bar.
    pub last_close: Vec<f64>,
    pub target_columns: Vec<String>,
    /// Files read, in load order.
    pub files: Vec<PathBuf>,
}

impl LoadedSplit {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Keep only the target columns at `indices`, in that order.
    pub fn select_targets(&self, indices: &[usize]) -> Vec<Vec<f64>> {
        self.targets
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect()
    }
}

/// Find every `*_<split>.csv` under `roots` (files or directories, recursive).
pub fn find_split_files(roots: &[PathBuf], split: SplitName) -> Vec<PathBuf> {
    let suffix = split.file_suffix();
    let mut files = Vec::new();
    for root in roots {
        if root.is_file() {
            if file_name_ends_with(root, &suffix) {
                files.push(root.clone());
            }
            continue;
        }
        let mut found: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| file_name_ends_with(path, &suffix))
            .collect();
        found.sort();
        files.extend(found);
    }
    files
}

fn file_name_ends_with(path: &Path, suffix: &str) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(suffix))
}

/// Target columns of a header, ordered by numeric suffix. A plain
/// `target` column sorts first.
pub fn parse_target_columns<'a>(header: impl IntoIterator<Item = &'a str>) -> Result<Vec<String>> {
    let mut targets: Vec<(usize, String)> = Vec::new();
    for name in header {
        if name == "target" {
            targets.push((0, name.to_string()));
        } else if let Some(suffix) = name.strip_prefix("target_") {
            let step: usize = suffix
                .parse()
                .map_err(|_| Error::schema(format!("target column '{name}' has no numeric suffix")))?;
            targets.push((step, name.to_string()));
        }
    }
    if targets.is_empty() {
        return Err(Error::schema("no target columns found in feature header"));
    }
    targets.sort_by_key(|(step, _)| *step);
    Ok(targets.into_iter().map(|(_, name)| name).collect())
}

/// Load one split from every matching file under `roots`.
///
/// Every file must carry all `feature_names` and the same target columns.
pub fn load_split(roots: &[PathBuf], split: SplitName, feature_names: &[&str]) -> Result<LoadedSplit> {
    let files = find_split_files(roots, split);
    if files.is_empty() {
        return Err(Error::data(format!(
            "no feature files found for split={split} under {roots:?}"
        )));
    }

    let mut out = LoadedSplit::default();
    for path in &files {
        let before = out.len();
        load_file(path, feature_names, &mut out)?;
        debug!(path = %path.display(), rows = out.len() - before, "loaded feature file");
    }
    out.files = files;
    info!(split = %split, rows = out.len(), files = out.files.len(), "loaded split");
    Ok(out)
}

fn load_file(path: &Path, feature_names: &[&str], out: &mut LoadedSplit) -> Result<()> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let index: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h, i)).collect();

    let targets = parse_target_columns(headers.iter())
        .map_err(|e| Error::schema(format!("{}: {e}", path.display())))?;
    if out.target_columns.is_empty() {
        out.target_columns = targets.clone();
    } else if out.target_columns != targets {
        return Err(Error::schema(format!(
            "target columns mismatch in {}: {:?} vs {:?}",
            path.display(),
            targets,
            out.target_columns
        )));
    }

    let column = |name: &str| -> Result<usize> {
        index.get(name).copied().ok_or_else(|| {
            Error::schema(format!("{}: missing column '{name}'", path.display()))
        })
    };
    let feature_idx: Vec<usize> = feature_names.iter().map(|n| column(*n)).collect::<Result<_>>()?;
    let target_idx: Vec<usize> = targets.iter().map(|n| column(n.as_str())).collect::<Result<_>>()?;
    let close_idx = index.get("last_close").or_else(|| index.get("close")).copied();

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let field = |idx: usize| -> Result<f64> {
            let raw = record.get(idx).unwrap_or("");
            raw.trim().parse::<f64>().map_err(|_| {
                Error::data(format!(
                    "{} row {}: '{raw}' is not a number",
                    path.display(),
                    line + 1
                ))
            })
        };
        out.features.push(feature_idx.iter().map(|&i| field(i)).collect::<Result<_>>()?);
        out.targets.push(target_idx.iter().map(|&i| field(i)).collect::<Result<_>>()?);
        out.last_close.push(match close_idx {
            Some(i) => field(i)?,
            None => 0.0,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn row(ts: i64, close: f64, features: &[f64], targets: &[f64]) -> TableRow {
        TableRow {
            ts,
            close,
            features: features.to_vec(),
            targets: targets.to_vec(),
        }
    }

    #[test]
    fn test_parse_target_columns() {
        let header = ["ts", "close", "a", "target_10", "target_2", "target_1"];
        assert_eq!(
            parse_target_columns(header).unwrap(),
            names(&["target_1", "target_2", "target_10"])
        );
        assert_eq!(parse_target_columns(["ts", "target"]).unwrap(), names(&["target"]));
        assert!(parse_target_columns(["ts", "close"]).is_err());
        assert!(parse_target_columns(["target_x"]).is_err());
    }

    #[test]
    fn test_write_then_load_split() {
        let dir = tempfile::tempdir().unwrap();
        let features = names(&["a", "b"]);
        let targets = names(&["target_1", "target_2"]);
        write_table_csv(
            &dir.path().join("x/BTC_1h_train.csv"),
            &features,
            &targets,
            &[row(1, 10.0, &[1.0, 2.0], &[0.5, -0.5]), row(2, 11.0, &[3.0, 4.0], &[1.5, 2.5])],
        )
        .unwrap();
        write_table_csv(
            &dir.path().join("y/ETH_1h_train.csv"),
            &features,
            &targets,
            &[row(3, 20.0, &[5.0, 6.0], &[0.0, 0.0])],
        )
        .unwrap();
        // Other splits are ignored.
        write_table_csv(&dir.path().join("x/BTC_1h_val.csv"), &features, &targets, &[]).unwrap();

        let split = load_split(&[dir.path().to_path_buf()], SplitName::Train, &["b", "a"]).unwrap();
        assert_eq!(split.files.len(), 2);
        assert_eq!(split.len(), 3);
        assert_eq!(split.features[0], vec![2.0, 1.0]);
        assert_eq!(split.targets[1], vec![1.5, 2.5]);
        assert_eq!(split.last_close, vec![10.0, 11.0, 20.0]);
        assert_eq!(split.target_columns, targets);
        assert_eq!(split.select_targets(&[1]), vec![vec![-0.5], vec![2.5], vec![0.0]]);
    }

    #[test]
    fn test_missing_feature_column_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_table_csv(&dir.path().join("a_test.csv"), &names(&["a"]), &names(&["target"]), &[]).unwrap();
        let err = load_split(&[dir.path().to_path_buf()], SplitName::Test, &["a", "b"]).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_target_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let f = names(&["a"]);
        write_table_csv(&dir.path().join("a_val.csv"), &f, &names(&["target_1"]), &[]).unwrap();
        write_table_csv(&dir.path().join("b_val.csv"), &f, &names(&["target_1", "target_2"]), &[]).unwrap();
        let err = load_split(&[dir.path().to_path_buf()], SplitName::Val, &["a"]).unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }

    #[test]
    fn test_no_files_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_split(&[dir.path().to_path_buf()], SplitName::Test, &["a"]).is_err());
    }
}
