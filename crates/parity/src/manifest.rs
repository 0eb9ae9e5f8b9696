//! Test-vector manifest documents.
//!
//! One file per model version. A manifest is written once; rewriting it is
//! accepted only when the content is unchanged.

use forecast_core::io::write_json_new;
use forecast_core::{Error, Result, TailPoint};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Expected scorer output for one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedOutput {
    /// Per-horizon deltas.
    pub delta: Vec<f64>,
    /// Deltas in price space: `delta + last_close`.
    pub p50: Vec<f64>,
}

/// One (tail, expected output, tolerance) case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestVectorCase {
    pub id: String,
    pub tail: Vec<TailPoint>,
    pub expected: ExpectedOutput,
    pub rtol: f64,
    pub atol: f64,
}

impl TestVectorCase {
    /// Close of the last tail point.
    pub fn last_close(&self) -> Option<f64> {
        self.tail.last().map(|p| p.close)
    }
}

/// Acceptance contract for one exported model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestVectorManifest {
    pub model_ver: String,
    pub horizon: usize,
    /// Trailing closes handed to the feature function.
    pub window: usize,
    pub feature_count: usize,
    pub rtol: f64,
    pub atol: f64,
    pub cases: Vec<TestVectorCase>,
}

impl TestVectorManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// `<dir>/test_vectors_<model_version>.json`.
pub fn manifest_path(dir: &Path, model_version: &str) -> PathBuf {
    dir.join(format!("test_vectors_{model_version}.json"))
}

/// Persist `manifest` under its version's file name.
///
/// If the file exists with different content this fails with
/// [`Error::ManifestConflict`]; a new model version needs a new tag.
pub fn write_manifest(dir: &Path, manifest: &TestVectorManifest, pretty: bool) -> Result<PathBuf> {
    if manifest.model_ver.is_empty()
        || manifest
            .model_ver
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(Error::config(format!(
            "model version '{}' must be non-empty and use only [A-Za-z0-9._-]",
            manifest.model_ver
        )));
    }

    let path = manifest_path(dir, &manifest.model_ver);
    if write_json_new(&path, manifest, pretty)? {
        info!(path = %path.display(), cases = manifest.cases.len(), "wrote manifest");
        return Ok(path);
    }

    let existing = TestVectorManifest::load(&path)?;
    if existing != *manifest {
        return Err(Error::manifest_conflict(format!(
            "{} already holds different vectors for model version '{}'",
            path.display(),
            manifest.model_ver
        )));
    }
    info!(path = %path.display(), "manifest unchanged");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(version: &str, rtol: f64) -> TestVectorManifest {
        TestVectorManifest {
            model_ver: version.to_string(),
            horizon: 1,
            window: 64,
            feature_count: 10,
            rtol,
            atol: 1e-4,
            cases: vec![TestVectorCase {
                id: "case-1".to_string(),
                tail: vec![TailPoint { ts_ms: 1, close: 2.0 }],
                expected: ExpectedOutput {
                    delta: vec![0.5],
                    p50: vec![2.5],
                },
                rtol,
                atol: 1e-4,
            }],
        }
    }

    #[test]
    fn test_json_shape() {
        let value = serde_json::to_value(manifest("lin-0-1-0", 1e-3)).unwrap();
        assert_eq!(value["model_ver"], "lin-0-1-0");
        assert_eq!(value["cases"][0]["tail"][0][0], 1);
        assert_eq!(value["cases"][0]["expected"]["p50"][0], 2.5);
    }

    #[test]
    fn test_rewrite_same_content_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let m = manifest("lin-0-1-0", 1e-3);
        let path = write_manifest(dir.path(), &m, true).unwrap();
        assert_eq!(path, dir.path().join("test_vectors_lin-0-1-0.json"));
        assert_eq!(write_manifest(dir.path(), &m, false).unwrap(), path);
        assert_eq!(TestVectorManifest::load(&path).unwrap(), m);
    }

    #[test]
    fn test_changed_tolerance_needs_new_version() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), &manifest("lin-0-1-0", 1e-3), true).unwrap();

        let err = write_manifest(dir.path(), &manifest("lin-0-1-0", 1e-2), true).unwrap_err();
        assert!(matches!(err, Error::ManifestConflict(_)));

        assert!(write_manifest(dir.path(), &manifest("lin-0-2-0", 1e-2), true).is_ok());
    }

    #[test]
    fn test_racing_writers_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let a = manifest("lin-0-1-0", 1e-3);
        let b = manifest("lin-0-1-0", 1e-2);
        let barrier = std::sync::Barrier::new(2);

        let (ra, rb) = std::thread::scope(|s| {
            let ta = s.spawn(|| {
                barrier.wait();
                write_manifest(dir.path(), &a, true)
            });
            let tb = s.spawn(|| {
                barrier.wait();
                write_manifest(dir.path(), &b, true)
            });
            (ta.join().unwrap(), tb.join().unwrap())
        });

        assert!(ra.is_ok() != rb.is_ok());
        let winner = if ra.is_ok() { &a } else { &b };
        let loser = if ra.is_ok() { rb } else { ra };
        assert!(matches!(loser.unwrap_err(), Error::ManifestConflict(_)));
        let on_disk = TestVectorManifest::load(&manifest_path(dir.path(), "lin-0-1-0")).unwrap();
        assert_eq!(&on_disk, winner);
    }

    #[test]
    fn test_rejects_path_like_versions() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_manifest(dir.path(), &manifest("../x", 1e-3), true).is_err());
        assert!(write_manifest(dir.path(), &manifest("", 1e-3), true).is_err());
    }
}
