//! SHA-256 sidecars for exported artifacts.
//!
//! `<file>.sha256` holds the lowercase hex digest of `<file>`.

use forecast_core::io::write_bytes_atomic;
use forecast_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::manifest::TestVectorManifest;

/// Hex digest of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Sidecar path for `path`: the full file name plus `.sha256`.
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".sha256");
    PathBuf::from(name)
}

/// Write the digest sidecar next to `path`; returns the digest.
pub fn write_sidecar(path: &Path) -> Result<String> {
    let digest = sha256_file(path)?;
    write_bytes_atomic(&sidecar_path(path), digest.as_bytes())?;
    Ok(digest)
}

/// Keep an existing sidecar, failing if it no longer matches `path`;
/// write one only when none exists. Returns the digest.
pub fn ensure_sidecar(path: &Path) -> Result<String> {
    if sidecar_path(path).exists() {
        verify_sidecar(path)
    } else {
        write_sidecar(path)
    }
}

fn verify_sidecar(path: &Path) -> Result<String> {
    let actual = sha256_file(path)?;
    let recorded = fs::read_to_string(sidecar_path(path))?;
    let recorded = recorded.trim();
    if recorded.eq_ignore_ascii_case(&actual) {
        Ok(actual)
    } else {
        Err(Error::data(format!(
            "{}: digest {actual} does not match sidecar {recorded}",
            path.display()
        )))
    }
}

/// Result of checking one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactCheck {
    pub path: PathBuf,
    pub ok: bool,
    pub detail: String,
}

/// Compare a file against its sidecar.
pub fn check_sidecar(path: &Path) -> ArtifactCheck {
    match verify_sidecar(path) {
        Ok(digest) => ArtifactCheck {
            path: path.to_path_buf(),
            ok: true,
            detail: digest,
        },
        Err(e) => ArtifactCheck {
            path: path.to_path_buf(),
            ok: false,
            detail: e.to_string(),
        },
    }
}

/// Check a manifest's sidecar and that it carries at least one case.
pub fn check_manifest(path: &Path) -> ArtifactCheck {
    let mut check = check_sidecar(path);
    if !check.ok {
        return check;
    }
    match TestVectorManifest::load(path) {
        Ok(m) if m.cases.is_empty() => {
            check.ok = false;
            check.detail = format!("manifest '{}' has no cases", m.model_ver);
        }
        Ok(_) => {}
        Err(e) => {
            check.ok = false;
            check.detail = e.to_string();
        }
    }
    check
}
