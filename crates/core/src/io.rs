//! All-or-nothing artifact output.
//!
//! Every file is written to a temporary sibling and renamed over the target,
//! so a downstream reader sees either the old file or the complete new one.
//! The `*_new` variants refuse to replace an existing target.

use serde::Serialize;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::Result;

/// Write `path` through `write`, replacing it only once `write` succeeds.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    persist_with(path, true, write).map(|_| ())
}

/// Like [`write_atomic`], but never replaces an existing `path`.
///
/// Returns `false`, leaving the existing file untouched, when `path` is
/// already present at rename time.
pub fn write_new<F>(path: &Path, write: F) -> Result<bool>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    persist_with(path, false, write)
}

fn persist_with<F>(path: &Path, clobber: bool, write: F) -> Result<bool>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    if clobber {
        tmp.persist(path).map_err(|e| e.error)?;
        return Ok(true);
    }
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error.into()),
    }
}

/// Serialize `value` as JSON into `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    write_atomic(path, |w| {
        if pretty {
            serde_json::to_writer_pretty(&mut *w, value)?;
        } else {
            serde_json::to_writer(&mut *w, value)?;
        }
        Ok(())
    })
}

/// Serialize `value` as JSON into `path` unless `path` already exists.
pub fn write_json_new<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<bool> {
    write_new(path, |w| {
        if pretty {
            serde_json::to_writer_pretty(&mut *w, value)?;
        } else {
            serde_json::to_writer(&mut *w, value)?;
        }
        Ok(())
    })
}

/// Write raw bytes into `path`.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic(path, |w| {
        w.write_all(bytes)?;
        Ok(())
    })
}
