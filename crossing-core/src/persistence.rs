//! Atomic file persistence for checkpoints and manifests.
//!
//! Every write goes to a temporary sibling which is flushed to disk and then
//! renamed over the target, so readers observe either the old file or the new
//! one and never a partially written file.

use crate::error::Result;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Sibling path used while a write is in flight: `best.json` -> `best.json.tmp`.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("snapshot"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replace `path` with `data`.
///
/// Creates parent directories if they don't exist.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let staging = staging_path(path);
    let result = (|| -> io::Result<()> {
        let mut file = File::create(&staging)?;
        file.write_all(data)?;
        file.sync_all()?;
        std::fs::rename(&staging, path)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&staging);
    }
    Ok(result?)
}

/// Serialize `value` as pretty JSON and atomically write it to `path`.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

/// Read and deserialize JSON from `path`.
///
/// Returns `Ok(None)` when the file does not exist; malformed content is a
/// `Serialization` error.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_slice(&bytes)?))
}
