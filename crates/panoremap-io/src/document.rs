//! JSON document loading and atomic persistence.
//!
//! Documents are loaded into owned values, mutated in memory, and written
//! back via a temporary sibling file renamed into place, so a crash
//! mid-write never corrupts an existing document.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::IoError;

/// Load and parse a JSON document.
///
/// # Errors
///
/// [`IoError::Read`] when the file cannot be read, [`IoError::Json`] when
/// it does not parse into `T`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, IoError> {
    let bytes = fs::read(path).map_err(|source| IoError::Read {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| IoError::Json {
        path: path.to_owned(),
        source,
    })
}

/// Serialize `value` and write it to `path` via write-new-then-rename.
///
/// # Errors
///
/// [`IoError::Json`] when serialization fails, [`IoError::Write`] when the
/// temporary file cannot be written or renamed into place.
pub fn save_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), IoError> {
    let json = serde_json::to_vec(value).map_err(|source| IoError::Json {
        path: path.to_owned(),
        source,
    })?;
    let tmp = tmp_sibling(path);
    fs::write(&tmp, &json).map_err(|source| IoError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| IoError::Write {
        path: path.to_owned(),
        source,
    })
}

/// Temporary sibling path used for atomic writes (same directory, so the
/// final rename never crosses a filesystem boundary).
pub(crate) fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map_or_else(|| OsString::from("output"), ToOwned::to_owned);
    name.push(".tmp");
    path.with_file_name(name)
}
