//! JSON file storage with merge-on-write semantics.
//!
//! Each [`JsonFile`] wraps a single path holding a flat JSON object. Writes
//! never replace the object wholesale: new keys overwrite old keys of the same
//! name, everything else on disk is preserved. This is what lets a token
//! refresh persist only the fields the provider returned without dropping the
//! stored `refresh_token` or `scope`.
//!
//! # Failure policy
//!
//! - Missing file → `read` returns `None`
//! - Corrupt JSON (or a non-object document) → `read` returns `None`
//! - Any other I/O failure (permissions, is-a-directory, ...) → `StorageError`
//!
//! There is no locking. The read-merge-write sequence is not atomic across
//! processes; two concurrent writers can lose an update.

use crate::error::{OAuthError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};


/// Flat JSON object as stored on disk.
pub type JsonMap = Map<String, Value>;

/// A named JSON document on durable storage.
#[derive(Clone, Debug)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored object.
    ///
    /// # Returns
    /// * `Ok(Some(map))` - File exists and holds a JSON object
    /// * `Ok(None)` - File missing, undecodable, or not a JSON object
    /// * `Err` - Filesystem error other than not-found
    pub fn read(&self) -> Result<Option<JsonMap>> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored file");
                return Ok(None);
            }
            Err(e) => return Err(OAuthError::storage(&self.path, e)),
        };

        match serde_json::from_slice::<Value>(&contents) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => {
                warn!(path = %self.path.display(), "Stored file is not a JSON object, ignoring");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Stored file is not valid JSON, ignoring");
                Ok(None)
            }
        }
    }

    /// Shallow-merges `data` into the stored object and writes the result back.
    ///
    /// Keys in `data` win; keys only present on disk survive.
    pub fn write(&self, data: &JsonMap) -> Result<()> {
        let mut merged = self.read()?.unwrap_or_default();
        for (key, value) in data {
            merged.insert(key.clone(), value.clone());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| OAuthError::storage(parent, e))?;
        }

        let serialized = serde_json::to_string_pretty(&Value::Object(merged))
            .map_err(|e| OAuthError::storage(&self.path, e.into()))?;
        fs::write(&self.path, serialized).map_err(|e| OAuthError::storage(&self.path, e))?;

        debug!(
            path = %self.path.display(),
            keys_written = data.len(),
            "Merged data into stored file"
        );

        Ok(())
    }

    /// Removes the file. Deleting a missing file is a no-op.
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Deleted stored file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(OAuthError::storage(&self.path, e)),
        }
    }
}
