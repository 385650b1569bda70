//! Durable key → record map on top of sled
//!
//! Opening is the only operation whose failure is reported to the caller as
//! fatal. Runtime lookups and writes log their failures and degrade to
//! "entry absent" so audio routing keeps working with a broken database.

use crate::entry::{Entry, EntryCodec};
use crate::error::StoreError;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Preference database handle (cheap to clone, shares the same tree)
#[derive(Clone)]
pub struct PreferenceStore {
    db: sled::Db,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("path", &self.path)
            .field("len", &self.db.len())
            .finish()
    }
}

impl PreferenceStore {
    /// Open (or create) the database directory at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = sled::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Opened preference database at {}", path.display());
        Ok(Self {
            db,
            path: Some(path.to_path_buf()),
        })
    }

    /// In-memory database removed when the last handle drops
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.db.get(key.as_bytes()) {
            Ok(value) => value.map(|v| v.to_vec()),
            Err(e) => {
                error!("Failed to read preference {:?}: {}", key, e);
                None
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.db.contains_key(key.as_bytes()).unwrap_or_else(|e| {
            error!("Failed to look up preference {:?}: {}", key, e);
            false
        })
    }

    /// Store `data` under `key`.
    ///
    /// With `replace == false` an existing record is left untouched. Returns
    /// whether the record was written.
    pub fn set(&self, key: &str, data: &[u8], replace: bool) -> Result<bool, StoreError> {
        if replace {
            self.db.insert(key.as_bytes(), data)?;
            return Ok(true);
        }
        let swapped = self
            .db
            .compare_and_swap(key.as_bytes(), None as Option<&[u8]>, Some(data))?;
        Ok(swapped.is_ok())
    }

    /// Remove `key`; returns whether a record existed
    pub fn unset(&self, key: &str) -> bool {
        match self.db.remove(key.as_bytes()) {
            Ok(old) => old.is_some(),
            Err(e) => {
                error!("Failed to remove preference {:?}: {}", key, e);
                false
            }
        }
    }

    /// Snapshot of every record, in key order. Keys that are not UTF-8 are skipped.
    pub fn iterate(&self) -> Vec<(String, Vec<u8>)> {
        let mut records = Vec::new();
        for item in self.db.iter() {
            match item {
                Ok((key, value)) => match String::from_utf8(key.to_vec()) {
                    Ok(key) => records.push((key, value.to_vec())),
                    Err(_) => warn!("Skipping preference with non UTF-8 key"),
                },
                Err(e) => {
                    error!("Failed to iterate preference database: {}", e);
                    break;
                }
            }
        }
        records
    }

    pub fn keys(&self) -> Vec<String> {
        self.iterate().into_iter().map(|(k, _)| k).collect()
    }

    pub fn clear_all(&self) {
        if let Err(e) = self.db.clear() {
            error!("Failed to clear preference database: {}", e);
        }
    }

    /// Write all pending changes to disk; returns the number of bytes flushed
    pub fn flush(&self) -> Result<usize, StoreError> {
        Ok(self.db.flush()?)
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Decoded entry for `key`; undecodable records read as absent
    pub fn read_entry(&self, key: &str) -> Option<Entry> {
        let data = self.get(key)?;
        match EntryCodec::decode(&data) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Ignoring invalid preference record {:?}: {}", key, e);
                None
            }
        }
    }

    /// Encode and store `entry`; failures are logged and reported as `false`
    pub fn write_entry(&self, key: &str, entry: &Entry, replace: bool) -> bool {
        match self.set(key, &EntryCodec::encode(entry), replace) {
            Ok(written) => written,
            Err(e) => {
                error!("Failed to store preference {:?}: {}", key, e);
                false
            }
        }
    }
}
