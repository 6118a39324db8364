// Record collection persistence

use std::path::{Path, PathBuf};

use uaplaces_recon::source::Checkpoint;
use uaplaces_recon::{ReconError, RecordStore};

use crate::error::IoError;

/// Load the collection. A missing or malformed file is an error.
pub fn load_collection(path: &Path) -> Result<RecordStore, IoError> {
    let content = std::fs::read_to_string(path).map_err(|e| IoError::read(path, e))?;
    RecordStore::from_json(&content).map_err(|source| IoError::Collection {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the collection, or start empty when the file does not exist yet.
pub fn load_or_empty(path: &Path) -> Result<RecordStore, IoError> {
    if !path.exists() {
        log::info!("{} not found, starting an empty collection", path.display());
        return Ok(RecordStore::new());
    }
    load_collection(path)
}

/// Write the collection through a sibling temp file and a rename, so a
/// crash mid-write leaves the previous version in place.
pub fn save_collection(store: &RecordStore, path: &Path) -> Result<(), IoError> {
    let json = store.to_json().map_err(|source| IoError::Collection {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, json.as_bytes())
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| IoError::write(path, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).map_err(|e| IoError::write(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| IoError::write(path, e))
}

/// Checkpoint that rewrites the collection file after every batch.
#[derive(Debug, Clone)]
pub struct JsonCheckpoint {
    path: PathBuf,
    saves: usize,
}

impl JsonCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), saves: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl Checkpoint for JsonCheckpoint {
    fn save(&mut self, store: &RecordStore) -> Result<(), ReconError> {
        save_collection(store, &self.path).map_err(|e| ReconError::Checkpoint(e.to_string()))?;
        self.saves += 1;
        log::debug!("checkpoint {} written to {}", self.saves, self.path.display());
        Ok(())
    }
}
