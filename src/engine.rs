use crate::collection::Collection;
use crate::errors::AppError;
use crate::ndjson;
use crate::types::CollectionName;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// In-memory collections, optionally snapshotted to `<data_dir>/<collection>.ndjson`.
pub struct Engine {
    pub(crate) collections: RwLock<HashMap<CollectionName, Arc<Collection>>>,
    data_dir: Option<PathBuf>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("collections", &self.list_collection_names())
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self { collections: RwLock::new(HashMap::new()), data_dir: None }
    }

    /// Engine that loads from and saves to `dir`.
    pub fn with_data_dir<P: AsRef<Path>>(dir: P) -> Result<Self, AppError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { collections: RwLock::new(HashMap::new()), data_dir: Some(dir) })
    }

    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Returns the named collection, creating it if missing.
    pub fn create_collection(&self, name: &str) -> Arc<Collection> {
        if let Some(c) = self.collections.read().get(name) {
            return c.clone();
        }
        self.collections
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Collection::new(name.to_string())))
            .clone()
    }

    pub fn list_collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Loads every `<name>.ndjson` in the data dir into the matching collection.
    /// Collections are created on demand; existing records are replaced.
    pub fn load_snapshot(&self) -> Result<u64, AppError> {
        let Some(dir) = self.data_dir.as_ref() else {
            return Ok(0);
        };
        let mut total = 0;
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("ndjson") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let col = self.create_collection(name);
            col.clear();
            let report = ndjson::import_ndjson(&col, File::open(&path)?, true)?;
            if report.skipped > 0 {
                log::warn!("snapshot {}: skipped {} records", path.display(), report.skipped);
            }
            total += report.inserted;
        }
        log::info!("loaded {total} records from {}", dir.display());
        Ok(total)
    }

    /// Writes each collection to a temp file and renames it into place.
    pub fn save_snapshot(&self) -> Result<u64, AppError> {
        let Some(dir) = self.data_dir.as_ref() else {
            return Ok(0);
        };
        fs::create_dir_all(dir)?;
        let cols: Vec<Arc<Collection>> = self.collections.read().values().cloned().collect();
        let mut total = 0;
        for col in cols {
            let name = col.name_str();
            let tmp = dir.join(format!("{name}.ndjson.tmp"));
            total += ndjson::export_ndjson(&col, File::create(&tmp)?)?;
            fs::rename(&tmp, dir.join(format!("{name}.ndjson")))?;
        }
        log::info!("saved {total} records to {}", dir.display());
        Ok(total)
    }
}
