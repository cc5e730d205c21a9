//! Persistent record storage with reset-on-corruption semantics.

use crate::error::StoreError;
use crate::types::{RecordPatch, WorkRecord};
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// JSON-array file store.
///
/// The file holds the records newest first. A missing, empty or unparseable
/// file is rewritten as `[]` and read as empty.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in file order.
    ///
    /// Only I/O failures of the read itself are returned. Content that is
    /// not valid UTF-8 or not a record array is treated as corrupt.
    pub async fn read_all(&self) -> Result<Vec<WorkRecord>, StoreError> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = ?self.path, "Record file not found, creating an empty one");
                self.write_all(&[]).await?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        if content.iter().all(u8::is_ascii_whitespace) {
            info!(path = ?self.path, "Record file is empty, initializing with []");
            self.write_all(&[]).await?;
            return Ok(Vec::new());
        }

        match serde_json::from_slice::<Vec<WorkRecord>>(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Record file is corrupt, resetting to []");
                self.write_all(&[]).await?;
                Ok(Vec::new())
            }
        }
    }

    /// Overwrite the file atomically (temp file + rename).
    pub async fn write_all(&self, records: &[WorkRecord]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(records)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, &data).await?;
        fs::rename(&temp_path, &self.path).await?;

        debug!(
            "Saved {} records ({} bytes) to {:?}",
            records.len(),
            data.len(),
            self.path
        );
        Ok(())
    }

    /// Write `records` to a fresh timestamped side file.
    async fn backup(&self, records: &[WorkRecord]) -> Result<PathBuf, StoreError> {
        let backup_path = self.backup_path(Utc::now().timestamp_millis());
        let data = serde_json::to_vec_pretty(records)?;
        fs::write(&backup_path, &data).await?;
        Ok(backup_path)
    }

    fn backup_path(&self, millis: i64) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("records");
        let dir = self.path.parent().unwrap_or_else(|| Path::new(""));

        let mut candidate = dir.join(format!("{stem}_backup_{millis}.json"));
        let mut suffix = 1;
        while candidate.exists() {
            candidate = dir.join(format!("{stem}_backup_{millis}_{suffix}.json"));
            suffix += 1;
        }
        candidate
    }
}

/// In-memory store for tests and non-persistent runs.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<WorkRecord>>,
    backups: RwLock<Vec<Vec<WorkRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read_all(&self) -> Result<Vec<WorkRecord>, StoreError> {
        Ok(self.records.read().await.clone())
    }

    pub async fn write_all(&self, records: &[WorkRecord]) -> Result<(), StoreError> {
        *self.records.write().await = records.to_vec();
        Ok(())
    }

    /// Snapshots taken by `clear`, oldest first.
    pub async fn backups(&self) -> Vec<Vec<WorkRecord>> {
        self.backups.read().await.clone()
    }
}

/// Record store, file-backed or in-memory.
///
/// Every mutation is a read-modify-write of the whole collection and is
/// flushed before returning. A single process is assumed to own the store.
pub enum Store {
    File(FileStore),
    Memory(MemoryStore),
}

impl Store {
    /// Open a file store, creating or repairing the file as needed.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = FileStore::new(path);
        let count = store.read_all().await?.len();
        info!("Opened record store at {:?} with {} records", store.path(), count);
        Ok(Store::File(store))
    }

    pub fn memory() -> Self {
        Store::Memory(MemoryStore::new())
    }

    /// All records, newest first.
    pub async fn read_all(&self) -> Result<Vec<WorkRecord>, StoreError> {
        match self {
            Store::File(s) => s.read_all().await,
            Store::Memory(s) => s.read_all().await,
        }
    }

    pub async fn write_all(&self, records: &[WorkRecord]) -> Result<(), StoreError> {
        match self {
            Store::File(s) => s.write_all(records).await,
            Store::Memory(s) => s.write_all(records).await,
        }
    }

    /// Insert `record` at the head. Its id is bumped past the current maximum
    /// if it collides with an existing one.
    pub async fn append(&self, mut record: WorkRecord) -> Result<WorkRecord, StoreError> {
        let mut records = self.read_all().await?;

        if records.iter().any(|r| r.id == record.id) {
            let max = records.iter().map(|r| r.id).max().unwrap_or(record.id);
            record.id = max + 1;
        }

        records.insert(0, record.clone());
        self.write_all(&records).await?;
        Ok(record)
    }

    /// Merge `patch` into the record with `id`. Returns `None` if absent.
    pub async fn update(
        &self,
        id: u64,
        patch: &RecordPatch,
    ) -> Result<Option<WorkRecord>, StoreError> {
        let mut records = self.read_all().await?;

        let Some(record) = records.iter_mut().find(|r| r.id == id) else {
            debug!(id, "Update skipped, record not found");
            return Ok(None);
        };
        patch.apply(record, Utc::now());
        let updated = record.clone();

        self.write_all(&records).await?;
        Ok(Some(updated))
    }

    /// Archive the current contents and reset to empty.
    ///
    /// Returns the backup file path for file stores.
    pub async fn clear(&self) -> Result<Option<PathBuf>, StoreError> {
        let records = self.read_all().await?;

        let backup = match self {
            Store::File(s) => Some(s.backup(&records).await?),
            Store::Memory(s) => {
                s.backups.write().await.push(records.clone());
                None
            }
        };

        self.write_all(&[]).await?;
        info!(
            archived = records.len(),
            backup = ?backup,
            "Record store cleared"
        );
        Ok(backup)
    }
}
