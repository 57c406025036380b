// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Keeps the last applied record across daemon restarts and crashes, so a
// restarted client does not push an update it already made.
//
// ## Crash Recovery
//
// - Atomic writes: write temp file, fsync, then rename over the target
// - Corruption detection: the document is validated on load
// - Automatic backup: `.backup` holds the previous good document
// - Recovery: falls back to the backup, then to an empty state
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "state": {
//     "lastAppliedAddress": {
//       "hostname": "home.example.org",
//       "address": "1.2.3.4",
//       "recordType": "A"
//     },
//     "lastAttemptTimestamp": "2025-01-09T12:00:00Z",
//     "lastSuccessTimestamp": "2025-01-09T12:00:00Z",
//     "consecutiveFailureCount": 0
//   }
// }
// ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::error::StorageError;
use crate::traits::state_store::{ReconciliationState, StateStore};

/// State file format version
/// Used for future migration if format changes
const STATE_FILE_VERSION: &str = "1.0";

/// File-based state store with crash recovery
///
/// # Crash Recovery
///
/// - **Atomic writes**: New state written to a temporary file, synced, then renamed
/// - **Backup**: Last known good document kept in the `.backup` file
/// - **Corruption detection**: JSON validation on load
/// - **Automatic recovery**: Falls back to backup if main file corrupted
///
/// # Example
///
/// ```rust,no_run
/// use hostup_core::state::FileStateStore;
/// use hostup_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/hostup/state.json").await?;
///
///     let mut state = store.load().await?;
///     state.consecutive_failure_count = 0;
///     store.save(&state).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    state: ReconciliationState,
}

impl FileStateStore {
    /// Create a file state store, creating parent directories if needed
    ///
    /// Nothing is read here; the first `load` does that.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create state directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the state document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main state file
    /// 2. If it is corrupt, try loading backup and restore the main file from it
    /// 3. If backup also fails, start with empty state
    async fn load_with_recovery(&self) -> Result<ReconciliationState, StorageError> {
        let err = match Self::read_document(&self.path).await {
            Ok(Some(state)) => {
                tracing::debug!("Loaded state from {}", self.path.display());
                return Ok(state);
            }
            Ok(None) => {
                tracing::debug!("State file does not exist: {}", self.path.display());
                return Ok(ReconciliationState::default());
            }
            Err(err @ StorageError::Corrupt(_)) => err,
            Err(err) => return Err(err),
        };

        tracing::warn!(
            "State file appears corrupted: {}. Attempting recovery from backup.",
            err
        );

        let backup_path = Self::backup_path(&self.path);
        match Self::read_document(&backup_path).await {
            Ok(Some(state)) => {
                tracing::info!("Recovered state from backup {}", backup_path.display());
                if let Err(restore_err) = fs::copy(&backup_path, &self.path).await {
                    tracing::error!(
                        "Failed to restore state file from backup: {}",
                        restore_err
                    );
                }
                Ok(state)
            }
            Ok(None) => {
                tracing::warn!("No backup file found. Starting with empty state.");
                Ok(ReconciliationState::default())
            }
            Err(backup_err) => {
                tracing::error!(
                    "Backup also unreadable: {}. Starting with empty state.",
                    backup_err
                );
                Ok(ReconciliationState::default())
            }
        }
    }

    /// Read one state document; `None` if the file does not exist
    async fn read_document(path: &Path) -> Result<Option<ReconciliationState>, StorageError> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::Io(format!(
                    "Failed to read state file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let document: StateFileFormat = serde_json::from_str(&content).map_err(|e| {
            StorageError::Corrupt(format!("{}: {}", path.display(), e))
        })?;

        if document.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STATE_FILE_VERSION,
                document.version
            );
        }

        Ok(Some(document.state))
    }

    /// Write state to file atomically
    async fn write_document(&self, state: &ReconciliationState) -> Result<(), StorageError> {
        let document = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            state: state.clone(),
        };

        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| StorageError::Io(format!("Failed to serialize state: {}", e)))?;

        let _guard = self.write_lock.lock().await;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                StorageError::Io(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                StorageError::Io(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                StorageError::Io(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Only a document that still parses is worth keeping as the backup
        if matches!(Self::read_document(&self.path).await, Ok(Some(_))) {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            StorageError::Io(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<ReconciliationState, StorageError> {
        self.load_with_recovery().await
    }

    async fn save(&self, state: &ReconciliationState) -> Result<(), StorageError> {
        self.write_document(state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Record, RecordType};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn state_for(address: &str, failures: u32) -> ReconciliationState {
        ReconciliationState {
            last_applied_address: Some(
                Record::parse("home.example.org", address, RecordType::A).unwrap(),
            ),
            last_attempt_timestamp: Some(Utc.with_ymd_and_hms(2025, 1, 9, 12, 0, 0).unwrap()),
            last_success_timestamp: Some(Utc.with_ymd_and_hms(2025, 1, 9, 11, 0, 0).unwrap()),
            consecutive_failure_count: failures,
        }
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        assert_eq!(store.load().await.unwrap(), ReconciliationState::default());

        let state = state_for("1.2.3.4", 0);
        store.save(&state).await.unwrap();
        assert!(path.exists());

        // A fresh instance sees the same document
        let store2 = FileStateStore::new(&path).await.unwrap();
        assert_eq!(store2.load().await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_file_store_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store.save(&state_for("1.2.3.4", 0)).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_file_store_document_layout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store.save(&state_for("1.2.3.4", 2)).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], "1.0");
        assert_eq!(raw["state"]["consecutiveFailureCount"], 2);
        assert_eq!(raw["state"]["lastAppliedAddress"]["recordType"], "A");
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        let first = state_for("1.2.3.4", 0);
        store.save(&first).await.unwrap();

        // Second write moves the first document into the backup
        store.save(&state_for("1.2.3.5", 0)).await.unwrap();
        let backup_path = FileStateStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = store.load().await.unwrap();
        assert_eq!(
            recovered, first,
            "Backup should contain previous state, not latest"
        );

        // The main file was restored from the backup
        let store2 = FileStateStore::new(&path).await.unwrap();
        assert_eq!(store2.load().await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_without_backup_starts_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, b"{ not json").await.unwrap();

        let store = FileStateStore::new(&path).await.unwrap();
        assert_eq!(store.load().await.unwrap(), ReconciliationState::default());
    }

    #[tokio::test]
    async fn test_file_store_atomic_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        for i in 0..10 {
            store.save(&state_for(&format!("1.2.3.{}", i), i)).await.unwrap();
        }

        let final_state = FileStateStore::new(&path).await.unwrap().load().await.unwrap();
        assert_eq!(final_state, state_for("1.2.3.9", 9));
        assert!(!store.temp_path().exists());
    }
}
