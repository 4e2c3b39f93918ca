#![forbid(unsafe_code)]

//! Saved-state persistence for suspended activity stacks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     SavedStateStore                           │
//! │   - In-memory cache of encoded stack snapshots                │
//! │   - Delegates to StorageBackend for persistence               │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     StorageBackend                            │
//! │   - MemoryStorage: in-memory (testing, ephemeral)             │
//! │   - FileStorage: JSON file (requires state-persistence)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Invariants
//!
//! 1. **Graceful degradation**: storage failures never panic; operations return `Result`.
//! 2. **Atomic writes**: file storage uses write-then-rename.
//! 3. **Opaque activity state**: each entry's saved payload is whatever the
//!    activity wrote in `close`; the store never looks inside it.
//! 4. **Version gate**: entries written with another snapshot version are
//!    ignored, not misread.
//!
//! # Feature Gates
//!
//! - `state-persistence`: enables `FileStorage`. Without it only
//!   `MemoryStorage` is available.

use actstack_core::{ActivityId, DataOutput, Identity, Payload};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

/// Errors that can occur during saved-state storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error during file operations.
    Io(std::io::Error),
    /// Serialization or deserialization error.
    #[cfg(feature = "state-persistence")]
    Serialization(String),
    /// Stored data is corrupted or in an invalid format.
    Corruption(String),
    /// Backend is not available.
    Unavailable(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "state-persistence")]
            StorageError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            StorageError::Corruption(msg) => write!(f, "storage corruption: {msg}"),
            StorageError::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<actstack_core::Error> for StorageError {
    fn from(e: actstack_core::Error) -> Self {
        StorageError::Corruption(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// One suspended activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    /// Providing app, `None` for built-ins.
    pub app: Option<Identity>,
    pub activity_id: ActivityId,
    /// Lived off-stack.
    pub detached: bool,
    /// What the activity wrote in `close`.
    pub saved: Payload,
}

/// A suspended stack, bottom slot first, detached activities last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackSnapshot {
    pub entries: Vec<SnapshotEntry>,
}

impl StackSnapshot {
    /// Snapshot encoding version.
    pub const VERSION: u32 = 1;

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode to bytes for a [`StorageBackend`].
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let mut out = DataOutput::new();
        out.put_serialized("stack", self)?;
        Ok(out.finish().as_bytes().to_vec())
    }

    /// Decode bytes produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        Payload::from_bytes(bytes.to_vec())
            .decode()?
            .get_serialized("stack")?
            .ok_or_else(|| StorageError::Corruption("snapshot has no stack entry".into()))
    }
}

/// A serialized snapshot with version metadata.
#[derive(Clone, Debug)]
pub struct StoredEntry {
    /// Store key, usually the session name.
    pub key: String,
    /// [`StackSnapshot::VERSION`] at write time.
    pub version: u32,
    /// Encoded snapshot bytes.
    pub data: Vec<u8>,
}

/// Pluggable snapshot storage.
///
/// Implementations must be `Send + Sync`; `save_all` should be atomic and
/// `load_all` resilient to partially corrupt data.
pub trait StorageBackend: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Load all stored entries. Empty on first run.
    fn load_all(&self) -> StorageResult<HashMap<String, StoredEntry>>;

    /// Replace all stored entries.
    fn save_all(&self, entries: &HashMap<String, StoredEntry>) -> StorageResult<()>;

    /// Remove everything.
    fn clear(&self) -> StorageResult<()>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Ephemeral in-memory backend.
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, StoredEntry>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entries(entries: HashMap<String, StoredEntry>) -> Self {
        Self {
            data: RwLock::new(entries),
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "MemoryStorage"
    }

    fn load_all(&self) -> StorageResult<HashMap<String, StoredEntry>> {
        let guard = self
            .data
            .read()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        Ok(guard.clone())
    }

    fn save_all(&self, entries: &HashMap<String, StoredEntry>) -> StorageResult<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        *guard = entries.clone();
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.data
            .write()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?
            .clear();
        Ok(())
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.data.read().map(|g| g.len()).unwrap_or(0);
        f.debug_struct("MemoryStorage")
            .field("entries", &count)
            .finish()
    }
}

#[cfg(feature = "state-persistence")]
mod file_storage {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::fs::{self, File};
    use std::io::{BufReader, BufWriter, Write};
    use std::path::{Path, PathBuf};

    #[derive(Serialize, Deserialize)]
    struct StateFile {
        format_version: u32,
        entries: HashMap<String, FileEntry>,
    }

    #[derive(Serialize, Deserialize)]
    struct FileEntry {
        version: u32,
        data_base64: String,
    }

    impl StateFile {
        const FORMAT_VERSION: u32 = 1;
    }

    /// JSON file backend with write-then-rename.
    ///
    /// ```json
    /// {
    ///   "format_version": 1,
    ///   "entries": {
    ///     "session": { "version": 1, "data_base64": "eyJzdGFjayI6Li4ufQ==" }
    ///   }
    /// }
    /// ```
    pub struct FileStorage {
        path: PathBuf,
    }

    impl FileStorage {
        /// The file is created on first save.
        #[must_use]
        pub fn new(path: impl AsRef<Path>) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
            }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn temp_path(&self) -> PathBuf {
            let mut tmp = self.path.clone();
            tmp.set_extension("json.tmp");
            tmp
        }
    }

    impl StorageBackend for FileStorage {
        fn name(&self) -> &str {
            "FileStorage"
        }

        fn load_all(&self) -> StorageResult<HashMap<String, StoredEntry>> {
            if !self.path.exists() {
                return Ok(HashMap::new());
            }
            let reader = BufReader::new(File::open(&self.path)?);
            let file: StateFile = serde_json::from_reader(reader).map_err(|e| {
                StorageError::Serialization(format!("failed to parse state file: {e}"))
            })?;

            if file.format_version != StateFile::FORMAT_VERSION {
                tracing::warn!(
                    stored = file.format_version,
                    expected = StateFile::FORMAT_VERSION,
                    "state file format version mismatch, ignoring stored snapshots"
                );
                return Ok(HashMap::new());
            }

            let mut result = HashMap::with_capacity(file.entries.len());
            for (key, entry) in file.entries {
                match STANDARD.decode(&entry.data_base64) {
                    Ok(data) => {
                        result.insert(
                            key.clone(),
                            StoredEntry {
                                key,
                                version: entry.version,
                                data,
                            },
                        );
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "undecodable snapshot entry, skipping");
                    }
                }
            }
            Ok(result)
        }

        fn save_all(&self, entries: &HashMap<String, StoredEntry>) -> StorageResult<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let file = StateFile {
                format_version: StateFile::FORMAT_VERSION,
                entries: entries
                    .iter()
                    .map(|(key, entry)| {
                        (
                            key.clone(),
                            FileEntry {
                                version: entry.version,
                                data_base64: STANDARD.encode(&entry.data),
                            },
                        )
                    })
                    .collect(),
            };

            let tmp_path = self.temp_path();
            {
                let mut writer = BufWriter::new(File::create(&tmp_path)?);
                serde_json::to_writer_pretty(&mut writer, &file).map_err(|e| {
                    StorageError::Serialization(format!("failed to serialize snapshots: {e}"))
                })?;
                writer.flush()?;
                writer.get_ref().sync_all()?;
            }
            fs::rename(&tmp_path, &self.path)?;

            tracing::debug!(path = %self.path.display(), entries = entries.len(), "saved stack snapshots");
            Ok(())
        }

        fn clear(&self) -> StorageResult<()> {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            Ok(())
        }

        fn is_available(&self) -> bool {
            match self.path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => {
                    parent.exists() || fs::create_dir_all(parent).is_ok()
                }
                _ => true,
            }
        }
    }

    impl fmt::Debug for FileStorage {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("FileStorage")
                .field("path", &self.path)
                .finish()
        }
    }
}

#[cfg(feature = "state-persistence")]
pub use file_storage::FileStorage;

/// Cache of encoded snapshots in front of a [`StorageBackend`].
///
/// Writes mark the store dirty; [`flush`](Self::flush) persists.
pub struct SavedStateStore {
    backend: Box<dyn StorageBackend>,
    cache: RwLock<HashMap<String, StoredEntry>>,
    dirty: RwLock<bool>,
}

impl SavedStateStore {
    /// Does not load; call [`load`](Self::load) first.
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            cache: RwLock::new(HashMap::new()),
            dirty: RwLock::new(false),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStorage::new()))
    }

    #[cfg(feature = "state-persistence")]
    #[must_use]
    pub fn with_file(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(Box::new(FileStorage::new(path)))
    }

    /// Replace the cache with stored data. Returns the entry count.
    pub fn load(&self) -> StorageResult<usize> {
        let entries = self.backend.load_all()?;
        let count = entries.len();
        *self
            .cache
            .write()
            .map_err(|_| StorageError::Corruption("cache lock poisoned".into()))? = entries;
        *self
            .dirty
            .write()
            .map_err(|_| StorageError::Corruption("dirty lock poisoned".into()))? = false;
        tracing::debug!(backend = %self.backend.name(), count, "loaded stack snapshots");
        Ok(count)
    }

    /// Persist if anything changed since the last flush.
    pub fn flush(&self) -> StorageResult<bool> {
        let dirty = *self
            .dirty
            .read()
            .map_err(|_| StorageError::Corruption("dirty lock poisoned".into()))?;
        if !dirty {
            return Ok(false);
        }
        let cache = self
            .cache
            .read()
            .map_err(|_| StorageError::Corruption("cache lock poisoned".into()))?;
        self.backend.save_all(&cache)?;
        *self
            .dirty
            .write()
            .map_err(|_| StorageError::Corruption("dirty lock poisoned".into()))? = false;
        Ok(true)
    }

    /// Store `snapshot` under `key`.
    pub fn put(&self, key: impl Into<String>, snapshot: &StackSnapshot) -> StorageResult<()> {
        let key = key.into();
        let data = snapshot.encode()?;
        self.cache
            .write()
            .map_err(|_| StorageError::Corruption("cache lock poisoned".into()))?
            .insert(
                key.clone(),
                StoredEntry {
                    key,
                    version: StackSnapshot::VERSION,
                    data,
                },
            );
        *self
            .dirty
            .write()
            .map_err(|_| StorageError::Corruption("dirty lock poisoned".into()))? = true;
        Ok(())
    }

    /// Snapshot stored under `key`.
    ///
    /// Entries of another version read as absent.
    pub fn get(&self, key: &str) -> StorageResult<Option<StackSnapshot>> {
        let cache = self
            .cache
            .read()
            .map_err(|_| StorageError::Corruption("cache lock poisoned".into()))?;
        let Some(entry) = cache.get(key) else {
            return Ok(None);
        };
        if entry.version != StackSnapshot::VERSION {
            tracing::warn!(
                key,
                stored = entry.version,
                expected = StackSnapshot::VERSION,
                "snapshot version mismatch, ignoring"
            );
            return Ok(None);
        }
        StackSnapshot::decode(&entry.data).map(Some)
    }

    /// Drop the snapshot under `key`. Returns whether one existed.
    pub fn remove(&self, key: &str) -> StorageResult<bool> {
        let removed = self
            .cache
            .write()
            .map_err(|_| StorageError::Corruption("cache lock poisoned".into()))?
            .remove(key)
            .is_some();
        if removed {
            *self
                .dirty
                .write()
                .map_err(|_| StorageError::Corruption("dirty lock poisoned".into()))? = true;
        }
        Ok(removed)
    }

    /// Clear cache and backend.
    pub fn clear(&self) -> StorageResult<()> {
        self.cache
            .write()
            .map_err(|_| StorageError::Corruption("cache lock poisoned".into()))?
            .clear();
        self.backend.clear()?;
        *self
            .dirty
            .write()
            .map_err(|_| StorageError::Corruption("dirty lock poisoned".into()))? = false;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.read().map(|d| *d).unwrap_or(false)
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }
}

impl fmt::Debug for SavedStateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.cache.read().map(|c| c.len()).unwrap_or(0);
        f.debug_struct("SavedStateStore")
            .field("backend", &self.backend.name())
            .field("entries", &entries)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
