//! Key-value persistence used as the second-tier copy of cached entries.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use mercato_types::MercatoError;

/// Synchronous string key-value store.
///
/// Implementations must be cheap enough to call from non-async code paths;
/// callers treat every error as non-fatal.
pub trait PersistentStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    /// Returns `MercatoError::Storage` when the backing medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, MercatoError>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    /// Returns `MercatoError::Storage` when the value cannot be stored, e.g. the
    /// store is over capacity.
    fn set(&self, key: &str, value: &str) -> Result<(), MercatoError>;

    /// Remove a value; removing an absent key is not an error.
    ///
    /// # Errors
    /// Returns `MercatoError::Storage` when the backing medium cannot be written.
    fn remove(&self, key: &str) -> Result<(), MercatoError>;

    /// List all keys.
    ///
    /// # Errors
    /// Returns `MercatoError::Storage` when the backing medium cannot be read.
    fn keys(&self) -> Result<Vec<String>, MercatoError>;
}

/// In-process store, optionally bounded by the total size of keys and values.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    capacity_bytes: Option<usize>,
}

impl MemoryStore {
    /// Unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once keys plus values exceed `bytes`.
    #[must_use]
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity_bytes: Some(bytes),
        }
    }

    /// Number of stored keys.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("mutex poisoned").len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, MercatoError> {
        let guard = self.entries.lock().expect("mutex poisoned");
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), MercatoError> {
        let mut guard = self.entries.lock().expect("mutex poisoned");
        if let Some(cap) = self.capacity_bytes {
            let used: usize = guard
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > cap {
                return Err(MercatoError::storage(format!(
                    "quota exceeded writing {key}: {} bytes over capacity {cap}",
                    used + key.len() + value.len()
                )));
            }
        }
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MercatoError> {
        self.entries.lock().expect("mutex poisoned").remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, MercatoError> {
        Ok(self
            .entries
            .lock()
            .expect("mutex poisoned")
            .keys()
            .cloned()
            .collect())
    }
}

/// Store backed by a single JSON document on disk.
///
/// The whole document is kept in memory and rewritten on every mutation via
/// a temporary file and rename.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    /// Returns `MercatoError::Storage` if an existing file cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MercatoError> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(MercatoError::storage)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(MercatoError::storage(e)),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), MercatoError> {
        let raw = serde_json::to_string(entries).map_err(MercatoError::storage)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(MercatoError::storage)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, raw).map_err(MercatoError::storage)?;
        std::fs::rename(&tmp, &self.path).map_err(MercatoError::storage)
    }
}

impl PersistentStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, MercatoError> {
        Ok(self
            .entries
            .lock()
            .expect("mutex poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), MercatoError> {
        let mut guard = self.entries.lock().expect("mutex poisoned");
        let previous = guard.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush(&guard) {
            // keep memory and disk in agreement
            match previous {
                Some(v) => guard.insert(key.to_string(), v),
                None => guard.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), MercatoError> {
        let mut guard = self.entries.lock().expect("mutex poisoned");
        if guard.remove(key).is_some() {
            self.flush(&guard)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, MercatoError> {
        Ok(self
            .entries
            .lock()
            .expect("mutex poisoned")
            .keys()
            .cloned()
            .collect())
    }
}
